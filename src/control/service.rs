use tracing::info;

use super::registry::{ActuatorRegistry, NewActuator};
use crate::{
    config::ActuatorSeed,
    db::{
        journal::{Journal, JournalEntry},
        models::{Actuator, ActuatorStateEvent},
    },
    error::CoreResult,
};

/// Actuator operations. Control commands update in-memory state and are
/// journaled; nothing is sent to hardware from here.
#[derive(Clone)]
pub struct ControlService {
    registry: ActuatorRegistry,
    journal: Option<Journal>,
}

impl ControlService {
    pub fn new(journal: Option<Journal>) -> Self {
        Self {
            registry: ActuatorRegistry::new(),
            journal,
        }
    }

    async fn record(&self, entry: JournalEntry) {
        if let Some(journal) = &self.journal {
            journal.record(entry).await;
        }
    }

    pub async fn register(&self, new: NewActuator) -> CoreResult<Actuator> {
        self.registry
            .register(new, |actuator| self.record(JournalEntry::ActuatorRegistered(actuator)))
            .await
    }

    /// Register an actuator declared in configuration unless it exists.
    pub async fn seed(&self, seed: &ActuatorSeed) -> CoreResult<()> {
        if self.registry.lookup_actuator(seed.id).await.is_ok() {
            return Ok(());
        }
        let actuator = Actuator {
            id: seed.id,
            name: format!("{} {}", seed.actuator_type, seed.id),
            actuator_type: seed.actuator_type.clone(),
            location: seed.location.clone(),
            description: None,
            created_at: chrono::Utc::now(),
            is_active: true,
            current_state: false,
            last_activated: None,
            value: None,
        };
        self.registry
            .restore(actuator, Vec::new(), |actuator| {
                self.record(JournalEntry::ActuatorRegistered(actuator))
            })
            .await?;
        info!(actuator_id = seed.id, "Actuator seeded from configuration");
        Ok(())
    }

    /// Replay journaled actuators; `events` ordered by actuator, oldest first.
    pub async fn restore(
        &self,
        actuators: Vec<Actuator>,
        mut events: Vec<ActuatorStateEvent>,
    ) -> CoreResult<()> {
        for actuator in actuators {
            let (own, rest): (Vec<_>, Vec<_>) =
                events.into_iter().partition(|e| e.actuator_id == actuator.id);
            events = rest;
            self.registry.restore(actuator, own, |_| async {}).await?;
        }
        Ok(())
    }

    pub async fn get(&self, id: i64) -> CoreResult<Actuator> {
        self.registry.get(id).await
    }

    pub async fn list(&self) -> Vec<Actuator> {
        self.registry.list().await
    }

    pub async fn control(
        &self,
        id: i64,
        state: bool,
        value: Option<f64>,
    ) -> CoreResult<ActuatorStateEvent> {
        self.registry
            .control(id, state, value, |event, actuator| {
                self.record(JournalEntry::ActuatorControlled { actuator, event })
            })
            .await
    }

    pub async fn history(&self, id: i64, limit: usize) -> CoreResult<Vec<ActuatorStateEvent>> {
        self.registry.history(id, limit).await
    }
}
