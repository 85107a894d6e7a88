use std::{collections::BTreeMap, future::Future, sync::Arc};

use chrono::Utc;
use serde::Deserialize;
use tokio::sync::{Mutex, RwLock};
use tracing::info;
use utoipa::ToSchema;

use crate::{
    db::models::{Actuator, ActuatorStateEvent},
    error::{CoreError, CoreResult},
};

/// Request body for registering an actuator.
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct NewActuator {
    pub name: String,
    /// `pump`, `light`, `fan`, `heater`, ...
    pub actuator_type: String,
    pub location: String,
    pub description: Option<String>,
}

/// What the registry contract exposes about an actuator.
#[derive(Debug, Clone, PartialEq)]
pub struct ActuatorInfo {
    pub actuator_type: String,
}

#[derive(Debug)]
struct Entry {
    actuator: Actuator,
    /// Append-only, oldest first.
    history: Vec<ActuatorStateEvent>,
}

/// Tracks actuators, their current state, and every control event.
///
/// Each actuator has its own `Mutex`; control calls on different actuators
/// run independently.
#[derive(Clone, Default)]
pub struct ActuatorRegistry {
    entries: Arc<RwLock<BTreeMap<i64, Arc<Mutex<Entry>>>>>,
}

impl ActuatorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an actuator under the next free id. It starts active and off.
    ///
    /// `publish` runs under the registry write lock, before the actuator can
    /// be controlled.
    pub async fn register<F, Fut>(&self, new: NewActuator, publish: F) -> CoreResult<Actuator>
    where
        F: FnOnce(Actuator) -> Fut,
        Fut: Future<Output = ()>,
    {
        if new.name.trim().is_empty() {
            return Err(CoreError::validation("actuator name must not be empty"));
        }
        if new.actuator_type.trim().is_empty() {
            return Err(CoreError::validation("actuator type must not be empty"));
        }

        let mut entries = self.entries.write().await;
        let id = match entries.keys().next_back() {
            None => 1,
            Some(last) => last
                .checked_add(1)
                .ok_or_else(|| CoreError::validation("actuator id space exhausted"))?,
        };
        let actuator = Actuator {
            id,
            name: new.name,
            actuator_type: new.actuator_type,
            location: new.location,
            description: new.description,
            created_at: Utc::now(),
            is_active: true,
            current_state: false,
            last_activated: None,
            value: None,
        };
        publish(actuator.clone()).await;
        entries.insert(
            id,
            Arc::new(Mutex::new(Entry { actuator: actuator.clone(), history: Vec::new() })),
        );

        info!(actuator_id = id, actuator_type = %actuator.actuator_type, "Actuator registered");
        Ok(actuator)
    }

    /// Insert an actuator with known state and history (configuration seed or
    /// journal replay). `history` must be oldest first. `publish` runs as in
    /// [`register`](Self::register).
    pub async fn restore<F, Fut>(
        &self,
        actuator: Actuator,
        history: Vec<ActuatorStateEvent>,
        publish: F,
    ) -> CoreResult<()>
    where
        F: FnOnce(Actuator) -> Fut,
        Fut: Future<Output = ()>,
    {
        let mut entries = self.entries.write().await;
        if entries.contains_key(&actuator.id) {
            return Err(CoreError::validation(format!(
                "actuator id {} is already registered",
                actuator.id
            )));
        }
        publish(actuator.clone()).await;
        entries.insert(actuator.id, Arc::new(Mutex::new(Entry { actuator, history })));
        Ok(())
    }

    async fn entry(&self, id: i64) -> CoreResult<Arc<Mutex<Entry>>> {
        self.entries
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or(CoreError::UnknownActuator(id))
    }

    pub async fn lookup_actuator(&self, id: i64) -> CoreResult<ActuatorInfo> {
        let entry = self.entry(id).await?;
        let entry = entry.lock().await;
        Ok(ActuatorInfo { actuator_type: entry.actuator.actuator_type.clone() })
    }

    pub async fn get(&self, id: i64) -> CoreResult<Actuator> {
        let entry = self.entry(id).await?;
        let entry = entry.lock().await;
        Ok(entry.actuator.clone())
    }

    /// All actuators ordered by id.
    pub async fn list(&self) -> Vec<Actuator> {
        let entries: Vec<_> = self.entries.read().await.values().cloned().collect();
        let mut out = Vec::with_capacity(entries.len());
        for entry in entries {
            out.push(entry.lock().await.actuator.clone());
        }
        out
    }

    /// Apply a control command. `last_activated` only moves when the new
    /// state is on.
    ///
    /// `on_applied` receives the event and the resulting actuator while the
    /// actuator's lock is still held, so calls observe changes in apply order.
    pub async fn control<F, Fut>(
        &self,
        id: i64,
        state: bool,
        value: Option<f64>,
        on_applied: F,
    ) -> CoreResult<ActuatorStateEvent>
    where
        F: FnOnce(ActuatorStateEvent, Actuator) -> Fut,
        Fut: Future<Output = ()>,
    {
        if value.is_some_and(|v| !v.is_finite()) {
            return Err(CoreError::validation("actuator value must be a finite number"));
        }

        let entry = self.entry(id).await?;
        let mut entry = entry.lock().await;
        let now = Utc::now();

        entry.actuator.current_state = state;
        entry.actuator.value = value;
        if state {
            entry.actuator.last_activated = Some(now);
        }

        let event = ActuatorStateEvent {
            actuator_id: id,
            state,
            value,
            recorded_at: now,
        };
        entry.history.push(event.clone());
        on_applied(event.clone(), entry.actuator.clone()).await;

        info!(actuator_id = id, state, value = ?value, "Actuator state changed");
        Ok(event)
    }

    /// Up to `limit` most recent events, newest first.
    pub async fn history(&self, id: i64, limit: usize) -> CoreResult<Vec<ActuatorStateEvent>> {
        let entry = self.entry(id).await?;
        let entry = entry.lock().await;
        Ok(entry.history.iter().rev().take(limit).cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn registry_with_pump() -> (ActuatorRegistry, i64) {
        let reg = ActuatorRegistry::new();
        let pump = reg
            .register(
                NewActuator {
                    name: "Irrigation pump".to_owned(),
                    actuator_type: "pump".to_owned(),
                    location: "Greenhouse 1".to_owned(),
                    description: None,
                },
                |_| async {},
            )
            .await
            .unwrap();
        (reg, pump.id)
    }

    #[tokio::test]
    async fn new_actuator_starts_off_and_active() {
        let (reg, id) = registry_with_pump().await;
        let a = reg.get(id).await.unwrap();
        assert!(a.is_active);
        assert!(!a.current_state);
        assert!(a.last_activated.is_none());
        assert_eq!(reg.lookup_actuator(id).await.unwrap().actuator_type, "pump");
    }

    #[tokio::test]
    async fn turning_on_sets_last_activated_and_off_keeps_it() {
        let (reg, id) = registry_with_pump().await;
        let before = Utc::now();

        reg.control(id, true, None, |_, _| async {}).await.unwrap();
        let on = reg.get(id).await.unwrap();
        assert!(on.current_state);
        let activated = on.last_activated.unwrap();
        assert!(activated >= before);

        reg.control(id, false, None, |_, _| async {}).await.unwrap();
        let off = reg.get(id).await.unwrap();
        assert!(!off.current_state);
        assert_eq!(off.last_activated, Some(activated));
    }

    #[tokio::test]
    async fn analog_value_is_recorded() {
        let (reg, id) = registry_with_pump().await;
        let event = reg.control(id, true, Some(50.0), |_, _| async {}).await.unwrap();
        assert_eq!(event.value, Some(50.0));
        assert_eq!(reg.get(id).await.unwrap().value, Some(50.0));

        let err = reg.control(id, true, Some(f64::NAN), |_, _| async {}).await.unwrap_err();
        assert!(matches!(err, CoreError::Validation(_)));
    }

    #[tokio::test]
    async fn history_is_newest_first_and_limited() {
        let (reg, id) = registry_with_pump().await;
        for i in 0..5 {
            reg.control(id, i % 2 == 0, Some(i as f64), |_, _| async {}).await.unwrap();
        }

        let history = reg.history(id, 3).await.unwrap();
        let values: Vec<f64> = history.iter().map(|e| e.value.unwrap()).collect();
        assert_eq!(values, vec![4.0, 3.0, 2.0]);
        assert!(history.iter().all(|e| e.actuator_id == id));
        assert_eq!(reg.history(id, 100).await.unwrap().len(), 5);
    }

    #[tokio::test]
    async fn unknown_actuator_errors() {
        let reg = ActuatorRegistry::new();
        let err = reg.control(3, true, None, |_, _| async {}).await.unwrap_err();
        assert_eq!(err, CoreError::UnknownActuator(3));
        assert_eq!(reg.history(3, 10).await.unwrap_err(), CoreError::UnknownActuator(3));
        assert_eq!(reg.get(3).await.unwrap_err(), CoreError::UnknownActuator(3));
    }

    #[tokio::test]
    async fn restore_rejects_taken_id() {
        let (reg, id) = registry_with_pump().await;
        let existing = reg.get(id).await.unwrap();
        let err = reg.restore(existing, Vec::new(), |_| async {}).await.unwrap_err();
        assert!(matches!(err, CoreError::Validation(_)));
    }

    #[tokio::test]
    async fn register_after_max_id_is_rejected_not_wrapped() {
        let (reg, id) = registry_with_pump().await;
        let mut top = reg.get(id).await.unwrap();
        top.id = i64::MAX;
        reg.restore(top, Vec::new(), |_| async {}).await.unwrap();

        let err = reg
            .register(
                NewActuator {
                    name: "Fan".to_owned(),
                    actuator_type: "fan".to_owned(),
                    location: "Greenhouse 1".to_owned(),
                    description: None,
                },
                |_| async {},
            )
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::Validation(_)));
        assert_eq!(reg.list().await.len(), 2);
    }

    #[tokio::test]
    async fn on_applied_sees_the_state_it_caused() {
        let (reg, id) = registry_with_pump().await;
        let event = reg
            .control(id, true, Some(30.0), |event, actuator| async move {
                assert_eq!(actuator.current_state, event.state);
                assert_eq!(actuator.value, event.value);
                assert_eq!(actuator.last_activated, Some(event.recorded_at));
            })
            .await
            .unwrap();
        assert!(event.state);
    }
}
