pub mod aggregation;
pub mod store;

use chrono::Duration;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

pub use aggregation::{AggregationEngine, Summary};
pub use store::{StoreConfig, TimeSeriesStore};

/// Resolution of a history query.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum Interval {
    #[default]
    Raw,
    Hourly,
    Daily,
    Weekly,
}

impl Interval {
    /// Bucket width for downsampling; `None` for raw readings.
    pub fn bucket_width(&self) -> Option<Duration> {
        match self {
            Interval::Raw => None,
            Interval::Hourly => Some(Duration::hours(1)),
            Interval::Daily => Some(Duration::days(1)),
            Interval::Weekly => Some(Duration::weeks(1)),
        }
    }
}
