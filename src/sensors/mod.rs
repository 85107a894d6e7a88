pub mod classification;
pub mod ingestion;
pub mod registry;
pub mod service;

pub use service::SensorService;
