pub mod api;
pub mod config;
pub mod control;
pub mod db;
pub mod error;
pub mod prediction_cache;
pub mod sensors;
pub mod state;
pub mod timeseries;
