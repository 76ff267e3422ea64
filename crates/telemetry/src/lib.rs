//! Observability for the TravelMate startup sequencer.

pub mod metrics;
pub mod logging;
pub mod audit;

pub use metrics::Metrics;
pub use logging::{init_logging, LogFormat};
