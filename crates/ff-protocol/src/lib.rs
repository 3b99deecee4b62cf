pub mod telemetry;
pub mod topics;

pub use telemetry::*;
