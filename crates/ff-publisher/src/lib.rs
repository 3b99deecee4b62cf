//! Library side of the footfall publisher: one telemetry snapshot per run.
//!
//! Re-exports all modules so external crates (e.g. `ff-e2e-tests`) can
//! drive a `PublishSession` against mock transports and collaborators.

pub mod cli;
pub mod config;
pub mod error;
pub mod reporter;
pub mod session;

pub use error::RunError;
pub use reporter::{RecordingReporter, ReportEvent, RunReporter, Stage, TracingReporter};
pub use session::{Published, PublishSession, RunOutcome, SessionSettings};
