//! Data collaborators for the Footfall publisher.
//!
//! Each part of a telemetry snapshot comes from its own source behind a
//! trait (`Clock`, `CountSource`, `EnvironmentSource`), so the publish
//! session can run against fixed values in tests. `Collaborators` gathers
//! all four and assembles the snapshot.

pub mod clock;
pub mod count;
pub mod environment;
pub mod error;
pub mod mock;

use std::sync::Arc;

use ff_protocol::{CalendarSnapshot, TelemetrySnapshot};

// Re-export key types for convenience
pub use clock::{Clock, FixedClock, SteppingClock, SystemClock};
pub use count::{CountSource, StaticCount};
pub use environment::{EnvironmentConfig, EnvironmentSource, HttpJsonSource, StaticSource};
pub use error::{CollectorError, CollectorResult};
pub use mock::{FailingCount, MockEnvironment};

/// The four sources a snapshot is assembled from.
#[derive(Clone)]
pub struct Collaborators {
    pub clock: Arc<dyn Clock>,
    pub count: Arc<dyn CountSource>,
    pub weather: Arc<dyn EnvironmentSource>,
    pub traffic: Arc<dyn EnvironmentSource>,
}

impl Collaborators {
    /// Query every source in turn and build a snapshot.
    ///
    /// The first failure aborts assembly; a partial snapshot is never
    /// returned.
    pub async fn snapshot(&self) -> CollectorResult<TelemetrySnapshot> {
        let time = CalendarSnapshot::at(self.clock.now());
        let pi = self.count.read().await?;
        let weather = self.weather.fetch().await?;
        let traffic = self.traffic.fetch().await?;

        tracing::debug!(
            time = %time.id,
            people_count = pi.people_count,
            weather_keys = weather.len(),
            traffic_keys = traffic.len(),
            "snapshot assembled"
        );

        Ok(TelemetrySnapshot {
            time,
            pi,
            weather,
            traffic,
        })
    }
}
