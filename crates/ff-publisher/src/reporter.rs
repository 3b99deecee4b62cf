//! Run reporting.
//!
//! A `PublishSession` never logs on its own; it reports progress through a
//! `RunReporter` that lives exactly as long as the run. `TracingReporter`
//! is what the binary uses. `RecordingReporter` captures events for tests.

use std::fmt;
use std::sync::{Arc, Mutex};

use ff_mqtt_channel::{ConnectionObserver, MqttError, NoopObserver, TracingObserver};
use uuid::Uuid;

use crate::error::RunError;

/// Steps of a publish run, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    SelectingTransport,
    Connecting,
    Collecting,
    Publishing,
    Disconnecting,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::SelectingTransport => "selecting_transport",
            Self::Connecting => "connecting",
            Self::Collecting => "collecting",
            Self::Publishing => "publishing",
            Self::Disconnecting => "disconnecting",
        };
        f.write_str(name)
    }
}

/// Receives progress of a single run.
pub trait RunReporter: Send + Sync {
    fn stage(&self, _stage: Stage) {}

    fn published(&self, _topic: &str, _bytes: usize) {}

    fn run_failed(&self, _error: &RunError) {}

    fn disconnect_failed(&self, _error: &MqttError) {}

    /// Observer handed to the connection manager for this run.
    fn connection_observer(&self) -> Arc<dyn ConnectionObserver> {
        Arc::new(NoopObserver)
    }
}

/// Reports through `tracing`, inside a span tagged with a fresh run id.
pub struct TracingReporter {
    run_id: Uuid,
    span: tracing::Span,
}

impl TracingReporter {
    pub fn new() -> Self {
        let run_id = Uuid::now_v7();
        let span = tracing::info_span!("publish_run", %run_id);
        Self { run_id, span }
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    /// Span the run should be instrumented with.
    pub fn span(&self) -> &tracing::Span {
        &self.span
    }
}

impl Default for TracingReporter {
    fn default() -> Self {
        Self::new()
    }
}

impl RunReporter for TracingReporter {
    fn stage(&self, stage: Stage) {
        self.span.in_scope(|| tracing::info!(%stage, "run stage"));
    }

    fn published(&self, topic: &str, bytes: usize) {
        self.span
            .in_scope(|| tracing::info!(topic, bytes, "telemetry published"));
    }

    fn run_failed(&self, error: &RunError) {
        self.span.in_scope(|| {
            tracing::error!(error = %error, exit_code = error.exit_code(), "run failed");
        });
    }

    fn disconnect_failed(&self, error: &MqttError) {
        self.span
            .in_scope(|| tracing::warn!(error = %error, "disconnect did not complete cleanly"));
    }

    fn connection_observer(&self) -> Arc<dyn ConnectionObserver> {
        Arc::new(TracingObserver)
    }
}

/// An event captured by [`RecordingReporter`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReportEvent {
    Stage(Stage),
    Published { topic: String, bytes: usize },
    Failed(String),
    DisconnectFailed(String),
}

/// Reporter that stores every event for later assertions.
#[derive(Default)]
pub struct RecordingReporter {
    events: Mutex<Vec<ReportEvent>>,
    observer: Option<Arc<dyn ConnectionObserver>>,
}

impl RecordingReporter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Forward connection events to `observer`.
    pub fn with_observer(observer: Arc<dyn ConnectionObserver>) -> Self {
        Self {
            events: Mutex::new(Vec::new()),
            observer: Some(observer),
        }
    }

    pub fn events(&self) -> Vec<ReportEvent> {
        self.events.lock().map(|e| e.clone()).unwrap_or_default()
    }

    /// Stages entered, in order.
    pub fn stages(&self) -> Vec<Stage> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                ReportEvent::Stage(stage) => Some(stage),
                _ => None,
            })
            .collect()
    }

    fn record(&self, event: ReportEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event);
        }
    }
}

impl RunReporter for RecordingReporter {
    fn stage(&self, stage: Stage) {
        self.record(ReportEvent::Stage(stage));
    }

    fn published(&self, topic: &str, bytes: usize) {
        self.record(ReportEvent::Published {
            topic: topic.to_string(),
            bytes,
        });
    }

    fn run_failed(&self, error: &RunError) {
        self.record(ReportEvent::Failed(error.to_string()));
    }

    fn disconnect_failed(&self, error: &MqttError) {
        self.record(ReportEvent::DisconnectFailed(error.to_string()));
    }

    fn connection_observer(&self) -> Arc<dyn ConnectionObserver> {
        match &self.observer {
            Some(observer) => observer.clone(),
            None => Arc::new(NoopObserver),
        }
    }
}
