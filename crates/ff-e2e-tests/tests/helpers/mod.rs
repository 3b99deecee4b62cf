//! Shared test harness for E2E integration tests.
//!
//! Runs the real `PublishSession` against a shared `MockTransport`, so every
//! scenario goes through transport selection, the connection manager, the
//! offline queue and snapshot assembly exactly as the binary does.

#![allow(dead_code)]

use std::sync::Arc;

use chrono::{NaiveDate, NaiveDateTime};
use serde_json::json;

use ff_collectors::{Clock, Collaborators, CountSource, FixedClock, StaticCount, StaticSource};
use ff_mqtt_channel::{
    EndpointSettings, MockTransport, MockTransportFactory, OperationTimeouts, ReconnectPolicy,
    RecordingObserver,
};
use ff_protocol::EnvironmentReading;
use ff_publisher::{PublishSession, RecordingReporter, RunOutcome, SessionSettings};

/// The instant every fixed-clock scenario is stamped with.
pub fn fixed_instant() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2024, 5, 1)
        .unwrap()
        .and_hms_micro_opt(9, 30, 0, 123_456)
        .unwrap()
}

pub fn weather_reading() -> EnvironmentReading {
    match json!({"conditions": "overcast", "temp_c": 18}) {
        serde_json::Value::Object(map) => map,
        _ => unreachable!(),
    }
}

pub fn traffic_reading() -> EnvironmentReading {
    match json!({"congestion": "light", "incidents": 0}) {
        serde_json::Value::Object(map) => map,
        _ => unreachable!(),
    }
}

/// Mutual TLS endpoint `h` with credentials `r`, `c`, `k`.
pub fn mutual_tls_settings() -> SessionSettings {
    SessionSettings {
        endpoint: EndpointSettings {
            host: "h".into(),
            root_ca_path: "r".into(),
            certificate_path: "c".into(),
            private_key_path: "k".into(),
            ..Default::default()
        },
        reconnect: ReconnectPolicy::default(),
        timeouts: OperationTimeouts::default(),
        topic: ff_protocol::topics::TELEMETRY.to_string(),
    }
}

/// Collaborators returning fixed stub values.
pub fn stub_collaborators(people_count: i64) -> Collaborators {
    collaborators_with(
        Arc::new(FixedClock(fixed_instant())),
        Arc::new(StaticCount(people_count)),
    )
}

pub fn collaborators_with(clock: Arc<dyn Clock>, count: Arc<dyn CountSource>) -> Collaborators {
    Collaborators {
        clock,
        count,
        weather: Arc::new(StaticSource::new("weather", weather_reading())),
        traffic: Arc::new(StaticSource::new("traffic", traffic_reading())),
    }
}

/// End-to-end harness: one mock broker link shared by every run.
pub struct TestHarness {
    pub mqtt: Arc<MockTransport>,
    pub factory: Arc<MockTransportFactory>,
    pub observer: Arc<RecordingObserver>,
    pub reporter: Arc<RecordingReporter>,
}

impl TestHarness {
    pub fn new() -> Self {
        let mqtt = Arc::new(MockTransport::new());
        let observer = Arc::new(RecordingObserver::new());
        Self {
            factory: Arc::new(MockTransportFactory::new(mqtt.clone())),
            reporter: Arc::new(RecordingReporter::with_observer(observer.clone())),
            mqtt,
            observer,
        }
    }

    pub fn session(&self, settings: SessionSettings, collaborators: Collaborators) -> PublishSession {
        PublishSession::new(
            settings,
            self.factory.clone(),
            collaborators,
            self.reporter.clone(),
        )
    }

    /// Run one session to completion.
    pub async fn run(&self, settings: SessionSettings, collaborators: Collaborators) -> RunOutcome {
        self.session(settings, collaborators).run().await
    }
}
