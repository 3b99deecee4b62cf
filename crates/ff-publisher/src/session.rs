//! Publish session: orchestrates exactly one run.
//!
//! select transport -> connect -> collect snapshot -> publish (QoS 1) ->
//! disconnect. Disconnect runs on every path once a connection manager
//! exists, and its failure never changes the outcome of the run.

use std::sync::Arc;

use ff_collectors::Collaborators;
use ff_mqtt_channel::{
    ConnectionManager, EndpointSettings, MqttError, OperationTimeouts, PublishOutcome, Qos,
    ReconnectPolicy, TransportFactory, select_transport,
};
use ff_protocol::topics;

use crate::error::RunError;
use crate::reporter::{RunReporter, Stage};

/// Connection settings for one run.
#[derive(Debug, Clone)]
pub struct SessionSettings {
    pub endpoint: EndpointSettings,
    pub reconnect: ReconnectPolicy,
    pub timeouts: OperationTimeouts,
    pub topic: String,
}

/// The message a successful run delivered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Published {
    pub topic: String,
    pub payload: Vec<u8>,
    /// True when the message went through the offline queue.
    pub queued: bool,
}

/// Result of a run.
#[derive(Debug)]
pub struct RunOutcome {
    pub result: Result<Published, RunError>,
    /// Set when teardown failed. Reported, but the run's result stands.
    pub disconnect_error: Option<MqttError>,
}

impl RunOutcome {
    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }

    /// Process exit code: 0 on success, otherwise the error's code.
    pub fn exit_code(&self) -> u8 {
        match &self.result {
            Ok(_) => 0,
            Err(e) => e.exit_code(),
        }
    }
}

pub struct PublishSession {
    settings: SessionSettings,
    factory: Arc<dyn TransportFactory>,
    collaborators: Collaborators,
    reporter: Arc<dyn RunReporter>,
}

impl PublishSession {
    pub fn new(
        settings: SessionSettings,
        factory: Arc<dyn TransportFactory>,
        collaborators: Collaborators,
        reporter: Arc<dyn RunReporter>,
    ) -> Self {
        Self {
            settings,
            factory,
            collaborators,
            reporter,
        }
    }

    /// Execute one publish run.
    pub async fn run(&self) -> RunOutcome {
        let manager = match self.prepare() {
            Ok(manager) => manager,
            Err(e) => return self.finish(Err(e), None),
        };

        let result = self.connect_and_publish(&manager).await;

        self.reporter.stage(Stage::Disconnecting);
        let disconnect_error = manager.disconnect().await.err();
        self.finish(result, disconnect_error)
    }

    /// Validate settings and build the connection manager. No I/O beyond
    /// reading TLS material from disk happens here.
    fn prepare(&self) -> Result<ConnectionManager, RunError> {
        self.reporter.stage(Stage::SelectingTransport);

        let config = select_transport(&self.settings.endpoint).map_err(configuration)?;
        if !topics::is_valid_publish_topic(&self.settings.topic) {
            return Err(RunError::Configuration(format!(
                "invalid publish topic '{}'",
                self.settings.topic
            )));
        }
        let transport = self.factory.build(&config).map_err(configuration)?;

        ConnectionManager::new(
            transport,
            self.settings.reconnect.clone(),
            self.settings.timeouts.clone(),
            self.reporter.connection_observer(),
        )
        .map_err(configuration)
    }

    async fn connect_and_publish(&self, manager: &ConnectionManager) -> Result<Published, RunError> {
        self.reporter.stage(Stage::Connecting);
        manager
            .connect()
            .await
            .map_err(|e| RunError::Connection(e.to_string()))?;

        self.reporter.stage(Stage::Collecting);
        let snapshot = self.collaborators.snapshot().await?;
        let payload = snapshot
            .to_payload()
            .map_err(|e| RunError::Publish(format!("failed to serialize snapshot: {e}")))?;

        self.reporter.stage(Stage::Publishing);
        let topic = &self.settings.topic;
        let queued = match manager
            .publish(topic, payload.clone(), Qos::AtLeastOnce)
            .await
            .map_err(RunError::from_publish)?
        {
            PublishOutcome::Delivered => false,
            PublishOutcome::Queued(receipt) => {
                receipt
                    .wait(self.settings.timeouts.operation())
                    .await
                    .map_err(RunError::from_publish)?;
                true
            }
        };

        self.reporter.published(topic, payload.len());
        Ok(Published {
            topic: topic.clone(),
            payload,
            queued,
        })
    }

    fn finish(
        &self,
        result: Result<Published, RunError>,
        disconnect_error: Option<MqttError>,
    ) -> RunOutcome {
        if let Err(e) = &result {
            self.reporter.run_failed(e);
        }
        if let Some(e) = &disconnect_error {
            self.reporter.disconnect_failed(e);
        }
        RunOutcome {
            result,
            disconnect_error,
        }
    }
}

fn configuration(error: MqttError) -> RunError {
    match error {
        MqttError::Configuration(message) => RunError::Configuration(message),
        other => RunError::Configuration(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use ff_collectors::{FailingCount, FixedClock, MockEnvironment, StaticCount};
    use ff_mqtt_channel::{MockTransport, MockTransportFactory, RecordingObserver, SessionState};
    use ff_protocol::EnvironmentReading;

    use crate::reporter::{RecordingReporter, ReportEvent};

    fn settings() -> SessionSettings {
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
            topic: topics::TELEMETRY.to_string(),
        }
    }

    fn collaborators(count: Arc<dyn ff_collectors::CountSource>) -> Collaborators {
        let now = NaiveDate::from_ymd_opt(2024, 5, 1)
            .unwrap()
            .and_hms_micro_opt(9, 30, 0, 123_456)
            .unwrap();
        Collaborators {
            clock: Arc::new(FixedClock(now)),
            count,
            weather: Arc::new(MockEnvironment::new("weather", EnvironmentReading::new())),
            traffic: Arc::new(MockEnvironment::new("traffic", EnvironmentReading::new())),
        }
    }

    struct Harness {
        mock: Arc<MockTransport>,
        factory: Arc<MockTransportFactory>,
        reporter: Arc<RecordingReporter>,
        observer: Arc<RecordingObserver>,
    }

    impl Harness {
        fn new() -> Self {
            let mock = Arc::new(MockTransport::new());
            let observer = Arc::new(RecordingObserver::new());
            Self {
                factory: Arc::new(MockTransportFactory::new(mock.clone())),
                mock,
                reporter: Arc::new(RecordingReporter::with_observer(observer.clone())),
                observer,
            }
        }

        fn session(&self, settings: SessionSettings, collaborators: Collaborators) -> PublishSession {
            PublishSession::new(
                settings,
                self.factory.clone(),
                collaborators,
                self.reporter.clone(),
            )
        }
    }

    #[tokio::test(start_paused = true)]
    async fn successful_run_publishes_once_and_disconnects() {
        let h = Harness::new();
        let outcome = h
            .session(settings(), collaborators(Arc::new(StaticCount(3))))
            .run()
            .await;

        let published = outcome.result.as_ref().unwrap();
        assert!(!published.queued);
        assert_eq!(outcome.exit_code(), 0);
        assert!(outcome.disconnect_error.is_none());

        let delivered = h.mock.delivered();
        assert_eq!(delivered.len(), 1);
        assert_eq!(delivered[0].topic, "sdk/test/Python");
        assert_eq!(delivered[0].qos, Qos::AtLeastOnce);
        assert_eq!(delivered[0].payload, published.payload);
        assert_eq!(h.mock.connect_calls(), 1);
        assert_eq!(h.mock.disconnect_calls(), 1);

        assert_eq!(
            h.reporter.stages(),
            vec![
                Stage::SelectingTransport,
                Stage::Connecting,
                Stage::Collecting,
                Stage::Publishing,
                Stage::Disconnecting,
            ]
        );
        assert_eq!(
            h.observer.transitions().last(),
            Some(&(SessionState::Disconnecting, SessionState::Disconnected))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn missing_key_is_configuration_error_without_io() {
        let h = Harness::new();
        let mut s = settings();
        s.endpoint.private_key_path.clear();

        let outcome = h
            .session(s, collaborators(Arc::new(StaticCount(3))))
            .run()
            .await;
        assert!(matches!(outcome.result, Err(RunError::Configuration(_))));
        assert_eq!(outcome.exit_code(), 2);
        assert!(h.factory.configs().is_empty());
        assert_eq!(h.mock.connect_calls(), 0);
        assert_eq!(h.mock.disconnect_calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn unreadable_tls_material_is_configuration_error() {
        let mock = Arc::new(MockTransport::new());
        let factory = Arc::new(MockTransportFactory::failing(
            mock.clone(),
            "failed to read CA cert 'r'",
        ));
        let reporter = Arc::new(RecordingReporter::new());
        let session = PublishSession::new(
            settings(),
            factory,
            collaborators(Arc::new(StaticCount(3))),
            reporter,
        );

        let outcome = session.run().await;
        assert!(matches!(outcome.result, Err(RunError::Configuration(_))));
        assert_eq!(mock.connect_calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn invalid_topic_is_configuration_error() {
        let h = Harness::new();
        let mut s = settings();
        s.topic = "sdk/#".into();

        let outcome = h
            .session(s, collaborators(Arc::new(StaticCount(3))))
            .run()
            .await;
        assert!(matches!(outcome.result, Err(RunError::Configuration(_))));
        assert_eq!(h.mock.connect_calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn connect_failure_aborts_run() {
        let h = Harness::new();
        h.mock.fail_next_connects(1);

        let outcome = h
            .session(settings(), collaborators(Arc::new(StaticCount(3))))
            .run()
            .await;
        assert!(matches!(outcome.result, Err(RunError::Connection(_))));
        assert_eq!(outcome.exit_code(), 1);
        assert!(h.mock.delivered().is_empty());
        assert!(!h.reporter.stages().contains(&Stage::Collecting));
    }

    #[tokio::test(start_paused = true)]
    async fn collaborator_failure_publishes_nothing() {
        let h = Harness::new();
        let outcome = h
            .session(settings(), collaborators(Arc::new(FailingCount)))
            .run()
            .await;

        assert!(matches!(outcome.result, Err(RunError::Collaborator(_))));
        assert!(h.mock.delivered().is_empty());
        assert_eq!(h.mock.disconnect_calls(), 1);
        assert!(
            h.reporter
                .events()
                .iter()
                .any(|e| matches!(e, ReportEvent::Failed(msg) if msg.contains("people counter")))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn unacknowledged_publish_times_out_and_still_disconnects() {
        let h = Harness::new();
        h.mock.withhold_acks();

        let outcome = h
            .session(settings(), collaborators(Arc::new(StaticCount(3))))
            .run()
            .await;
        assert!(matches!(outcome.result, Err(RunError::PublishTimeout(_))));
        assert_eq!(h.mock.disconnect_calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn disconnect_failure_does_not_change_outcome() {
        let h = Harness::new();
        h.mock.hang_disconnect();

        let outcome = h
            .session(settings(), collaborators(Arc::new(StaticCount(3))))
            .run()
            .await;
        assert!(outcome.is_success());
        assert_eq!(outcome.exit_code(), 0);
        assert!(matches!(
            outcome.disconnect_error,
            Some(MqttError::DisconnectTimeout { .. })
        ));
        assert!(
            h.reporter
                .events()
                .iter()
                .any(|e| matches!(e, ReportEvent::DisconnectFailed(_)))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn websocket_run_ignores_credentials() {
        let h = Harness::new();
        let mut s = settings();
        s.endpoint.use_websocket = true;

        let outcome = h
            .session(s, collaborators(Arc::new(StaticCount(3))))
            .run()
            .await;
        assert!(outcome.is_success());

        let configs = h.factory.configs();
        assert_eq!(configs.len(), 1);
        assert_eq!(configs[0].port(), 443);
        assert!(configs[0].client_auth().is_none());
    }
}
