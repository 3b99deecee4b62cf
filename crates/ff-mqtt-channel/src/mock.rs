//! Mock MQTT transport for testing without a real broker.
//!
//! Records every delivered message and every connect/disconnect call,
//! and can be scripted to fail or hang connects, withhold QoS 1
//! acknowledgments, or drop the link after a number of messages.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::watch;

use crate::config::ConnectionConfig;
use crate::error::{MqttError, MqttResult};
use crate::manager::SessionState;
use crate::observer::ConnectionObserver;
use crate::transport::{LinkState, Qos, Transport, TransportFactory};

/// A recorded publish call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishedMessage {
    pub topic: String,
    pub payload: Vec<u8>,
    pub qos: Qos,
}

#[derive(Debug, Default)]
struct MockState {
    delivered: Vec<PublishedMessage>,
    connect_calls: u32,
    disconnect_calls: u32,
    failing_connects: u32,
    hang_connects: bool,
    hang_disconnect: bool,
    withhold_acks: bool,
    drop_after: Option<usize>,
    since_connect: usize,
    up: bool,
}

/// Scriptable implementation of the `Transport` trait.
///
/// Thread-safe via `Mutex` (fine for test contexts).
pub struct MockTransport {
    state: Mutex<MockState>,
    link: watch::Sender<LinkState>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(MockState::default()),
            link: watch::channel(LinkState::Down).0,
        }
    }

    /// Make the next `n` connect calls fail.
    pub fn fail_next_connects(&self, n: u32) {
        self.state.lock().unwrap().failing_connects = n;
    }

    /// Make connect calls never complete.
    pub fn hang_connects(&self) {
        self.state.lock().unwrap().hang_connects = true;
    }

    /// Make disconnect calls never complete.
    pub fn hang_disconnect(&self) {
        self.state.lock().unwrap().hang_disconnect = true;
    }

    /// Never acknowledge QoS 1 publishes.
    pub fn withhold_acks(&self) {
        self.state.lock().unwrap().withhold_acks = true;
    }

    /// Drop the link once `n` more messages were delivered on the current
    /// connection.
    pub fn drop_link_after(&self, n: usize) {
        let mut state = self.state.lock().unwrap();
        state.drop_after = Some(state.since_connect + n);
    }

    /// Drop the link right now.
    pub fn drop_link(&self) {
        self.state.lock().unwrap().up = false;
        self.link.send_replace(LinkState::Down);
    }

    /// Get all delivered messages, in delivery order.
    pub fn delivered(&self) -> Vec<PublishedMessage> {
        self.state.lock().unwrap().delivered.clone()
    }

    /// Get the topics of all delivered messages, in delivery order.
    pub fn delivered_topics(&self) -> Vec<String> {
        self.state
            .lock()
            .unwrap()
            .delivered
            .iter()
            .map(|m| m.topic.clone())
            .collect()
    }

    pub fn connect_calls(&self) -> u32 {
        self.state.lock().unwrap().connect_calls
    }

    pub fn disconnect_calls(&self) -> u32 {
        self.state.lock().unwrap().disconnect_calls
    }

    pub fn is_up(&self) -> bool {
        self.state.lock().unwrap().up
    }
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn connect(&self) -> MqttResult<()> {
        let hang = {
            let mut state = self.state.lock().unwrap();
            state.connect_calls += 1;
            if state.failing_connects > 0 {
                state.failing_connects -= 1;
                return Err(MqttError::Connection("scripted connect failure".into()));
            }
            state.hang_connects
        };
        if hang {
            std::future::pending::<()>().await;
        }
        {
            let mut state = self.state.lock().unwrap();
            state.up = true;
            state.since_connect = 0;
        }
        self.link.send_replace(LinkState::Up);
        Ok(())
    }

    async fn publish(&self, topic: &str, payload: &[u8], qos: Qos) -> MqttResult<()> {
        let hang = {
            let state = self.state.lock().unwrap();
            if !state.up {
                return Err(MqttError::NotConnected("mock link is down".into()));
            }
            state.withhold_acks && qos == Qos::AtLeastOnce
        };
        if hang {
            std::future::pending::<()>().await;
        }

        let dropped = {
            let mut state = self.state.lock().unwrap();
            state.delivered.push(PublishedMessage {
                topic: topic.to_string(),
                payload: payload.to_vec(),
                qos,
            });
            state.since_connect += 1;
            match state.drop_after {
                Some(n) if state.since_connect >= n => {
                    state.drop_after = None;
                    state.up = false;
                    true
                }
                _ => false,
            }
        };
        if dropped {
            self.link.send_replace(LinkState::Down);
        }
        Ok(())
    }

    async fn disconnect(&self) -> MqttResult<()> {
        let hang = {
            let mut state = self.state.lock().unwrap();
            state.disconnect_calls += 1;
            state.hang_disconnect
        };
        if hang {
            std::future::pending::<()>().await;
        }
        self.state.lock().unwrap().up = false;
        self.link.send_replace(LinkState::Down);
        Ok(())
    }

    fn link_state(&self) -> watch::Receiver<LinkState> {
        self.link.subscribe()
    }
}

/// Factory handing out one shared `MockTransport`.
pub struct MockTransportFactory {
    transport: Arc<MockTransport>,
    configs: Mutex<Vec<ConnectionConfig>>,
    failure: Option<String>,
}

impl MockTransportFactory {
    pub fn new(transport: Arc<MockTransport>) -> Self {
        Self {
            transport,
            configs: Mutex::new(Vec::new()),
            failure: None,
        }
    }

    /// Make `build` fail with a TLS error, as if the PEM files were unreadable.
    pub fn failing(transport: Arc<MockTransport>, reason: impl Into<String>) -> Self {
        Self {
            failure: Some(reason.into()),
            ..Self::new(transport)
        }
    }

    /// Configs passed to `build`, in call order.
    pub fn configs(&self) -> Vec<ConnectionConfig> {
        self.configs.lock().unwrap().clone()
    }
}

impl TransportFactory for MockTransportFactory {
    fn build(&self, config: &ConnectionConfig) -> MqttResult<Arc<dyn Transport>> {
        self.configs.lock().unwrap().push(config.clone());
        if let Some(reason) = &self.failure {
            return Err(MqttError::Tls(reason.clone()));
        }
        Ok(self.transport.clone())
    }
}

/// A notification captured by [`RecordingObserver`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ObservedEvent {
    State(SessionState, SessionState),
    ReconnectScheduled { attempt: u32, delay: Duration },
    ReconnectFailed { attempt: u32 },
    Queued { topic: String, backlog: usize },
    Drained { topic: String },
    Dropped(usize),
}

/// Observer that stores every notification for later assertions.
#[derive(Debug, Default)]
pub struct RecordingObserver {
    events: Mutex<Vec<ObservedEvent>>,
}

impl RecordingObserver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<ObservedEvent> {
        self.events.lock().unwrap().clone()
    }

    /// Delays of every scheduled reconnect, in order.
    pub fn reconnect_delays(&self) -> Vec<Duration> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter_map(|e| match e {
                ObservedEvent::ReconnectScheduled { delay, .. } => Some(*delay),
                _ => None,
            })
            .collect()
    }

    /// State transitions, in order.
    pub fn transitions(&self) -> Vec<(SessionState, SessionState)> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter_map(|e| match e {
                ObservedEvent::State(from, to) => Some((*from, *to)),
                _ => None,
            })
            .collect()
    }

    fn record(&self, event: ObservedEvent) {
        self.events.lock().unwrap().push(event);
    }
}

impl ConnectionObserver for RecordingObserver {
    fn state_changed(&self, from: SessionState, to: SessionState) {
        self.record(ObservedEvent::State(from, to));
    }

    fn reconnect_scheduled(&self, attempt: u32, delay: Duration) {
        self.record(ObservedEvent::ReconnectScheduled { attempt, delay });
    }

    fn reconnect_failed(&self, attempt: u32, _reason: &str) {
        self.record(ObservedEvent::ReconnectFailed { attempt });
    }

    fn message_queued(&self, topic: &str, backlog: usize) {
        self.record(ObservedEvent::Queued {
            topic: topic.to_string(),
            backlog,
        });
    }

    fn message_drained(&self, topic: &str) {
        self.record(ObservedEvent::Drained {
            topic: topic.to_string(),
        });
    }

    fn messages_dropped(&self, count: usize) {
        self.record(ObservedEvent::Dropped(count));
    }
}
