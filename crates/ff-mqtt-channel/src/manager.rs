//! Connection manager: owns the single logical broker connection.
//!
//! State machine:
//! ```text
//! Disconnected -> Connecting -> Connected -> Disconnecting -> Disconnected
//!                                  |   ^
//!                       link lost  v   | reconnected
//!                               Reconnecting
//! ```
//! The initial connect is attempted exactly once and bounded by the
//! connect timeout. Once connected, a background supervisor task watches
//! the transport's link state, reconnects with exponential backoff, and
//! drains the offline queue at the configured rate. The queue and the
//! state are only ever touched through this type.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, Notify, watch};
use tokio::task::JoinHandle;
use tokio::time::{self, Instant};

use crate::backoff::Backoff;
use crate::config::{OperationTimeouts, ReconnectPolicy};
use crate::error::{MqttError, MqttResult};
use crate::observer::ConnectionObserver;
use crate::queue::{DeliveryReceipt, OfflineQueue, QueuedMessage};
use crate::transport::{LinkState, Qos, Transport};

/// Roughly 30 years; stands in for deadlines beyond what `Instant` can hold.
const FAR_FUTURE_SECS: u64 = 86_400 * 365 * 30;

/// Lifecycle state of the managed session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
    Disconnecting,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Reconnecting => "reconnecting",
            Self::Disconnecting => "disconnecting",
        };
        f.write_str(name)
    }
}

/// How a publish call was satisfied.
#[derive(Debug)]
pub enum PublishOutcome {
    /// Sent on the live link and settled (acknowledged for QoS 1).
    Delivered,
    /// Held in the offline queue; the receipt resolves once drained.
    Queued(DeliveryReceipt),
}

fn millis(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

/// State shared between the manager and its supervisor task.
struct Shared {
    state: watch::Sender<SessionState>,
    queue: Mutex<OfflineQueue>,
    backlog: watch::Sender<usize>,
    drain_requested: Notify,
    observer: Arc<dyn ConnectionObserver>,
}

impl Shared {
    fn state(&self) -> SessionState {
        *self.state.borrow()
    }

    fn set_state(&self, to: SessionState) {
        let from = self.state.send_replace(to);
        if from != to {
            self.observer.state_changed(from, to);
        }
    }

    /// Move `from -> to` only if the session is currently in `from`.
    fn transition(&self, from: SessionState, to: SessionState) -> bool {
        let changed = self.state.send_if_modified(|state| {
            if *state == from {
                *state = to;
                true
            } else {
                false
            }
        });
        if changed {
            self.observer.state_changed(from, to);
        }
        changed
    }

    fn sync_backlog(&self, queue: &OfflineQueue) {
        self.backlog.send_replace(queue.backlog());
    }
}

/// Manages one MQTT connection and its delivery guarantees.
pub struct ConnectionManager {
    transport: Arc<dyn Transport>,
    policy: ReconnectPolicy,
    timeouts: OperationTimeouts,
    shared: Arc<Shared>,
    shutdown: watch::Sender<bool>,
    supervisor: Mutex<Option<JoinHandle<()>>>,
}

impl ConnectionManager {
    pub fn new(
        transport: Arc<dyn Transport>,
        policy: ReconnectPolicy,
        timeouts: OperationTimeouts,
        observer: Arc<dyn ConnectionObserver>,
    ) -> MqttResult<Self> {
        policy.validate()?;
        timeouts.validate()?;

        let shared = Arc::new(Shared {
            state: watch::channel(SessionState::Disconnected).0,
            queue: Mutex::new(OfflineQueue::new(timeouts.queue_limit())),
            backlog: watch::channel(0).0,
            drain_requested: Notify::new(),
            observer,
        });

        Ok(Self {
            transport,
            policy,
            timeouts,
            shared,
            shutdown: watch::channel(false).0,
            supervisor: Mutex::new(None),
        })
    }

    pub fn state(&self) -> SessionState {
        self.shared.state()
    }

    /// Watch state transitions.
    pub fn subscribe_state(&self) -> watch::Receiver<SessionState> {
        self.shared.state.subscribe()
    }

    /// Messages submitted but not yet delivered.
    pub fn backlog(&self) -> usize {
        *self.shared.backlog.borrow()
    }

    /// Establish the connection.
    ///
    /// Blocks until the broker accepts the session or the connect timeout
    /// elapses. The first attempt is never retried; the reconnect policy
    /// only takes over once this call has succeeded.
    pub async fn connect(&self) -> MqttResult<()> {
        let current = self.state();
        if !self
            .shared
            .transition(SessionState::Disconnected, SessionState::Connecting)
        {
            return Err(MqttError::Connection(format!(
                "cannot connect while {current}"
            )));
        }

        let limit = self.timeouts.connect();
        let result = match time::timeout(limit, self.transport.connect()).await {
            Ok(result) => result,
            Err(_) => Err(MqttError::ConnectTimeout {
                timeout_ms: millis(limit),
            }),
        };

        if let Err(e) = result {
            tracing::error!(error = %e, "initial connect failed");
            // Release whatever the transport opened before it failed.
            match time::timeout(self.timeouts.disconnect(), self.transport.disconnect()).await {
                Ok(Ok(())) => {}
                Ok(Err(close_err)) => {
                    tracing::debug!(error = %close_err, "cleanup after failed connect");
                }
                Err(_) => tracing::warn!("cleanup after failed connect timed out"),
            }
            self.shared.set_state(SessionState::Disconnected);
            return Err(e);
        }

        self.shared.set_state(SessionState::Connected);
        self.shutdown.send_replace(false);

        let supervisor = Supervisor {
            transport: self.transport.clone(),
            shared: self.shared.clone(),
            timeouts: self.timeouts.clone(),
            backoff: Backoff::new(&self.policy),
            link: self.transport.link_state(),
            shutdown: self.shutdown.subscribe(),
        };
        *self.supervisor.lock().await = Some(tokio::spawn(supervisor.run()));

        tracing::info!("connected");
        Ok(())
    }

    /// Submit a message for delivery on `topic`.
    ///
    /// On a live link with an empty offline queue the message is sent
    /// immediately and the call waits up to the operation timeout for the
    /// broker to settle it. While reconnecting, or when the link drops
    /// under the send, the message goes to the offline queue instead.
    /// A timed-out publish is reported, never retried here.
    pub async fn publish(
        &self,
        topic: &str,
        payload: Vec<u8>,
        qos: Qos,
    ) -> MqttResult<PublishOutcome> {
        let state = self.state();
        if !matches!(state, SessionState::Connected | SessionState::Reconnecting) {
            return Err(MqttError::NotConnected(format!("session is {state}")));
        }

        let direct = state == SessionState::Connected && self.shared.queue.lock().await.is_idle();
        if direct {
            let limit = self.timeouts.operation();
            match time::timeout(limit, self.transport.publish(topic, &payload, qos)).await {
                Ok(Ok(())) => {
                    tracing::debug!(topic, "message delivered");
                    return Ok(PublishOutcome::Delivered);
                }
                Ok(Err(e)) if e.is_link_down() => {
                    tracing::debug!(topic, "link dropped during publish, queueing");
                }
                Ok(Err(e)) => return Err(e),
                Err(_) => {
                    return Err(MqttError::PublishTimeout {
                        timeout_ms: millis(limit),
                    });
                }
            }
        }

        self.enqueue(topic, payload, qos).await
    }

    async fn enqueue(&self, topic: &str, payload: Vec<u8>, qos: Qos) -> MqttResult<PublishOutcome> {
        let (message, receipt) = QueuedMessage::new(topic, payload, qos);
        let (evicted, backlog) = {
            let mut queue = self.shared.queue.lock().await;
            let evicted = queue.push(message)?;
            self.shared.sync_backlog(&queue);
            (evicted, queue.backlog())
        };

        if let Some(oldest) = evicted {
            oldest.complete(Err(MqttError::Undelivered(
                "evicted from full offline queue".into(),
            )));
            self.shared.observer.messages_dropped(1);
        }
        self.shared.observer.message_queued(topic, backlog);
        self.shared.drain_requested.notify_one();
        Ok(PublishOutcome::Queued(receipt))
    }

    /// Close the connection.
    ///
    /// Waits up to the disconnect timeout for queued and in-flight messages
    /// to settle, then closes the transport. Transport resources, the
    /// supervisor task, and the offline queue are released on every path;
    /// messages still queued at that point are reported as undelivered.
    pub async fn disconnect(&self) -> MqttResult<()> {
        let state = self.state();
        let mut supervisor = self.supervisor.lock().await;
        if state == SessionState::Disconnected && supervisor.is_none() {
            return Ok(());
        }

        let limit = self.timeouts.disconnect();
        let deadline = deadline_after(limit);
        let mut timed_out = false;

        if matches!(state, SessionState::Connected | SessionState::Reconnecting) {
            let mut backlog = self.shared.backlog.subscribe();
            if time::timeout_at(deadline, backlog.wait_for(|n| *n == 0))
                .await
                .is_err()
            {
                tracing::warn!(backlog = self.backlog(), "offline queue not drained before disconnect");
                timed_out = true;
            }
        }

        self.shared.set_state(SessionState::Disconnecting);
        self.shutdown.send_replace(true);
        if let Some(mut handle) = supervisor.take() {
            if time::timeout_at(deadline, &mut handle).await.is_err() {
                handle.abort();
            }
        }
        drop(supervisor);

        let mut close_error = None;
        match time::timeout_at(deadline, self.transport.disconnect()).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => close_error = Some(e),
            Err(_) => timed_out = true,
        }

        let undelivered = {
            let mut queue = self.shared.queue.lock().await;
            let items = queue.release();
            self.shared.sync_backlog(&queue);
            items
        };
        if !undelivered.is_empty() {
            self.shared.observer.messages_dropped(undelivered.len());
            for message in undelivered {
                message.complete(Err(MqttError::Undelivered("session closed".into())));
            }
        }

        self.shared.set_state(SessionState::Disconnected);
        tracing::info!("disconnected");

        if timed_out {
            return Err(MqttError::DisconnectTimeout {
                timeout_ms: millis(limit),
            });
        }
        match close_error {
            Some(e) => Err(MqttError::Disconnect(e.to_string())),
            None => Ok(()),
        }
    }
}

impl Drop for ConnectionManager {
    fn drop(&mut self) {
        self.shutdown.send_replace(true);
        if let Some(handle) = self.supervisor.get_mut().take() {
            handle.abort();
        }
    }
}

/// Resolves once teardown is requested or the manager is gone.
async fn stop_requested(shutdown: &mut watch::Receiver<bool>) {
    let _ = shutdown.wait_for(|stop| *stop).await;
}

/// `now + limit`, clamped for limits too large to represent as an instant.
fn deadline_after(limit: Duration) -> Instant {
    let now = Instant::now();
    now.checked_add(limit)
        .unwrap_or_else(|| now + Duration::from_secs(FAR_FUTURE_SECS))
}

/// Background task: reconnects on link loss and drains the offline queue.
struct Supervisor {
    transport: Arc<dyn Transport>,
    shared: Arc<Shared>,
    timeouts: OperationTimeouts,
    backoff: Backoff,
    link: watch::Receiver<LinkState>,
    shutdown: watch::Receiver<bool>,
}

impl Supervisor {
    async fn run(mut self) {
        let mut connected_at = Instant::now();

        loop {
            if *self.link.borrow_and_update() == LinkState::Up {
                tokio::select! {
                    () = stop_requested(&mut self.shutdown) => return,
                    changed = self.link.changed() => {
                        if changed.is_err() {
                            return;
                        }
                    }
                    () = self.shared.drain_requested.notified() => {
                        if !self.drain().await {
                            return;
                        }
                    }
                }
                continue;
            }

            if !self
                .shared
                .transition(SessionState::Connected, SessionState::Reconnecting)
            {
                // Tearing down; nothing left to supervise.
                let _ = self.shutdown.wait_for(|stop| *stop).await;
                return;
            }
            let lifetime = connected_at.elapsed();
            tracing::warn!(lifetime_ms = millis(lifetime), "connection lost");
            self.backoff.connection_ended(lifetime);

            if !self.reconnect().await {
                return;
            }
            connected_at = Instant::now();
            if !self.drain().await {
                return;
            }
        }
    }

    /// Retry until connected. Returns false when asked to stop.
    async fn reconnect(&mut self) -> bool {
        let limit = self.timeouts.connect();
        loop {
            let delay = self.backoff.next_delay();
            let attempt = self.backoff.attempts();
            self.shared.observer.reconnect_scheduled(attempt, delay);

            tokio::select! {
                () = stop_requested(&mut self.shutdown) => return false,
                () = time::sleep(delay) => {}
            }
            if self.shared.state() != SessionState::Reconnecting {
                return false;
            }

            let result = tokio::select! {
                () = stop_requested(&mut self.shutdown) => return false,
                result = time::timeout(limit, self.transport.connect()) => result,
            };
            match result {
                Ok(Ok(())) => {
                    tracing::info!(attempt, "reconnected");
                    return self
                        .shared
                        .transition(SessionState::Reconnecting, SessionState::Connected);
                }
                Ok(Err(e)) => self.shared.observer.reconnect_failed(attempt, &e.to_string()),
                Err(_) => self
                    .shared
                    .observer
                    .reconnect_failed(attempt, "connect timed out"),
            }
        }
    }

    /// Deliver queued messages in order, one per draining interval.
    /// Stops early when the link drops again. Returns false when asked to stop.
    async fn drain(&mut self) -> bool {
        let op_limit = self.timeouts.operation();
        let interval = self.timeouts.draining_interval();

        loop {
            let next = {
                let mut queue = self.shared.queue.lock().await;
                queue.take_next()
            };
            let Some(message) = next else {
                return true;
            };

            let sent = tokio::select! {
                () = stop_requested(&mut self.shutdown) => None,
                result = time::timeout(
                    op_limit,
                    self.transport.publish(&message.topic, &message.payload, message.qos),
                ) => Some(result),
            };

            let mut queue = self.shared.queue.lock().await;
            match sent {
                None => {
                    queue.requeue(message);
                    self.shared.sync_backlog(&queue);
                    return false;
                }
                Some(Ok(Err(e))) if e.is_link_down() => {
                    queue.requeue(message);
                    self.shared.sync_backlog(&queue);
                    return true;
                }
                Some(Ok(Ok(()))) => {
                    queue.settle();
                    self.shared.sync_backlog(&queue);
                    self.shared.observer.message_drained(&message.topic);
                    message.complete(Ok(()));
                }
                Some(Ok(Err(e))) => {
                    queue.settle();
                    self.shared.sync_backlog(&queue);
                    tracing::warn!(topic = %message.topic, error = %e, "queued message rejected");
                    message.complete(Err(e));
                }
                Some(Err(_)) => {
                    queue.settle();
                    self.shared.sync_backlog(&queue);
                    tracing::warn!(topic = %message.topic, "queued message not acknowledged");
                    message.complete(Err(MqttError::PublishTimeout {
                        timeout_ms: millis(op_limit),
                    }));
                }
            }
            let more = !queue.is_empty();
            drop(queue);

            if more {
                tokio::select! {
                    () = stop_requested(&mut self.shutdown) => return false,
                    () = time::sleep(interval) => {}
                }
            }
        }
    }
}
