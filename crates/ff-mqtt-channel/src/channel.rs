//! rumqttc-backed MQTT transport for AWS IoT Core.
//!
//! Each `connect` builds a fresh `AsyncClient`/`EventLoop` pair and spawns a
//! pump task that drives the event loop. The pump reports link state and
//! matches broker acknowledgments to waiting publishers. It never retries:
//! when the event loop fails the link goes down and the pump exits, leaving
//! reconnection to the connection manager.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex as StdMutex};

use async_trait::async_trait;
use rumqttc::{AsyncClient, ConnectReturnCode, Event, EventLoop, MqttOptions, Outgoing, Packet};
use tokio::sync::{Mutex, oneshot, watch};
use tokio::task::JoinHandle;

use crate::config::{ConnectionConfig, TransportKind};
use crate::error::{MqttError, MqttResult};
use crate::sigv4::WebSocketSigner;
use crate::tls;
use crate::transport::{LinkState, Qos, Transport, TransportFactory};

/// Capacity of the request channel between `AsyncClient` and `EventLoop`.
const REQUEST_CAPACITY: usize = 64;

type AckSender = oneshot::Sender<MqttResult<()>>;

// ── Ack tracking ──────────────────────────────────────────────

/// Matches outgoing publishes to their completion.
///
/// Publishes are registered in the order they are handed to the client,
/// which is the order the event loop writes them. QoS 0 completes when
/// written; QoS 1 completes on the matching PUBACK.
#[derive(Debug, Default)]
struct AckTracker {
    pending: VecDeque<(Qos, AckSender)>,
    inflight: HashMap<u16, AckSender>,
}

impl AckTracker {
    fn register(&mut self, qos: Qos) -> oneshot::Receiver<MqttResult<()>> {
        let (tx, rx) = oneshot::channel();
        self.pending.push_back((qos, tx));
        rx
    }

    /// The event loop wrote a publish with packet id `pkid`.
    fn written(&mut self, pkid: u16) {
        let Some((qos, tx)) = self.pending.pop_front() else {
            return;
        };
        match qos {
            Qos::AtMostOnce => {
                let _ = tx.send(Ok(()));
            }
            Qos::AtLeastOnce => {
                self.inflight.insert(pkid, tx);
            }
        }
    }

    fn acknowledged(&mut self, pkid: u16) {
        if let Some(tx) = self.inflight.remove(&pkid) {
            let _ = tx.send(Ok(()));
        }
    }

    /// Fail every waiter; the link is gone.
    fn fail_all(&mut self, reason: &str) {
        for (_, tx) in self.pending.drain(..) {
            let _ = tx.send(Err(MqttError::NotConnected(reason.to_string())));
        }
        for (_, tx) in self.inflight.drain() {
            let _ = tx.send(Err(MqttError::NotConnected(reason.to_string())));
        }
    }
}

// ── Pump task ─────────────────────────────────────────────────

/// Join handle that aborts the task when dropped.
struct PumpTask(Option<JoinHandle<()>>);

impl PumpTask {
    /// Wait for the pump to exit on its own.
    async fn finish(&mut self) {
        if let Some(handle) = self.0.as_mut() {
            let _ = handle.await;
        }
        self.0 = None;
    }
}

impl Drop for PumpTask {
    fn drop(&mut self) {
        if let Some(handle) = self.0.take() {
            handle.abort();
        }
    }
}

fn set_link(link: &watch::Sender<LinkState>, to: LinkState) {
    link.send_if_modified(|state| {
        let changed = *state != to;
        *state = to;
        changed
    });
}

async fn pump(
    mut eventloop: EventLoop,
    acks: Arc<StdMutex<AckTracker>>,
    link: Arc<watch::Sender<LinkState>>,
    connack: oneshot::Sender<MqttResult<()>>,
) {
    let mut connack = Some(connack);
    let reason = loop {
        match eventloop.poll().await {
            Ok(Event::Incoming(Packet::ConnAck(ack))) => {
                if ack.code != ConnectReturnCode::Success {
                    let reason = format!("broker refused connection: {:?}", ack.code);
                    if let Some(tx) = connack.take() {
                        let _ = tx.send(Err(MqttError::Connection(reason.clone())));
                    }
                    break reason;
                }
                tracing::info!(session_present = ack.session_present, "MQTT connected");
                set_link(&link, LinkState::Up);
                if let Some(tx) = connack.take() {
                    let _ = tx.send(Ok(()));
                }
            }
            Ok(Event::Incoming(Packet::PubAck(ack))) => {
                if let Ok(mut acks) = acks.lock() {
                    acks.acknowledged(ack.pkid);
                }
            }
            Ok(Event::Outgoing(Outgoing::Publish(pkid))) => {
                if let Ok(mut acks) = acks.lock() {
                    acks.written(pkid);
                }
            }
            Ok(Event::Outgoing(Outgoing::Disconnect)) => {
                tracing::debug!("MQTT disconnect sent");
                break "disconnected".to_string();
            }
            Ok(event) => tracing::trace!(?event, "MQTT event"),
            Err(e) => {
                tracing::warn!(error = %e, "MQTT event loop error");
                if let Some(tx) = connack.take() {
                    let _ = tx.send(Err(MqttError::Connection(e.to_string())));
                }
                break e.to_string();
            }
        }
    };

    set_link(&link, LinkState::Down);
    if let Ok(mut acks) = acks.lock() {
        acks.fail_all(&reason);
    }
}

// ── MqttChannel ───────────────────────────────────────────────

struct Session {
    client: AsyncClient,
    acks: Arc<StdMutex<AckTracker>>,
    pump: PumpTask,
}

/// MQTT transport connected to AWS IoT Core over mutual TLS or WSS.
pub struct MqttChannel {
    config: ConnectionConfig,
    transport: rumqttc::Transport,
    signer: Option<WebSocketSigner>,
    link: Arc<watch::Sender<LinkState>>,
    session: Mutex<Option<Session>>,
}

impl MqttChannel {
    /// Prepare a channel for `config`. Reads the TLS material up front so a
    /// missing or unreadable PEM file fails before any network I/O.
    pub fn new(config: &ConnectionConfig) -> MqttResult<Self> {
        let transport = tls::load_transport(config)?;
        let signer = (config.kind() == TransportKind::WebSocketTls)
            .then(|| WebSocketSigner::new(config.host(), config.region()));

        tracing::debug!(
            broker = %config.broker_address(),
            port = config.port(),
            kind = ?config.kind(),
            "MQTT channel prepared"
        );

        Ok(Self {
            config: config.clone(),
            transport,
            signer,
            link: Arc::new(watch::channel(LinkState::Down).0),
            session: Mutex::new(None),
        })
    }

    /// Client options for one connect attempt. WebSocket URLs are signed
    /// fresh each time since a presigned URL expires.
    async fn options(&self) -> MqttResult<MqttOptions> {
        let broker = match &self.signer {
            Some(signer) => signer.presign().await?,
            None => self.config.broker_address(),
        };
        let mut options = MqttOptions::new(self.config.client_id(), broker, self.config.port());
        options.set_keep_alive(self.config.keepalive());
        options.set_transport(self.transport.clone());
        Ok(options)
    }
}

#[async_trait]
impl Transport for MqttChannel {
    async fn connect(&self) -> MqttResult<()> {
        let mut session = self.session.lock().await;
        // Drop any previous client; its pump is aborted with it.
        *session = None;

        let options = self.options().await?;
        let (client, eventloop) = AsyncClient::new(options, REQUEST_CAPACITY);
        let acks = Arc::new(StdMutex::new(AckTracker::default()));
        let (connack_tx, connack_rx) = oneshot::channel();
        let pump_task = PumpTask(Some(tokio::spawn(pump(
            eventloop,
            acks.clone(),
            self.link.clone(),
            connack_tx,
        ))));

        match connack_rx.await {
            Ok(Ok(())) => {
                *session = Some(Session {
                    client,
                    acks,
                    pump: pump_task,
                });
                Ok(())
            }
            Ok(Err(e)) => Err(e),
            Err(_) => Err(MqttError::Connection(
                "event loop stopped before CONNACK".into(),
            )),
        }
    }

    async fn publish(&self, topic: &str, payload: &[u8], qos: Qos) -> MqttResult<()> {
        let done = {
            let session = self.session.lock().await;
            let Some(session) = session.as_ref() else {
                return Err(MqttError::NotConnected("no active MQTT session".into()));
            };
            if *self.link.borrow() == LinkState::Down {
                return Err(MqttError::NotConnected("MQTT link is down".into()));
            }

            // Register before handing off so tracker order matches write order.
            let done = session
                .acks
                .lock()
                .map_err(|_| MqttError::Publish("ack tracker poisoned".into()))?
                .register(qos);
            session
                .client
                .publish(topic, qos.into(), false, payload.to_vec())
                .await
                .map_err(|e| MqttError::NotConnected(e.to_string()))?;
            done
        };

        done.await
            .unwrap_or_else(|_| Err(MqttError::NotConnected("MQTT session dropped".into())))
    }

    async fn disconnect(&self) -> MqttResult<()> {
        let Some(mut session) = self.session.lock().await.take() else {
            set_link(&self.link, LinkState::Down);
            return Ok(());
        };

        let result = session
            .client
            .disconnect()
            .await
            .map_err(|e| MqttError::Disconnect(e.to_string()));
        if result.is_ok() {
            session.pump.finish().await;
        }
        set_link(&self.link, LinkState::Down);
        result
    }

    fn link_state(&self) -> watch::Receiver<LinkState> {
        self.link.subscribe()
    }
}

/// Builds [`MqttChannel`] transports.
#[derive(Debug, Default, Clone, Copy)]
pub struct MqttTransportFactory;

impl TransportFactory for MqttTransportFactory {
    fn build(&self, config: &ConnectionConfig) -> MqttResult<Arc<dyn Transport>> {
        Ok(Arc::new(MqttChannel::new(config)?))
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;
    use crate::config::EndpointSettings;
    use crate::selector::select_transport;

    fn pem_file(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    fn websocket_config(ca: &tempfile::NamedTempFile) -> ConnectionConfig {
        select_transport(&EndpointSettings {
            host: "example-ats.iot.us-east-1.amazonaws.com".into(),
            root_ca_path: ca.path().display().to_string(),
            use_websocket: true,
            ..Default::default()
        })
        .unwrap()
    }

    #[test]
    fn qos0_completes_when_written() {
        let mut tracker = AckTracker::default();
        let mut rx = tracker.register(Qos::AtMostOnce);
        tracker.written(0);
        assert!(matches!(rx.try_recv(), Ok(Ok(()))));
        assert!(tracker.inflight.is_empty());
    }

    #[test]
    fn qos1_waits_for_puback() {
        let mut tracker = AckTracker::default();
        let mut first = tracker.register(Qos::AtLeastOnce);
        let mut second = tracker.register(Qos::AtLeastOnce);
        tracker.written(1);
        tracker.written(2);
        assert!(first.try_recv().is_err());

        tracker.acknowledged(2);
        assert!(matches!(second.try_recv(), Ok(Ok(()))));
        assert!(first.try_recv().is_err());

        tracker.acknowledged(1);
        assert!(matches!(first.try_recv(), Ok(Ok(()))));
    }

    #[test]
    fn unknown_puback_is_ignored() {
        let mut tracker = AckTracker::default();
        let mut rx = tracker.register(Qos::AtLeastOnce);
        tracker.written(7);
        tracker.acknowledged(8);
        assert!(rx.try_recv().is_err());
        assert_eq!(tracker.inflight.len(), 1);
    }

    #[test]
    fn fail_all_reports_link_down() {
        let mut tracker = AckTracker::default();
        let mut waiting = tracker.register(Qos::AtLeastOnce);
        let mut unsent = tracker.register(Qos::AtLeastOnce);
        tracker.written(1);
        tracker.fail_all("connection reset");

        for rx in [&mut waiting, &mut unsent] {
            match rx.try_recv() {
                Ok(Err(e)) => assert!(e.is_link_down()),
                other => panic!("unexpected: {other:?}"),
            }
        }
    }

    #[test]
    fn unreadable_ca_fails_before_io() {
        let config = select_transport(&EndpointSettings {
            host: "localhost".into(),
            root_ca_path: "/nonexistent/root-CA.crt".into(),
            use_websocket: true,
            ..Default::default()
        })
        .unwrap();
        let err = MqttChannel::new(&config).err().expect("should fail");
        assert!(matches!(err, MqttError::Tls(_)));
    }

    #[tokio::test]
    async fn publish_without_session_is_link_down() {
        let ca = pem_file("ca");
        let channel = MqttChannel::new(&websocket_config(&ca)).unwrap();
        assert_eq!(*channel.link_state().borrow(), LinkState::Down);

        let err = channel
            .publish("sdk/test/Python", b"{}", Qos::AtLeastOnce)
            .await
            .unwrap_err();
        assert!(err.is_link_down());
    }

    #[tokio::test]
    async fn disconnect_without_session_is_noop() {
        let ca = pem_file("ca");
        let channel = MqttChannel::new(&websocket_config(&ca)).unwrap();
        channel.disconnect().await.unwrap();
    }

    #[test]
    fn websocket_channel_signs_on_connect() {
        let ca = pem_file("ca");
        let channel = MqttChannel::new(&websocket_config(&ca)).unwrap();
        assert!(channel.signer.is_some());

        let key = pem_file("key");
        let cert = pem_file("cert");
        let mutual = select_transport(&EndpointSettings {
            host: "localhost".into(),
            root_ca_path: ca.path().display().to_string(),
            certificate_path: cert.path().display().to_string(),
            private_key_path: key.path().display().to_string(),
            ..Default::default()
        })
        .unwrap();
        assert!(MqttChannel::new(&mutual).unwrap().signer.is_none());
    }

    #[tokio::test]
    async fn mutual_tls_options_use_plain_host() {
        let ca = pem_file("ca");
        let key = pem_file("key");
        let cert = pem_file("cert");
        let config = select_transport(&EndpointSettings {
            host: "broker.local".into(),
            root_ca_path: ca.path().display().to_string(),
            certificate_path: cert.path().display().to_string(),
            private_key_path: key.path().display().to_string(),
            ..Default::default()
        })
        .unwrap();
        let options = MqttChannel::new(&config).unwrap().options().await.unwrap();
        assert_eq!(options.broker_address(), ("broker.local".to_string(), 8883));
        assert_eq!(options.client_id(), "basicPubSub");
    }

    #[test]
    fn factory_builds_channel() {
        let ca = pem_file("ca");
        let transport = MqttTransportFactory.build(&websocket_config(&ca)).unwrap();
        assert_eq!(*transport.link_state().borrow(), LinkState::Down);
    }
}
