//! Offline publish queue.
//!
//! Holds messages submitted while the link is down, in submission order,
//! until the connection manager drains them after a reconnect. Each
//! queued message carries a one-shot completion so the submitter can wait
//! for the eventual broker acknowledgment through a [`DeliveryReceipt`].

use std::collections::VecDeque;
use std::time::Duration;

use tokio::sync::oneshot;

use crate::config::{DropBehavior, QueueLimit};
use crate::error::{MqttError, MqttResult};
use crate::transport::Qos;

/// A message waiting for the link to come back.
#[derive(Debug)]
pub struct QueuedMessage {
    pub topic: String,
    pub payload: Vec<u8>,
    pub qos: Qos,
    done: oneshot::Sender<MqttResult<()>>,
}

impl QueuedMessage {
    pub fn new(topic: impl Into<String>, payload: Vec<u8>, qos: Qos) -> (Self, DeliveryReceipt) {
        let (done, rx) = oneshot::channel();
        let message = Self {
            topic: topic.into(),
            payload,
            qos,
            done,
        };
        (message, DeliveryReceipt { rx })
    }

    /// Report the final delivery result to whoever holds the receipt.
    pub fn complete(self, result: MqttResult<()>) {
        // The submitter may have stopped waiting.
        let _ = self.done.send(result);
    }
}

/// Handle for a message that went through the offline queue.
#[derive(Debug)]
pub struct DeliveryReceipt {
    rx: oneshot::Receiver<MqttResult<()>>,
}

impl DeliveryReceipt {
    /// Wait up to `timeout` for the queued message to be delivered.
    pub async fn wait(self, timeout: Duration) -> MqttResult<()> {
        match tokio::time::timeout(timeout, self.rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(MqttError::Undelivered(
                "queue released before delivery".into(),
            )),
            Err(_) => Err(MqttError::PublishTimeout {
                timeout_ms: timeout.as_millis() as u64,
            }),
        }
    }
}

/// FIFO buffer of offline messages with a configurable limit.
#[derive(Debug)]
pub struct OfflineQueue {
    limit: QueueLimit,
    items: VecDeque<QueuedMessage>,
    in_flight: usize,
}

impl OfflineQueue {
    pub fn new(limit: QueueLimit) -> Self {
        Self {
            limit,
            items: VecDeque::new(),
            in_flight: 0,
        }
    }

    /// Append a message. Returns the evicted head when a full queue is
    /// configured to drop its oldest entry.
    pub fn push(&mut self, message: QueuedMessage) -> MqttResult<Option<QueuedMessage>> {
        match self.limit {
            QueueLimit::Disabled => Err(MqttError::QueueDisabled),
            QueueLimit::Unbounded => {
                self.items.push_back(message);
                Ok(None)
            }
            QueueLimit::Bounded { depth, drop } => {
                if self.items.len() < depth {
                    self.items.push_back(message);
                    return Ok(None);
                }
                match drop {
                    DropBehavior::DropNewest => Err(MqttError::QueueFull { depth }),
                    DropBehavior::DropOldest => {
                        let evicted = self.items.pop_front();
                        self.items.push_back(message);
                        Ok(evicted)
                    }
                }
            }
        }
    }

    /// Take the oldest message for delivery. It counts as in flight until
    /// [`OfflineQueue::settle`] or [`OfflineQueue::requeue`] is called.
    pub fn take_next(&mut self) -> Option<QueuedMessage> {
        let message = self.items.pop_front()?;
        self.in_flight += 1;
        Some(message)
    }

    /// An in-flight message finished (delivered or failed for good).
    pub fn settle(&mut self) {
        self.in_flight = self.in_flight.saturating_sub(1);
    }

    /// Put an in-flight message back at the head, ahead of everything
    /// submitted after it. Ignores the depth limit.
    pub fn requeue(&mut self, message: QueuedMessage) {
        self.in_flight = self.in_flight.saturating_sub(1);
        self.items.push_front(message);
    }

    /// Remove every waiting message and forget anything in flight.
    pub fn release(&mut self) -> Vec<QueuedMessage> {
        self.in_flight = 0;
        self.items.drain(..).collect()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Messages not yet delivered, including the one being drained.
    pub fn backlog(&self) -> usize {
        self.items.len() + self.in_flight
    }

    /// True when nothing is waiting and nothing is being drained, so a new
    /// message may bypass the queue without overtaking older ones.
    pub fn is_idle(&self) -> bool {
        self.backlog() == 0
    }
}
