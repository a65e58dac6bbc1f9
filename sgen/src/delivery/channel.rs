use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use scommon::BoxFuture;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::mpsc::{Receiver, Sender, channel};

use super::{DeliveryError, DeliveryPort, DeliveryTarget};
use crate::WireMessage;

pub const DEFAULT_INBOX_CAPACITY: usize = 256;

/// In-process recipients backed by bounded tokio channels. A full inbox is a
/// transient failure, a dropped one means the recipient is gone.
#[derive(Debug)]
pub struct ChannelDelivery {
    recipients: Mutex<HashMap<String, Sender<WireMessage>>>,
    capacity: usize,
}

impl Default for ChannelDelivery {
    fn default() -> Self {
        Self {
            recipients: Mutex::new(HashMap::new()),
            capacity: DEFAULT_INBOX_CAPACITY,
        }
    }
}

impl ChannelDelivery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity.max(1);
        self
    }

    /// Registers `target`, replacing any previous registration, and returns its inbox.
    pub fn register(&self, target: &DeliveryTarget) -> Receiver<WireMessage> {
        let (sender, receiver) = channel(self.capacity);
        self.recipients().insert(target.as_str().to_string(), sender);
        receiver
    }

    pub fn unregister(&self, target: &DeliveryTarget) -> bool {
        self.recipients().remove(target.as_str()).is_some()
    }

    pub fn is_registered(&self, target: &DeliveryTarget) -> bool {
        self.recipients().contains_key(target.as_str())
    }

    // Every critical section leaves the map consistent, so a poisoned lock is reused.
    fn recipients(&self) -> MutexGuard<'_, HashMap<String, Sender<WireMessage>>> {
        self.recipients.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl DeliveryPort for ChannelDelivery {
    fn send<'a>(
        &'a self,
        target: &'a DeliveryTarget,
        message: &'a WireMessage,
    ) -> BoxFuture<'a, Result<(), DeliveryError>> {
        Box::pin(async move {
            let mut recipients = self.recipients();

            let Some(sender) = recipients.get(target.as_str()) else {
                return Err(DeliveryError::gone(format!(
                    "recipient '{target}' is not registered"
                )));
            };

            match sender.try_send(message.clone()) {
                Ok(()) => Ok(()),
                Err(TrySendError::Full(_)) => Err(DeliveryError::transient(format!(
                    "inbox for '{target}' is full"
                ))),
                Err(TrySendError::Closed(_)) => {
                    recipients.remove(target.as_str());
                    Err(DeliveryError::gone(format!("recipient '{target}' closed")))
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use scommon::{ConversationId, MessageId};

    use super::*;
    use crate::{DeliveryErrorKind, StreamEvent};

    fn wire(index: u64) -> WireMessage {
        StreamEvent::chunk(MessageId::new("m"), ConversationId::new("c"), 1, index, "x").to_wire()
    }

    #[tokio::test]
    async fn registered_recipient_receives_messages_in_order() {
        let delivery = ChannelDelivery::new();
        let target = DeliveryTarget::new("conn-1");
        let mut inbox = delivery.register(&target);

        delivery.send(&target, &wire(0)).await.expect("first send");
        delivery.send(&target, &wire(1)).await.expect("second send");

        assert_eq!(inbox.recv().await.map(|m| m.chunk_index), Some(0));
        assert_eq!(inbox.recv().await.map(|m| m.chunk_index), Some(1));
    }

    #[tokio::test]
    async fn unknown_recipient_is_gone() {
        let delivery = ChannelDelivery::new();
        let error = delivery
            .send(&DeliveryTarget::new("missing"), &wire(0))
            .await
            .expect_err("unknown target fails");

        assert_eq!(error.kind, DeliveryErrorKind::Gone);
    }

    #[tokio::test]
    async fn dropped_inbox_is_gone_and_unregistered() {
        let delivery = ChannelDelivery::new();
        let target = DeliveryTarget::new("conn-2");
        drop(delivery.register(&target));

        let error = delivery.send(&target, &wire(0)).await.expect_err("closed");

        assert!(error.is_gone());
        assert!(!delivery.is_registered(&target));
    }

    #[tokio::test]
    async fn full_inbox_is_transient_until_drained() {
        let delivery = ChannelDelivery::new().with_capacity(1);
        let target = DeliveryTarget::new("conn-4");
        let mut inbox = delivery.register(&target);

        delivery.send(&target, &wire(0)).await.expect("first send fits");
        let error = delivery.send(&target, &wire(1)).await.expect_err("inbox full");
        assert_eq!(error.kind, DeliveryErrorKind::Transient);
        assert!(delivery.is_registered(&target));

        assert_eq!(inbox.recv().await.map(|m| m.chunk_index), Some(0));
        delivery.send(&target, &wire(1)).await.expect("room again");
        assert_eq!(inbox.recv().await.map(|m| m.chunk_index), Some(1));
    }

    #[test]
    fn registration_survives_a_poisoned_lock() {
        let delivery = std::sync::Arc::new(ChannelDelivery::new());
        let poisoner = std::sync::Arc::clone(&delivery);
        let _ = std::thread::spawn(move || {
            let _guard = poisoner.recipients.lock().expect("lock");
            panic!("poison the registry");
        })
        .join();
        assert!(delivery.recipients.is_poisoned());

        let target = DeliveryTarget::new("conn-5");
        let _inbox = delivery.register(&target);

        assert!(delivery.is_registered(&target));
        assert!(delivery.unregister(&target));
    }

    #[test]
    fn unregister_reports_presence() {
        let delivery = ChannelDelivery::new();
        let target = DeliveryTarget::new("conn-3");
        let _inbox = delivery.register(&target);

        assert!(delivery.unregister(&target));
        assert!(!delivery.unregister(&target));
    }
}
