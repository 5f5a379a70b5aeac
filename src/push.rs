//! Fan-out of freshly stored notifications to connected WebSocket clients.

use tokio::sync::broadcast;
use uuid::Uuid;

use crate::models::Notification;

const CHANNEL_CAPACITY: usize = 1024;

#[derive(Clone)]
pub struct PushHub {
    sender: broadcast::Sender<Notification>,
}

impl Default for PushHub {
    fn default() -> Self {
        Self::new()
    }
}

impl PushHub {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(CHANNEL_CAPACITY);
        PushHub { sender }
    }

    /// Deliver to whoever is listening; returns the number of live listeners
    pub fn publish(&self, notifications: &[Notification]) -> usize {
        let mut listeners = 0;
        for notification in notifications {
            // No subscribers is not an error, the notification is already stored
            listeners = self.sender.send(notification.clone()).unwrap_or(0);
        }
        if !notifications.is_empty() {
            tracing::debug!(count = notifications.len(), listeners, "pushed notifications");
        }
        listeners
    }

    pub fn subscribe(&self, recipient_id: Uuid) -> PushSubscription {
        PushSubscription {
            recipient_id,
            receiver: self.sender.subscribe(),
        }
    }
}

/// A single resident's view of the hub
pub struct PushSubscription {
    recipient_id: Uuid,
    receiver: broadcast::Receiver<Notification>,
}

impl PushSubscription {
    /// Next notification addressed to this resident; `None` once the hub is gone
    pub async fn next(&mut self) -> Option<Notification> {
        loop {
            match self.receiver.recv().await {
                Ok(notification) if notification.recipient_id == self.recipient_id => {
                    return Some(notification);
                }
                Ok(_) => continue,
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(recipient = %self.recipient_id, skipped, "push subscriber lagged");
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::NotificationType;
    use chrono::NaiveDateTime;

    fn notification(recipient_id: Uuid, title: &str) -> Notification {
        Notification {
            id: Uuid::new_v4(),
            recipient_id,
            recipient_name: "Resident".to_string(),
            title: title.to_string(),
            message: "body".to_string(),
            notification_type: NotificationType::SystemNotification,
            is_read: false,
            created_at: NaiveDateTime::default(),
            read_at: None,
            reference_id: None,
            reference_type: None,
        }
    }

    #[tokio::test]
    async fn subscribers_only_see_their_own_notifications() {
        let hub = PushHub::new();
        let alice = Uuid::new_v4();
        let bob = Uuid::new_v4();
        let mut subscription = hub.subscribe(alice);

        hub.publish(&[notification(bob, "for bob"), notification(alice, "for alice")]);

        let received = subscription.next().await.unwrap();
        assert_eq!(received.title, "for alice");
    }

    #[test]
    fn publishing_without_listeners_is_fine() {
        let hub = PushHub::new();
        assert_eq!(hub.publish(&[notification(Uuid::new_v4(), "nobody")]), 0);
    }
}
