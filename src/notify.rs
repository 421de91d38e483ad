use rust_decimal::Decimal;
use serde::Serialize;
use tokio::sync::broadcast;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Success,
    Error,
    Info,
}

/// Receives ledger events for delivery to the owning user's live connections.
/// Calls must return immediately; delivery is best effort.
pub trait NotificationDispatcher: Send + Sync {
    fn notify(&self, user_id: Uuid, message: &str, severity: Severity);

    fn transaction_update(&self, user_id: Uuid, kind: &str, payload: serde_json::Value);

    fn balance_update(&self, user_id: Uuid, new_balance: Decimal);
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum Notification {
    Notification {
        message: String,
        severity: Severity,
    },
    TransactionUpdate {
        kind: String,
        payload: serde_json::Value,
    },
    BalanceUpdate {
        balance: Decimal,
    },
}

#[derive(Debug, Clone)]
pub struct UserEvent {
    pub user_id: Uuid,
    pub notification: Notification,
}

/// Fans events out over a broadcast channel; subscribers filter by user.
#[derive(Debug, Clone)]
pub struct BroadcastDispatcher {
    sender: broadcast::Sender<UserEvent>,
}

impl BroadcastDispatcher {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<UserEvent> {
        self.sender.subscribe()
    }

    fn publish(&self, user_id: Uuid, notification: Notification) {
        // an error only means nobody is listening right now
        if self
            .sender
            .send(UserEvent {
                user_id,
                notification,
            })
            .is_err()
        {
            tracing::trace!("No live connections for user {user_id}");
        }
    }
}

impl NotificationDispatcher for BroadcastDispatcher {
    fn notify(&self, user_id: Uuid, message: &str, severity: Severity) {
        self.publish(
            user_id,
            Notification::Notification {
                message: message.to_string(),
                severity,
            },
        );
    }

    fn transaction_update(&self, user_id: Uuid, kind: &str, payload: serde_json::Value) {
        self.publish(
            user_id,
            Notification::TransactionUpdate {
                kind: kind.to_string(),
                payload,
            },
        );
    }

    fn balance_update(&self, user_id: Uuid, new_balance: Decimal) {
        self.publish(
            user_id,
            Notification::BalanceUpdate {
                balance: new_balance,
            },
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscribers_receive_published_events() {
        let dispatcher = BroadcastDispatcher::new(8);
        let mut rx = dispatcher.subscribe();
        let user_id = Uuid::new_v4();

        dispatcher.balance_update(user_id, Decimal::new(40, 0));

        let event = rx.recv().await.unwrap();
        assert_eq!(event.user_id, user_id);
        assert_eq!(
            event.notification,
            Notification::BalanceUpdate {
                balance: Decimal::new(40, 0)
            }
        );
    }

    #[test]
    fn publishing_without_listeners_is_silent() {
        let dispatcher = BroadcastDispatcher::new(1);
        dispatcher.notify(Uuid::new_v4(), "hello", Severity::Info);
    }

    #[test]
    fn events_serialize_with_tag() {
        let value = serde_json::to_value(Notification::Notification {
            message: "Your deposit of 50 has been approved!".to_string(),
            severity: Severity::Success,
        })
        .unwrap();
        assert_eq!(value["event"], "notification");
        assert_eq!(value["severity"], "success");
    }
}
