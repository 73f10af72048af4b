//! Outbound domain events and the notification sink seam.
//!
//! Events are published only after the originating database transaction
//! has committed. Publishing never blocks and never fails the caller: a
//! rejected notification is logged and counted, and retries are the
//! sink's own concern.

use std::sync::{Arc, Mutex};

use common::{OrderId, UserId};
use serde::{Deserialize, Serialize};
use store::OrderStatus;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Kind of outbound event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OrderEvent {
    #[serde(rename = "order.assigned")]
    Assigned,
    #[serde(rename = "order.reassigned")]
    Reassigned,
    #[serde(rename = "order.cancelled")]
    Cancelled,
    /// Generic broadcast after any driver change.
    #[serde(rename = "OrderStatusUpdated")]
    StatusUpdated,
    /// Emitted by the state machine after a committed status change.
    #[serde(rename = "OrderStatusChanged")]
    StatusChanged,
}

impl OrderEvent {
    /// Returns the wire name of the event.
    pub fn name(&self) -> &'static str {
        match self {
            OrderEvent::Assigned => "order.assigned",
            OrderEvent::Reassigned => "order.reassigned",
            OrderEvent::Cancelled => "order.cancelled",
            OrderEvent::StatusUpdated => "OrderStatusUpdated",
            OrderEvent::StatusChanged => "OrderStatusChanged",
        }
    }
}

impl std::fmt::Display for OrderEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Who a notification is addressed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "user_id", rename_all = "snake_case")]
pub enum Recipient {
    Driver(UserId),
    /// All parties interested in the order (customer, vendor, admin panel).
    Broadcast,
}

/// Event payload: `{order_id, driver_id?, reason?}` plus the status when relevant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventPayload {
    pub order_id: OrderId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub driver_id: Option<UserId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<OrderStatus>,
}

/// A single outbound message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub event: OrderEvent,
    pub recipient: Recipient,
    pub payload: EventPayload,
}

impl Notification {
    /// Creates a notification about an order.
    pub fn new(event: OrderEvent, recipient: Recipient, order_id: OrderId) -> Self {
        Self {
            event,
            recipient,
            payload: EventPayload {
                order_id,
                driver_id: None,
                reason: None,
                status: None,
            },
        }
    }

    pub fn with_driver(mut self, driver_id: Option<UserId>) -> Self {
        self.payload.driver_id = driver_id;
        self
    }

    pub fn with_reason(mut self, reason: Option<String>) -> Self {
        self.payload.reason = reason;
        self
    }

    pub fn with_status(mut self, status: OrderStatus) -> Self {
        self.payload.status = Some(status);
        self
    }
}

/// Errors a sink may report when refusing a notification.
#[derive(Debug, Error)]
pub enum NotifyError {
    /// The delivery channel has shut down.
    #[error("Notification channel closed")]
    Closed,

    #[error("Notification rejected: {0}")]
    Rejected(String),
}

/// Receiver of outbound events. Must not block.
pub trait NotificationSink: Send + Sync {
    fn publish(&self, notification: Notification) -> Result<(), NotifyError>;
}

/// Publishes notifications in order, logging failures without propagating them.
pub(crate) fn publish_all(sink: &dyn NotificationSink, notifications: Vec<Notification>) {
    for notification in notifications {
        let event = notification.event;
        let order_id = notification.payload.order_id;
        if let Err(e) = sink.publish(notification) {
            metrics::counter!("notifications_failed_total", "event" => event.name()).increment(1);
            tracing::warn!(%order_id, %event, error = %e, "failed to publish notification");
        }
    }
}

/// Sink backed by an unbounded in-process channel.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    sender: mpsc::UnboundedSender<Notification>,
}

impl ChannelSink {
    /// Creates a sink and the receiving end of its channel.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Notification>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }
}

impl NotificationSink for ChannelSink {
    fn publish(&self, notification: Notification) -> Result<(), NotifyError> {
        self.sender.send(notification).map_err(|_| NotifyError::Closed)
    }
}

/// Drains a notification channel, handing each message to the push/SMS
/// fan-out. Delivery itself is external; this task only logs dispatch.
pub fn spawn_dispatcher(mut receiver: mpsc::UnboundedReceiver<Notification>) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(notification) = receiver.recv().await {
            metrics::counter!("notifications_dispatched_total", "event" => notification.event.name())
                .increment(1);
            tracing::info!(
                event = %notification.event,
                order_id = %notification.payload.order_id,
                recipient = ?notification.recipient,
                "notification dispatched"
            );
        }
        tracing::debug!("notification channel closed, dispatcher stopping");
    })
}

#[derive(Debug, Default)]
struct RecordingState {
    notifications: Vec<Notification>,
    fail: bool,
}

/// Sink that keeps every notification in memory, for tests.
#[derive(Debug, Clone, Default)]
pub struct RecordingSink {
    state: Arc<Mutex<RecordingState>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Configures the sink to reject every notification.
    pub fn set_fail(&self, fail: bool) {
        self.state.lock().unwrap().fail = fail;
    }

    /// Returns all notifications received so far.
    pub fn notifications(&self) -> Vec<Notification> {
        self.state.lock().unwrap().notifications.clone()
    }

    /// Returns the notifications addressed to a recipient.
    pub fn for_recipient(&self, recipient: Recipient) -> Vec<Notification> {
        self.notifications()
            .into_iter()
            .filter(|n| n.recipient == recipient)
            .collect()
    }

    pub fn clear(&self) {
        self.state.lock().unwrap().notifications.clear();
    }
}

impl NotificationSink for RecordingSink {
    fn publish(&self, notification: Notification) -> Result<(), NotifyError> {
        let mut state = self.state.lock().unwrap();
        if state.fail {
            return Err(NotifyError::Rejected("sink configured to fail".to_string()));
        }
        state.notifications.push(notification);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_names_match_wire_format() {
        let json = serde_json::to_string(&OrderEvent::Reassigned).unwrap();
        assert_eq!(json, "\"order.reassigned\"");
        assert_eq!(OrderEvent::StatusUpdated.name(), "OrderStatusUpdated");
    }

    #[test]
    fn payload_omits_missing_fields() {
        let order_id = OrderId::new();
        let n = Notification::new(OrderEvent::Assigned, Recipient::Broadcast, order_id);
        let json = serde_json::to_value(&n.payload).unwrap();
        assert_eq!(json, serde_json::json!({ "order_id": order_id }));
    }

    #[test]
    fn publish_all_swallows_failures() {
        let sink = RecordingSink::new();
        sink.set_fail(true);
        let n = Notification::new(OrderEvent::Cancelled, Recipient::Broadcast, OrderId::new());

        publish_all(&sink, vec![n.clone()]);
        assert!(sink.notifications().is_empty());

        sink.set_fail(false);
        publish_all(&sink, vec![n]);
        assert_eq!(sink.notifications().len(), 1);
    }

    #[tokio::test]
    async fn channel_sink_delivers_in_order() {
        let (sink, mut rx) = ChannelSink::new();
        let order_id = OrderId::new();
        sink.publish(Notification::new(OrderEvent::Assigned, Recipient::Broadcast, order_id))
            .unwrap();
        sink.publish(Notification::new(OrderEvent::StatusUpdated, Recipient::Broadcast, order_id))
            .unwrap();

        assert_eq!(rx.recv().await.unwrap().event, OrderEvent::Assigned);
        assert_eq!(rx.recv().await.unwrap().event, OrderEvent::StatusUpdated);
    }

    #[tokio::test]
    async fn channel_sink_reports_closed_channel() {
        let (sink, rx) = ChannelSink::new();
        drop(rx);
        let result = sink.publish(Notification::new(
            OrderEvent::Assigned,
            Recipient::Broadcast,
            OrderId::new(),
        ));
        assert!(matches!(result, Err(NotifyError::Closed)));
    }
}
