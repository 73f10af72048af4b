//! Driver assignment and reassignment.

use std::sync::Arc;

use chrono::Utc;
use common::{OrderId, UserId};
use serde::Serialize;
use store::{Driver, Order, OrderStatus, Store, StoreTx};

use crate::error::{FulfillmentError, Result};
use crate::events::{Notification, NotificationSink, OrderEvent, Recipient, publish_all};

/// Whether the order had a driver before this change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AssignmentKind {
    Assigned,
    Reassigned,
}

impl AssignmentKind {
    fn as_str(&self) -> &'static str {
        match self {
            AssignmentKind::Assigned => "assigned",
            AssignmentKind::Reassigned => "reassigned",
        }
    }
}

/// A committed driver change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Assignment {
    pub order: Order,
    pub previous_driver: Option<UserId>,
    pub kind: AssignmentKind,
}

/// Binds drivers to orders and notifies the parties involved.
#[derive(Clone)]
pub struct AssignmentCoordinator<S: Store> {
    store: S,
    sink: Arc<dyn NotificationSink>,
}

impl<S: Store> AssignmentCoordinator<S> {
    pub fn new(store: S, sink: Arc<dyn NotificationSink>) -> Self {
        Self { store, sink }
    }

    /// Creates or updates a driver profile.
    #[tracing::instrument(skip(self))]
    pub async fn register_driver(&self, driver: Driver) -> Result<Driver> {
        let mut tx = self.store.begin().await?;
        tx.upsert_driver(&driver).await?;
        tx.commit().await?;
        Ok(driver)
    }

    pub async fn get_driver(&self, user_id: UserId) -> Result<Driver> {
        let mut tx = self.store.begin().await?;
        tx.get_driver(user_id)
            .await?
            .ok_or(FulfillmentError::DriverNotFound(user_id))
    }

    /// Assigns a driver to an order.
    #[tracing::instrument(skip(self))]
    pub async fn assign(&self, order_id: OrderId, driver_id: UserId) -> Result<Assignment> {
        self.bind(order_id, driver_id, None).await
    }

    /// Moves an order to another driver. The previous driver, if any, is
    /// told the order was taken away.
    #[tracing::instrument(skip(self))]
    pub async fn reassign(
        &self,
        order_id: OrderId,
        driver_id: UserId,
        reason: Option<String>,
    ) -> Result<Assignment> {
        self.bind(order_id, driver_id, reason).await
    }

    async fn bind(
        &self,
        order_id: OrderId,
        driver_id: UserId,
        reason: Option<String>,
    ) -> Result<Assignment> {
        let mut tx = self.store.begin().await?;
        let mut order = tx
            .lock_order(order_id)
            .await?
            .ok_or(FulfillmentError::OrderNotFound(order_id))?;

        // Once picked up the goods travel with the driver.
        if order.status.is_terminal() || order.status == OrderStatus::Dispatched {
            return Err(FulfillmentError::OrderNotReassignable {
                order_id,
                status: order.status,
            });
        }
        if order.driver_id == Some(driver_id) {
            return Err(FulfillmentError::DriverAlreadyAssigned {
                order_id,
                driver_id,
            });
        }

        let driver = tx
            .get_driver(driver_id)
            .await?
            .ok_or(FulfillmentError::DriverNotFound(driver_id))?;
        if !driver.is_verified {
            return Err(FulfillmentError::DriverNotEligible {
                driver_id,
                reason: "driver is not verified".to_string(),
            });
        }
        if !driver.is_online {
            tracing::debug!(%driver_id, "assigning offline driver");
        }

        let previous_driver = order.driver_id;
        order.driver_id = Some(driver_id);
        order.assigned_at = Some(Utc::now());
        tx.update_order(&order).await?;
        tx.commit().await?;

        let kind = if previous_driver.is_some() {
            AssignmentKind::Reassigned
        } else {
            AssignmentKind::Assigned
        };
        metrics::counter!("driver_assignments_total", "kind" => kind.as_str()).increment(1);
        tracing::info!(
            %order_id,
            %driver_id,
            previous_driver = ?previous_driver,
            reason = reason.as_deref(),
            "driver {}",
            kind.as_str()
        );

        publish_all(
            self.sink.as_ref(),
            assignment_notifications(&order, previous_driver, kind, reason),
        );

        Ok(Assignment {
            order,
            previous_driver,
            kind,
        })
    }
}

fn assignment_notifications(
    order: &Order,
    previous_driver: Option<UserId>,
    kind: AssignmentKind,
    reason: Option<String>,
) -> Vec<Notification> {
    let mut out = Vec::with_capacity(3);
    if let Some(previous) = previous_driver {
        out.push(
            Notification::new(OrderEvent::Cancelled, Recipient::Driver(previous), order.id)
                .with_driver(Some(previous))
                .with_reason(reason.clone()),
        );
    }
    if let Some(driver_id) = order.driver_id {
        let event = match kind {
            AssignmentKind::Assigned => OrderEvent::Assigned,
            AssignmentKind::Reassigned => OrderEvent::Reassigned,
        };
        out.push(
            Notification::new(event, Recipient::Driver(driver_id), order.id)
                .with_driver(Some(driver_id))
                .with_reason(reason),
        );
    }
    out.push(
        Notification::new(OrderEvent::StatusUpdated, Recipient::Broadcast, order.id)
            .with_driver(order.driver_id)
            .with_status(order.status),
    );
    out
}

/// Builds the notice telling an assigned driver their order was called off.
///
/// The driver stays on the order row for audit; only the notice is new.
pub(crate) fn release_driver(order: &Order, reason: Option<String>) -> Option<Notification> {
    let driver_id = order.driver_id?;
    metrics::counter!("driver_assignments_total", "kind" => "released").increment(1);
    tracing::info!(order_id = %order.id, %driver_id, status = %order.status, "driver released");
    Some(
        Notification::new(OrderEvent::Cancelled, Recipient::Driver(driver_id), order.id)
            .with_driver(Some(driver_id))
            .with_reason(reason),
    )
}
