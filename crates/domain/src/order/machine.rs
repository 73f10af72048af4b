use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use common::{Money, OrderId};
use serde::{Deserialize, Serialize};
use store::{Order, OrderStatus, Store, StoreTx, TransactionType};

use super::transitions::{Actor, check_ownership, check_transition};
use crate::assignment::release_driver;
use crate::config::FeeSchedule;
use crate::error::{FulfillmentError, Result};
use crate::events::{Notification, NotificationSink, OrderEvent, Recipient, publish_all};
use crate::ledger::credit_in;
use crate::settlement::{SettlementEngine, SettlementOutcome};

/// Ledger reference for the customer credit of a refunded order.
pub fn refund_reference(order_id: OrderId) -> String {
    format!("refund:{order_id}")
}

/// A request to move an order to another status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionRequest {
    pub order_id: OrderId,
    pub target: OrderStatus,
    pub actor: Actor,
    /// Delivery confirmation code, required when a driver completes.
    #[serde(default)]
    pub otp: Option<String>,
    /// Free-text reason forwarded to cancellation notices and refunds.
    #[serde(default)]
    pub reason: Option<String>,
}

impl TransitionRequest {
    pub fn new(order_id: OrderId, target: OrderStatus, actor: Actor) -> Self {
        Self {
            order_id,
            target,
            actor,
            otp: None,
            reason: None,
        }
    }

    pub fn with_otp(mut self, otp: impl Into<String>) -> Self {
        self.otp = Some(otp.into());
        self
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }
}

/// Outcome of a transition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TransitionResult {
    pub order: Order,
    pub previous: OrderStatus,
    /// False when the order was already in the target status.
    pub changed: bool,
    /// When the order entered the target status.
    pub timestamp: DateTime<Utc>,
    pub settlement: Option<SettlementOutcome>,
}

/// Applies status changes to orders under a row lock.
///
/// Everything a transition writes (order row, settlement, earnings,
/// refunds and their ledger entries) commits together or not at all.
/// Notifications go out only after the commit.
#[derive(Clone)]
pub struct OrderStateMachine<S: Store> {
    store: S,
    settlement: SettlementEngine<S>,
    sink: Arc<dyn NotificationSink>,
}

impl<S: Store + Clone> OrderStateMachine<S> {
    pub fn new(store: S, fees: FeeSchedule, sink: Arc<dyn NotificationSink>) -> Self {
        Self {
            settlement: SettlementEngine::new(store.clone(), fees),
            store,
            sink,
        }
    }
}

impl<S: Store> OrderStateMachine<S> {
    /// Records a new order coming out of checkout.
    #[tracing::instrument(skip(self, order), fields(order_id = %order.id))]
    pub async fn place_order(&self, order: Order) -> Result<Order> {
        for amount in [order.gross_total, order.delivery_fee, order.coupon_discount] {
            if amount.is_negative() {
                return Err(FulfillmentError::InvalidAmount(amount));
            }
        }
        let net_total = order
            .gross_total
            .checked_sub(order.coupon_discount)
            .filter(|net| !net.is_negative() && *net == order.net_total)
            .ok_or(FulfillmentError::InvalidAmount(order.net_total))?;
        // Refunds pay back net plus delivery, so the sum must be representable.
        if net_total.checked_add(order.delivery_fee).is_none() {
            return Err(FulfillmentError::InvalidAmount(order.delivery_fee));
        }
        if !matches!(order.status, OrderStatus::Pending | OrderStatus::Paid) {
            return Err(FulfillmentError::InvalidTransition {
                from: OrderStatus::Pending,
                to: order.status,
            });
        }

        let mut tx = self.store.begin().await?;
        tx.insert_order(&order).await?;
        tx.commit().await?;

        tracing::info!(status = %order.status, net_total = %order.net_total, "order placed");
        Ok(order)
    }

    pub async fn get_order(&self, order_id: OrderId) -> Result<Order> {
        let mut tx = self.store.begin().await?;
        tx.get_order(order_id)
            .await?
            .ok_or(FulfillmentError::OrderNotFound(order_id))
    }

    /// Moves an order to `request.target`.
    ///
    /// Requesting the status the order is already in returns the existing
    /// timestamp without writing or notifying anything.
    #[tracing::instrument(
        skip(self, request),
        fields(order_id = %request.order_id, target = %request.target, actor = %request.actor)
    )]
    pub async fn transition(&self, request: TransitionRequest) -> Result<TransitionResult> {
        let started = Instant::now();
        let target = request.target;

        let mut tx = self.store.begin().await?;
        let mut order = tx
            .lock_order(request.order_id)
            .await?
            .ok_or(FulfillmentError::OrderNotFound(request.order_id))?;
        let previous = order.status;

        check_ownership(&request.actor, &order, target).inspect_err(rejected)?;

        if previous == target {
            let timestamp = order
                .status_timestamp(target)
                .unwrap_or(order.created_at);
            tracing::debug!("order already in target status");
            return Ok(TransitionResult {
                order,
                previous,
                changed: false,
                timestamp,
                settlement: None,
            });
        }

        check_transition(&request.actor, &order, target, request.otp.as_deref())
            .inspect_err(rejected)?;

        order.status = target;
        let timestamp = order.stamp(target, Utc::now());

        let mut settlement = None;
        let mut notifications = vec![
            Notification::new(OrderEvent::StatusChanged, Recipient::Broadcast, order.id)
                .with_driver(order.driver_id)
                .with_status(target)
                .with_reason(request.reason.clone()),
        ];

        match target {
            OrderStatus::Completed => {
                settlement = Some(self.settlement.settle_in(&mut tx, &order).await?);
            }
            OrderStatus::Refunded => {
                refund_in(&mut tx, &mut order, request.reason.clone()).await?;
            }
            _ => {}
        }
        if matches!(target, OrderStatus::Cancelled | OrderStatus::Refunded)
            && let Some(notice) = release_driver(&order, request.reason.clone())
        {
            notifications.push(notice);
        }

        tx.update_order(&order).await?;
        tx.commit().await?;

        metrics::counter!(
            "order_transitions_total",
            "from" => previous.as_str(),
            "to" => target.as_str()
        )
        .increment(1);
        metrics::histogram!("transition_duration_seconds").record(started.elapsed().as_secs_f64());
        tracing::info!(from = %previous, to = %target, "order status changed");

        publish_all(self.sink.as_ref(), notifications);

        Ok(TransitionResult {
            order,
            previous,
            changed: true,
            timestamp,
            settlement,
        })
    }
}

fn rejected(err: &FulfillmentError) {
    metrics::counter!("order_transition_rejected_total").increment(1);
    tracing::debug!(error = %err, "transition rejected");
}

/// Records the refund on the order and credits the customer's wallet.
///
/// Only money that was actually collected goes back: an order that never
/// reached payment is refunded with a zero amount and no ledger entry.
async fn refund_in<T: StoreTx>(
    tx: &mut T,
    order: &mut Order,
    reason: Option<String>,
) -> Result<()> {
    let amount = if order.paid_at.is_some() {
        order
            .net_total
            .checked_add(order.delivery_fee)
            .ok_or(FulfillmentError::InvalidAmount(order.delivery_fee))?
    } else {
        Money::zero()
    };
    order.refund_amount = Some(amount);
    order.refund_reason = reason;

    if amount.is_positive() {
        credit_in(
            tx,
            order.customer_id,
            amount,
            TransactionType::Credit,
            &refund_reference(order.id),
            Some(format!("Refund for order {}", order.id)),
        )
        .await?;
    }
    tracing::info!(order_id = %order.id, %amount, paid = order.paid_at.is_some(), "order refunded");
    Ok(())
}
