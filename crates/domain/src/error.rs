//! Domain error types.

use common::{Money, OrderId, UserId};
use store::{OrderStatus, PayoutStatus, StoreError};
use thiserror::Error;

/// Errors returned by the fulfillment core.
///
/// Everything except [`FulfillmentError::Store`] is a validation failure:
/// the operation was rejected before anything was written.
#[derive(Debug, Error)]
pub enum FulfillmentError {
    /// The requested status is not reachable from the current one.
    #[error("Invalid transition: cannot move order from {from} to {to}")]
    InvalidTransition { from: OrderStatus, to: OrderStatus },

    /// The actor may not perform this transition on this order.
    #[error("{actor} is not permitted to move order from {from} to {to}")]
    NotPermitted {
        actor: String,
        from: OrderStatus,
        to: OrderStatus,
    },

    /// Delivery confirmation code did not match.
    #[error("Delivery confirmation code does not match")]
    InvalidOtp,

    #[error("Order not found: {0}")]
    OrderNotFound(OrderId),

    /// The order was picked up or is terminal and can no longer change driver.
    #[error("Order {order_id} cannot be reassigned in {status} state")]
    OrderNotReassignable {
        order_id: OrderId,
        status: OrderStatus,
    },

    /// Settlement was requested for an order that has not completed.
    #[error("Order {order_id} cannot be settled in {status} state")]
    OrderNotSettleable {
        order_id: OrderId,
        status: OrderStatus,
    },

    #[error("Driver not found: {0}")]
    DriverNotFound(UserId),

    #[error("Driver {driver_id} is not eligible: {reason}")]
    DriverNotEligible { driver_id: UserId, reason: String },

    /// The requested driver already holds the order.
    #[error("Driver {driver_id} is already assigned to order {order_id}")]
    DriverAlreadyAssigned { order_id: OrderId, driver_id: UserId },

    #[error("Insufficient balance: available {available}, requested {requested}")]
    InsufficientBalance { available: Money, requested: Money },

    /// The idempotency reference has already been applied.
    #[error("Duplicate transaction reference: {reference}")]
    DuplicateTransaction { reference: String },

    #[error("Invalid amount: {0} (must be greater than 0)")]
    InvalidAmount(Money),

    #[error("Invalid reference: must not be empty")]
    InvalidReference,

    #[error("Wallet not found for user {0}")]
    WalletNotFound(UserId),

    #[error("Payout not found: {0}")]
    PayoutNotFound(String),

    #[error("Payout {reference} is already {status}")]
    PayoutNotPending {
        reference: String,
        status: PayoutStatus,
    },

    /// Infrastructure failure; the transaction was rolled back.
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

impl FulfillmentError {
    /// Returns true for validation errors the caller should not retry.
    pub fn is_client_error(&self) -> bool {
        !matches!(self, FulfillmentError::Store(_))
    }
}

/// Result type for domain operations.
pub type Result<T> = std::result::Result<T, FulfillmentError>;
