//! Domain layer for order fulfillment and the wallet ledger.
//!
//! This crate provides:
//! - [`OrderStateMachine`] for status transitions and their side effects
//! - [`AssignmentCoordinator`] for binding drivers to orders
//! - [`Ledger`] for wallet credits, debits and reconciliation
//! - [`SettlementEngine`] and [`PayoutProcessor`] for moving money out of orders
//! - [`FulfillmentService`] bundling all of the above over one store

pub mod assignment;
pub mod config;
pub mod error;
pub mod events;
pub mod ledger;
pub mod order;
pub mod payout;
pub mod service;
pub mod settlement;

pub use assignment::{Assignment, AssignmentCoordinator, AssignmentKind};
pub use config::FeeSchedule;
pub use error::{FulfillmentError, Result};
pub use events::{
    ChannelSink, EventPayload, Notification, NotificationSink, NotifyError, OrderEvent, Recipient,
    RecordingSink, spawn_dispatcher,
};
pub use ledger::{Ledger, Reconciliation};
pub use order::{Actor, OrderStateMachine, TransitionRequest, TransitionResult};
pub use payout::{PayoutProcessor, PayoutReceipt};
pub use service::FulfillmentService;
pub use settlement::{SettlementEngine, SettlementOutcome};
