//! Shared types for the order fulfillment and ledger core.

pub mod ids;
pub mod money;

pub use ids::{EarningId, OrderId, PayoutId, SettlementId, TransactionId, UserId, WalletId};
pub use money::{Money, Rate};
