//! Persistence layer for the fulfillment and ledger core.
//!
//! All access goes through a [`StoreTx`] handle obtained from [`Store::begin`].
//! A handle is one database transaction: reads that lock rows hold the lock
//! until the handle is committed or dropped, and dropping an uncommitted
//! handle discards every write made through it.

pub mod error;
pub mod memory;
pub mod model;
pub mod postgres;
pub mod store;

pub use error::{Result, StoreError};
pub use memory::InMemoryStore;
pub use model::{
    Driver, DriverEarning, EarningStatus, Order, OrderStatus, Payout, PayoutStatus, Settlement,
    SettlementStatus, Transaction, TransactionType, Wallet,
};
pub use postgres::PostgresStore;
pub use store::{Store, StoreTx};
