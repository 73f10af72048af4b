use async_trait::async_trait;
use common::{Money, OrderId, PayoutId, UserId, WalletId};

use crate::{
    Driver, DriverEarning, Order, Payout, Result, Settlement, Transaction, Wallet,
};

/// Constraint names shared by every implementation so callers can map
/// uniqueness violations to domain errors.
pub mod constraints {
    pub const TRANSACTION_REFERENCE: &str = "transactions_wallet_reference_key";
    pub const SETTLEMENT_ORDER: &str = "settlements_order_id_key";
    pub const EARNING_ORDER: &str = "driver_earnings_order_id_key";
    pub const PAYOUT_REFERENCE: &str = "driver_payouts_reference_key";
    pub const WALLET_USER: &str = "wallets_user_id_key";
    pub const ORDER_ID: &str = "orders_pkey";
}

/// Entry point to a transactional datastore.
///
/// Implementations must be thread-safe; each call to [`Store::begin`] yields
/// an independent transaction.
#[async_trait]
pub trait Store: Send + Sync + 'static {
    /// The transaction handle type.
    type Tx: StoreTx;

    /// Starts a new transaction.
    async fn begin(&self) -> Result<Self::Tx>;
}

/// A single open transaction.
///
/// `lock_*` methods read a row with `SELECT ... FOR UPDATE` semantics: a
/// concurrent transaction locking the same row waits until this one ends.
/// Dropping the handle without [`StoreTx::commit`] rolls back.
#[async_trait]
pub trait StoreTx: Send {
    // -- orders --

    async fn insert_order(&mut self, order: &Order) -> Result<()>;

    async fn get_order(&mut self, order_id: OrderId) -> Result<Option<Order>>;

    async fn lock_order(&mut self, order_id: OrderId) -> Result<Option<Order>>;

    /// Overwrites every mutable column of an existing order.
    async fn update_order(&mut self, order: &Order) -> Result<()>;

    // -- drivers --

    async fn upsert_driver(&mut self, driver: &Driver) -> Result<()>;

    async fn get_driver(&mut self, user_id: UserId) -> Result<Option<Driver>>;

    // -- wallets --

    async fn insert_wallet(&mut self, wallet: &Wallet) -> Result<()>;

    /// Inserts `wallet` unless its user already has one, then returns the
    /// user's wallet locked. Concurrent callers for the same user all get
    /// the single surviving row instead of a uniqueness error.
    async fn ensure_wallet(&mut self, wallet: &Wallet) -> Result<Wallet>;

    async fn get_wallet_by_user(&mut self, user_id: UserId) -> Result<Option<Wallet>>;

    async fn lock_wallet_by_user(&mut self, user_id: UserId) -> Result<Option<Wallet>>;

    async fn update_wallet_balance(&mut self, wallet_id: WalletId, balance: Money) -> Result<()>;

    // -- transactions --

    async fn find_transaction(
        &mut self,
        wallet_id: WalletId,
        reference: &str,
    ) -> Result<Option<Transaction>>;

    /// Appends a ledger row and returns it with its assigned sequence.
    async fn insert_transaction(&mut self, transaction: &Transaction) -> Result<Transaction>;

    /// Returns a wallet's rows in creation order.
    async fn list_transactions(&mut self, wallet_id: WalletId) -> Result<Vec<Transaction>>;

    // -- settlements --

    async fn find_settlement(&mut self, order_id: OrderId) -> Result<Option<Settlement>>;

    async fn insert_settlement(&mut self, settlement: &Settlement) -> Result<()>;

    // -- driver earnings --

    async fn find_earning(&mut self, order_id: OrderId) -> Result<Option<DriverEarning>>;

    async fn insert_earning(&mut self, earning: &DriverEarning) -> Result<()>;

    /// Returns the driver's earnings not yet linked to a payout, oldest first.
    async fn list_unswept_earnings(&mut self, driver_id: UserId) -> Result<Vec<DriverEarning>>;

    async fn list_earnings_for_payout(&mut self, payout_id: PayoutId)
    -> Result<Vec<DriverEarning>>;

    /// Updates the status and payout link of an earning.
    async fn update_earning(&mut self, earning: &DriverEarning) -> Result<()>;

    // -- payouts --

    async fn insert_payout(&mut self, payout: &Payout) -> Result<()>;

    async fn get_payout(&mut self, reference: &str) -> Result<Option<Payout>>;

    async fn lock_payout(&mut self, reference: &str) -> Result<Option<Payout>>;

    /// Updates the status columns of a payout.
    async fn update_payout(&mut self, payout: &Payout) -> Result<()>;

    // -- lifecycle --

    async fn commit(self) -> Result<()>;

    async fn rollback(self) -> Result<()>;
}
