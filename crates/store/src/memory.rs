use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use common::{Money, OrderId, PayoutId, UserId, WalletId};
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::{
    Driver, DriverEarning, Order, Payout, Result, Settlement, StoreError, Transaction, Wallet,
    store::{Store, StoreTx, constraints},
};

#[derive(Debug, Clone, Default)]
struct Tables {
    orders: HashMap<OrderId, Order>,
    drivers: HashMap<UserId, Driver>,
    wallets: HashMap<WalletId, Wallet>,
    transactions: Vec<Transaction>,
    settlements: HashMap<OrderId, Settlement>,
    earnings: Vec<DriverEarning>,
    payouts: HashMap<String, Payout>,
    next_sequence: i64,
}

/// In-memory store for tests and single-process deployments.
///
/// A transaction holds a lock over the whole dataset and writes to a
/// private copy that replaces the shared state on commit. Transactions are
/// therefore fully serialized, which is a superset of the row-level
/// locking the PostgreSQL store provides.
#[derive(Clone, Default)]
pub struct InMemoryStore {
    tables: Arc<Mutex<Tables>>,
}

impl InMemoryStore {
    /// Creates a new empty in-memory store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the total number of ledger rows stored.
    pub async fn transaction_count(&self) -> usize {
        self.tables.lock().await.transactions.len()
    }

    /// Returns the total number of settlement rows stored.
    pub async fn settlement_count(&self) -> usize {
        self.tables.lock().await.settlements.len()
    }
}

#[async_trait]
impl Store for InMemoryStore {
    type Tx = InMemoryTx;

    async fn begin(&self) -> Result<InMemoryTx> {
        let guard = self.tables.clone().lock_owned().await;
        let working = guard.clone();
        Ok(InMemoryTx { guard, working })
    }
}

/// Open transaction on an [`InMemoryStore`].
pub struct InMemoryTx {
    guard: OwnedMutexGuard<Tables>,
    working: Tables,
}

fn unique(constraint: &str) -> StoreError {
    StoreError::UniqueViolation {
        constraint: constraint.to_string(),
    }
}

fn not_found(entity: &'static str, id: impl ToString) -> StoreError {
    StoreError::NotFound {
        entity,
        id: id.to_string(),
    }
}

#[async_trait]
impl StoreTx for InMemoryTx {
    async fn insert_order(&mut self, order: &Order) -> Result<()> {
        if self.working.orders.contains_key(&order.id) {
            return Err(unique(constraints::ORDER_ID));
        }
        self.working.orders.insert(order.id, order.clone());
        Ok(())
    }

    async fn get_order(&mut self, order_id: OrderId) -> Result<Option<Order>> {
        Ok(self.working.orders.get(&order_id).cloned())
    }

    async fn lock_order(&mut self, order_id: OrderId) -> Result<Option<Order>> {
        self.get_order(order_id).await
    }

    async fn update_order(&mut self, order: &Order) -> Result<()> {
        let slot = self
            .working
            .orders
            .get_mut(&order.id)
            .ok_or_else(|| not_found("Order", order.id))?;
        *slot = order.clone();
        Ok(())
    }

    async fn upsert_driver(&mut self, driver: &Driver) -> Result<()> {
        self.working.drivers.insert(driver.user_id, driver.clone());
        Ok(())
    }

    async fn get_driver(&mut self, user_id: UserId) -> Result<Option<Driver>> {
        Ok(self.working.drivers.get(&user_id).cloned())
    }

    async fn insert_wallet(&mut self, wallet: &Wallet) -> Result<()> {
        if self
            .working
            .wallets
            .values()
            .any(|w| w.user_id == wallet.user_id)
        {
            return Err(unique(constraints::WALLET_USER));
        }
        self.working.wallets.insert(wallet.id, wallet.clone());
        Ok(())
    }

    async fn ensure_wallet(&mut self, wallet: &Wallet) -> Result<Wallet> {
        if let Some(existing) = self.get_wallet_by_user(wallet.user_id).await? {
            return Ok(existing);
        }
        self.working.wallets.insert(wallet.id, wallet.clone());
        Ok(wallet.clone())
    }

    async fn get_wallet_by_user(&mut self, user_id: UserId) -> Result<Option<Wallet>> {
        Ok(self
            .working
            .wallets
            .values()
            .find(|w| w.user_id == user_id)
            .cloned())
    }

    async fn lock_wallet_by_user(&mut self, user_id: UserId) -> Result<Option<Wallet>> {
        self.get_wallet_by_user(user_id).await
    }

    async fn update_wallet_balance(&mut self, wallet_id: WalletId, balance: Money) -> Result<()> {
        let wallet = self
            .working
            .wallets
            .get_mut(&wallet_id)
            .ok_or_else(|| not_found("Wallet", wallet_id))?;
        wallet.balance = balance;
        wallet.updated_at = Utc::now();
        Ok(())
    }

    async fn find_transaction(
        &mut self,
        wallet_id: WalletId,
        reference: &str,
    ) -> Result<Option<Transaction>> {
        Ok(self
            .working
            .transactions
            .iter()
            .find(|t| t.wallet_id == wallet_id && t.reference == reference)
            .cloned())
    }

    async fn insert_transaction(&mut self, transaction: &Transaction) -> Result<Transaction> {
        if self
            .working
            .transactions
            .iter()
            .any(|t| t.wallet_id == transaction.wallet_id && t.reference == transaction.reference)
        {
            return Err(unique(constraints::TRANSACTION_REFERENCE));
        }
        self.working.next_sequence += 1;
        let mut stored = transaction.clone();
        stored.sequence = self.working.next_sequence;
        self.working.transactions.push(stored.clone());
        Ok(stored)
    }

    async fn list_transactions(&mut self, wallet_id: WalletId) -> Result<Vec<Transaction>> {
        let mut rows: Vec<_> = self
            .working
            .transactions
            .iter()
            .filter(|t| t.wallet_id == wallet_id)
            .cloned()
            .collect();
        rows.sort_by_key(|t| t.sequence);
        Ok(rows)
    }

    async fn find_settlement(&mut self, order_id: OrderId) -> Result<Option<Settlement>> {
        Ok(self.working.settlements.get(&order_id).cloned())
    }

    async fn insert_settlement(&mut self, settlement: &Settlement) -> Result<()> {
        if self.working.settlements.contains_key(&settlement.order_id) {
            return Err(unique(constraints::SETTLEMENT_ORDER));
        }
        self.working
            .settlements
            .insert(settlement.order_id, settlement.clone());
        Ok(())
    }

    async fn find_earning(&mut self, order_id: OrderId) -> Result<Option<DriverEarning>> {
        Ok(self
            .working
            .earnings
            .iter()
            .find(|e| e.order_id == order_id)
            .cloned())
    }

    async fn insert_earning(&mut self, earning: &DriverEarning) -> Result<()> {
        if self
            .working
            .earnings
            .iter()
            .any(|e| e.order_id == earning.order_id)
        {
            return Err(unique(constraints::EARNING_ORDER));
        }
        self.working.earnings.push(earning.clone());
        Ok(())
    }

    async fn list_unswept_earnings(&mut self, driver_id: UserId) -> Result<Vec<DriverEarning>> {
        // Insertion order is creation order.
        Ok(self
            .working
            .earnings
            .iter()
            .filter(|e| e.driver_id == driver_id && e.payout_id.is_none())
            .cloned()
            .collect())
    }

    async fn list_earnings_for_payout(
        &mut self,
        payout_id: PayoutId,
    ) -> Result<Vec<DriverEarning>> {
        Ok(self
            .working
            .earnings
            .iter()
            .filter(|e| e.payout_id == Some(payout_id))
            .cloned()
            .collect())
    }

    async fn update_earning(&mut self, earning: &DriverEarning) -> Result<()> {
        let slot = self
            .working
            .earnings
            .iter_mut()
            .find(|e| e.id == earning.id)
            .ok_or_else(|| not_found("DriverEarning", earning.id))?;
        slot.status = earning.status;
        slot.payout_id = earning.payout_id;
        Ok(())
    }

    async fn insert_payout(&mut self, payout: &Payout) -> Result<()> {
        if self.working.payouts.contains_key(&payout.reference) {
            return Err(unique(constraints::PAYOUT_REFERENCE));
        }
        self.working
            .payouts
            .insert(payout.reference.clone(), payout.clone());
        Ok(())
    }

    async fn get_payout(&mut self, reference: &str) -> Result<Option<Payout>> {
        Ok(self.working.payouts.get(reference).cloned())
    }

    async fn lock_payout(&mut self, reference: &str) -> Result<Option<Payout>> {
        self.get_payout(reference).await
    }

    async fn update_payout(&mut self, payout: &Payout) -> Result<()> {
        let slot = self
            .working
            .payouts
            .get_mut(&payout.reference)
            .ok_or_else(|| not_found("Payout", &payout.reference))?;
        slot.status = payout.status;
        slot.failure_reason = payout.failure_reason.clone();
        slot.paid_at = payout.paid_at;
        slot.failed_at = payout.failed_at;
        Ok(())
    }

    async fn commit(self) -> Result<()> {
        let InMemoryTx { mut guard, working } = self;
        *guard = working;
        Ok(())
    }

    async fn rollback(self) -> Result<()> {
        Ok(())
    }
}
