//! Wallet balances and the append-only transaction ledger.
//!
//! Every balance change locks the wallet row, appends one [`Transaction`]
//! carrying the resulting `balance_after`, and writes the new cached
//! balance, all inside the caller's database transaction. References are
//! unique per wallet, so replaying the same external event is rejected
//! instead of applied twice.

use chrono::Utc;
use common::{Money, TransactionId, UserId, WalletId};
use serde::Serialize;
use store::{Store, StoreTx, Transaction, TransactionType, Wallet, store::constraints};

use crate::error::{FulfillmentError, Result};

/// Entry point for posting to and reading wallets.
#[derive(Clone)]
pub struct Ledger<S: Store> {
    store: S,
}

impl<S: Store> Ledger<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Credits a user's wallet, creating the wallet on first use.
    #[tracing::instrument(skip(self))]
    pub async fn credit(
        &self,
        user_id: UserId,
        amount: Money,
        kind: TransactionType,
        reference: &str,
    ) -> Result<Transaction> {
        let mut tx = self.store.begin().await?;
        let entry = credit_in(&mut tx, user_id, amount, kind, reference, None).await?;
        tx.commit().await?;
        Ok(entry)
    }

    /// Debits a user's wallet. Fails with `InsufficientBalance` if the
    /// balance does not cover `amount`.
    #[tracing::instrument(skip(self))]
    pub async fn debit(
        &self,
        user_id: UserId,
        amount: Money,
        kind: TransactionType,
        reference: &str,
    ) -> Result<Transaction> {
        let mut tx = self.store.begin().await?;
        let entry = debit_in(&mut tx, user_id, amount, kind, reference, None).await?;
        tx.commit().await?;
        Ok(entry)
    }

    /// Returns a user's wallet.
    pub async fn wallet(&self, user_id: UserId) -> Result<Wallet> {
        let mut tx = self.store.begin().await?;
        tx.get_wallet_by_user(user_id)
            .await?
            .ok_or(FulfillmentError::WalletNotFound(user_id))
    }

    /// Returns a user's balance; users without a wallet have zero.
    pub async fn balance(&self, user_id: UserId) -> Result<Money> {
        let mut tx = self.store.begin().await?;
        Ok(tx
            .get_wallet_by_user(user_id)
            .await?
            .map(|w| w.balance)
            .unwrap_or_default())
    }

    /// Returns a user's ledger rows in creation order.
    pub async fn transactions(&self, user_id: UserId) -> Result<Vec<Transaction>> {
        let mut tx = self.store.begin().await?;
        let wallet = tx
            .get_wallet_by_user(user_id)
            .await?
            .ok_or(FulfillmentError::WalletNotFound(user_id))?;
        Ok(tx.list_transactions(wallet.id).await?)
    }

    /// Recomputes a wallet's balance from its transaction rows.
    ///
    /// This is an audit routine, not a hot-path read.
    #[tracing::instrument(skip(self))]
    pub async fn reconcile(&self, user_id: UserId) -> Result<Reconciliation> {
        let mut tx = self.store.begin().await?;
        let wallet = tx
            .lock_wallet_by_user(user_id)
            .await?
            .ok_or(FulfillmentError::WalletNotFound(user_id))?;
        let rows = tx.list_transactions(wallet.id).await?;

        let mut running = Money::zero();
        let mut mismatched_rows = Vec::new();
        for row in &rows {
            running += row.amount;
            if row.balance_after != running {
                mismatched_rows.push(row.id);
            }
        }

        let report = Reconciliation {
            wallet_id: wallet.id,
            user_id,
            cached_balance: wallet.balance,
            computed_balance: running,
            transaction_count: rows.len(),
            mismatched_rows,
        };
        if !report.is_consistent() {
            tracing::error!(
                wallet_id = %wallet.id,
                cached = %report.cached_balance,
                computed = %report.computed_balance,
                "wallet balance does not match its ledger"
            );
        }
        Ok(report)
    }
}

/// Result of recomputing a wallet from its ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Reconciliation {
    pub wallet_id: WalletId,
    pub user_id: UserId,
    pub cached_balance: Money,
    pub computed_balance: Money,
    pub transaction_count: usize,
    /// Rows whose `balance_after` differs from the running sum.
    pub mismatched_rows: Vec<TransactionId>,
}

impl Reconciliation {
    pub fn is_consistent(&self) -> bool {
        self.cached_balance == self.computed_balance && self.mismatched_rows.is_empty()
    }
}

/// Credits `amount` inside an open transaction.
pub(crate) async fn credit_in<T: StoreTx>(
    tx: &mut T,
    user_id: UserId,
    amount: Money,
    kind: TransactionType,
    reference: &str,
    description: Option<String>,
) -> Result<Transaction> {
    validate(amount, reference)?;

    let wallet = match tx.lock_wallet_by_user(user_id).await? {
        Some(wallet) => wallet,
        None => {
            let wallet = tx.ensure_wallet(&Wallet::new(user_id)).await?;
            tracing::debug!(%user_id, wallet_id = %wallet.id, "wallet created");
            wallet
        }
    };

    post(tx, &wallet, amount, kind, reference, description).await
}

/// Debits `amount` inside an open transaction.
pub(crate) async fn debit_in<T: StoreTx>(
    tx: &mut T,
    user_id: UserId,
    amount: Money,
    kind: TransactionType,
    reference: &str,
    description: Option<String>,
) -> Result<Transaction> {
    validate(amount, reference)?;

    let Some(wallet) = tx.lock_wallet_by_user(user_id).await? else {
        return Err(FulfillmentError::InsufficientBalance {
            available: Money::zero(),
            requested: amount,
        });
    };

    if wallet.balance < amount {
        return Err(FulfillmentError::InsufficientBalance {
            available: wallet.balance,
            requested: amount,
        });
    }

    post(tx, &wallet, amount.negate(), kind, reference, description).await
}

fn validate(amount: Money, reference: &str) -> Result<()> {
    if !amount.is_positive() {
        return Err(FulfillmentError::InvalidAmount(amount));
    }
    if reference.trim().is_empty() {
        return Err(FulfillmentError::InvalidReference);
    }
    Ok(())
}

/// Appends a signed entry to a wallet already locked by the caller.
async fn post<T: StoreTx>(
    tx: &mut T,
    wallet: &Wallet,
    signed_amount: Money,
    kind: TransactionType,
    reference: &str,
    description: Option<String>,
) -> Result<Transaction> {
    if tx.find_transaction(wallet.id, reference).await?.is_some() {
        return Err(FulfillmentError::DuplicateTransaction {
            reference: reference.to_string(),
        });
    }

    let balance_after = wallet
        .balance
        .checked_add(signed_amount)
        .ok_or(FulfillmentError::InvalidAmount(signed_amount))?;

    let entry = Transaction {
        id: TransactionId::new(),
        wallet_id: wallet.id,
        amount: signed_amount,
        balance_after,
        kind,
        reference: reference.to_string(),
        description,
        sequence: 0,
        created_at: Utc::now(),
    };

    let stored = tx.insert_transaction(&entry).await.map_err(|e| {
        if e.is_unique_violation(constraints::TRANSACTION_REFERENCE) {
            FulfillmentError::DuplicateTransaction {
                reference: reference.to_string(),
            }
        } else {
            e.into()
        }
    })?;
    tx.update_wallet_balance(wallet.id, balance_after).await?;

    metrics::counter!("ledger_entries_total", "type" => kind.as_str()).increment(1);
    tracing::debug!(
        wallet_id = %wallet.id,
        amount = %signed_amount,
        balance_after = %balance_after,
        reference,
        "ledger entry posted"
    );
    Ok(stored)
}
