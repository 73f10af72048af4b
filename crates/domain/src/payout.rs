//! Withdrawals from accumulated wallet balances.
//!
//! A payout debits the wallet immediately and stays `PENDING` until the
//! external disbursement reports back. Completion only flips the status;
//! failure credits the amount back under `reversal:{reference}`.

use chrono::Utc;
use common::{Money, PayoutId, UserId};
use serde::Serialize;
use store::{
    DriverEarning, EarningStatus, Payout, PayoutStatus, Store, StoreTx, TransactionType,
    store::constraints,
};

use crate::error::{FulfillmentError, Result};
use crate::ledger::{credit_in, debit_in};

/// Ledger reference for the compensating credit of a failed payout.
pub fn reversal_reference(payout_reference: &str) -> String {
    format!("reversal:{payout_reference}")
}

/// Result of a payout request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PayoutReceipt {
    pub payout: Payout,
    /// False when the reference was already used by this account and the
    /// existing payout is returned without a new debit.
    pub created: bool,
    /// Driver earnings linked to this payout.
    pub swept_earnings: usize,
}

#[derive(Clone)]
pub struct PayoutProcessor<S: Store> {
    store: S,
}

impl<S: Store> PayoutProcessor<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Debits `amount` from the account's wallet and records a pending payout.
    ///
    /// `reference` is the idempotency key. When omitted a fresh one is
    /// generated, so only callers that supply one get retry safety. A retry
    /// must repeat the original account and amount.
    #[tracing::instrument(skip(self))]
    pub async fn request_payout(
        &self,
        user_id: UserId,
        amount: Money,
        reference: Option<String>,
    ) -> Result<PayoutReceipt> {
        if !amount.is_positive() {
            return Err(FulfillmentError::InvalidAmount(amount));
        }
        let reference = match reference {
            Some(r) if r.trim().is_empty() => return Err(FulfillmentError::InvalidReference),
            Some(r) => r,
            None => format!("payout:{}", PayoutId::new()),
        };

        let mut tx = self.store.begin().await?;

        if let Some(existing) = tx.lock_payout(&reference).await? {
            if existing.user_id != user_id || existing.amount != amount {
                return Err(FulfillmentError::DuplicateTransaction { reference });
            }
            tracing::debug!(%reference, "payout already requested");
            let swept_earnings = tx.list_earnings_for_payout(existing.id).await?.len();
            return Ok(PayoutReceipt {
                payout: existing,
                created: false,
                swept_earnings,
            });
        }

        debit_in(
            &mut tx,
            user_id,
            amount,
            TransactionType::Payout,
            &reference,
            Some("Payout request".to_string()),
        )
        .await?;

        let payout = Payout {
            id: PayoutId::new(),
            user_id,
            amount,
            status: PayoutStatus::Pending,
            reference: reference.clone(),
            failure_reason: None,
            created_at: Utc::now(),
            paid_at: None,
            failed_at: None,
        };
        tx.insert_payout(&payout).await.map_err(|e| {
            if e.is_unique_violation(constraints::PAYOUT_REFERENCE) {
                FulfillmentError::DuplicateTransaction {
                    reference: reference.clone(),
                }
            } else {
                e.into()
            }
        })?;

        let swept_earnings = sweep_earnings(&mut tx, &payout).await?;
        tx.commit().await?;

        metrics::counter!("payouts_requested_total").increment(1);
        tracing::info!(
            %user_id,
            payout_id = %payout.id,
            %amount,
            %reference,
            swept_earnings,
            "payout requested"
        );

        Ok(PayoutReceipt {
            payout,
            created: true,
            swept_earnings,
        })
    }

    /// Marks a pending payout as disbursed.
    #[tracing::instrument(skip(self))]
    pub async fn complete_payout(&self, reference: &str) -> Result<Payout> {
        let mut tx = self.store.begin().await?;
        let mut payout = tx
            .lock_payout(reference)
            .await?
            .ok_or_else(|| FulfillmentError::PayoutNotFound(reference.to_string()))?;

        match payout.status {
            PayoutStatus::Paid => return Ok(payout),
            PayoutStatus::Failed => {
                return Err(FulfillmentError::PayoutNotPending {
                    reference: reference.to_string(),
                    status: payout.status,
                });
            }
            PayoutStatus::Pending => {}
        }

        payout.status = PayoutStatus::Paid;
        payout.paid_at = Some(Utc::now());
        tx.update_payout(&payout).await?;
        tx.commit().await?;

        tracing::info!(payout_id = %payout.id, reference, "payout completed");
        Ok(payout)
    }

    /// Marks a pending payout as failed and credits the amount back.
    ///
    /// Earnings swept into the payout become available for the next one.
    #[tracing::instrument(skip(self))]
    pub async fn fail_payout(&self, reference: &str, reason: &str) -> Result<Payout> {
        let mut tx = self.store.begin().await?;
        let mut payout = tx
            .lock_payout(reference)
            .await?
            .ok_or_else(|| FulfillmentError::PayoutNotFound(reference.to_string()))?;

        match payout.status {
            PayoutStatus::Failed => return Ok(payout),
            PayoutStatus::Paid => {
                return Err(FulfillmentError::PayoutNotPending {
                    reference: reference.to_string(),
                    status: payout.status,
                });
            }
            PayoutStatus::Pending => {}
        }

        credit_in(
            &mut tx,
            payout.user_id,
            payout.amount,
            TransactionType::Reversal,
            &reversal_reference(reference),
            Some(format!("Reversal of failed payout: {reason}")),
        )
        .await?;

        for mut earning in tx.list_earnings_for_payout(payout.id).await? {
            earning.status = EarningStatus::Credited;
            earning.payout_id = None;
            tx.update_earning(&earning).await?;
        }

        payout.status = PayoutStatus::Failed;
        payout.failure_reason = Some(reason.to_string());
        payout.failed_at = Some(Utc::now());
        tx.update_payout(&payout).await?;
        tx.commit().await?;

        metrics::counter!("payouts_reversed_total").increment(1);
        tracing::warn!(payout_id = %payout.id, reference, reason, "payout failed and reversed");
        Ok(payout)
    }

    pub async fn get_payout(&self, reference: &str) -> Result<Payout> {
        let mut tx = self.store.begin().await?;
        tx.get_payout(reference)
            .await?
            .ok_or_else(|| FulfillmentError::PayoutNotFound(reference.to_string()))
    }

    /// Returns the earnings linked to a payout.
    pub async fn swept_earnings(&self, reference: &str) -> Result<Vec<DriverEarning>> {
        let mut tx = self.store.begin().await?;
        let payout = tx
            .get_payout(reference)
            .await?
            .ok_or_else(|| FulfillmentError::PayoutNotFound(reference.to_string()))?;
        Ok(tx.list_earnings_for_payout(payout.id).await?)
    }
}

/// Links the oldest unswept earnings whose running total fits the payout.
async fn sweep_earnings<T: StoreTx>(tx: &mut T, payout: &Payout) -> Result<usize> {
    let mut covered = Money::zero();
    let mut swept = 0;
    for mut earning in tx.list_unswept_earnings(payout.user_id).await? {
        let next = covered + earning.net_amount;
        if next > payout.amount {
            break;
        }
        covered = next;
        earning.status = EarningStatus::PaidOut;
        earning.payout_id = Some(payout.id);
        tx.update_earning(&earning).await?;
        swept += 1;
    }
    Ok(swept)
}
