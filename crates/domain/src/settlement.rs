//! Vendor settlement and driver earnings for completed orders.

use chrono::Utc;
use common::{EarningId, Money, OrderId, SettlementId};
use serde::Serialize;
use store::{
    DriverEarning, EarningStatus, Order, OrderStatus, Settlement, SettlementStatus, Store, StoreTx,
    TransactionType,
};

use crate::config::FeeSchedule;
use crate::error::{FulfillmentError, Result};
use crate::ledger::credit_in;

/// Ledger reference for a vendor settlement credit.
pub fn settlement_reference(order_id: OrderId) -> String {
    format!("settlement:{order_id}")
}

/// Ledger reference for a driver earning credit.
pub fn earning_reference(order_id: OrderId) -> String {
    format!("earning:{order_id}")
}

/// Rows produced by settling an order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SettlementOutcome {
    pub settlement: Settlement,
    pub earning: Option<DriverEarning>,
    /// False when the settlement already existed and nothing was written.
    pub created: bool,
}

/// Computes and records the money splits of a completed order.
#[derive(Clone)]
pub struct SettlementEngine<S: Store> {
    store: S,
    fees: FeeSchedule,
}

impl<S: Store> SettlementEngine<S> {
    pub fn new(store: S, fees: FeeSchedule) -> Self {
        Self { store, fees }
    }

    pub fn fees(&self) -> &FeeSchedule {
        &self.fees
    }

    /// Settles a completed order in its own transaction.
    ///
    /// Safe to call repeatedly: an existing settlement is returned unchanged.
    #[tracing::instrument(skip(self))]
    pub async fn settle(&self, order_id: OrderId) -> Result<SettlementOutcome> {
        let mut tx = self.store.begin().await?;
        let order = tx
            .lock_order(order_id)
            .await?
            .ok_or(FulfillmentError::OrderNotFound(order_id))?;

        if order.status != OrderStatus::Completed {
            return Err(FulfillmentError::OrderNotSettleable {
                order_id,
                status: order.status,
            });
        }

        let outcome = self.settle_in(&mut tx, &order).await?;
        tx.commit().await?;
        Ok(outcome)
    }

    /// Returns the settlement of an order, if any.
    pub async fn find(&self, order_id: OrderId) -> Result<Option<Settlement>> {
        let mut tx = self.store.begin().await?;
        Ok(tx.find_settlement(order_id).await?)
    }

    /// Settles `order` inside the caller's transaction.
    ///
    /// The caller holds the order row lock, so the existence checks below
    /// cannot race with another settlement of the same order.
    pub(crate) async fn settle_in<T: StoreTx>(
        &self,
        tx: &mut T,
        order: &Order,
    ) -> Result<SettlementOutcome> {
        if let Some(existing) = tx.find_settlement(order.id).await? {
            tracing::debug!(order_id = %order.id, "order already settled");
            let earning = tx.find_earning(order.id).await?;
            return Ok(SettlementOutcome {
                settlement: existing,
                earning,
                created: false,
            });
        }

        let now = Utc::now();
        let total_amount = order.net_total;
        let platform_fee = self.fees.platform_fee_rate.apply(total_amount);
        let vendor_amount = total_amount
            .checked_sub(platform_fee)
            .filter(|amount| !amount.is_negative())
            .ok_or(FulfillmentError::InvalidAmount(platform_fee))?;
        let settlement = Settlement {
            id: SettlementId::new(),
            order_id: order.id,
            vendor_id: order.vendor_id,
            total_amount,
            vendor_amount,
            platform_fee,
            status: SettlementStatus::Settled,
            settled_at: Some(now),
            created_at: now,
        };
        tx.insert_settlement(&settlement).await?;

        if settlement.vendor_amount.is_positive() {
            credit_in(
                tx,
                order.vendor_id,
                settlement.vendor_amount,
                TransactionType::Settlement,
                &settlement_reference(order.id),
                Some(format!("Settlement for order {}", order.id)),
            )
            .await?;
        }
        if let Some(platform) = self.fees.platform_account
            && platform_fee.is_positive()
        {
            credit_in(
                tx,
                platform,
                platform_fee,
                TransactionType::Fee,
                &format!("platform-fee:{}", order.id),
                Some(format!("Platform fee for order {}", order.id)),
            )
            .await?;
        }

        let earning = self.record_earning(tx, order).await?;

        metrics::counter!("settlements_total").increment(1);
        tracing::info!(
            order_id = %order.id,
            vendor_amount = %settlement.vendor_amount,
            platform_fee = %settlement.platform_fee,
            driver_net = ?earning.as_ref().map(|e| e.net_amount.minor()),
            "order settled"
        );

        Ok(SettlementOutcome {
            settlement,
            earning,
            created: true,
        })
    }

    /// Records and credits the driver's share of the delivery fee.
    async fn record_earning<T: StoreTx>(
        &self,
        tx: &mut T,
        order: &Order,
    ) -> Result<Option<DriverEarning>> {
        let Some(driver_id) = order.driver_id else {
            return Ok(None);
        };
        if let Some(existing) = tx.find_earning(order.id).await? {
            return Ok(Some(existing));
        }

        let commission_amount = self.fees.driver_commission_rate.apply(order.delivery_fee);
        let net_amount: Money = order
            .delivery_fee
            .checked_sub(commission_amount)
            .filter(|amount| !amount.is_negative())
            .ok_or(FulfillmentError::InvalidAmount(commission_amount))?;
        let earning = DriverEarning {
            id: EarningId::new(),
            driver_id,
            order_id: order.id,
            gross_amount: order.delivery_fee,
            commission_amount,
            net_amount,
            status: EarningStatus::Credited,
            payout_id: None,
            created_at: Utc::now(),
        };
        tx.insert_earning(&earning).await?;

        if net_amount.is_positive() {
            credit_in(
                tx,
                driver_id,
                net_amount,
                TransactionType::Earning,
                &earning_reference(order.id),
                Some(format!("Delivery earning for order {}", order.id)),
            )
            .await?;
        }
        if let Some(platform) = self.fees.platform_account
            && commission_amount.is_positive()
        {
            credit_in(
                tx,
                platform,
                commission_amount,
                TransactionType::Fee,
                &format!("commission:{}", order.id),
                Some(format!("Delivery commission for order {}", order.id)),
            )
            .await?;
        }

        Ok(Some(earning))
    }
}

#[cfg(test)]
mod tests {
    use common::{Rate, UserId};
    use store::InMemoryStore;

    use super::*;
    use crate::ledger::Ledger;

    async fn completed_order(store: &InMemoryStore, driver: Option<UserId>) -> Order {
        let mut order = Order::new(
            UserId::new(),
            UserId::new(),
            Money::from_minor(10_000),
            Money::from_minor(1000),
            Money::zero(),
        );
        order.driver_id = driver;
        order.status = OrderStatus::Completed;
        order.completed_at = Some(Utc::now());

        let mut tx = store.begin().await.unwrap();
        tx.insert_order(&order).await.unwrap();
        tx.commit().await.unwrap();
        order
    }

    #[tokio::test]
    async fn settles_vendor_and_driver() {
        let store = InMemoryStore::new();
        let engine = SettlementEngine::new(store.clone(), FeeSchedule::default());
        let ledger = Ledger::new(store.clone());
        let driver = UserId::new();
        let order = completed_order(&store, Some(driver)).await;

        let outcome = engine.settle(order.id).await.unwrap();

        assert!(outcome.created);
        assert_eq!(outcome.settlement.total_amount.minor(), 10_000);
        assert_eq!(outcome.settlement.platform_fee.minor(), 1000);
        assert_eq!(outcome.settlement.vendor_amount.minor(), 9000);
        let earning = outcome.earning.unwrap();
        assert_eq!(earning.commission_amount.minor(), 100);
        assert_eq!(earning.net_amount.minor(), 900);

        assert_eq!(ledger.balance(order.vendor_id).await.unwrap().minor(), 9000);
        assert_eq!(ledger.balance(driver).await.unwrap().minor(), 900);
    }

    #[tokio::test]
    async fn fee_rates_cannot_exceed_the_order_total() {
        let store = InMemoryStore::new();
        let platform = UserId::new();
        let engine = SettlementEngine::new(
            store.clone(),
            FeeSchedule {
                platform_fee_rate: Rate::from_bps(20_000),
                driver_commission_rate: Rate::from_bps(1000),
                platform_account: Some(platform),
            },
        );
        let ledger = Ledger::new(store.clone());
        let order = completed_order(&store, None).await;

        let outcome = engine.settle(order.id).await.unwrap();

        assert_eq!(outcome.settlement.platform_fee.minor(), 10_000);
        assert_eq!(outcome.settlement.vendor_amount.minor(), 0);
        assert_eq!(ledger.balance(platform).await.unwrap().minor(), 10_000);
        assert_eq!(ledger.balance(order.vendor_id).await.unwrap().minor(), 0);
    }

    #[tokio::test]
    async fn negative_vendor_share_is_rejected() {
        let store = InMemoryStore::new();
        let engine = SettlementEngine::new(store.clone(), FeeSchedule::default());
        let mut order = Order::new(
            UserId::new(),
            UserId::new(),
            Money::from_minor(100),
            Money::zero(),
            Money::from_minor(5000),
        );
        order.status = OrderStatus::Completed;
        let mut tx = store.begin().await.unwrap();
        tx.insert_order(&order).await.unwrap();
        tx.commit().await.unwrap();

        let err = engine.settle(order.id).await.unwrap_err();

        assert!(matches!(err, FulfillmentError::InvalidAmount(_)));
        assert!(engine.find(order.id).await.unwrap().is_none());
        assert_eq!(store.transaction_count().await, 0);
    }

    #[tokio::test]
    async fn settle_twice_credits_once() {
        let store = InMemoryStore::new();
        let engine = SettlementEngine::new(store.clone(), FeeSchedule::default());
        let ledger = Ledger::new(store.clone());
        let order = completed_order(&store, None).await;

        let first = engine.settle(order.id).await.unwrap();
        let second = engine.settle(order.id).await.unwrap();

        assert!(first.created);
        assert!(!second.created);
        assert_eq!(first.settlement, second.settlement);
        assert_eq!(store.settlement_count().await, 1);
        assert_eq!(ledger.transactions(order.vendor_id).await.unwrap().len(), 1);
        assert_eq!(ledger.balance(order.vendor_id).await.unwrap().minor(), 9000);
    }

    #[tokio::test]
    async fn platform_account_receives_fee_and_commission() {
        let store = InMemoryStore::new();
        let platform = UserId::new();
        let fees = FeeSchedule {
            platform_fee_rate: Rate::from_bps(1500),
            driver_commission_rate: Rate::from_bps(2000),
            platform_account: Some(platform),
        };
        let engine = SettlementEngine::new(store.clone(), fees);
        let ledger = Ledger::new(store.clone());
        let driver = UserId::new();
        let order = completed_order(&store, Some(driver)).await;

        engine.settle(order.id).await.unwrap();

        let vendor = ledger.balance(order.vendor_id).await.unwrap();
        let driver_balance = ledger.balance(driver).await.unwrap();
        let platform_balance = ledger.balance(platform).await.unwrap();
        assert_eq!(vendor.minor(), 8500);
        assert_eq!(driver_balance.minor(), 800);
        assert_eq!(platform_balance.minor(), 1500 + 200);
        assert_eq!(
            (vendor + driver_balance + platform_balance).minor(),
            (order.net_total + order.delivery_fee).minor()
        );
    }

    #[tokio::test]
    async fn only_completed_orders_settle() {
        let store = InMemoryStore::new();
        let engine = SettlementEngine::new(store.clone(), FeeSchedule::default());
        let order = Order::new(
            UserId::new(),
            UserId::new(),
            Money::from_minor(100),
            Money::zero(),
            Money::zero(),
        );
        let mut tx = store.begin().await.unwrap();
        tx.insert_order(&order).await.unwrap();
        tx.commit().await.unwrap();

        let err = engine.settle(order.id).await.unwrap_err();
        assert!(matches!(
            err,
            FulfillmentError::OrderNotSettleable { status: OrderStatus::Pending, .. }
        ));
        assert!(engine.find(order.id).await.unwrap().is_none());
    }
}
