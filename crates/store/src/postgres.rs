use async_trait::async_trait;
use chrono::Utc;
use common::{EarningId, Money, OrderId, PayoutId, SettlementId, TransactionId, UserId, WalletId};
use sqlx::{PgPool, Postgres, Row, postgres::PgRow};
use uuid::Uuid;

use crate::{
    Driver, DriverEarning, Order, Payout, Result, Settlement, StoreError, Transaction, Wallet,
    store::{Store, StoreTx},
};

const ORDER_COLUMNS: &str = "id, vendor_id, customer_id, driver_id, status, gross_total, \
    delivery_fee, coupon_discount, net_total, is_gift, receiver_name, receiver_phone, otp_code, \
    refund_amount, refund_reason, created_at, paid_at, processing_at, assigned_at, dispatched_at, \
    completed_at, cancelled_at, refunded_at";

const TRANSACTION_COLUMNS: &str =
    "sequence, id, wallet_id, amount, balance_after, type, reference, description, created_at";

const EARNING_COLUMNS: &str = "id, driver_id, order_id, gross_amount, commission_amount, \
    net_amount, status, payout_id, created_at";

const PAYOUT_COLUMNS: &str =
    "id, user_id, amount, status, reference, failure_reason, created_at, paid_at, failed_at";

/// PostgreSQL-backed store.
///
/// Row locks are taken with `SELECT ... FOR UPDATE` and held until the
/// owning [`PostgresTx`] commits or is dropped.
#[derive(Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    /// Creates a new PostgreSQL store.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs the database migrations.
    pub async fn run_migrations(&self) -> Result<()> {
        sqlx::migrate!("../../migrations").run(&self.pool).await?;
        Ok(())
    }
}

#[async_trait]
impl Store for PostgresStore {
    type Tx = PostgresTx;

    async fn begin(&self) -> Result<PostgresTx> {
        let tx = self.pool.begin().await?;
        Ok(PostgresTx { tx })
    }
}

/// Open transaction on a [`PostgresStore`].
pub struct PostgresTx {
    tx: sqlx::Transaction<'static, Postgres>,
}

fn map_write_error(e: sqlx::Error) -> StoreError {
    if let sqlx::Error::Database(ref db_err) = e
        && db_err.is_unique_violation()
        && let Some(constraint) = db_err.constraint()
    {
        return StoreError::UniqueViolation {
            constraint: constraint.to_string(),
        };
    }
    StoreError::Database(e)
}

fn parse_text<T: std::str::FromStr<Err = String>>(
    row: &PgRow,
    column: &str,
    table: &'static str,
) -> Result<T> {
    let raw: String = row.try_get(column)?;
    raw.parse()
        .map_err(|reason| StoreError::Corrupt { table, reason })
}

fn money(row: &PgRow, column: &str) -> Result<Money> {
    Ok(Money::from_minor(row.try_get::<i64, _>(column)?))
}

fn row_to_order(row: PgRow) -> Result<Order> {
    Ok(Order {
        id: OrderId::from_uuid(row.try_get("id")?),
        vendor_id: UserId::from_uuid(row.try_get("vendor_id")?),
        customer_id: UserId::from_uuid(row.try_get("customer_id")?),
        driver_id: row
            .try_get::<Option<Uuid>, _>("driver_id")?
            .map(UserId::from_uuid),
        status: parse_text(&row, "status", "orders")?,
        gross_total: money(&row, "gross_total")?,
        delivery_fee: money(&row, "delivery_fee")?,
        coupon_discount: money(&row, "coupon_discount")?,
        net_total: money(&row, "net_total")?,
        is_gift: row.try_get("is_gift")?,
        receiver_name: row.try_get("receiver_name")?,
        receiver_phone: row.try_get("receiver_phone")?,
        otp_code: row.try_get("otp_code")?,
        refund_amount: row
            .try_get::<Option<i64>, _>("refund_amount")?
            .map(Money::from_minor),
        refund_reason: row.try_get("refund_reason")?,
        created_at: row.try_get("created_at")?,
        paid_at: row.try_get("paid_at")?,
        processing_at: row.try_get("processing_at")?,
        assigned_at: row.try_get("assigned_at")?,
        dispatched_at: row.try_get("dispatched_at")?,
        completed_at: row.try_get("completed_at")?,
        cancelled_at: row.try_get("cancelled_at")?,
        refunded_at: row.try_get("refunded_at")?,
    })
}

fn row_to_wallet(row: PgRow) -> Result<Wallet> {
    Ok(Wallet {
        id: WalletId::from_uuid(row.try_get("id")?),
        user_id: UserId::from_uuid(row.try_get("user_id")?),
        balance: money(&row, "balance")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn row_to_transaction(row: PgRow) -> Result<Transaction> {
    Ok(Transaction {
        id: TransactionId::from_uuid(row.try_get("id")?),
        wallet_id: WalletId::from_uuid(row.try_get("wallet_id")?),
        amount: money(&row, "amount")?,
        balance_after: money(&row, "balance_after")?,
        kind: parse_text(&row, "type", "transactions")?,
        reference: row.try_get("reference")?,
        description: row.try_get("description")?,
        sequence: row.try_get("sequence")?,
        created_at: row.try_get("created_at")?,
    })
}

fn row_to_settlement(row: PgRow) -> Result<Settlement> {
    Ok(Settlement {
        id: SettlementId::from_uuid(row.try_get("id")?),
        order_id: OrderId::from_uuid(row.try_get("order_id")?),
        vendor_id: UserId::from_uuid(row.try_get("vendor_id")?),
        total_amount: money(&row, "total_amount")?,
        vendor_amount: money(&row, "vendor_amount")?,
        platform_fee: money(&row, "platform_fee")?,
        status: parse_text(&row, "status", "settlements")?,
        settled_at: row.try_get("settled_at")?,
        created_at: row.try_get("created_at")?,
    })
}

fn row_to_earning(row: PgRow) -> Result<DriverEarning> {
    Ok(DriverEarning {
        id: EarningId::from_uuid(row.try_get("id")?),
        driver_id: UserId::from_uuid(row.try_get("driver_id")?),
        order_id: OrderId::from_uuid(row.try_get("order_id")?),
        gross_amount: money(&row, "gross_amount")?,
        commission_amount: money(&row, "commission_amount")?,
        net_amount: money(&row, "net_amount")?,
        status: parse_text(&row, "status", "driver_earnings")?,
        payout_id: row
            .try_get::<Option<Uuid>, _>("payout_id")?
            .map(PayoutId::from_uuid),
        created_at: row.try_get("created_at")?,
    })
}

fn row_to_payout(row: PgRow) -> Result<Payout> {
    Ok(Payout {
        id: PayoutId::from_uuid(row.try_get("id")?),
        user_id: UserId::from_uuid(row.try_get("user_id")?),
        amount: money(&row, "amount")?,
        status: parse_text(&row, "status", "driver_payouts")?,
        reference: row.try_get("reference")?,
        failure_reason: row.try_get("failure_reason")?,
        created_at: row.try_get("created_at")?,
        paid_at: row.try_get("paid_at")?,
        failed_at: row.try_get("failed_at")?,
    })
}

impl PostgresTx {
    async fn fetch_order(&mut self, order_id: OrderId, lock: bool) -> Result<Option<Order>> {
        let sql = format!(
            "SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1{}",
            if lock { " FOR UPDATE" } else { "" }
        );
        let row = sqlx::query(&sql)
            .bind(order_id.as_uuid())
            .fetch_optional(&mut *self.tx)
            .await?;
        row.map(row_to_order).transpose()
    }

    async fn fetch_wallet(&mut self, user_id: UserId, lock: bool) -> Result<Option<Wallet>> {
        let sql = format!(
            "SELECT id, user_id, balance, created_at, updated_at FROM wallets WHERE user_id = $1{}",
            if lock { " FOR UPDATE" } else { "" }
        );
        let row = sqlx::query(&sql)
            .bind(user_id.as_uuid())
            .fetch_optional(&mut *self.tx)
            .await?;
        row.map(row_to_wallet).transpose()
    }

    async fn fetch_payout(&mut self, reference: &str, lock: bool) -> Result<Option<Payout>> {
        let sql = format!(
            "SELECT {PAYOUT_COLUMNS} FROM driver_payouts WHERE reference = $1{}",
            if lock { " FOR UPDATE" } else { "" }
        );
        let row = sqlx::query(&sql)
            .bind(reference)
            .fetch_optional(&mut *self.tx)
            .await?;
        row.map(row_to_payout).transpose()
    }
}

#[async_trait]
impl StoreTx for PostgresTx {
    async fn insert_order(&mut self, order: &Order) -> Result<()> {
        sqlx::query(&format!(
            "INSERT INTO orders ({ORDER_COLUMNS}) VALUES \
             ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18, \
             $19, $20, $21, $22, $23)"
        ))
        .bind(order.id.as_uuid())
        .bind(order.vendor_id.as_uuid())
        .bind(order.customer_id.as_uuid())
        .bind(order.driver_id.map(|d| d.as_uuid()))
        .bind(order.status.as_str())
        .bind(order.gross_total.minor())
        .bind(order.delivery_fee.minor())
        .bind(order.coupon_discount.minor())
        .bind(order.net_total.minor())
        .bind(order.is_gift)
        .bind(&order.receiver_name)
        .bind(&order.receiver_phone)
        .bind(&order.otp_code)
        .bind(order.refund_amount.map(|m| m.minor()))
        .bind(&order.refund_reason)
        .bind(order.created_at)
        .bind(order.paid_at)
        .bind(order.processing_at)
        .bind(order.assigned_at)
        .bind(order.dispatched_at)
        .bind(order.completed_at)
        .bind(order.cancelled_at)
        .bind(order.refunded_at)
        .execute(&mut *self.tx)
        .await
        .map_err(map_write_error)?;
        Ok(())
    }

    async fn get_order(&mut self, order_id: OrderId) -> Result<Option<Order>> {
        self.fetch_order(order_id, false).await
    }

    async fn lock_order(&mut self, order_id: OrderId) -> Result<Option<Order>> {
        self.fetch_order(order_id, true).await
    }

    async fn update_order(&mut self, order: &Order) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE orders SET
                driver_id = $2, status = $3, refund_amount = $4, refund_reason = $5,
                paid_at = $6, processing_at = $7, assigned_at = $8, dispatched_at = $9,
                completed_at = $10, cancelled_at = $11, refunded_at = $12
            WHERE id = $1
            "#,
        )
        .bind(order.id.as_uuid())
        .bind(order.driver_id.map(|d| d.as_uuid()))
        .bind(order.status.as_str())
        .bind(order.refund_amount.map(|m| m.minor()))
        .bind(&order.refund_reason)
        .bind(order.paid_at)
        .bind(order.processing_at)
        .bind(order.assigned_at)
        .bind(order.dispatched_at)
        .bind(order.completed_at)
        .bind(order.cancelled_at)
        .bind(order.refunded_at)
        .execute(&mut *self.tx)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound {
                entity: "Order",
                id: order.id.to_string(),
            });
        }
        Ok(())
    }

    async fn upsert_driver(&mut self, driver: &Driver) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO drivers (user_id, is_verified, is_online)
            VALUES ($1, $2, $3)
            ON CONFLICT (user_id) DO UPDATE SET
                is_verified = EXCLUDED.is_verified,
                is_online = EXCLUDED.is_online
            "#,
        )
        .bind(driver.user_id.as_uuid())
        .bind(driver.is_verified)
        .bind(driver.is_online)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn get_driver(&mut self, user_id: UserId) -> Result<Option<Driver>> {
        let row = sqlx::query("SELECT user_id, is_verified, is_online FROM drivers WHERE user_id = $1")
            .bind(user_id.as_uuid())
            .fetch_optional(&mut *self.tx)
            .await?;

        match row {
            Some(row) => Ok(Some(Driver {
                user_id: UserId::from_uuid(row.try_get("user_id")?),
                is_verified: row.try_get("is_verified")?,
                is_online: row.try_get("is_online")?,
            })),
            None => Ok(None),
        }
    }

    async fn insert_wallet(&mut self, wallet: &Wallet) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO wallets (id, user_id, balance, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(wallet.id.as_uuid())
        .bind(wallet.user_id.as_uuid())
        .bind(wallet.balance.minor())
        .bind(wallet.created_at)
        .bind(wallet.updated_at)
        .execute(&mut *self.tx)
        .await
        .map_err(map_write_error)?;
        Ok(())
    }

    async fn ensure_wallet(&mut self, wallet: &Wallet) -> Result<Wallet> {
        sqlx::query(
            r#"
            INSERT INTO wallets (id, user_id, balance, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (user_id) DO NOTHING
            "#,
        )
        .bind(wallet.id.as_uuid())
        .bind(wallet.user_id.as_uuid())
        .bind(wallet.balance.minor())
        .bind(wallet.created_at)
        .bind(wallet.updated_at)
        .execute(&mut *self.tx)
        .await
        .map_err(map_write_error)?;

        self.fetch_wallet(wallet.user_id, true)
            .await?
            .ok_or_else(|| StoreError::NotFound {
                entity: "Wallet",
                id: wallet.user_id.to_string(),
            })
    }

    async fn get_wallet_by_user(&mut self, user_id: UserId) -> Result<Option<Wallet>> {
        self.fetch_wallet(user_id, false).await
    }

    async fn lock_wallet_by_user(&mut self, user_id: UserId) -> Result<Option<Wallet>> {
        self.fetch_wallet(user_id, true).await
    }

    async fn update_wallet_balance(&mut self, wallet_id: WalletId, balance: Money) -> Result<()> {
        let result = sqlx::query("UPDATE wallets SET balance = $2, updated_at = $3 WHERE id = $1")
            .bind(wallet_id.as_uuid())
            .bind(balance.minor())
            .bind(Utc::now())
            .execute(&mut *self.tx)
            .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound {
                entity: "Wallet",
                id: wallet_id.to_string(),
            });
        }
        Ok(())
    }

    async fn find_transaction(
        &mut self,
        wallet_id: WalletId,
        reference: &str,
    ) -> Result<Option<Transaction>> {
        let row = sqlx::query(&format!(
            "SELECT {TRANSACTION_COLUMNS} FROM transactions WHERE wallet_id = $1 AND reference = $2"
        ))
        .bind(wallet_id.as_uuid())
        .bind(reference)
        .fetch_optional(&mut *self.tx)
        .await?;
        row.map(row_to_transaction).transpose()
    }

    async fn insert_transaction(&mut self, transaction: &Transaction) -> Result<Transaction> {
        let sequence: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO transactions (id, wallet_id, amount, balance_after, type, reference, description, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING sequence
            "#,
        )
        .bind(transaction.id.as_uuid())
        .bind(transaction.wallet_id.as_uuid())
        .bind(transaction.amount.minor())
        .bind(transaction.balance_after.minor())
        .bind(transaction.kind.as_str())
        .bind(&transaction.reference)
        .bind(&transaction.description)
        .bind(transaction.created_at)
        .fetch_one(&mut *self.tx)
        .await
        .map_err(map_write_error)?;

        Ok(Transaction {
            sequence,
            ..transaction.clone()
        })
    }

    async fn list_transactions(&mut self, wallet_id: WalletId) -> Result<Vec<Transaction>> {
        let rows = sqlx::query(&format!(
            "SELECT {TRANSACTION_COLUMNS} FROM transactions WHERE wallet_id = $1 ORDER BY sequence ASC"
        ))
        .bind(wallet_id.as_uuid())
        .fetch_all(&mut *self.tx)
        .await?;

        rows.into_iter().map(row_to_transaction).collect()
    }

    async fn find_settlement(&mut self, order_id: OrderId) -> Result<Option<Settlement>> {
        let row = sqlx::query(
            r#"
            SELECT id, order_id, vendor_id, total_amount, vendor_amount, platform_fee, status, settled_at, created_at
            FROM settlements
            WHERE order_id = $1
            "#,
        )
        .bind(order_id.as_uuid())
        .fetch_optional(&mut *self.tx)
        .await?;
        row.map(row_to_settlement).transpose()
    }

    async fn insert_settlement(&mut self, settlement: &Settlement) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO settlements (id, order_id, vendor_id, total_amount, vendor_amount, platform_fee, status, settled_at, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(settlement.id.as_uuid())
        .bind(settlement.order_id.as_uuid())
        .bind(settlement.vendor_id.as_uuid())
        .bind(settlement.total_amount.minor())
        .bind(settlement.vendor_amount.minor())
        .bind(settlement.platform_fee.minor())
        .bind(settlement.status.as_str())
        .bind(settlement.settled_at)
        .bind(settlement.created_at)
        .execute(&mut *self.tx)
        .await
        .map_err(map_write_error)?;
        Ok(())
    }

    async fn find_earning(&mut self, order_id: OrderId) -> Result<Option<DriverEarning>> {
        let row = sqlx::query(&format!(
            "SELECT {EARNING_COLUMNS} FROM driver_earnings WHERE order_id = $1"
        ))
        .bind(order_id.as_uuid())
        .fetch_optional(&mut *self.tx)
        .await?;
        row.map(row_to_earning).transpose()
    }

    async fn insert_earning(&mut self, earning: &DriverEarning) -> Result<()> {
        sqlx::query(&format!(
            "INSERT INTO driver_earnings ({EARNING_COLUMNS}) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)"
        ))
        .bind(earning.id.as_uuid())
        .bind(earning.driver_id.as_uuid())
        .bind(earning.order_id.as_uuid())
        .bind(earning.gross_amount.minor())
        .bind(earning.commission_amount.minor())
        .bind(earning.net_amount.minor())
        .bind(earning.status.as_str())
        .bind(earning.payout_id.map(|p| p.as_uuid()))
        .bind(earning.created_at)
        .execute(&mut *self.tx)
        .await
        .map_err(map_write_error)?;
        Ok(())
    }

    async fn list_unswept_earnings(&mut self, driver_id: UserId) -> Result<Vec<DriverEarning>> {
        let rows = sqlx::query(&format!(
            "SELECT {EARNING_COLUMNS} FROM driver_earnings \
             WHERE driver_id = $1 AND payout_id IS NULL ORDER BY created_at ASC, id ASC FOR UPDATE"
        ))
        .bind(driver_id.as_uuid())
        .fetch_all(&mut *self.tx)
        .await?;

        rows.into_iter().map(row_to_earning).collect()
    }

    async fn list_earnings_for_payout(
        &mut self,
        payout_id: PayoutId,
    ) -> Result<Vec<DriverEarning>> {
        let rows = sqlx::query(&format!(
            "SELECT {EARNING_COLUMNS} FROM driver_earnings \
             WHERE payout_id = $1 ORDER BY created_at ASC, id ASC FOR UPDATE"
        ))
        .bind(payout_id.as_uuid())
        .fetch_all(&mut *self.tx)
        .await?;

        rows.into_iter().map(row_to_earning).collect()
    }

    async fn update_earning(&mut self, earning: &DriverEarning) -> Result<()> {
        sqlx::query("UPDATE driver_earnings SET status = $2, payout_id = $3 WHERE id = $1")
            .bind(earning.id.as_uuid())
            .bind(earning.status.as_str())
            .bind(earning.payout_id.map(|p| p.as_uuid()))
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }

    async fn insert_payout(&mut self, payout: &Payout) -> Result<()> {
        sqlx::query(&format!(
            "INSERT INTO driver_payouts ({PAYOUT_COLUMNS}) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)"
        ))
        .bind(payout.id.as_uuid())
        .bind(payout.user_id.as_uuid())
        .bind(payout.amount.minor())
        .bind(payout.status.as_str())
        .bind(&payout.reference)
        .bind(&payout.failure_reason)
        .bind(payout.created_at)
        .bind(payout.paid_at)
        .bind(payout.failed_at)
        .execute(&mut *self.tx)
        .await
        .map_err(map_write_error)?;
        Ok(())
    }

    async fn get_payout(&mut self, reference: &str) -> Result<Option<Payout>> {
        self.fetch_payout(reference, false).await
    }

    async fn lock_payout(&mut self, reference: &str) -> Result<Option<Payout>> {
        self.fetch_payout(reference, true).await
    }

    async fn update_payout(&mut self, payout: &Payout) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE driver_payouts SET status = $2, failure_reason = $3, paid_at = $4, failed_at = $5
            WHERE reference = $1
            "#,
        )
        .bind(&payout.reference)
        .bind(payout.status.as_str())
        .bind(&payout.failure_reason)
        .bind(payout.paid_at)
        .bind(payout.failed_at)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn commit(self) -> Result<()> {
        self.tx.commit().await?;
        Ok(())
    }

    async fn rollback(self) -> Result<()> {
        self.tx.rollback().await?;
        Ok(())
    }
}
