//! Row types for the persisted tables.
//!
//! All monetary columns are integer minor-unit amounts. Financial rows
//! (transactions, settlements, earnings, payouts) are append-only apart
//! from their status columns.

use chrono::{DateTime, Utc};
use common::{EarningId, Money, OrderId, PayoutId, SettlementId, TransactionId, UserId, WalletId};
use serde::{Deserialize, Serialize};

macro_rules! text_enum {
    ($(#[$meta:meta])* $name:ident { $($(#[$vmeta:meta])* $variant:ident => $text:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(rename_all = "SCREAMING_SNAKE_CASE")]
        pub enum $name {
            $($(#[$vmeta])* $variant),+
        }

        impl $name {
            /// Returns the name stored in the database.
            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $text),+
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl std::str::FromStr for $name {
            type Err = String;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s.to_ascii_uppercase().as_str() {
                    $($text => Ok($name::$variant),)+
                    other => Err(format!("unknown {}: {other}", stringify!($name))),
                }
            }
        }
    };
}

text_enum!(
    /// The state of an order in its lifecycle.
    ///
    /// ```text
    /// PENDING ──► PAID ──► PROCESSING ──► DISPATCHED ──► COMPLETED
    ///    │          │  └──────────────────────▲  │
    ///    └──────────┴─────────┴───────────────┴──┴──► CANCELLED | REFUNDED
    /// ```
    OrderStatus {
        Pending => "PENDING",
        Paid => "PAID",
        Processing => "PROCESSING",
        Dispatched => "DISPATCHED",
        Completed => "COMPLETED",
        Cancelled => "CANCELLED",
        Refunded => "REFUNDED",
    }
);

impl OrderStatus {
    /// Returns true if no further transitions are possible.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            OrderStatus::Completed | OrderStatus::Cancelled | OrderStatus::Refunded
        )
    }
}

text_enum!(
    /// Kind of ledger entry.
    TransactionType {
        Credit => "CREDIT",
        Debit => "DEBIT",
        Fee => "FEE",
        Settlement => "SETTLEMENT",
        Payout => "PAYOUT",
        Earning => "EARNING",
        Reversal => "REVERSAL",
    }
);

text_enum!(
    SettlementStatus {
        Pending => "PENDING",
        Settled => "SETTLED",
        Failed => "FAILED",
    }
);

text_enum!(
    /// Driver earnings are credited on completion and later linked to a payout.
    EarningStatus {
        Pending => "PENDING",
        Credited => "CREDITED",
        PaidOut => "PAID_OUT",
    }
);

text_enum!(
    PayoutStatus {
        Pending => "PENDING",
        Paid => "PAID",
        Failed => "FAILED",
    }
);

/// An order as seen by the fulfillment core.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub vendor_id: UserId,
    pub customer_id: UserId,
    pub driver_id: Option<UserId>,
    pub status: OrderStatus,

    /// Items subtotal before coupon.
    pub gross_total: Money,
    pub delivery_fee: Money,
    pub coupon_discount: Money,
    /// Items subtotal after coupon, excluding the delivery fee.
    pub net_total: Money,

    pub is_gift: bool,
    pub receiver_name: Option<String>,
    pub receiver_phone: Option<String>,
    pub otp_code: Option<String>,

    pub refund_amount: Option<Money>,
    pub refund_reason: Option<String>,

    pub created_at: DateTime<Utc>,
    pub paid_at: Option<DateTime<Utc>>,
    pub processing_at: Option<DateTime<Utc>>,
    pub assigned_at: Option<DateTime<Utc>>,
    pub dispatched_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub refunded_at: Option<DateTime<Utc>>,
}

impl Order {
    /// Creates a pending order. `net_total` is derived as `gross_total - coupon_discount`,
    /// saturating so that out-of-range input is left for validation to reject.
    pub fn new(
        vendor_id: UserId,
        customer_id: UserId,
        gross_total: Money,
        delivery_fee: Money,
        coupon_discount: Money,
    ) -> Self {
        Self {
            id: OrderId::new(),
            vendor_id,
            customer_id,
            driver_id: None,
            status: OrderStatus::Pending,
            gross_total,
            delivery_fee,
            coupon_discount,
            net_total: gross_total.saturating_sub(coupon_discount),
            is_gift: false,
            receiver_name: None,
            receiver_phone: None,
            otp_code: None,
            refund_amount: None,
            refund_reason: None,
            created_at: Utc::now(),
            paid_at: None,
            processing_at: None,
            assigned_at: None,
            dispatched_at: None,
            completed_at: None,
            cancelled_at: None,
            refunded_at: None,
        }
    }

    /// Marks the order as already paid at checkout.
    pub fn paid(mut self) -> Self {
        self.status = OrderStatus::Paid;
        self.paid_at = Some(self.created_at);
        self
    }

    /// Sets the delivery confirmation code.
    pub fn with_otp(mut self, otp: impl Into<String>) -> Self {
        self.otp_code = Some(otp.into());
        self
    }

    /// Marks the order as a gift for another receiver.
    pub fn with_gift(mut self, receiver_name: impl Into<String>, receiver_phone: impl Into<String>) -> Self {
        self.is_gift = true;
        self.receiver_name = Some(receiver_name.into());
        self.receiver_phone = Some(receiver_phone.into());
        self
    }

    /// Returns the timestamp recorded for entering `status`, if any.
    pub fn status_timestamp(&self, status: OrderStatus) -> Option<DateTime<Utc>> {
        match status {
            OrderStatus::Pending => Some(self.created_at),
            OrderStatus::Paid => self.paid_at,
            OrderStatus::Processing => self.processing_at,
            OrderStatus::Dispatched => self.dispatched_at,
            OrderStatus::Completed => self.completed_at,
            OrderStatus::Cancelled => self.cancelled_at,
            OrderStatus::Refunded => self.refunded_at,
        }
    }

    /// Records the timestamp for entering `status`. The first write wins.
    pub fn stamp(&mut self, status: OrderStatus, at: DateTime<Utc>) -> DateTime<Utc> {
        let slot = match status {
            OrderStatus::Pending => return self.created_at,
            OrderStatus::Paid => &mut self.paid_at,
            OrderStatus::Processing => &mut self.processing_at,
            OrderStatus::Dispatched => &mut self.dispatched_at,
            OrderStatus::Completed => &mut self.completed_at,
            OrderStatus::Cancelled => &mut self.cancelled_at,
            OrderStatus::Refunded => &mut self.refunded_at,
        };
        *slot.get_or_insert(at)
    }
}

/// Delivery driver profile consulted for assignment eligibility.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Driver {
    pub user_id: UserId,
    pub is_verified: bool,
    pub is_online: bool,
}

/// A wallet owned by exactly one user. `balance` is a cached projection
/// of the wallet's transaction rows.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Wallet {
    pub id: WalletId,
    pub user_id: UserId,
    pub balance: Money,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Wallet {
    /// Creates an empty wallet for a user.
    pub fn new(user_id: UserId) -> Self {
        let now = Utc::now();
        Self {
            id: WalletId::new(),
            user_id,
            balance: Money::zero(),
            created_at: now,
            updated_at: now,
        }
    }
}

/// Immutable ledger entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: TransactionId,
    pub wallet_id: WalletId,
    /// Signed amount: positive for credits, negative for debits.
    pub amount: Money,
    pub balance_after: Money,
    #[serde(rename = "type")]
    pub kind: TransactionType,
    /// Unique per wallet.
    pub reference: String,
    pub description: Option<String>,
    /// Creation order within the store, assigned on insert.
    pub sequence: i64,
    pub created_at: DateTime<Utc>,
}

/// Vendor-facing split of one completed order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settlement {
    pub id: SettlementId,
    pub order_id: OrderId,
    pub vendor_id: UserId,
    pub total_amount: Money,
    pub vendor_amount: Money,
    pub platform_fee: Money,
    pub status: SettlementStatus,
    pub settled_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// Driver-facing split of one completed order's delivery fee.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DriverEarning {
    pub id: EarningId,
    pub driver_id: UserId,
    pub order_id: OrderId,
    pub gross_amount: Money,
    pub commission_amount: Money,
    pub net_amount: Money,
    pub status: EarningStatus,
    pub payout_id: Option<PayoutId>,
    pub created_at: DateTime<Utc>,
}

/// Withdrawal request against a wallet balance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payout {
    pub id: PayoutId,
    pub user_id: UserId,
    pub amount: Money,
    pub status: PayoutStatus,
    /// Idempotency key, unique across payouts.
    pub reference: String,
    pub failure_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub paid_at: Option<DateTime<Utc>>,
    pub failed_at: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn order() -> Order {
        Order::new(
            UserId::new(),
            UserId::new(),
            Money::from_minor(10_000),
            Money::from_minor(1000),
            Money::from_minor(500),
        )
    }

    #[test]
    fn net_total_excludes_coupon() {
        let order = order();
        assert_eq!(order.net_total.minor(), 9500);
        assert_eq!(order.status, OrderStatus::Pending);
    }

    #[test]
    fn paid_sets_timestamp() {
        let order = order().paid();
        assert_eq!(order.status, OrderStatus::Paid);
        assert_eq!(order.paid_at, Some(order.created_at));
    }

    #[test]
    fn stamp_first_write_wins() {
        let mut order = order();
        let first = Utc::now();
        let later = first + chrono::Duration::seconds(30);

        assert_eq!(order.stamp(OrderStatus::Dispatched, first), first);
        assert_eq!(order.stamp(OrderStatus::Dispatched, later), first);
        assert_eq!(order.dispatched_at, Some(first));
    }

    #[test]
    fn terminal_states() {
        assert!(!OrderStatus::Pending.is_terminal());
        assert!(!OrderStatus::Paid.is_terminal());
        assert!(!OrderStatus::Processing.is_terminal());
        assert!(!OrderStatus::Dispatched.is_terminal());
        assert!(OrderStatus::Completed.is_terminal());
        assert!(OrderStatus::Cancelled.is_terminal());
        assert!(OrderStatus::Refunded.is_terminal());
    }

    #[test]
    fn status_text_roundtrip() {
        assert_eq!(OrderStatus::Dispatched.to_string(), "DISPATCHED");
        assert_eq!("dispatched".parse::<OrderStatus>(), Ok(OrderStatus::Dispatched));
        assert!("shipped".parse::<OrderStatus>().is_err());
        assert_eq!("PAID_OUT".parse::<EarningStatus>(), Ok(EarningStatus::PaidOut));
    }

    #[test]
    fn transaction_type_serializes_as_type() {
        let tx = Transaction {
            id: TransactionId::new(),
            wallet_id: WalletId::new(),
            amount: Money::from_minor(100),
            balance_after: Money::from_minor(100),
            kind: TransactionType::Settlement,
            reference: "settlement:1".to_string(),
            description: None,
            sequence: 1,
            created_at: Utc::now(),
        };
        let json = serde_json::to_value(&tx).unwrap();
        assert_eq!(json["type"], "SETTLEMENT");
        assert_eq!(json["amount"], 100);
    }
}
