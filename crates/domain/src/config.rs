//! Fee configuration for settlements.

use common::{Rate, UserId};

/// Rates applied when an order completes.
#[derive(Debug, Clone)]
pub struct FeeSchedule {
    /// Share of the order's net total kept by the platform.
    pub platform_fee_rate: Rate,
    /// Share of the delivery fee kept by the platform.
    pub driver_commission_rate: Rate,
    /// Owner of the platform wallet. When unset, platform revenue is
    /// recorded on settlement rows only.
    pub platform_account: Option<UserId>,
}

impl Default for FeeSchedule {
    fn default() -> Self {
        Self {
            platform_fee_rate: Rate::from_bps(1000),
            driver_commission_rate: Rate::from_bps(1000),
            platform_account: None,
        }
    }
}
