//! Fixed-point money in minor currency units.

use serde::{Deserialize, Serialize};

/// Money amount in minor currency units to avoid floating point issues.
///
/// The amount is signed so that ledger entries can carry debits as
/// negative values; domain inputs such as order totals are never negative.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Money(i64);

impl Money {
    /// Creates a new amount from minor units (e.g. 1000 = 10.00).
    pub const fn from_minor(minor: i64) -> Self {
        Self(minor)
    }

    /// Returns zero money.
    pub const fn zero() -> Self {
        Self(0)
    }

    /// Returns the amount in minor units.
    pub const fn minor(&self) -> i64 {
        self.0
    }

    /// Returns the whole-unit part.
    pub fn major(&self) -> i64 {
        self.0 / 100
    }

    /// Returns the minor-unit remainder.
    pub fn minor_part(&self) -> i64 {
        self.0.abs() % 100
    }

    /// Returns true if the amount is positive.
    pub fn is_positive(&self) -> bool {
        self.0 > 0
    }

    /// Returns true if the amount is zero.
    pub fn is_zero(&self) -> bool {
        self.0 == 0
    }

    /// Returns true if the amount is negative.
    pub fn is_negative(&self) -> bool {
        self.0 < 0
    }

    /// Returns the negated amount.
    pub fn negate(&self) -> Money {
        Money(-self.0)
    }

    /// Adds another amount, returning None on overflow.
    pub fn checked_add(&self, other: Money) -> Option<Money> {
        self.0.checked_add(other.0).map(Money)
    }

    /// Subtracts another amount, returning None on overflow.
    pub fn checked_sub(&self, other: Money) -> Option<Money> {
        self.0.checked_sub(other.0).map(Money)
    }

    /// Subtracts another amount, clamping at the numeric bounds.
    pub fn saturating_sub(&self, other: Money) -> Money {
        Money(self.0.saturating_sub(other.0))
    }
}

impl std::fmt::Display for Money {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.0 < 0 {
            write!(f, "-{}.{:02}", self.major().abs(), self.minor_part())
        } else {
            write!(f, "{}.{:02}", self.major(), self.minor_part())
        }
    }
}

impl std::ops::Add for Money {
    type Output = Money;

    fn add(self, rhs: Self) -> Self::Output {
        Money(self.0 + rhs.0)
    }
}

impl std::ops::Sub for Money {
    type Output = Money;

    fn sub(self, rhs: Self) -> Self::Output {
        Money(self.0 - rhs.0)
    }
}

impl std::ops::AddAssign for Money {
    fn add_assign(&mut self, rhs: Self) {
        self.0 += rhs.0;
    }
}

impl std::ops::SubAssign for Money {
    fn sub_assign(&mut self, rhs: Self) {
        self.0 -= rhs.0;
    }
}

impl std::iter::Sum for Money {
    fn sum<I: Iterator<Item = Money>>(iter: I) -> Self {
        iter.fold(Money::zero(), |acc, m| acc + m)
    }
}

/// A proportional rate in basis points (1 bp = 0.01%).
///
/// `Rate::from_bps(1000)` is 10%.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(into = "u32", try_from = "u32")]
pub struct Rate(u32);

impl TryFrom<u32> for Rate {
    type Error = String;

    fn try_from(bps: u32) -> Result<Self, Self::Error> {
        Rate::try_from_bps(bps).ok_or_else(|| format!("rate of {bps} bps exceeds 100%"))
    }
}

impl From<Rate> for u32 {
    fn from(rate: Rate) -> Self {
        rate.0
    }
}

impl Rate {
    const BPS_SCALE: i128 = 10_000;

    /// The largest rate, 100%.
    pub const MAX_BPS: u32 = 10_000;

    /// Creates a rate from basis points, capped at 100%.
    pub const fn from_bps(bps: u32) -> Self {
        if bps > Self::MAX_BPS {
            Self(Self::MAX_BPS)
        } else {
            Self(bps)
        }
    }

    /// Creates a rate from basis points, rejecting anything above 100%.
    pub const fn try_from_bps(bps: u32) -> Option<Self> {
        if bps > Self::MAX_BPS {
            None
        } else {
            Some(Self(bps))
        }
    }

    /// Returns the rate in basis points.
    pub const fn bps(&self) -> u32 {
        self.0
    }

    /// Applies the rate to an amount, rounding half away from zero.
    pub fn apply(&self, amount: Money) -> Money {
        let product = amount.minor() as i128 * self.0 as i128;
        let half = Self::BPS_SCALE / 2;
        let rounded = if product >= 0 {
            (product + half) / Self::BPS_SCALE
        } else {
            (product - half) / Self::BPS_SCALE
        };
        Money::from_minor(rounded as i64)
    }
}

impl std::fmt::Display for Rate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{:02}%", self.0 / 100, self.0 % 100)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn money_display() {
        assert_eq!(Money::from_minor(1234).to_string(), "12.34");
        assert_eq!(Money::from_minor(5).to_string(), "0.05");
        assert_eq!(Money::from_minor(-1234).to_string(), "-12.34");
    }

    #[test]
    fn money_arithmetic() {
        let a = Money::from_minor(1000);
        let b = Money::from_minor(300);
        assert_eq!((a + b).minor(), 1300);
        assert_eq!((a - b).minor(), 700);
        assert_eq!(a.negate().minor(), -1000);
        assert_eq!(Money::from_minor(i64::MAX).checked_add(a), None);
    }

    #[test]
    fn money_sum() {
        let total: Money = [100, 250, -50].into_iter().map(Money::from_minor).sum();
        assert_eq!(total.minor(), 300);
    }

    #[test]
    fn rate_applies_exactly() {
        let ten_percent = Rate::from_bps(1000);
        assert_eq!(ten_percent.apply(Money::from_minor(10_000)).minor(), 1000);
        assert_eq!(ten_percent.apply(Money::from_minor(1000)).minor(), 100);
    }

    #[test]
    fn rate_rounds_half_away_from_zero() {
        let rate = Rate::from_bps(1250);
        // 12.5% of 1004 = 125.5
        assert_eq!(rate.apply(Money::from_minor(1004)).minor(), 126);
        // 12.5% of 1003 = 125.375
        assert_eq!(rate.apply(Money::from_minor(1003)).minor(), 125);
        assert_eq!(rate.apply(Money::from_minor(-1004)).minor(), -126);
    }

    #[test]
    fn rate_never_exceeds_the_amount() {
        assert_eq!(Rate::from_bps(20_000).bps(), Rate::MAX_BPS);
        assert_eq!(Rate::try_from_bps(10_001), None);
        assert_eq!(Rate::try_from_bps(10_000), Some(Rate::from_bps(10_000)));

        let all = Rate::from_bps(u32::MAX);
        assert_eq!(all.apply(Money::from_minor(i64::MAX)).minor(), i64::MAX);
    }

    #[test]
    fn rate_deserialization_rejects_over_100_percent() {
        assert_eq!(serde_json::from_str::<Rate>("1500").unwrap().bps(), 1500);
        assert!(serde_json::from_str::<Rate>("10001").is_err());
    }

    #[test]
    fn saturating_sub_does_not_wrap() {
        let min = Money::from_minor(i64::MIN);
        assert_eq!(min.saturating_sub(Money::from_minor(1)), min);
        assert_eq!(Money::from_minor(5).saturating_sub(Money::from_minor(7)).minor(), -2);
    }

    #[test]
    fn rate_display() {
        assert_eq!(Rate::from_bps(1000).to_string(), "10.00%");
        assert_eq!(Rate::from_bps(275).to_string(), "2.75%");
    }
}
