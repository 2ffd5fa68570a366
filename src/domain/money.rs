use std::fmt;
use std::iter::Sum;
use std::ops::{Add, AddAssign, Neg, Sub, SubAssign};
use std::str::FromStr;

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

/// Monetary amount backed by an exact decimal.
///
/// Every constructor normalises to two decimal places (half away from zero), so
/// arithmetic between two `Money` values never drifts. Deserialization goes
/// through the same rounding.
///
/// The operators panic on overflow like `Decimal`'s do; balance updates use the
/// `checked_*` forms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(from = "Decimal", into = "Decimal")]
pub struct Money(Decimal);

impl Money {
    pub const ZERO: Money = Money(Decimal::ZERO);

    /// Wrap a decimal, rounding it to cents.
    pub fn new(amount: Decimal) -> Self {
        Self(amount.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero))
    }

    /// Example: 5000 -> 50.00, -1234 -> -12.34
    pub fn from_cents(cents: i64) -> Self {
        Self(Decimal::new(cents, 2))
    }

    pub fn amount(&self) -> Decimal {
        self.0
    }

    pub fn is_positive(&self) -> bool {
        self.0 > Decimal::ZERO
    }

    pub fn is_negative(&self) -> bool {
        self.0 < Decimal::ZERO
    }

    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    pub fn abs(&self) -> Self {
        Self(self.0.abs())
    }

    pub fn checked_add(self, rhs: Money) -> Option<Money> {
        self.0.checked_add(rhs.0).map(Money)
    }

    pub fn checked_sub(self, rhs: Money) -> Option<Money> {
        self.0.checked_sub(rhs.0).map(Money)
    }

    pub fn saturating_add(self, rhs: Money) -> Money {
        Money(self.0.saturating_add(rhs.0))
    }

    /// Sum that yields `None` instead of overflowing.
    pub fn checked_sum(amounts: impl IntoIterator<Item = Money>) -> Option<Money> {
        amounts
            .into_iter()
            .try_fold(Money::ZERO, |total, amount| total.checked_add(amount))
    }

    /// Multiply by a rate (e.g. an interest rate) and round back to cents.
    /// `None` when the product does not fit.
    pub fn apply_rate(&self, rate: Decimal) -> Option<Self> {
        self.0.checked_mul(rate).map(Self::new)
    }

    /// Parse a decimal string.
    /// Example: "50.00" -> 50.00, "12.5" -> 12.50, "100" -> 100.00, "-3.005" -> -3.01
    pub fn parse(input: &str) -> Result<Self, ParseMoneyError> {
        let input = input.trim();
        let digits = input.strip_prefix('-').unwrap_or(input);

        let mut parts = digits.splitn(2, '.');
        let units = parts.next().unwrap_or_default();
        let fraction = parts.next().unwrap_or_default();

        let well_formed = !(units.is_empty() && fraction.is_empty())
            && units.chars().all(|c| c.is_ascii_digit())
            && fraction.chars().all(|c| c.is_ascii_digit());
        if !well_formed {
            return Err(ParseMoneyError::InvalidFormat);
        }

        let normalised = format!(
            "{}{}.{}",
            if input.starts_with('-') { "-" } else { "" },
            if units.is_empty() { "0" } else { units },
            if fraction.is_empty() { "0" } else { fraction }
        );
        Decimal::from_str(&normalised)
            .map(Self::new)
            .map_err(|_| ParseMoneyError::InvalidFormat)
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(&format!("{:.2}", self.0))
    }
}

impl FromStr for Money {
    type Err = ParseMoneyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl From<Decimal> for Money {
    fn from(amount: Decimal) -> Self {
        Self::new(amount)
    }
}

impl From<Money> for Decimal {
    fn from(money: Money) -> Self {
        money.0
    }
}

impl Add for Money {
    type Output = Money;

    fn add(self, rhs: Money) -> Money {
        Money(self.0 + rhs.0)
    }
}

impl Sub for Money {
    type Output = Money;

    fn sub(self, rhs: Money) -> Money {
        Money(self.0 - rhs.0)
    }
}

impl Neg for Money {
    type Output = Money;

    fn neg(self) -> Money {
        Money(-self.0)
    }
}

impl AddAssign for Money {
    fn add_assign(&mut self, rhs: Money) {
        self.0 += rhs.0;
    }
}

impl SubAssign for Money {
    fn sub_assign(&mut self, rhs: Money) {
        self.0 -= rhs.0;
    }
}

impl Sum for Money {
    fn sum<I: Iterator<Item = Money>>(iter: I) -> Self {
        iter.fold(Money::ZERO, Add::add)
    }
}

impl<'a> Sum<&'a Money> for Money {
    fn sum<I: Iterator<Item = &'a Money>>(iter: I) -> Self {
        iter.copied().sum()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseMoneyError {
    InvalidFormat,
}

impl fmt::Display for ParseMoneyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParseMoneyError::InvalidFormat => write!(f, "invalid money format"),
        }
    }
}

impl std::error::Error for ParseMoneyError {}

#[cfg(test)]
mod tests {
    use rust_decimal_macros::dec;

    use super::*;

    #[test]
    fn test_format_money() {
        assert_eq!(Money::from_cents(5000).to_string(), "50.00");
        assert_eq!(Money::from_cents(1234).to_string(), "12.34");
        assert_eq!(Money::from_cents(1).to_string(), "0.01");
        assert_eq!(Money::ZERO.to_string(), "0.00");
        assert_eq!(Money::from_cents(-5000).to_string(), "-50.00");
        assert_eq!(Money::new(dec!(5)).to_string(), "5.00");
    }

    #[test]
    fn test_parse_money() {
        assert_eq!(Money::parse("50.00"), Ok(Money::from_cents(5000)));
        assert_eq!(Money::parse("50"), Ok(Money::from_cents(5000)));
        assert_eq!(Money::parse("12.5"), Ok(Money::from_cents(1250)));
        assert_eq!(Money::parse(".50"), Ok(Money::from_cents(50)));
        assert_eq!(Money::parse("-50.00"), Ok(Money::from_cents(-5000)));
        assert_eq!(Money::parse("100.995"), Ok(Money::from_cents(10100)));
    }

    #[test]
    fn test_parse_money_invalid() {
        assert!(Money::parse("abc").is_err());
        assert!(Money::parse("12.34.56").is_err());
        assert!(Money::parse("1e5").is_err());
        assert!(Money::parse("").is_err());
        assert!(Money::parse("-").is_err());
    }

    #[test]
    fn test_arithmetic_is_exact() {
        let tenth = Money::parse("0.10").unwrap();
        let total: Money = std::iter::repeat(tenth).take(10).sum();
        assert_eq!(total, Money::from_cents(100));
        assert_eq!(Money::from_cents(5000) - Money::from_cents(14000), Money::from_cents(-9000));
    }

    #[test]
    fn test_apply_rate_rounds_to_cents() {
        assert_eq!(Money::from_cents(20000).apply_rate(dec!(0.025)), Some(Money::from_cents(500)));
        // 123.45 * 0.025 = 3.08625
        assert_eq!(Money::from_cents(12345).apply_rate(dec!(0.025)), Some(Money::from_cents(309)));
        assert_eq!(Money::new(Decimal::MAX).apply_rate(dec!(2)), None);
    }

    #[test]
    fn test_checked_arithmetic_at_the_limit() {
        let max = Money::new(Decimal::MAX);
        let near_max = Money::parse("79228162514264337593543950330").unwrap();
        let one = Money::from_cents(100);

        assert_eq!(near_max.checked_add(Money::from_cents(20000)), None);
        assert_eq!(max.checked_add(one), None);
        assert_eq!((-max).checked_sub(one), None);
        assert_eq!(one.checked_sub(one), Some(Money::ZERO));
        assert_eq!(max.saturating_add(max), max);
        assert_eq!(Money::checked_sum([max, one]), None);
        assert_eq!(Money::checked_sum([one, one]), Some(Money::from_cents(200)));
    }

    #[test]
    fn test_deserialize_rounds_to_cents() {
        let money: Money = serde_json::from_str(r#""5.001""#).unwrap();
        assert_eq!(money.amount().scale(), 2);
        assert_eq!(money.to_string(), "5.00");

        let money: Money = serde_json::from_str(r#""5.005""#).unwrap();
        assert_eq!(money, Money::from_cents(501));

        assert_eq!(serde_json::to_string(&Money::from_cents(1250)).unwrap(), r#""12.50""#);
    }
}
