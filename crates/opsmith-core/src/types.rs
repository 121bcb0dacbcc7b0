use std::fmt;
use std::iter::Sum;
use std::ops::{Add, AddAssign, Neg, Sub};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// =============================================================================
// Enums
// =============================================================================

/// Direction of a money movement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlowType {
    /// Money coming into the business.
    Income,
    /// Money leaving the business.
    Expense,
}

impl FlowType {
    /// Applies the flow direction to an amount: income is positive,
    /// expense is negative.
    pub fn signed(&self, amount: Money) -> Money {
        match self {
            FlowType::Income => amount,
            FlowType::Expense => -amount,
        }
    }
}

impl fmt::Display for FlowType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FlowType::Income => write!(f, "income"),
            FlowType::Expense => write!(f, "expense"),
        }
    }
}

impl std::str::FromStr for FlowType {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "income" => Ok(FlowType::Income),
            "expense" => Ok(FlowType::Expense),
            _ => Err(format!("Unknown flow type: {}", s)),
        }
    }
}

// =============================================================================
// Newtype Wrappers - Identity
// =============================================================================

/// Unique identifier for an organization (tenant).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OrgId(pub Uuid);

impl OrgId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for OrgId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for OrgId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier for a user acting within an organization.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UserId(pub Uuid);

impl UserId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for UserId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// =============================================================================
// Newtype Wrappers - Temporal
// =============================================================================

/// Unix timestamp in seconds since epoch.
///
/// Compared by value. Two Timestamps with the same inner value are equal.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Timestamp(pub i64);

impl Timestamp {
    pub fn now() -> Self {
        Self(Utc::now().timestamp())
    }

    pub fn from_datetime(dt: DateTime<Utc>) -> Self {
        Self(dt.timestamp())
    }

    pub fn to_datetime(&self) -> DateTime<Utc> {
        DateTime::from_timestamp(self.0, 0).unwrap_or_default()
    }

    pub fn plus_seconds(&self, secs: i64) -> Self {
        Self(self.0 + secs)
    }
}

// =============================================================================
// Newtype Wrappers - Money
// =============================================================================

/// An amount of money in integer cents.
///
/// All monetary arithmetic in the system is integer cent arithmetic; floats
/// appear only at the parse/display boundary. Serializes transparently as
/// the cent count.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Money(pub i64);

impl Money {
    pub const ZERO: Money = Money(0);

    pub fn from_cents(cents: i64) -> Self {
        Self(cents)
    }

    /// Converts a decimal dollar amount to cents, rounding half away from
    /// zero (`10.505` becomes 1051 cents).
    pub fn from_dollars(dollars: f64) -> Self {
        Self((dollars * 100.0).round() as i64)
    }

    pub fn cents(&self) -> i64 {
        self.0
    }

    pub fn to_dollars(&self) -> f64 {
        self.0 as f64 / 100.0
    }

    pub fn abs(&self) -> Self {
        Self(self.0.abs())
    }

    pub fn is_negative(&self) -> bool {
        self.0 < 0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == 0
    }

    pub fn min(self, other: Money) -> Money {
        Money(self.0.min(other.0))
    }

    pub fn max(self, other: Money) -> Money {
        Money(self.0.max(other.0))
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.abs();
        write!(f, "{}${}.{:02}", sign, abs / 100, abs % 100)
    }
}

impl std::str::FromStr for Money {
    type Err = String;

    /// Parses decimal amounts like `"10.50"`, `"$10.50"`, `"-3"`,
    /// `"1,299.00"`. At most two fractional digits.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let cleaned: String = s
            .trim()
            .chars()
            .filter(|c| *c != ',' && *c != '$')
            .collect();
        let (negative, digits) = match cleaned.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, cleaned.as_str()),
        };
        if digits.is_empty() || digits.contains('-') {
            return Err(format!("Invalid amount: {}", s));
        }
        let (whole, frac) = match digits.split_once('.') {
            Some((w, f)) => (w, f),
            None => (digits, ""),
        };
        if frac.len() > 2 || (whole.is_empty() && frac.is_empty()) {
            return Err(format!("Invalid amount: {}", s));
        }
        let whole: i64 = if whole.is_empty() {
            0
        } else {
            whole
                .parse()
                .map_err(|_| format!("Invalid amount: {}", s))?
        };
        let frac: i64 = if frac.is_empty() {
            0
        } else {
            format!("{:0<2}", frac)
                .parse()
                .map_err(|_| format!("Invalid amount: {}", s))?
        };
        let cents = whole * 100 + frac;
        Ok(Money(if negative { -cents } else { cents }))
    }
}

impl Add for Money {
    type Output = Money;
    fn add(self, rhs: Money) -> Money {
        Money(self.0 + rhs.0)
    }
}

impl AddAssign for Money {
    fn add_assign(&mut self, rhs: Money) {
        self.0 += rhs.0;
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

impl Sum for Money {
    fn sum<I: Iterator<Item = Money>>(iter: I) -> Money {
        Money(iter.map(|m| m.0).sum())
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    // ---- FlowType ----

    #[test]
    fn test_flow_type_display() {
        assert_eq!(FlowType::Income.to_string(), "income");
        assert_eq!(FlowType::Expense.to_string(), "expense");
    }

    #[test]
    fn test_flow_type_from_str() {
        assert_eq!("income".parse::<FlowType>().unwrap(), FlowType::Income);
        assert_eq!("expense".parse::<FlowType>().unwrap(), FlowType::Expense);
        assert!("transfer".parse::<FlowType>().is_err());
    }

    #[test]
    fn test_flow_type_from_str_error_message() {
        let err = "bogus".parse::<FlowType>().unwrap_err();
        assert_eq!(err, "Unknown flow type: bogus");
    }

    #[test]
    fn test_flow_type_serde_round_trip() {
        for variant in [FlowType::Income, FlowType::Expense] {
            let json = serde_json::to_string(&variant).unwrap();
            let rt: FlowType = serde_json::from_str(&json).unwrap();
            assert_eq!(variant, rt);
        }
        assert_eq!(
            serde_json::to_string(&FlowType::Expense).unwrap(),
            "\"expense\""
        );
    }

    #[test]
    fn test_flow_type_signed() {
        assert_eq!(FlowType::Income.signed(Money(500)), Money(500));
        assert_eq!(FlowType::Expense.signed(Money(500)), Money(-500));
    }

    // ---- Identity newtypes ----

    #[test]
    fn test_org_id_default_unique() {
        let a = OrgId::default();
        let b = OrgId::default();
        assert_ne!(a, b);
    }

    #[test]
    fn test_user_id_serde_round_trip() {
        let id = UserId::new();
        let json = serde_json::to_string(&id).unwrap();
        let rt: UserId = serde_json::from_str(&json).unwrap();
        assert_eq!(id, rt);
    }

    #[test]
    fn test_org_id_display_matches_uuid() {
        let id = OrgId::new();
        assert_eq!(id.to_string(), id.0.to_string());
    }

    // ---- Timestamp ----

    #[test]
    fn test_timestamp_to_datetime_roundtrip() {
        let now = Utc::now();
        let ts = Timestamp::from_datetime(now);
        let dt = ts.to_datetime();
        // Precision is seconds, so compare timestamps
        assert_eq!(dt.timestamp(), now.timestamp());
    }

    #[test]
    fn test_timestamp_plus_seconds() {
        let ts = Timestamp(1_700_000_000);
        assert_eq!(ts.plus_seconds(900), Timestamp(1_700_000_900));
        assert_eq!(ts.plus_seconds(-60), Timestamp(1_699_999_940));
    }

    #[test]
    fn test_timestamp_ordering() {
        assert!(Timestamp(100) < Timestamp(200));
        assert_eq!(Timestamp(100), Timestamp(100));
    }

    // ---- Money construction ----

    #[test]
    fn test_money_from_cents() {
        assert_eq!(Money::from_cents(1050).cents(), 1050);
        assert_eq!(Money::from_cents(-300).cents(), -300);
    }

    #[test]
    fn test_money_from_dollars_rounds() {
        assert_eq!(Money::from_dollars(10.50), Money(1050));
        assert_eq!(Money::from_dollars(10.505), Money(1051));
        assert_eq!(Money::from_dollars(-3.0), Money(-300));
        assert_eq!(Money::from_dollars(0.1), Money(10));
    }

    #[test]
    fn test_money_to_dollars() {
        assert!((Money(1050).to_dollars() - 10.50).abs() < f64::EPSILON);
        assert!((Money(-25).to_dollars() + 0.25).abs() < f64::EPSILON);
    }

    // ---- Money parsing ----

    #[test]
    fn test_money_parse_plain() {
        assert_eq!("10.50".parse::<Money>().unwrap(), Money(1050));
        assert_eq!("3".parse::<Money>().unwrap(), Money(300));
        assert_eq!("0.05".parse::<Money>().unwrap(), Money(5));
    }

    #[test]
    fn test_money_parse_currency_symbol_and_commas() {
        assert_eq!("$10.50".parse::<Money>().unwrap(), Money(1050));
        assert_eq!("1,299.00".parse::<Money>().unwrap(), Money(129_900));
        assert_eq!("$1,299".parse::<Money>().unwrap(), Money(129_900));
    }

    #[test]
    fn test_money_parse_negative() {
        assert_eq!("-3".parse::<Money>().unwrap(), Money(-300));
        assert_eq!("-$45.00".parse::<Money>().unwrap(), Money(-4500));
    }

    #[test]
    fn test_money_parse_single_fraction_digit() {
        // "10.5" means fifty cents, not five
        assert_eq!("10.5".parse::<Money>().unwrap(), Money(1050));
    }

    #[test]
    fn test_money_parse_bare_fraction() {
        assert_eq!(".50".parse::<Money>().unwrap(), Money(50));
    }

    #[test]
    fn test_money_parse_invalid() {
        assert!("".parse::<Money>().is_err());
        assert!("abc".parse::<Money>().is_err());
        assert!("10.123".parse::<Money>().is_err());
        assert!("--5".parse::<Money>().is_err());
        assert!("$".parse::<Money>().is_err());
    }

    // ---- Money arithmetic ----

    #[test]
    fn test_money_arithmetic() {
        assert_eq!(Money(100) + Money(250), Money(350));
        assert_eq!(Money(100) - Money(250), Money(-150));
        assert_eq!(-Money(100), Money(-100));

        let mut total = Money::ZERO;
        total += Money(75);
        total += Money(25);
        assert_eq!(total, Money(100));
    }

    #[test]
    fn test_money_sum() {
        let total: Money = [Money(100), Money(200), Money(-50)].into_iter().sum();
        assert_eq!(total, Money(250));
        let empty: Money = std::iter::empty::<Money>().sum();
        assert_eq!(empty, Money::ZERO);
    }

    #[test]
    fn test_money_min_max_abs() {
        assert_eq!(Money(100).min(Money(50)), Money(50));
        assert_eq!(Money(100).max(Money(50)), Money(100));
        assert_eq!(Money(-75).abs(), Money(75));
        assert!(Money(-1).is_negative());
        assert!(!Money(0).is_negative());
        assert!(Money(0).is_zero());
    }

    // ---- Money display / serde ----

    #[test]
    fn test_money_display() {
        assert_eq!(Money(1050).to_string(), "$10.50");
        assert_eq!(Money(5).to_string(), "$0.05");
        assert_eq!(Money(-4500).to_string(), "-$45.00");
        assert_eq!(Money(0).to_string(), "$0.00");
    }

    #[test]
    fn test_money_serde_transparent() {
        let json = serde_json::to_string(&Money(1050)).unwrap();
        assert_eq!(json, "1050");
        let rt: Money = serde_json::from_str("1050").unwrap();
        assert_eq!(rt, Money(1050));
    }

    #[test]
    fn test_money_display_parse_round_trip() {
        for cents in [0, 5, 99, 100, 1050, -4500, 129_900] {
            let m = Money(cents);
            let parsed: Money = m.to_string().parse().unwrap();
            assert_eq!(m, parsed);
        }
    }
}
