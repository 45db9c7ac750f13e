//! Record types, validation and derived values for the parish registry.
//!
//! The storage layer persists these types; the reporting helpers in
//! [`aggregate`] work on snapshots returned by it, and [`access`] holds the
//! session model used by callers that gate protected areas.

pub mod access;
pub mod aggregate;

use serde::{Deserialize, Serialize};
use time::macros::format_description;
use time::{Date, OffsetDateTime, PrimitiveDateTime, UtcOffset};

pub use access::{
    hash_passphrase, verify_passphrase, Capability, Credentials, ProtectedArea, Session,
};
pub use aggregate::{
    bracket_distribution, category_distribution, finance_report, monthly_flow, running_totals,
    BracketDistribution, BracketShare, CategoryTotal, FinanceReport, MonthlyFlow, RunningTotals,
    YearMonth,
};

/// Upper bound accepted for a member's age.
pub const MAX_AGE: u32 = 120;

pub const YOUTH_MIN_AGE: u32 = 13;
pub const PARENTS_MIN_AGE: u32 = 18;
pub const ELDERS_MIN_AGE: u32 = 60;

/// Largest amount a single transaction may carry. Totals over any realistic
/// ledger stay finite below it.
pub const MAX_AMOUNT: f64 = 1_000_000_000_000.0;

time::serde::format_description!(calendar_date, Date, "[year]-[month]-[day]");

#[derive(Debug, Clone, thiserror::Error, Eq, PartialEq)]
pub enum RegistryError {
    #[error("validation error: {0}")]
    Validation(String),
    #[error("configuration error: {0}")]
    Configuration(String),
    #[error("storage unavailable: {0}")]
    StorageUnavailable(String),
    #[error("access denied: {0}")]
    AccessDenied(String),
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq, Ord, PartialOrd, Hash)]
#[serde(rename_all = "snake_case")]
pub enum RecordKind {
    Member,
    PastoralRequest,
    Transaction,
}

impl RecordKind {
    pub const ALL: [Self; 3] = [Self::Member, Self::PastoralRequest, Self::Transaction];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Member => "member",
            Self::PastoralRequest => "pastoral_request",
            Self::Transaction => "transaction",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum MaritalStatus {
    Single,
    Married,
    Widowed,
    Divorced,
}

impl MaritalStatus {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Single => "single",
            Self::Married => "married",
            Self::Widowed => "widowed",
            Self::Divorced => "divorced",
        }
    }

    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "single" => Some(Self::Single),
            "married" => Some(Self::Married),
            "widowed" => Some(Self::Widowed),
            "divorced" => Some(Self::Divorced),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Baptized {
    Yes,
    No,
}

impl Baptized {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Yes => "yes",
            Self::No => "no",
        }
    }

    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "yes" => Some(Self::Yes),
            "no" => Some(Self::No),
            _ => None,
        }
    }
}

/// Age category derived from a member's age. Declaration order is youngest
/// first, which is also the order reports list them in.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq, Ord, PartialOrd, Hash)]
#[serde(rename_all = "snake_case")]
pub enum AgeBracket {
    Children,
    Youth,
    Parents,
    Elders,
}

impl AgeBracket {
    pub const ALL: [Self; 4] = [Self::Children, Self::Youth, Self::Parents, Self::Elders];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Children => "children",
            Self::Youth => "youth",
            Self::Parents => "parents",
            Self::Elders => "elders",
        }
    }

    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "children" => Some(Self::Children),
            "youth" => Some(Self::Youth),
            "parents" => Some(Self::Parents),
            "elders" => Some(Self::Elders),
            _ => None,
        }
    }
}

/// Classifies an age into its bracket. Each range includes its lower bound.
#[must_use]
pub fn bracket(age: u32) -> AgeBracket {
    if age < YOUTH_MIN_AGE {
        AgeBracket::Children
    } else if age < PARENTS_MIN_AGE {
        AgeBracket::Youth
    } else if age < ELDERS_MIN_AGE {
        AgeBracket::Parents
    } else {
        AgeBracket::Elders
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum RequestStatus {
    Pending,
    Attended,
}

impl RequestStatus {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Attended => "attended",
        }
    }

    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "pending" => Some(Self::Pending),
            "attended" => Some(Self::Attended),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq, Ord, PartialOrd, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Income,
    Expense,
}

impl Direction {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Income => "income",
            Self::Expense => "expense",
        }
    }

    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "income" => Some(Self::Income),
            "expense" => Some(Self::Expense),
            _ => None,
        }
    }
}

/// Categories accepted for income transactions.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq, Ord, PartialOrd, Hash)]
#[serde(rename_all = "snake_case")]
pub enum IncomeCategory {
    Tithe,
    Offering,
    Donation,
}

impl IncomeCategory {
    pub const ALL: [Self; 3] = [Self::Tithe, Self::Offering, Self::Donation];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Tithe => "tithe",
            Self::Offering => "offering",
            Self::Donation => "donation",
        }
    }

    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "tithe" => Some(Self::Tithe),
            "offering" => Some(Self::Offering),
            "donation" => Some(Self::Donation),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Member {
    pub id: i64,
    pub name: String,
    pub marital_status: MaritalStatus,
    pub age: u32,
    pub bracket: AgeBracket,
    pub residence: String,
    pub baptized: Baptized,
    pub years_in_congregation: u32,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NewMember {
    pub name: String,
    pub marital_status: MaritalStatus,
    pub age: u32,
    pub residence: String,
    pub baptized: Baptized,
    pub years_in_congregation: u32,
}

impl NewMember {
    /// Validates a registration before it is written.
    ///
    /// # Errors
    /// Returns [`RegistryError::Validation`] when a required field is blank or
    /// the age is above [`MAX_AGE`].
    pub fn validate(&self) -> Result<(), RegistryError> {
        require_text("name", &self.name)?;
        require_text("residence", &self.residence)?;

        if self.age > MAX_AGE {
            return Err(RegistryError::Validation(format!("age MUST be <= {MAX_AGE}")));
        }

        Ok(())
    }

    #[must_use]
    pub fn bracket(&self) -> AgeBracket {
        bracket(self.age)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PastoralRequest {
    pub id: i64,
    pub name: String,
    pub description: String,
    #[serde(with = "time::serde::rfc3339")]
    pub requested_at: OffsetDateTime,
    pub status: RequestStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NewPastoralRequest {
    pub name: String,
    pub description: String,
}

impl NewPastoralRequest {
    /// # Errors
    /// Returns [`RegistryError::Validation`] when the name or description is blank.
    pub fn validate(&self) -> Result<(), RegistryError> {
        require_text("name", &self.name)?;
        require_text("description", &self.description)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Transaction {
    pub id: i64,
    pub direction: Direction,
    pub category: String,
    pub amount: f64,
    #[serde(with = "calendar_date")]
    pub date: Date,
    pub note: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NewTransaction {
    pub direction: Direction,
    pub category: String,
    pub amount: f64,
    #[serde(with = "calendar_date")]
    pub date: Date,
    pub note: String,
}

impl NewTransaction {
    /// Validates a transaction before it is written.
    ///
    /// # Errors
    /// Returns [`RegistryError::Validation`] when the amount is not a positive
    /// finite number up to [`MAX_AMOUNT`], the category is blank, or an income
    /// category is not one of [`IncomeCategory`].
    pub fn validate(&self) -> Result<(), RegistryError> {
        if !self.amount.is_finite() || self.amount <= 0.0 {
            return Err(RegistryError::Validation("amount MUST be > 0".to_string()));
        }
        if self.amount > MAX_AMOUNT {
            return Err(RegistryError::Validation(format!(
                "amount MUST be <= {MAX_AMOUNT} (got {})",
                self.amount
            )));
        }

        require_text("category", &self.category)?;

        if self.direction == Direction::Income && IncomeCategory::parse(&self.category).is_none() {
            let accepted = IncomeCategory::ALL.map(IncomeCategory::as_str).join(", ");
            return Err(RegistryError::Validation(format!(
                "income category MUST be one of {accepted} (got {})",
                self.category
            )));
        }

        Ok(())
    }
}

fn require_text(field: &str, value: &str) -> Result<(), RegistryError> {
    if value.trim().is_empty() {
        return Err(RegistryError::Validation(format!(
            "{field} MUST be provided"
        )));
    }
    Ok(())
}

/// Current UTC time truncated to the microsecond precision used in storage.
#[must_use]
pub fn now_utc() -> OffsetDateTime {
    truncate_to_micros(OffsetDateTime::now_utc())
}

/// Drops sub-microsecond precision. Stored timestamps keep six fractional
/// digits, so values written through the store come back truncated this way.
#[must_use]
pub fn truncate_to_micros(value: OffsetDateTime) -> OffsetDateTime {
    value
        .replace_nanosecond(value.microsecond() * 1_000)
        .unwrap_or(value)
}

/// Formats a timestamp as fixed-width UTC text so lexical order matches
/// chronological order.
///
/// # Errors
/// Returns [`RegistryError::Validation`] when the value cannot be formatted.
pub fn format_timestamp(value: OffsetDateTime) -> Result<String, RegistryError> {
    value
        .to_offset(UtcOffset::UTC)
        .format(format_description!(
            "[year]-[month]-[day]T[hour]:[minute]:[second].[subsecond digits:6]Z"
        ))
        .map_err(|err| RegistryError::Validation(format!("failed to format timestamp: {err}")))
}

/// # Errors
/// Returns [`RegistryError::Validation`] for text not produced by
/// [`format_timestamp`].
pub fn parse_timestamp(value: &str) -> Result<OffsetDateTime, RegistryError> {
    PrimitiveDateTime::parse(
        value,
        format_description!("[year]-[month]-[day]T[hour]:[minute]:[second].[subsecond digits:6]Z"),
    )
    .map(PrimitiveDateTime::assume_utc)
    .map_err(|err| RegistryError::Validation(format!("invalid timestamp {value}: {err}")))
}

/// # Errors
/// Returns [`RegistryError::Validation`] when the date cannot be formatted.
pub fn format_date(value: Date) -> Result<String, RegistryError> {
    value
        .format(format_description!("[year]-[month]-[day]"))
        .map_err(|err| RegistryError::Validation(format!("failed to format date: {err}")))
}

/// Parses a `YYYY-MM-DD` calendar date.
///
/// # Errors
/// Returns [`RegistryError::Validation`] for malformed or out-of-range dates.
pub fn parse_date(value: &str) -> Result<Date, RegistryError> {
    Date::parse(value, format_description!("[year]-[month]-[day]"))
        .map_err(|err| RegistryError::Validation(format!("invalid date {value}: {err}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use time::macros::{date, datetime};

    fn must_ok<T, E: std::fmt::Display>(result: Result<T, E>) -> T {
        match result {
            Ok(value) => value,
            Err(err) => panic!("expected Ok(..), got error: {err}"),
        }
    }

    fn fixture_member() -> NewMember {
        NewMember {
            name: "Ana Mucavele".to_string(),
            marital_status: MaritalStatus::Married,
            age: 34,
            residence: "Serra da Mesa".to_string(),
            baptized: Baptized::Yes,
            years_in_congregation: 6,
        }
    }

    fn fixture_income(amount: f64) -> NewTransaction {
        NewTransaction {
            direction: Direction::Income,
            category: "tithe".to_string(),
            amount,
            date: date!(2024 - 03 - 10),
            note: String::new(),
        }
    }

    #[test]
    fn bracket_boundaries_include_lower_bound() {
        assert_eq!(bracket(0), AgeBracket::Children);
        assert_eq!(bracket(12), AgeBracket::Children);
        assert_eq!(bracket(13), AgeBracket::Youth);
        assert_eq!(bracket(17), AgeBracket::Youth);
        assert_eq!(bracket(18), AgeBracket::Parents);
        assert_eq!(bracket(59), AgeBracket::Parents);
        assert_eq!(bracket(60), AgeBracket::Elders);
        assert_eq!(bracket(u32::MAX), AgeBracket::Elders);
    }

    proptest! {
        #[test]
        fn prop_brackets_partition_ages(age in 0u32..200) {
            let expected = [
                age < YOUTH_MIN_AGE,
                (YOUTH_MIN_AGE..PARENTS_MIN_AGE).contains(&age),
                (PARENTS_MIN_AGE..ELDERS_MIN_AGE).contains(&age),
                age >= ELDERS_MIN_AGE,
            ];
            prop_assert_eq!(expected.iter().filter(|hit| **hit).count(), 1);

            let position = AgeBracket::ALL.iter().position(|item| *item == bracket(age));
            prop_assert_eq!(position.map(|index| expected[index]), Some(true));
        }

        #[test]
        fn prop_bracket_is_monotonic(lhs in 0u32..200, rhs in 0u32..200) {
            if lhs <= rhs {
                prop_assert!(bracket(lhs) <= bracket(rhs));
            }
        }
    }

    #[test]
    fn enum_codes_round_trip_through_parse() {
        for value in AgeBracket::ALL {
            assert_eq!(AgeBracket::parse(value.as_str()), Some(value));
        }
        assert_eq!(MaritalStatus::parse("widowed"), Some(MaritalStatus::Widowed));
        assert_eq!(RequestStatus::parse("Attended"), None);
        assert_eq!(Direction::parse("expense"), Some(Direction::Expense));
        for category in IncomeCategory::ALL {
            assert_eq!(IncomeCategory::parse(category.as_str()), Some(category));
        }
    }

    #[test]
    fn member_validation_rejects_blank_fields_and_excess_age() {
        must_ok(fixture_member().validate());

        let mut blank_name = fixture_member();
        blank_name.name = "   ".to_string();
        assert!(matches!(
            blank_name.validate(),
            Err(RegistryError::Validation(_))
        ));

        let mut blank_residence = fixture_member();
        blank_residence.residence = String::new();
        assert!(blank_residence.validate().is_err());

        let mut too_old = fixture_member();
        too_old.age = MAX_AGE + 1;
        assert!(too_old.validate().is_err());

        let mut oldest = fixture_member();
        oldest.age = MAX_AGE;
        must_ok(oldest.validate());
        assert_eq!(oldest.bracket(), AgeBracket::Elders);
    }

    #[test]
    fn pastoral_request_requires_name_and_description() {
        let request = NewPastoralRequest {
            name: "Jose".to_string(),
            description: "visit at the hospital".to_string(),
        };
        must_ok(request.validate());

        let missing = NewPastoralRequest {
            name: "Jose".to_string(),
            description: " ".to_string(),
        };
        assert!(missing.validate().is_err());
    }

    #[test]
    fn transaction_validation_enforces_amount_and_income_categories() {
        must_ok(fixture_income(100.0).validate());
        assert!(fixture_income(0.0).validate().is_err());
        assert!(fixture_income(-5.0).validate().is_err());
        assert!(fixture_income(f64::NAN).validate().is_err());

        let mut unknown = fixture_income(10.0);
        unknown.category = "raffle".to_string();
        let err = match unknown.validate() {
            Ok(()) => panic!("unknown income category must be rejected"),
            Err(err) => err,
        };
        let message = err.to_string();
        assert!(message.contains("one of tithe, offering, donation"));

        let expense = NewTransaction {
            direction: Direction::Expense,
            category: "roof repair".to_string(),
            amount: 40.0,
            date: date!(2024 - 04 - 02),
            note: "tin sheets".to_string(),
        };
        must_ok(expense.validate());
    }

    #[test]
    fn oversized_amounts_are_rejected_before_totals_can_overflow() {
        must_ok(fixture_income(MAX_AMOUNT).validate());
        assert!(fixture_income(MAX_AMOUNT * 1.5).validate().is_err());

        let err = match fixture_income(1e308).validate() {
            Ok(()) => panic!("amount near f64::MAX must be rejected"),
            Err(err) => err,
        };
        assert!(matches!(err, RegistryError::Validation(_)));
        assert!(err.to_string().contains("amount MUST be <="));
    }

    #[test]
    fn timestamps_are_fixed_width_and_round_trip() {
        let value = datetime!(2026-02-07 12:00:00.5 UTC);
        let formatted = must_ok(format_timestamp(value));
        assert_eq!(formatted, "2026-02-07T12:00:00.500000Z");
        assert_eq!(must_ok(parse_timestamp(&formatted)), value);

        let whole = must_ok(format_timestamp(datetime!(2026-02-07 12:00:00 UTC)));
        assert_eq!(whole.len(), formatted.len());

        assert!(parse_timestamp("07/02/2026 12:00").is_err());
    }

    #[test]
    fn truncation_keeps_whole_microseconds() {
        let precise = datetime!(2026-02-07 12:00:00.123456789 UTC);
        let truncated = truncate_to_micros(precise);
        assert_eq!(truncated, datetime!(2026-02-07 12:00:00.123456 UTC));
        assert_eq!(truncate_to_micros(truncated), truncated);

        let stored = must_ok(format_timestamp(precise));
        assert_eq!(must_ok(parse_timestamp(&stored)), truncated);
    }

    #[test]
    fn now_utc_round_trips_through_storage_format() {
        let now = now_utc();
        let stored = must_ok(format_timestamp(now));
        assert_eq!(must_ok(parse_timestamp(&stored)), now);
    }

    #[test]
    fn dates_use_iso_calendar_format() {
        assert_eq!(must_ok(format_date(date!(2024 - 03 - 05))), "2024-03-05");
        assert_eq!(must_ok(parse_date("2024-12-31")), date!(2024 - 12 - 31));
        assert!(parse_date("2024-02-30").is_err());
        assert!(parse_date("31/12/2024").is_err());
    }

    #[test]
    fn transaction_json_uses_calendar_dates() {
        let transaction = Transaction {
            id: 7,
            direction: Direction::Income,
            category: "tithe".to_string(),
            amount: 100.0,
            date: date!(2024 - 03 - 05),
            note: String::new(),
        };
        let value = must_ok(serde_json::to_value(&transaction));
        assert_eq!(value["date"], "2024-03-05");
        assert_eq!(value["direction"], "income");

        let decoded: Transaction = must_ok(serde_json::from_value(value));
        assert_eq!(decoded, transaction);
    }
}
