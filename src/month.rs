//! Keys that identify a ledger: the owning user and the month.

use std::{fmt::Display, str::FromStr};

use serde::{Deserialize, Serialize};
use time::Month;

use crate::Error;

/// The ID of the user that owns a ledger.
///
/// The ID comes from whatever authenticated the user and is only ever used to
/// partition ledgers, it is not validated or interpreted.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(String);

impl UserId {
    /// Wrap an ID issued by the authentication provider.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The ID as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for UserId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A calendar month, written as the lowercase month name and the year, e.g. `january-2026`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct MonthKey {
    year: i32,
    month: Month,
}

const MONTH_NAMES: [(Month, &str); 12] = [
    (Month::January, "january"),
    (Month::February, "february"),
    (Month::March, "march"),
    (Month::April, "april"),
    (Month::May, "may"),
    (Month::June, "june"),
    (Month::July, "july"),
    (Month::August, "august"),
    (Month::September, "september"),
    (Month::October, "october"),
    (Month::November, "november"),
    (Month::December, "december"),
];

impl MonthKey {
    /// Create a key for `month` of `year`.
    ///
    /// # Errors
    ///
    /// Returns [Error::InvalidMonthKey] if `year` is outside 1 to 9999.
    pub fn new(year: i32, month: Month) -> Result<Self, Error> {
        if !(1..=9999).contains(&year) {
            return Err(Error::InvalidMonthKey(format!("{}-{year}", month_name(month))));
        }

        Ok(Self { year, month })
    }

    /// The year of the month.
    pub fn year(&self) -> i32 {
        self.year
    }

    /// The month of the year.
    pub fn month(&self) -> Month {
        self.month
    }

    /// The month formatted for people, e.g. "January 2026".
    pub fn display_name(&self) -> String {
        format!("{} {}", self.month, self.year)
    }
}

fn month_name(month: Month) -> &'static str {
    MONTH_NAMES[usize::from(u8::from(month)) - 1].1
}

impl FromStr for MonthKey {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || Error::InvalidMonthKey(s.to_owned());

        let (name, year) = s.trim().rsplit_once('-').ok_or_else(invalid)?;
        let name = name.to_lowercase();
        let month = MONTH_NAMES
            .iter()
            .find(|(_, candidate)| *candidate == name)
            .map(|(month, _)| *month)
            .ok_or_else(invalid)?;

        if year.is_empty() || !year.chars().all(|c| c.is_ascii_digit()) {
            return Err(invalid());
        }
        let year: i32 = year.parse().map_err(|_| invalid())?;

        MonthKey::new(year, month).map_err(|_| invalid())
    }
}

impl TryFrom<String> for MonthKey {
    type Error = Error;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<MonthKey> for String {
    fn from(value: MonthKey) -> Self {
        value.to_string()
    }
}

impl Display for MonthKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}-{}", month_name(self.month), self.year)
    }
}

/// Identifies a single ledger: one user's transactions and totals for one month.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LedgerKey {
    /// The user that owns the ledger.
    pub user_id: UserId,
    /// The month the ledger covers.
    pub month: MonthKey,
}

impl LedgerKey {
    /// Create a key for `user_id`'s ledger for `month`.
    pub fn new(user_id: UserId, month: MonthKey) -> Self {
        Self { user_id, month }
    }
}

impl Display for LedgerKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "users/{}/months/{}", self.user_id, self.month)
    }
}

#[cfg(test)]
mod tests {
    use time::Month;

    use crate::{Error, LedgerKey, MonthKey, UserId};

    #[test]
    fn parses_month_name_and_year() {
        let key: MonthKey = "march-2026".parse().unwrap();

        assert_eq!(key.month(), Month::March);
        assert_eq!(key.year(), 2026);
    }

    #[test]
    fn parsing_is_case_insensitive_and_canonical() {
        let key: MonthKey = "September-2025".parse().unwrap();

        assert_eq!(key.to_string(), "september-2025");
    }

    #[test]
    fn rejects_malformed_keys() {
        let cases = ["", "2026-01", "smarch-2026", "january", "january-", "january-20x6"];

        for case in cases {
            assert_eq!(
                case.parse::<MonthKey>(),
                Err(Error::InvalidMonthKey(case.to_owned())),
                "want {case:?} to be rejected"
            );
        }
    }

    #[test]
    fn rejects_out_of_range_years() {
        assert!("january-0".parse::<MonthKey>().is_err());
        assert!("january-10000".parse::<MonthKey>().is_err());
        assert!(MonthKey::new(0, Month::January).is_err());
    }

    #[test]
    fn display_name() {
        let key = MonthKey::new(2026, Month::January).unwrap();

        assert_eq!(key.display_name(), "January 2026");
    }

    #[test]
    fn serializes_as_string() {
        let key = MonthKey::new(2026, Month::December).unwrap();

        let json = serde_json::to_string(&key).unwrap();

        assert_eq!(json, "\"december-2026\"");
        assert_eq!(serde_json::from_str::<MonthKey>(&json).unwrap(), key);
    }

    #[test]
    fn ledger_key_is_hierarchical() {
        let key = LedgerKey::new(UserId::new("alice"), "may-2026".parse().unwrap());

        assert_eq!(key.to_string(), "users/alice/months/may-2026");
    }
}
