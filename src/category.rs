//! The fixed set of spending categories.

use std::{fmt::Display, str::FromStr};

use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use serde::{Deserialize, Serialize};

use crate::Error;

/// A spending category.
///
/// The set of categories is closed: every aggregate carries a total for each
/// of them and nothing outside this list can be recorded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Category {
    /// Anything that does not fit another category.
    #[serde(rename = "general")]
    General,
    /// Clothes, gadgets and other purchases.
    #[serde(rename = "shopping")]
    Shopping,
    /// Eating out and going out.
    #[serde(rename = "outingFood")]
    OutingFood,
    /// Work and office expenses.
    #[serde(rename = "office")]
    Office,
    /// Household expenses for the AU home.
    #[serde(rename = "homeAU")]
    HomeAu,
    /// Household expenses for the AXIS home.
    #[serde(rename = "homeAXIS")]
    HomeAxis,
}

impl Category {
    /// Every category, in display order.
    pub const ALL: [Category; 6] = [
        Category::General,
        Category::Shopping,
        Category::OutingFood,
        Category::Office,
        Category::HomeAu,
        Category::HomeAxis,
    ];

    /// The key used for the category on the wire and in the database.
    pub fn as_str(self) -> &'static str {
        match self {
            Category::General => "general",
            Category::Shopping => "shopping",
            Category::OutingFood => "outingFood",
            Category::Office => "office",
            Category::HomeAu => "homeAU",
            Category::HomeAxis => "homeAXIS",
        }
    }

    /// The human readable name of the category.
    pub fn label(self) -> &'static str {
        match self {
            Category::General => "General",
            Category::Shopping => "Shopping",
            Category::OutingFood => "Outing & Food",
            Category::Office => "Office",
            Category::HomeAu => "Home (AU)",
            Category::HomeAxis => "Home (AXIS)",
        }
    }
}

impl FromStr for Category {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Category::ALL
            .into_iter()
            .find(|category| category.as_str() == s)
            .ok_or_else(|| Error::InvalidCategory(s.to_owned()))
    }
}

impl Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl ToSql for Category {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for Category {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        value
            .as_str()?
            .parse()
            .map_err(|error| FromSqlError::Other(Box::new(error)))
    }
}
