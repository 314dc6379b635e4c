//! Transactions recorded against a monthly ledger.

use std::{fmt::Display, str::FromStr};

use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::{Error, category::Category};

/// The ID the store assigned to a transaction.
///
/// Callers should treat it as opaque: the only guarantee is that it is unique
/// within the store that issued it.
pub type TransactionId = i64;

/// Whether a transaction adds to or takes away from the month's spending.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionType {
    /// Money spent, increases the totals.
    Add,
    /// A refund or correction, decreases the totals.
    Remove,
}

impl TransactionType {
    /// The name used on the wire and in the database.
    pub fn as_str(self) -> &'static str {
        match self {
            TransactionType::Add => "add",
            TransactionType::Remove => "remove",
        }
    }
}

impl FromStr for TransactionType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "add" => Ok(TransactionType::Add),
            "remove" => Ok(TransactionType::Remove),
            other => Err(Error::InvalidTransactionType(other.to_owned())),
        }
    }
}

impl Display for TransactionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl ToSql for TransactionType {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for TransactionType {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        value
            .as_str()?
            .parse()
            .map_err(|error| FromSqlError::Other(Box::new(error)))
    }
}

/// A transaction that has been written to a ledger.
///
/// Transactions are immutable: the only change a ledger supports is deleting
/// one, which also reverses its effect on the month's totals.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    /// The ID assigned by the store.
    pub id: TransactionId,
    /// The amount of money, always positive. The sign comes from `kind`.
    pub amount: f64,
    /// What the money was spent on.
    pub category: Category,
    /// Whether the amount adds to or is taken away from the totals.
    #[serde(rename = "type")]
    pub kind: TransactionType,
    /// An optional note, never empty.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
    /// When the store wrote the transaction.
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

impl Transaction {
    /// The signed amount this transaction contributes to the totals.
    pub fn delta(&self) -> f64 {
        crate::aggregation::delta(self.kind, self.amount)
    }
}

/// A validated request to append a transaction to a ledger.
///
/// Construct one with [NewTransaction::new], which guarantees a positive,
/// finite amount and drops blank comments.
#[derive(Debug, Clone, PartialEq)]
pub struct NewTransaction {
    amount: f64,
    category: Category,
    kind: TransactionType,
    comment: Option<String>,
}

impl NewTransaction {
    /// Validate the fields of a new transaction.
    ///
    /// A comment that is empty or only whitespace is treated as no comment.
    ///
    /// # Errors
    ///
    /// Returns [Error::InvalidAmount] if `amount` is not a finite number greater than zero.
    pub fn new(
        amount: f64,
        category: Category,
        kind: TransactionType,
        comment: Option<&str>,
    ) -> Result<Self, Error> {
        if !amount.is_finite() || amount <= 0.0 {
            return Err(Error::InvalidAmount(amount));
        }

        let comment = comment
            .filter(|comment| !comment.trim().is_empty())
            .map(str::to_owned);

        Ok(Self {
            amount,
            category,
            kind,
            comment,
        })
    }

    /// The amount of money, always positive.
    pub fn amount(&self) -> f64 {
        self.amount
    }

    /// What the money was spent on.
    pub fn category(&self) -> Category {
        self.category
    }

    /// Whether the amount adds to or is taken away from the totals.
    pub fn kind(&self) -> TransactionType {
        self.kind
    }

    /// The note attached to the transaction, if any.
    pub fn comment(&self) -> Option<&str> {
        self.comment.as_deref()
    }

    /// The signed amount the transaction will contribute to the totals.
    pub fn delta(&self) -> f64 {
        crate::aggregation::delta(self.kind, self.amount)
    }

    /// Turn the request into a stored transaction with the ID and timestamp assigned by a store.
    pub(crate) fn finalise(self, id: TransactionId, created_at: OffsetDateTime) -> Transaction {
        Transaction {
            id,
            amount: self.amount,
            category: self.category,
            kind: self.kind,
            comment: self.comment,
            created_at,
        }
    }
}
