//! Summaries of a month's ledger for exporting.

use serde::Serialize;
use time::macros::format_description;

use crate::{
    Error,
    category::Category,
    month::MonthKey,
    store::LedgerSnapshot,
    transaction::{Transaction, TransactionType},
};

/// How much of a month's spending went to one category.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryBreakdown {
    /// The category.
    pub category: Category,
    /// The category's name for people.
    pub label: &'static str,
    /// The category's running total.
    pub amount: f64,
    /// The category's share of the month's total, in percent.
    pub share_percent: f64,
}

/// Everything an export of one month's ledger needs.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MonthReport {
    /// The month the report covers.
    pub month: MonthKey,
    /// The month formatted for people, e.g. "January 2026".
    pub display_name: String,
    /// The month's running total.
    pub total_spent: f64,
    /// One entry per category, in [Category::ALL] order.
    pub categories: Vec<CategoryBreakdown>,
    /// The sum of all `add` transactions.
    pub total_added: f64,
    /// The sum of all `remove` transactions.
    pub total_removed: f64,
    /// The number of `add` transactions.
    pub addition_count: usize,
    /// The number of `remove` transactions.
    pub deduction_count: usize,
    /// The month's transactions, newest first.
    pub transactions: Vec<Transaction>,
}

impl MonthReport {
    /// Summarise `snapshot`, the ledger for `month`.
    pub fn new(month: MonthKey, snapshot: LedgerSnapshot) -> Self {
        let LedgerSnapshot {
            aggregate,
            transactions,
        } = snapshot;

        // Shares of an empty month are all zero rather than undefined.
        let denominator = if aggregate.total_spent == 0.0 {
            1.0
        } else {
            aggregate.total_spent
        };

        let categories = Category::ALL
            .iter()
            .map(|&category| {
                let amount = aggregate.category_total(category);

                CategoryBreakdown {
                    category,
                    label: category.label(),
                    amount,
                    share_percent: amount / denominator * 100.0,
                }
            })
            .collect();

        let (mut total_added, mut total_removed) = (0.0, 0.0);
        let (mut addition_count, mut deduction_count) = (0, 0);
        for transaction in &transactions {
            match transaction.kind {
                TransactionType::Add => {
                    total_added += transaction.amount;
                    addition_count += 1;
                }
                TransactionType::Remove => {
                    total_removed += transaction.amount;
                    deduction_count += 1;
                }
            }
        }

        Self {
            month,
            display_name: month.display_name(),
            total_spent: aggregate.total_spent,
            categories,
            total_added,
            total_removed,
            addition_count,
            deduction_count,
            transactions,
        }
    }

    /// Render the transaction table as CSV with the columns date, category,
    /// amount and note.
    ///
    /// Amounts carry their sign, `+` for additions and `-` for removals.
    /// Transactions without a comment get `-` as their note.
    ///
    /// # Errors
    ///
    /// Returns [Error::ReportError] if a row could not be formatted or written.
    pub fn write_csv<W: std::io::Write>(&self, writer: W) -> Result<(), Error> {
        let mut writer = csv::Writer::from_writer(writer);
        let date_format = format_description!("[year]-[month]-[day]");

        writer
            .write_record(["Date", "Category", "Amount", "Note"])
            .map_err(|error| Error::ReportError(error.to_string()))?;

        for transaction in &self.transactions {
            let date = transaction
                .created_at
                .format(date_format)
                .map_err(|error| Error::ReportError(error.to_string()))?;
            let sign = match transaction.kind {
                TransactionType::Add => '+',
                TransactionType::Remove => '-',
            };

            writer
                .write_record([
                    date.as_str(),
                    transaction.category.label(),
                    &format!("{sign}{}", transaction.amount),
                    transaction.comment.as_deref().unwrap_or("-"),
                ])
                .map_err(|error| Error::ReportError(error.to_string()))?;
        }

        writer
            .flush()
            .map_err(|error| Error::ReportError(error.to_string()))
    }

    /// Render the transaction table as a CSV string, see [MonthReport::write_csv].
    pub fn to_csv(&self) -> Result<String, Error> {
        let mut buffer = Vec::new();
        self.write_csv(&mut buffer)?;

        String::from_utf8(buffer).map_err(|error| Error::ReportError(error.to_string()))
    }
}
