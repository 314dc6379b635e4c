//! The rule that turns transactions into a month's running totals.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::{category::Category, transaction::TransactionType};

/// The signed amount a transaction of `kind` contributes to the totals.
///
/// Additions count towards spending and removals count against it. Totals are
/// not clamped, so removing more than was added leaves a negative total.
pub fn delta(kind: TransactionType, amount: f64) -> f64 {
    match kind {
        TransactionType::Add => amount,
        TransactionType::Remove => -amount,
    }
}

/// The running totals for one user's month.
///
/// `total_spent` always equals the sum of `categories`, and both equal the
/// sum of the deltas of the transactions in the month's log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MonthAggregate {
    /// The total across all categories.
    pub total_spent: f64,
    /// The total for each category. Every category has an entry.
    pub categories: BTreeMap<Category, f64>,
}

impl MonthAggregate {
    /// An aggregate with every total set to zero.
    pub fn zero() -> Self {
        Self {
            total_spent: 0.0,
            categories: Category::ALL
                .into_iter()
                .map(|category| (category, 0.0))
                .collect(),
        }
    }

    /// The total for `category`.
    pub fn category_total(&self, category: Category) -> f64 {
        self.categories.get(&category).copied().unwrap_or(0.0)
    }

    /// Add `delta` to the overall total and to the total for `category`.
    pub fn apply(&mut self, category: Category, delta: f64) {
        self.total_spent += delta;
        *self.categories.entry(category).or_insert(0.0) += delta;
    }
}

impl Default for MonthAggregate {
    fn default() -> Self {
        Self::zero()
    }
}

#[cfg(test)]
mod tests {
    use crate::{Category, MonthAggregate, TransactionType, delta};

    #[test]
    fn add_is_positive_and_remove_is_negative() {
        assert_eq!(delta(TransactionType::Add, 12.5), 12.5);
        assert_eq!(delta(TransactionType::Remove, 12.5), -12.5);
    }

    #[test]
    fn zero_has_every_category() {
        let aggregate = MonthAggregate::zero();

        assert_eq!(aggregate.total_spent, 0.0);
        assert_eq!(aggregate.categories.len(), Category::ALL.len());
        assert!(aggregate.categories.values().all(|total| *total == 0.0));
    }

    #[test]
    fn apply_updates_total_and_category() {
        let mut aggregate = MonthAggregate::zero();

        aggregate.apply(Category::Shopping, delta(TransactionType::Add, 500.0));
        aggregate.apply(Category::Shopping, delta(TransactionType::Remove, 200.0));
        aggregate.apply(Category::Office, delta(TransactionType::Add, 40.0));

        assert_eq!(aggregate.total_spent, 340.0);
        assert_eq!(aggregate.category_total(Category::Shopping), 300.0);
        assert_eq!(aggregate.category_total(Category::Office), 40.0);
        assert_eq!(aggregate.category_total(Category::General), 0.0);
    }

    #[test]
    fn totals_may_go_negative() {
        let mut aggregate = MonthAggregate::zero();

        aggregate.apply(Category::General, delta(TransactionType::Remove, 75.0));

        assert_eq!(aggregate.total_spent, -75.0);
        assert_eq!(aggregate.category_total(Category::General), -75.0);
    }

    #[test]
    fn serializes_with_wire_names() {
        let json = serde_json::to_value(MonthAggregate::zero()).unwrap();

        assert_eq!(
            json,
            serde_json::json!({
                "totalSpent": 0.0,
                "categories": {
                    "general": 0.0,
                    "shopping": 0.0,
                    "outingFood": 0.0,
                    "office": 0.0,
                    "homeAU": 0.0,
                    "homeAXIS": 0.0,
                },
            })
        );
    }
}
