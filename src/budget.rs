//! The budget facade that clients use to read and write monthly ledgers.

use std::sync::Arc;

use serde::Deserialize;

use crate::{
    Error,
    aggregation::MonthAggregate,
    broker::Subscription,
    category::Category,
    month::{LedgerKey, MonthKey, UserId},
    report::MonthReport,
    store::LedgerStore,
    transaction::{NewTransaction, Transaction, TransactionId, TransactionType},
};

/// A client's request to record a transaction, before validation.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TransactionRequest {
    /// The amount of money, must be positive.
    pub amount: f64,
    /// What the money was spent on.
    pub category: Category,
    /// Whether the amount adds to or is taken away from the totals.
    #[serde(rename = "type")]
    pub kind: TransactionType,
    /// An optional note. Blank notes are not stored.
    #[serde(default)]
    pub comment: Option<String>,
}

/// The entry point for everything a client does with a budget.
///
/// The facade works the same whichever backend `S` is, clients never need to
/// know whether ledgers are durable or kept in memory.
#[derive(Debug, Clone)]
pub struct Budget<S> {
    store: S,
}

impl<S: LedgerStore> Budget<S> {
    /// Create a budget backed by `store`.
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// The backend this budget reads from and writes to.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Get the totals for `user_id`'s `month`, starting the month at zero if it is new.
    pub fn get_or_create_month(
        &self,
        user_id: &UserId,
        month: MonthKey,
    ) -> Result<MonthAggregate, Error> {
        self.store
            .get_or_create(&LedgerKey::new(user_id.clone(), month))
    }

    /// Record a transaction for `user_id`'s `month`.
    ///
    /// # Errors
    ///
    /// Returns [Error::InvalidAmount] if the amount is not a positive number,
    /// in which case nothing is written. Store errors are passed through
    /// unchanged and are not retried.
    pub fn add_transaction(
        &self,
        user_id: &UserId,
        month: MonthKey,
        request: TransactionRequest,
    ) -> Result<Transaction, Error> {
        let transaction = NewTransaction::new(
            request.amount,
            request.category,
            request.kind,
            request.comment.as_deref(),
        )?;

        self.store
            .append(&LedgerKey::new(user_id.clone(), month), transaction)
    }

    /// Delete a transaction from `user_id`'s `month`, reversing its effect on the totals.
    ///
    /// # Errors
    ///
    /// Returns [Error::NotFound] if there is no transaction `id` in that month.
    pub fn delete_transaction(
        &self,
        user_id: &UserId,
        month: MonthKey,
        id: TransactionId,
    ) -> Result<Transaction, Error> {
        self.store
            .delete(&LedgerKey::new(user_id.clone(), month), id)
    }

    /// The transactions recorded for `user_id`'s `month`, newest first.
    pub fn transactions(
        &self,
        user_id: &UserId,
        month: MonthKey,
    ) -> Result<Vec<Transaction>, Error> {
        self.store
            .snapshot(&LedgerKey::new(user_id.clone(), month))
            .map(|snapshot| snapshot.transactions)
    }

    /// Watch the totals of `user_id`'s `month`.
    ///
    /// `on_change` is called straight away with the current totals and again
    /// after every change. Call [Subscription::unsubscribe] when done.
    pub fn subscribe_to_month_data<F>(
        &self,
        user_id: &UserId,
        month: MonthKey,
        on_change: F,
    ) -> Result<Subscription, Error>
    where
        F: Fn(&MonthAggregate) + Send + Sync + 'static,
    {
        self.store
            .subscribe_aggregate(&LedgerKey::new(user_id.clone(), month), Arc::new(on_change))
    }

    /// Watch the transactions of `user_id`'s `month`.
    ///
    /// `on_change` is called straight away with the current transactions and
    /// again after every change, always newest first. Call
    /// [Subscription::unsubscribe] when done.
    pub fn subscribe_to_transactions<F>(
        &self,
        user_id: &UserId,
        month: MonthKey,
        on_change: F,
    ) -> Result<Subscription, Error>
    where
        F: Fn(&[Transaction]) + Send + Sync + 'static,
    {
        self.store
            .subscribe_transactions(&LedgerKey::new(user_id.clone(), month), Arc::new(on_change))
    }

    /// Gather everything needed to export `user_id`'s `month`.
    ///
    /// A month that was never created is reported as empty and stays uncreated.
    pub fn report(&self, user_id: &UserId, month: MonthKey) -> Result<MonthReport, Error> {
        let key = LedgerKey::new(user_id.clone(), month);
        let snapshot = self.store.snapshot(&key)?;

        Ok(MonthReport::new(month, snapshot))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use rusqlite::Connection;

    use crate::{
        Budget, Category, Error, MemoryLedgerStore, MonthAggregate, MonthKey, SqliteLedgerStore,
        Transaction, TransactionRequest, TransactionType, UserId,
    };

    fn budget() -> Budget<MemoryLedgerStore> {
        Budget::new(MemoryLedgerStore::new())
    }

    fn month() -> MonthKey {
        "january-2026".parse().unwrap()
    }

    fn request(amount: f64, category: Category, kind: TransactionType) -> TransactionRequest {
        TransactionRequest {
            amount,
            category,
            kind,
            comment: None,
        }
    }

    #[test]
    fn add_then_remove_scenario() {
        let budget = budget();
        let user = UserId::new("alice");
        budget.get_or_create_month(&user, month()).unwrap();

        budget
            .add_transaction(
                &user,
                month(),
                request(500.0, Category::Shopping, TransactionType::Add),
            )
            .unwrap();
        budget
            .add_transaction(
                &user,
                month(),
                request(200.0, Category::Shopping, TransactionType::Remove),
            )
            .unwrap();

        let aggregate = budget.get_or_create_month(&user, month()).unwrap();
        assert_eq!(aggregate.total_spent, 300.0);
        assert_eq!(aggregate.category_total(Category::Shopping), 300.0);
    }

    #[test]
    fn empty_comment_is_not_stored() {
        let budget = budget();
        let user = UserId::new("alice");

        let transaction = budget
            .add_transaction(
                &user,
                month(),
                TransactionRequest {
                    comment: Some(String::new()),
                    ..request(10.0, Category::General, TransactionType::Add)
                },
            )
            .unwrap();

        assert_eq!(transaction.comment, None);
        let stored = budget.transactions(&user, month()).unwrap();
        let json = serde_json::to_value(&stored[0]).unwrap();
        assert!(json.get("comment").is_none(), "got {json}");
    }

    #[test]
    fn invalid_amount_never_reaches_the_store() {
        let budget = budget();
        let user = UserId::new("alice");

        let result = budget.add_transaction(
            &user,
            month(),
            request(0.0, Category::General, TransactionType::Add),
        );

        assert_eq!(result, Err(Error::InvalidAmount(0.0)));
        assert!(budget.transactions(&user, month()).unwrap().is_empty());
    }

    #[test]
    fn delete_missing_transaction_leaves_totals_unchanged() {
        let budget = budget();
        let user = UserId::new("alice");
        budget
            .add_transaction(
                &user,
                month(),
                request(10.0, Category::Office, TransactionType::Add),
            )
            .unwrap();

        let result = budget.delete_transaction(&user, month(), 999);

        assert_eq!(result, Err(Error::NotFound));
        assert_eq!(
            budget.get_or_create_month(&user, month()).unwrap().total_spent,
            10.0
        );
    }

    #[test]
    fn delete_reverses_the_transaction() {
        let budget = budget();
        let user = UserId::new("alice");
        let before = budget.get_or_create_month(&user, month()).unwrap();
        let transaction = budget
            .add_transaction(
                &user,
                month(),
                request(10.0, Category::Office, TransactionType::Add),
            )
            .unwrap();

        budget
            .delete_transaction(&user, month(), transaction.id)
            .unwrap();

        assert_eq!(budget.get_or_create_month(&user, month()).unwrap(), before);
    }

    #[test]
    fn remaining_subscriber_keeps_receiving_updates() {
        let budget = budget();
        let user = UserId::new("alice");
        let kept = Arc::new(Mutex::new(Vec::new()));
        let removed = Arc::new(Mutex::new(Vec::new()));
        let kept_sink = kept.clone();
        let removed_sink = removed.clone();
        budget
            .subscribe_to_month_data(&user, month(), move |aggregate: &MonthAggregate| {
                kept_sink.lock().unwrap().push(aggregate.total_spent)
            })
            .unwrap();
        let subscription = budget
            .subscribe_to_month_data(&user, month(), move |aggregate: &MonthAggregate| {
                removed_sink.lock().unwrap().push(aggregate.total_spent)
            })
            .unwrap();

        subscription.unsubscribe();
        budget
            .add_transaction(
                &user,
                month(),
                request(10.0, Category::General, TransactionType::Add),
            )
            .unwrap();

        assert_eq!(*kept.lock().unwrap(), vec![0.0, 10.0]);
        assert_eq!(*removed.lock().unwrap(), vec![0.0]);
    }

    #[test]
    fn transaction_subscribers_get_one_call_per_change() {
        let budget = budget();
        let user = UserId::new("alice");
        let calls = Arc::new(Mutex::new(Vec::new()));
        let sink = calls.clone();
        let subscription = budget
            .subscribe_to_transactions(&user, month(), move |transactions: &[Transaction]| {
                sink.lock().unwrap().push(transactions.len())
            })
            .unwrap();

        let transaction = budget
            .add_transaction(
                &user,
                month(),
                request(10.0, Category::General, TransactionType::Add),
            )
            .unwrap();
        budget
            .delete_transaction(&user, month(), transaction.id)
            .unwrap();
        subscription.unsubscribe();
        budget
            .add_transaction(
                &user,
                month(),
                request(10.0, Category::General, TransactionType::Add),
            )
            .unwrap();

        assert_eq!(*calls.lock().unwrap(), vec![0, 1, 0]);
    }

    #[test]
    fn report_does_not_create_the_month() {
        let directory = tempfile::tempdir().unwrap();
        let db_path = directory.path().join("budget.db");
        let budget = Budget::new(SqliteLedgerStore::open(&db_path).unwrap());

        let report = budget.report(&UserId::new("alice"), month()).unwrap();

        assert_eq!(report.total_spent, 0.0);
        let connection = Connection::open(&db_path).unwrap();
        let months: i64 = connection
            .query_row("SELECT COUNT(*) FROM month", [], |row| row.get(0))
            .unwrap();
        assert_eq!(months, 0);
    }

    #[test]
    fn deserializes_requests_from_wire_names() {
        let request: TransactionRequest = serde_json::from_value(serde_json::json!({
            "amount": 12.5,
            "category": "homeAXIS",
            "type": "remove",
        }))
        .unwrap();

        assert_eq!(
            request,
            TransactionRequest {
                amount: 12.5,
                category: Category::HomeAxis,
                kind: TransactionType::Remove,
                comment: None,
            }
        );
    }
}
