//! Live ledger updates delivered as Server-Sent Events.

use std::{
    convert::Infallible,
    pin::Pin,
    task::{Context, Poll, ready},
    time::Duration,
};

use axum::{
    extract::{Path, State},
    response::sse::{Event, KeepAlive, KeepAliveStream, Sse},
};
use serde::Serialize;
use tokio::sync::watch;
use tokio_stream::{Stream, wrappers::WatchStream};

use crate::{
    Error,
    aggregation::MonthAggregate,
    broker::Subscription,
    budget::Budget,
    handlers::MonthPath,
    month::{MonthKey, UserId},
    store::{LedgerStore, Store},
    transaction::Transaction,
};

/// The SSE event name for month totals.
pub const AGGREGATE_EVENT: &str = "aggregate";
/// The SSE event name for transaction lists.
pub const TRANSACTIONS_EVENT: &str = "transactions";

const KEEP_ALIVE_INTERVAL: Duration = Duration::from_secs(15);

/// Unsubscribes when dropped.
#[derive(Debug)]
struct SubscriptionGuard(Subscription);

impl Drop for SubscriptionGuard {
    fn drop(&mut self) {
        tracing::debug!("Event stream for {} closed", self.0.key());
        self.0.unsubscribe();
    }
}

/// A stream of ledger updates that owns its subscription.
///
/// Only the latest serialized state is kept, so a slow client skips
/// intermediate states instead of buffering them. The subscription ends when
/// the stream is dropped, e.g. when the client disconnects.
pub struct SubscriptionStream {
    name: &'static str,
    latest: WatchStream<Option<String>>,
    _guard: SubscriptionGuard,
}

impl SubscriptionStream {
    fn new(
        name: &'static str,
        receiver: watch::Receiver<Option<String>>,
        subscription: Subscription,
    ) -> Self {
        Self {
            name,
            latest: WatchStream::new(receiver),
            _guard: SubscriptionGuard(subscription),
        }
    }
}

impl Stream for SubscriptionStream {
    type Item = Result<Event, Infallible>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        loop {
            match ready!(Pin::new(&mut self.latest).poll_next(cx)) {
                Some(Some(data)) => {
                    let event = Event::default().event(self.name).data(data);
                    return Poll::Ready(Some(Ok(event)));
                }
                // Nothing has been published yet.
                Some(None) => continue,
                None => return Poll::Ready(None),
            }
        }
    }
}

fn publish_latest<T: Serialize + ?Sized>(
    sender: &watch::Sender<Option<String>>,
    name: &'static str,
    data: &T,
) {
    match serde_json::to_string(data) {
        Ok(json) => {
            sender.send_replace(Some(json));
        }
        Err(error) => tracing::error!("Could not serialize {name} event: {error}"),
    }
}

/// Subscribe to the totals of `user_id`'s `month` as a stream of events.
///
/// The first event carries the current totals.
pub fn month_data_stream<S: LedgerStore>(
    budget: &Budget<S>,
    user_id: &UserId,
    month: MonthKey,
) -> Result<SubscriptionStream, Error> {
    let (sender, receiver) = watch::channel(None);
    let subscription =
        budget.subscribe_to_month_data(user_id, month, move |aggregate: &MonthAggregate| {
            publish_latest(&sender, AGGREGATE_EVENT, aggregate)
        })?;

    Ok(SubscriptionStream::new(AGGREGATE_EVENT, receiver, subscription))
}

/// Subscribe to the transactions of `user_id`'s `month` as a stream of events.
///
/// The first event carries the current transactions, newest first.
pub fn transactions_stream<S: LedgerStore>(
    budget: &Budget<S>,
    user_id: &UserId,
    month: MonthKey,
) -> Result<SubscriptionStream, Error> {
    let (sender, receiver) = watch::channel(None);
    let subscription =
        budget.subscribe_to_transactions(user_id, month, move |transactions: &[Transaction]| {
            publish_latest(&sender, TRANSACTIONS_EVENT, transactions)
        })?;

    Ok(SubscriptionStream::new(TRANSACTIONS_EVENT, receiver, subscription))
}

/// A route handler that streams a month's totals.
pub async fn stream_month_data(
    State(budget): State<Budget<Store>>,
    Path(path): Path<MonthPath>,
) -> Result<Sse<KeepAliveStream<SubscriptionStream>>, Error> {
    let (user_id, month) = path.parse()?;
    let stream = month_data_stream(&budget, &user_id, month)?;

    Ok(Sse::new(stream).keep_alive(KeepAlive::new().interval(KEEP_ALIVE_INTERVAL)))
}

/// A route handler that streams a month's transactions.
pub async fn stream_transactions(
    State(budget): State<Budget<Store>>,
    Path(path): Path<MonthPath>,
) -> Result<Sse<KeepAliveStream<SubscriptionStream>>, Error> {
    let (user_id, month) = path.parse()?;
    let stream = transactions_stream(&budget, &user_id, month)?;

    Ok(Sse::new(stream).keep_alive(KeepAlive::new().interval(KEEP_ALIVE_INTERVAL)))
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio_stream::StreamExt;

    use crate::{
        Budget, Category, LedgerKey, MemoryLedgerStore, MonthKey, TransactionRequest,
        TransactionType, UserId,
    };

    use super::{month_data_stream, transactions_stream};

    fn month() -> MonthKey {
        "january-2026".parse().unwrap()
    }

    fn request() -> TransactionRequest {
        TransactionRequest {
            amount: 10.0,
            category: Category::General,
            kind: TransactionType::Add,
            comment: None,
        }
    }

    #[tokio::test]
    async fn month_data_stream_starts_with_current_totals() {
        let budget = Budget::new(MemoryLedgerStore::new());
        let user = UserId::new("alice");

        let mut stream = month_data_stream(&budget, &user, month()).unwrap();

        assert!(matches!(stream.next().await, Some(Ok(_))));
    }

    #[tokio::test]
    async fn month_data_stream_receives_changes() {
        let budget = Budget::new(MemoryLedgerStore::new());
        let user = UserId::new("alice");
        let mut stream = month_data_stream(&budget, &user, month()).unwrap();
        stream.next().await;

        budget.add_transaction(&user, month(), request()).unwrap();

        assert!(matches!(stream.next().await, Some(Ok(_))));
    }

    #[tokio::test]
    async fn slow_readers_only_see_the_latest_state() {
        let budget = Budget::new(MemoryLedgerStore::new());
        let user = UserId::new("alice");
        let mut stream = month_data_stream(&budget, &user, month()).unwrap();

        for _ in 0..3 {
            budget.add_transaction(&user, month(), request()).unwrap();
        }

        assert!(matches!(stream.next().await, Some(Ok(_))));
        let next = tokio::time::timeout(Duration::from_millis(50), stream.next()).await;
        assert!(next.is_err(), "intermediate states should have been skipped");
    }

    #[tokio::test]
    async fn dropping_the_stream_unsubscribes() {
        let budget = Budget::new(MemoryLedgerStore::new());
        let user = UserId::new("alice");
        let key = LedgerKey::new(user.clone(), month());

        let aggregates = month_data_stream(&budget, &user, month()).unwrap();
        let transactions = transactions_stream(&budget, &user, month()).unwrap();
        assert_eq!(budget.store().broker().subscriber_count(&key), 2);

        drop(aggregates);
        drop(transactions);

        assert_eq!(budget.store().broker().subscriber_count(&key), 0);
        budget.add_transaction(&user, month(), request()).unwrap();
    }
}
