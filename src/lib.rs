//! Budget Ledger keeps monthly expense totals in step with an append-only log
//! of transactions.
//!
//! Each user has one ledger per month: a running aggregate (overall and per
//! [Category]) plus the ordered list of transactions that produced it. The
//! ledger lives in either a durable SQLite database or an in-memory fallback,
//! chosen once at startup, and observers can subscribe to live updates of
//! either half of a ledger.
//!
//! This library also provides a JSON API (with Server-Sent Events for live
//! updates) that exposes the [Budget] facade over HTTP.

#![warn(missing_docs)]

use std::{net::SocketAddr, time::Duration};

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use axum_server::Handle;
use serde_json::json;
use tokio::signal;

mod aggregation;
mod app_state;
mod broker;
mod budget;
mod category;
mod config;
mod db;
mod endpoints;
mod events;
mod handlers;
mod logging;
mod month;
mod report;
mod routing;
mod store;
mod transaction;

pub use aggregation::{MonthAggregate, delta};
pub use app_state::AppState;
pub use broker::{AggregateCallback, Subscription, SubscriptionBroker, TransactionsCallback};
pub use budget::{Budget, TransactionRequest};
pub use category::Category;
pub use config::BackendConfig;
pub use db::initialize as initialize_db;
pub use logging::{LOG_BODY_LENGTH_LIMIT, logging_middleware};
pub use month::{LedgerKey, MonthKey, UserId};
pub use report::{CategoryBreakdown, MonthReport};
pub use routing::build_router;
pub use store::{
    Backend, LedgerSnapshot, LedgerStore, MemoryLedgerStore, SqliteLedgerStore, Store,
};
pub use transaction::{NewTransaction, Transaction, TransactionId, TransactionType};

/// An async task that waits for either the ctrl+c or terminate signal, whichever comes first, and
/// then signals the server to shut down gracefully.
///
/// `handle` is a handle to an Axum `Server`.
pub async fn graceful_shutdown(handle: Handle<SocketAddr>) {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::debug!("Received ctrl+c signal.");
            handle.graceful_shutdown(Some(Duration::from_secs(1)));
        },
        _ = terminate => {
            tracing::debug!("Received terminate signal.");
            handle.graceful_shutdown(Some(Duration::from_secs(1)));
        },
    }
}

/// The errors that may occur in the application.
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum Error {
    /// The durable backend is not configured or could not be opened.
    ///
    /// This is not a per-call failure: it is raised while selecting a backend
    /// at startup and causes the in-memory fallback to be used instead.
    #[error("the durable backend is unavailable: {0}")]
    BackendUnavailable(String),

    /// The requested resource was not found.
    ///
    /// For ledgers this means a transaction ID that is not in the log of the
    /// requested user and month.
    #[error("the requested resource could not be found")]
    NotFound,

    /// A transaction amount was zero, negative or not a finite number.
    #[error("{0} is not a valid amount, amounts must be positive numbers")]
    InvalidAmount(f64),

    /// A month key was not of the form `january-2026`.
    #[error("\"{0}\" is not a valid month, expected a month and year such as \"january-2026\"")]
    InvalidMonthKey(String),

    /// A category name did not match any of the fixed categories.
    #[error("\"{0}\" is not a valid category")]
    InvalidCategory(String),

    /// A transaction type was neither "add" nor "remove".
    #[error("\"{0}\" is not a valid transaction type, expected \"add\" or \"remove\"")]
    InvalidTransactionType(String),

    /// An unhandled/unexpected SQL error.
    #[error("an unexpected SQL error occurred: {0}")]
    SqlError(rusqlite::Error),

    /// Could not acquire the lock guarding a ledger backend.
    #[error("could not acquire the ledger lock")]
    LockError,

    /// A report could not be rendered.
    #[error("could not write the report: {0}")]
    ReportError(String),
}

impl From<rusqlite::Error> for Error {
    fn from(value: rusqlite::Error) -> Self {
        match value {
            rusqlite::Error::QueryReturnedNoRows => Error::NotFound,
            error => {
                tracing::error!("an unhandled SQL error occurred: {}", error);
                Error::SqlError(error)
            }
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = match &self {
            Error::NotFound => StatusCode::NOT_FOUND,
            Error::InvalidAmount(_)
            | Error::InvalidMonthKey(_)
            | Error::InvalidCategory(_)
            | Error::InvalidTransactionType(_) => StatusCode::BAD_REQUEST,
            // Any errors that are not handled above are not intended to be shown to the client.
            _ => {
                tracing::error!("An unexpected error occurred: {}", self);
                return (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(json!({
                        "error": "An unexpected error occurred, check the server logs."
                    })),
                )
                    .into_response();
            }
        };

        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}
