//! Route handlers for the JSON API.

use axum::{
    Json,
    extract::{Path, State},
    http::{
        HeaderValue, StatusCode,
        header::{CONTENT_DISPOSITION, CONTENT_TYPE, LOCATION},
    },
    response::{IntoResponse, Response},
};
use serde::Deserialize;
use serde_json::json;

use crate::{
    Error,
    aggregation::MonthAggregate,
    budget::{Budget, TransactionRequest},
    endpoints::{self, format_endpoint},
    month::{MonthKey, UserId},
    report::MonthReport,
    store::Store,
    transaction::{Transaction, TransactionId},
};

/// The path parameters that name a ledger.
#[derive(Debug, Deserialize)]
pub(crate) struct MonthPath {
    user_id: String,
    month_key: String,
}

impl MonthPath {
    /// Validate the parameters into a user ID and month.
    pub(crate) fn parse(self) -> Result<(UserId, MonthKey), Error> {
        let month = self.month_key.parse()?;

        Ok((UserId::new(self.user_id), month))
    }
}

/// The path parameters that name a transaction in a ledger.
#[derive(Debug, Deserialize)]
pub(crate) struct TransactionPath {
    user_id: String,
    month_key: String,
    transaction_id: TransactionId,
}

/// The body of a request to record a transaction.
///
/// Category and type are read as plain strings so that unknown names are
/// reported with the same errors as every other invalid input.
#[derive(Debug, Deserialize)]
pub(crate) struct TransactionBody {
    amount: f64,
    category: String,
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    comment: Option<String>,
}

impl TryFrom<TransactionBody> for TransactionRequest {
    type Error = Error;

    fn try_from(body: TransactionBody) -> Result<Self, Self::Error> {
        Ok(TransactionRequest {
            amount: body.amount,
            category: body.category.parse()?,
            kind: body.kind.parse()?,
            comment: body.comment,
        })
    }
}

/// Report that the server is up and which backend it is using.
pub async fn get_health(State(budget): State<Budget<Store>>) -> Response {
    Json(json!({
        "status": "ok",
        "backend": budget.store().backend(),
    }))
    .into_response()
}

/// A route handler that returns the totals for a month, creating the month if needed.
pub async fn put_month(
    State(budget): State<Budget<Store>>,
    Path(path): Path<MonthPath>,
) -> Result<Json<MonthAggregate>, Error> {
    let (user_id, month) = path.parse()?;

    budget.get_or_create_month(&user_id, month).map(Json)
}

/// A route handler that lists a month's transactions, newest first.
pub async fn get_transactions(
    State(budget): State<Budget<Store>>,
    Path(path): Path<MonthPath>,
) -> Result<Json<Vec<Transaction>>, Error> {
    let (user_id, month) = path.parse()?;

    budget.transactions(&user_id, month).map(Json)
}

/// A route handler for recording a transaction.
///
/// Responds with `201 Created`, the new transaction and its location.
pub async fn create_transaction(
    State(budget): State<Budget<Store>>,
    Path(path): Path<MonthPath>,
    Json(body): Json<TransactionBody>,
) -> Result<Response, Error> {
    let (user_id, month) = path.parse()?;
    let request = TransactionRequest::try_from(body)?;

    let transaction = budget.add_transaction(&user_id, month, request)?;

    let location = format_endpoint(
        endpoints::TRANSACTION,
        &[
            ("user_id", user_id.as_str()),
            ("month_key", &month.to_string()),
            ("transaction_id", &transaction.id.to_string()),
        ],
    );
    let mut response = (StatusCode::CREATED, Json(transaction)).into_response();
    if let Ok(location) = HeaderValue::from_str(&location) {
        response.headers_mut().insert(LOCATION, location);
    }

    Ok(response)
}

/// A route handler for deleting a transaction, responds with `204 No Content`.
pub async fn delete_transaction(
    State(budget): State<Budget<Store>>,
    Path(path): Path<TransactionPath>,
) -> Result<StatusCode, Error> {
    let month = path.month_key.parse()?;
    let user_id = UserId::new(path.user_id);

    budget.delete_transaction(&user_id, month, path.transaction_id)?;

    Ok(StatusCode::NO_CONTENT)
}

/// A route handler that returns the export summary of a month.
pub async fn get_report(
    State(budget): State<Budget<Store>>,
    Path(path): Path<MonthPath>,
) -> Result<Json<MonthReport>, Error> {
    let (user_id, month) = path.parse()?;

    budget.report(&user_id, month).map(Json)
}

/// A route handler that returns a month's transactions as a CSV download.
pub async fn get_report_csv(
    State(budget): State<Budget<Store>>,
    Path(path): Path<MonthPath>,
) -> Result<Response, Error> {
    let (user_id, month) = path.parse()?;
    let csv = budget.report(&user_id, month)?.to_csv()?;

    Ok((
        [
            (CONTENT_TYPE, "text/csv; charset=utf-8".to_owned()),
            (
                CONTENT_DISPOSITION,
                format!("attachment; filename=\"budget-{month}.csv\""),
            ),
        ],
        csv,
    )
        .into_response())
}

/// The fallback for unknown routes.
pub async fn get_404_not_found() -> Response {
    Error::NotFound.into_response()
}
