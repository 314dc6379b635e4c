//! The API endpoints URIs.
//!
//! For endpoints that take parameters, e.g., '/api/users/{user_id}', use [format_endpoint].

/// The route for checking the server is up and which backend it uses.
pub const HEALTH: &str = "/api/health";
/// The route to a user's month: its totals.
pub const MONTH: &str = "/api/users/{user_id}/months/{month_key}";
/// The route for live updates of a month's totals.
pub const MONTH_EVENTS: &str = "/api/users/{user_id}/months/{month_key}/events";
/// The route to a month's transactions.
pub const TRANSACTIONS: &str = "/api/users/{user_id}/months/{month_key}/transactions";
/// The route for live updates of a month's transactions.
pub const TRANSACTION_EVENTS: &str = "/api/users/{user_id}/months/{month_key}/transactions/events";
/// The route to a single transaction.
pub const TRANSACTION: &str =
    "/api/users/{user_id}/months/{month_key}/transactions/{transaction_id}";
/// The route for a month's export summary.
pub const REPORT: &str = "/api/users/{user_id}/months/{month_key}/report";
/// The route for a month's transactions as a CSV file.
pub const REPORT_CSV: &str = "/api/users/{user_id}/months/{month_key}/report.csv";

/// Replace the parameters in `endpoint_path` with their values in `params`.
///
/// A parameter is a name wrapped in braces, for example, in the endpoint path
/// '/users/{user_id}', '{user_id}' is the parameter `user_id`.
/// Parameters without a value in `params` are left as is.
pub fn format_endpoint(endpoint_path: &str, params: &[(&str, &str)]) -> String {
    params
        .iter()
        .fold(endpoint_path.to_owned(), |path, (name, value)| {
            path.replace(&format!("{{{name}}}"), value)
        })
}
