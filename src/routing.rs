//! Application router configuration for the JSON API and its event streams.

use axum::{
    Router, middleware,
    routing::{delete, get, put},
};

use crate::{
    AppState, endpoints,
    events::{stream_month_data, stream_transactions},
    handlers::{
        create_transaction, delete_transaction, get_404_not_found, get_health, get_report,
        get_report_csv, get_transactions, put_month,
    },
    logging::logging_middleware,
};

/// Return a router with all the app's routes.
pub fn build_router(state: AppState) -> Router {
    let api_routes = Router::new()
        .route(endpoints::HEALTH, get(get_health))
        .route(endpoints::MONTH, put(put_month))
        .route(
            endpoints::TRANSACTIONS,
            get(get_transactions).post(create_transaction),
        )
        .route(endpoints::TRANSACTION, delete(delete_transaction))
        .route(endpoints::REPORT, get(get_report))
        .route(endpoints::REPORT_CSV, get(get_report_csv))
        .layer(middleware::from_fn(logging_middleware));

    // The logging middleware buffers whole bodies, so event streams must stay outside it.
    let event_routes = Router::new()
        .route(endpoints::MONTH_EVENTS, get(stream_month_data))
        .route(endpoints::TRANSACTION_EVENTS, get(stream_transactions));

    api_routes
        .merge(event_routes)
        .fallback(get_404_not_found)
        .with_state(state)
}
