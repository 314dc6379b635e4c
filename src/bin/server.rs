use std::{
    net::{IpAddr, SocketAddr},
    path::PathBuf,
};

use axum::{
    Router,
    extract::{MatchedPath, Request},
};
use axum_server::Handle;
use clap::Parser;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{EnvFilter, Layer, layer::SubscriberExt, util::SubscriberInitExt};

use budget_ledger::{AppState, BackendConfig, Store, build_router, graceful_shutdown};

/// The JSON API server for budget_ledger.
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// File path to the SQLite database that holds the ledgers.
    ///
    /// Without a usable database, ledgers are kept in memory and lost on exit.
    #[arg(long, env = "BUDGET_DB_PATH")]
    db_path: Option<PathBuf>,

    /// The address to serve the API from.
    #[arg(short, long, default_value = "127.0.0.1")]
    address: IpAddr,

    /// The port to serve the API from.
    #[arg(short, long, default_value_t = 3000)]
    port: u16,
}

impl From<&Args> for BackendConfig {
    fn from(args: &Args) -> Self {
        Self {
            db_path: args.db_path.clone(),
        }
    }
}

#[tokio::main]
async fn main() {
    setup_logging();

    let args = Args::parse();
    let addr = SocketAddr::new(args.address, args.port);

    let store = Store::select(&BackendConfig::from(&args));
    let state = AppState::new(store);

    let handle = Handle::new();
    tokio::spawn(graceful_shutdown(handle.clone()));

    let router = add_tracing_layer(build_router(state));

    tracing::info!("HTTP server listening on {}", addr);
    axum_server::bind(addr)
        .handle(handle)
        .serve(router.into_make_service())
        .await
        .expect("Could not start the server");
}

fn setup_logging() {
    let stdout_log = tracing_subscriber::fmt::layer().pretty();
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(stdout_log.with_filter(filter))
        .init();
}

fn add_tracing_layer(router: Router) -> Router {
    let tracing_layer = TraceLayer::new_for_http()
        .make_span_with(|req: &Request| {
            let method = req.method();
            let uri = req.uri();

            let matched_path = req
                .extensions()
                .get::<MatchedPath>()
                .map(|matched_path| matched_path.as_str());

            tracing::debug_span!("request", %method, %uri, matched_path)
        })
        // Errors are logged where they are turned into responses.
        .on_failure(());

    router.layer(tracing_layer)
}
