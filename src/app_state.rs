//! Implements a struct that holds the state of the JSON API server.

use axum::extract::FromRef;

use crate::{budget::Budget, store::Store};

/// The state of the JSON API server.
#[derive(Debug, Clone)]
pub struct AppState {
    /// The budget facade, backed by whichever store was selected at startup.
    pub budget: Budget<Store>,
}

impl AppState {
    /// Create a new [AppState] that serves ledgers from `store`.
    pub fn new(store: Store) -> Self {
        Self {
            budget: Budget::new(store),
        }
    }
}

// Lets handlers extract the facade directly with `State<Budget<Store>>`.
impl FromRef<AppState> for Budget<Store> {
    fn from_ref(state: &AppState) -> Self {
        state.budget.clone()
    }
}
