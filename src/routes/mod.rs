pub mod uploads;

use crate::state::AppState;
use axum::Router;
use std::sync::Arc;

pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .nest("/api/uploads", uploads::router())
        .with_state(state)
}
