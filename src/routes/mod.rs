use axum::{
    Router,
    routing::{get, post},
};

use crate::{AppState, middleware::log_failures};

pub mod predict;

// url-checker 服务的全部路由
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(predict::index))
        .route("/health", get(predict::health))
        .route("/predict", post(predict::predict))
        .layer(axum::middleware::from_fn(log_failures))
        .with_state(state)
}
