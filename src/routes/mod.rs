//! Router assembly.

mod catalog;
mod common;

pub use catalog::{catalog_routes, resource_routes};
pub use common::common_routes;

use crate::state::AppState;
use axum::Router;
use tower::ServiceBuilder;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;

/// Maximum accepted request body.
pub const BODY_LIMIT_BYTES: usize = 1024 * 1024;

/// Full application: common routes at the root, catalog resources under `/api`.
pub fn app(state: AppState) -> Router {
    Router::new()
        .merge(common_routes(state.store.clone()))
        .nest("/api", catalog_routes(&state))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(RequestBodyLimitLayer::new(BODY_LIMIT_BYTES)),
        )
}
