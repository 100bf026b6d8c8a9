//! Catalog resource routes: one index/show/store/update/destroy set per controller.

use crate::controller::ResourceController;
use crate::handlers::resource::{destroy, index, show, store, update};
use crate::state::AppState;
use axum::{routing::get, Router};
use std::sync::Arc;

/// `/` (GET list, POST create) and `/:id` (GET, PUT, PATCH, DELETE) for one resource.
pub fn resource_routes<C: ResourceController>(controller: Arc<C>) -> Router {
    Router::new()
        .route("/", get(index::<C>).post(store::<C>))
        .route(
            "/:id",
            get(show::<C>)
                .put(update::<C>)
                .patch(update::<C>)
                .delete(destroy::<C>),
        )
        .with_state(controller)
}

pub fn catalog_routes(state: &AppState) -> Router {
    Router::new()
        .nest("/categories", resource_routes(Arc::clone(&state.categories)))
        .nest("/genres", resource_routes(Arc::clone(&state.genres)))
        .nest("/videos", resource_routes(Arc::clone(&state.videos)))
}
