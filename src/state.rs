//! Shared application state for all routes: the store and one controller per resource.

use crate::controller::{CrudController, RelationController};
use crate::model::{Category, Genre, Video};
use crate::store::EntityStore;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn EntityStore>,
    pub categories: Arc<CrudController<Category>>,
    pub genres: Arc<CrudController<Genre>>,
    pub videos: Arc<RelationController<Video>>,
}

impl AppState {
    pub fn new(store: Arc<dyn EntityStore>) -> Self {
        AppState {
            categories: Arc::new(CrudController::for_entity(Arc::clone(&store))),
            genres: Arc::new(CrudController::for_entity(Arc::clone(&store))),
            videos: Arc::new(RelationController::for_entity(Arc::clone(&store))),
            store,
        }
    }
}
