//! Controller-level tests against the in-memory store: CRUD lifecycle, soft delete,
//! exhaustive validation and relation transactions.

mod common;

use std::collections::HashSet;
use std::sync::Arc;

use assert_matches::assert_matches;
use serde_json::{json, Value};
use uuid::Uuid;

use catalog_api::model::{Category, Genre, Video, CATEGORIES, VIDEOS};
use catalog_api::store::{EntityStore, MemoryStore};
use catalog_api::validation::RuleKind;
use catalog_api::{AppError, CrudController, RelationController, ResourceController};
use common::{count_rows, forced_failure, input, FailingStore};

struct Fixture {
    store: MemoryStore,
    categories: CrudController<Category>,
    genres: CrudController<Genre>,
    videos: RelationController<Video>,
}

fn fixture() -> Fixture {
    let store = MemoryStore::new();
    let shared: Arc<dyn EntityStore> = Arc::new(store.clone());
    Fixture {
        categories: CrudController::for_entity(Arc::clone(&shared)),
        genres: CrudController::for_entity(Arc::clone(&shared)),
        videos: RelationController::for_entity(shared),
        store,
    }
}

fn video_input(categories: &[Uuid], genres: &[Uuid]) -> Value {
    json!({
        "title": "title",
        "description": "description",
        "year_launched": 2010,
        "rating": "L",
        "duration": 90,
        "categories_id": categories.iter().map(Uuid::to_string).collect::<Vec<_>>(),
        "genres_id": genres.iter().map(Uuid::to_string).collect::<Vec<_>>(),
    })
}

async fn category(f: &Fixture, name: &str) -> Uuid {
    f.categories.store(input(json!({ "name": name }))).await.unwrap().id
}

async fn genre(f: &Fixture, name: &str) -> Uuid {
    f.genres.store(input(json!({ "name": name }))).await.unwrap().id
}

fn ids<T>(items: &[T], id: impl Fn(&T) -> Uuid) -> HashSet<Uuid> {
    items.iter().map(id).collect()
}

#[tokio::test]
async fn stored_video_round_trips_with_relations() {
    let f = fixture();
    let c = category(&f, "c").await;
    let g = genre(&f, "g").await;

    let video = f.videos.store(input(video_input(&[c], &[g]))).await.unwrap();
    assert_eq!(video.title, "title");
    assert_eq!(video.year_launched, 2010);
    assert_eq!(video.duration, 90);
    assert_eq!(video.rating, "L");
    assert!(!video.opened);
    assert_eq!(video.deleted_at, None);
    assert_eq!(ids(&video.categories, |c| c.id), HashSet::from([c]));
    assert_eq!(ids(&video.genres, |g| g.id), HashSet::from([g]));

    assert_eq!(f.videos.show(video.id).await.unwrap(), video);
    assert_eq!(f.videos.index(false).await.unwrap(), vec![video]);
}

#[tokio::test]
async fn missing_and_deleted_ids_are_not_found() {
    let f = fixture();
    let unknown = Uuid::new_v4();
    assert_matches!(f.categories.show(unknown).await, Err(AppError::NotFound(_)));
    assert_matches!(
        f.categories.update(input(json!({ "name": "x" })), unknown).await,
        Err(AppError::NotFound(_))
    );
    assert_matches!(f.categories.destroy(unknown).await, Err(AppError::NotFound(_)));

    let c = category(&f, "c").await;
    f.categories.destroy(c).await.unwrap();
    assert_matches!(f.categories.show(c).await, Err(AppError::NotFound(_)));
    assert_matches!(
        f.categories.update(input(json!({ "name": "x" })), c).await,
        Err(AppError::NotFound(_))
    );
    assert_matches!(f.categories.destroy(c).await, Err(AppError::NotFound(_)));
}

#[tokio::test]
async fn validation_reports_every_violated_field() {
    let f = fixture();
    let err = f
        .videos
        .store(input(json!({
            "title": "a".repeat(256),
            "description": "d",
            "year_launched": "s",
            "opened": "s",
            "rating": "X",
            "duration": "s",
            "categories_id": [100],
            "genres_id": "s",
        })))
        .await
        .unwrap_err();
    let errors = assert_matches!(err, AppError::Validation(e) => e);
    assert_eq!(errors.len(), 7);
    assert!(errors.has("title", RuleKind::Max));
    assert!(errors.has("year_launched", RuleKind::DateFormat));
    assert!(errors.has("opened", RuleKind::Boolean));
    assert!(errors.has("rating", RuleKind::In));
    assert!(errors.has("duration", RuleKind::Integer));
    assert!(errors.has("categories_id", RuleKind::Exists));
    assert!(errors.has("genres_id", RuleKind::Array));
    assert_eq!(count_rows(&f.store, &VIDEOS, true).await, 0);
}

#[tokio::test]
async fn destroy_keeps_the_row_for_include_deleted_listing() {
    let f = fixture();
    let c = category(&f, "c").await;
    let g = genre(&f, "g").await;
    let video = f.videos.store(input(video_input(&[c], &[g]))).await.unwrap();

    f.videos.destroy(video.id).await.unwrap();
    assert_matches!(f.videos.show(video.id).await, Err(AppError::NotFound(_)));
    assert!(f.videos.index(false).await.unwrap().is_empty());

    let all = f.videos.index(true).await.unwrap();
    assert_eq!(all.len(), 1);
    assert_eq!(all[0].id, video.id);
    assert!(all[0].deleted_at.is_some());
}

#[tokio::test]
async fn failed_relation_sync_rolls_back_the_base_write() {
    let store = FailingStore::default();
    let shared: Arc<dyn EntityStore> = Arc::new(store.clone());
    let categories = CrudController::<Category>::for_entity(Arc::clone(&shared));
    let genres = CrudController::<Genre>::for_entity(Arc::clone(&shared));
    let videos = RelationController::<Video>::for_entity(shared);

    let c = categories.store(input(json!({ "name": "c" }))).await.unwrap().id;
    let g = genres.store(input(json!({ "name": "g" }))).await.unwrap().id;
    assert_eq!(count_rows(&store.inner, &VIDEOS, true).await, 0);

    let err = videos.store(input(video_input(&[c], &[g]))).await.unwrap_err();
    assert_eq!(err.to_string(), forced_failure().to_string());
    assert_eq!(count_rows(&store.inner, &VIDEOS, true).await, 0);
    assert_eq!(count_rows(&store.inner, &CATEGORIES, true).await, 1);
}

#[tokio::test]
async fn failed_relation_sync_on_update_leaves_video_unchanged() {
    let f = fixture();
    let (a, b) = (category(&f, "a").await, category(&f, "b").await);
    let g = genre(&f, "g").await;
    let video = f.videos.store(input(video_input(&[a], &[g]))).await.unwrap();

    let failing = RelationController::<Video>::for_entity(Arc::new(FailingStore {
        inner: f.store.clone(),
    }));
    let mut changed = video_input(&[b], &[g]);
    changed["title"] = json!("changed");
    let err = failing.update(input(changed), video.id).await.unwrap_err();
    assert_matches!(err, AppError::Db(_));

    let after = f.videos.show(video.id).await.unwrap();
    assert_eq!(after, video);
}

#[tokio::test]
async fn update_replaces_the_full_relation_set() {
    let f = fixture();
    let (a, b, c) = (
        category(&f, "a").await,
        category(&f, "b").await,
        category(&f, "c").await,
    );
    let g = genre(&f, "g").await;
    let video = f.videos.store(input(video_input(&[a, b], &[g]))).await.unwrap();
    assert_eq!(ids(&video.categories, |c| c.id), HashSet::from([a, b]));

    let updated = f
        .videos
        .update(input(video_input(&[b, c], &[g])), video.id)
        .await
        .unwrap();
    assert_eq!(updated.id, video.id);
    assert_eq!(ids(&updated.categories, |c| c.id), HashSet::from([b, c]));
    assert_eq!(ids(&updated.genres, |g| g.id), HashSet::from([g]));

    let shown = f.videos.show(video.id).await.unwrap();
    assert_eq!(ids(&shown.categories, |c| c.id), HashSet::from([b, c]));
}

#[tokio::test]
async fn empty_optional_field_is_stored_as_null() {
    let f = fixture();
    let created = f
        .categories
        .store(input(json!({ "name": "n", "description": "text" })))
        .await
        .unwrap();
    assert_eq!(created.description.as_deref(), Some("text"));

    let updated = f
        .categories
        .update(input(json!({ "name": "n", "description": "" })), created.id)
        .await
        .unwrap();
    assert_eq!(updated.description, None);
    assert_eq!(f.categories.show(created.id).await.unwrap().description, None);
}

#[tokio::test]
async fn soft_deleted_relation_targets_are_rejected_and_hidden() {
    let f = fixture();
    let (a, b) = (category(&f, "a").await, category(&f, "b").await);
    let g = genre(&f, "g").await;
    let video = f.videos.store(input(video_input(&[a, b], &[g]))).await.unwrap();

    f.categories.destroy(a).await.unwrap();
    let shown = f.videos.show(video.id).await.unwrap();
    assert_eq!(ids(&shown.categories, |c| c.id), HashSet::from([b]));

    let err = f.videos.store(input(video_input(&[a], &[g]))).await.unwrap_err();
    let errors = assert_matches!(err, AppError::Validation(e) => e);
    assert!(errors.has("categories_id", RuleKind::Exists));
}
