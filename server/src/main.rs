//! Catalog server: reads settings, prepares the store, serves the catalog API.
//!
//! Run from repo root: `cargo run -p catalog-server`
//! `DATABASE_URL` selects PostgreSQL; `CATALOG_STORE=memory` runs without a database.

use catalog_api::{
    app, apply_migrations, catalog, ensure_database_exists, schema, AppState, EntityStore,
    MemoryStore, PgStore, Settings, StoreBackend,
};
use std::sync::Arc;
use tokio::net::TcpListener;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                tracing_subscriber::EnvFilter::new("catalog_api=info,catalog_server=info")
            }),
        )
        .init();

    let settings = Settings::from_env()?;
    let tables = catalog();
    schema::validate(&tables)?;

    let store: Arc<dyn EntityStore> = match &settings.store {
        StoreBackend::Postgres { database_url } => {
            ensure_database_exists(database_url).await?;
            let pool = sqlx::postgres::PgPoolOptions::new()
                .max_connections(settings.max_connections)
                .connect(database_url)
                .await?;
            apply_migrations(&pool, &settings.schema, &tables).await?;
            tracing::info!(schema = %settings.schema, "using postgres store");
            Arc::new(PgStore::new(pool, settings.schema.clone()))
        }
        StoreBackend::Memory => {
            tracing::info!("using in-memory store; data is lost on exit");
            Arc::new(MemoryStore::new())
        }
    };

    let router = app(AppState::new(store));
    let listener = TcpListener::bind(settings.bind_addr).await?;
    tracing::info!("Catalog API listening on http://{}", listener.local_addr()?);
    axum::serve(listener, router).await?;
    Ok(())
}
