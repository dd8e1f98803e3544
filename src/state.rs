//! Shared application state: pool, catalogs and the execution collaborators.

use crate::catalog::Catalogs;
use crate::config::{load_from_dir, load_from_pool};
use crate::error::AppError;
use crate::service::{PgExecutor, PgTextSearch, QueryExecutor, TextSearch};
use crate::settings::Settings;
use sqlx::PgPool;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub catalogs: Catalogs,
    pub search: Arc<dyn TextSearch>,
    pub executor: Arc<dyn QueryExecutor>,
}

impl AppState {
    /// Connect, load the catalog config (directory or registry tables), then
    /// introspect the schema and build the field catalog.
    pub async fn connect(settings: &Settings) -> Result<Self, AppError> {
        let pool = sqlx::postgres::PgPoolOptions::new()
            .max_connections(settings.max_connections)
            .connect(&settings.database_url)
            .await?;
        let config = match &settings.config_path {
            Some(dir) => load_from_dir(dir).await?,
            None => load_from_pool(&pool, &settings.db_schema).await?,
        };
        let catalogs = Catalogs::initialize(&pool, &settings.db_schema, &config, settings.query.clone()).await;
        Ok(AppState {
            executor: Arc::new(PgExecutor::new(pool.clone())),
            search: Arc::new(PgTextSearch::default()),
            pool,
            catalogs,
        })
    }
}
