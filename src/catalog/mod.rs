//! Field catalog and the startup wiring of all read-only catalogs.

pub mod field;
pub mod registry;

pub use field::{FieldDescriptor, RequestScope, SCOPE_QUERY_ALIAS};
pub use registry::{FieldCatalog, ListContext, ModelInfo, BUCKET, SINGLE_VALUE_FIELDS};

use crate::config::FullConfig;
use crate::schema::SchemaHandle;
use crate::settings::QuerySettings;
use sqlx::PgPool;
use std::sync::Arc;

/// Everything a request reads and never writes.
#[derive(Clone)]
pub struct Catalogs {
    pub schema: SchemaHandle,
    pub fields: Arc<FieldCatalog>,
    pub settings: Arc<QuerySettings>,
}

impl Catalogs {
    /// Two-phase startup: introspect the schema, then build the field catalog
    /// against it. A failed introspection leaves the schema unloaded and
    /// requests degrade to root-only joins and lexical ordering.
    pub async fn initialize(pool: &PgPool, db_schema: &str, config: &FullConfig, settings: QuerySettings) -> Self {
        let schema = SchemaHandle::new();
        // Failure is logged by `load`.
        let _ = schema.load(pool, db_schema, config.schema.clone()).await;
        Self::build(schema, config, settings)
    }

    pub fn build(schema: SchemaHandle, config: &FullConfig, settings: QuerySettings) -> Self {
        let current = schema.current();
        let fields = FieldCatalog::build(config, current.as_deref());
        Catalogs {
            schema,
            fields: Arc::new(fields),
            settings: Arc::new(settings),
        }
    }
}
