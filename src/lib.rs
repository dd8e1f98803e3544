//! biokb-query: metadata-driven list, facet and similarity query composition
//! for a biomedical knowledgebase.

pub mod catalog;
pub mod compose;
pub mod config;
pub mod error;
pub mod hierarchy;
pub mod list;
pub mod response;
pub mod schema;
pub mod service;
pub mod settings;
pub mod similarity;
pub mod sql;
pub mod state;

pub use catalog::{Catalogs, FieldCatalog, FieldDescriptor};
pub use config::{load_from_dir, load_from_pool, FullConfig, ModelKind};
pub use error::{AppError, CompositionError, ConfigError};
pub use list::{ListOrchestrator, ListRequest};
pub use response::{FacetResult, ListResult};
pub use schema::{SchemaCatalog, SchemaHandle};
pub use service::{DetailService, ListService, PgExecutor, PgTextSearch, QueryExecutor, TextSearch};
pub use settings::{QuerySettings, Settings};
pub use state::AppState;
