//! Typed errors for config loading, query composition and execution.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("missing reference: {kind} '{id}'")]
    MissingReference { kind: &'static str, id: String },
    #[error("no primary key: table {table}")]
    InvalidPrimaryKey { table: String },
    #[error("duplicate model: {0}")]
    DuplicateModel(String),
    #[error("config load: {0}")]
    Load(String),
    #[error("validation: {0}")]
    Validation(String),
}

/// Composition-time failures. All of them are recoverable: the caller drops
/// the offending field or constraint and keeps composing.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CompositionError {
    #[error("unknown field '{name}' for model {model}")]
    UnknownField { model: String, name: String },
    #[error("no join path from {root} to {table} (field '{field}')")]
    NoJoinPath {
        root: String,
        table: String,
        field: String,
    },
    #[error("field '{field}' on type table {table} has no type modifier")]
    MissingTypeModifier { table: String, field: String },
    #[error("schema catalog not loaded")]
    SchemaUnavailable,
    #[error("{0}")]
    Unsupported(String),
}

#[derive(Error, Debug)]
pub enum AppError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Composition(#[from] CompositionError),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("bad request: {0}")]
    BadRequest(String),
    #[error("database: {0}")]
    Db(#[from] sqlx::Error),
}

impl AppError {
    /// Short machine-readable code for the transport layer.
    pub fn code(&self) -> &'static str {
        match self {
            AppError::Config(_) => "config_error",
            AppError::Composition(_) => "composition_error",
            AppError::NotFound(_) => "not_found",
            AppError::BadRequest(_) => "bad_request",
            AppError::Db(sqlx::Error::RowNotFound) => "not_found",
            AppError::Db(_) => "database_error",
        }
    }
}
