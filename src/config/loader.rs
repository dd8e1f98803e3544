//! Load catalog config from a directory of JSON files or from registry tables in DB.

use crate::config::types::*;
use crate::config::{validate, FullConfig};
use crate::error::ConfigError;
use serde::de::DeserializeOwned;
use sqlx::PgPool;
use std::path::Path;

const MODELS_FILE: &str = "models.json";
const FIELDS_FILE: &str = "fields.json";
const OVERRIDES_FILE: &str = "schema_overrides.json";

/// Load `models.json`, `fields.json` and (optionally) `schema_overrides.json`
/// from `dir`. Missing overrides fall back to the knowledgebase defaults.
pub async fn load_from_dir(dir: &Path) -> Result<FullConfig, ConfigError> {
    let models: Vec<ModelConfig> = read_json(&dir.join(MODELS_FILE)).await?;
    let fields: Vec<FieldConfig> = read_json(&dir.join(FIELDS_FILE)).await?;
    let overrides_path = dir.join(OVERRIDES_FILE);
    let schema = if tokio::fs::try_exists(&overrides_path).await.unwrap_or(false) {
        read_json(&overrides_path).await?
    } else {
        SchemaOverrides::knowledgebase_defaults()
    };
    let config = FullConfig { models, fields, schema };
    validate(&config)?;
    tracing::info!(
        dir = %dir.display(),
        models = config.models.len(),
        fields = config.fields.len(),
        "catalog config loaded"
    );
    Ok(config)
}

async fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T, ConfigError> {
    let bytes = tokio::fs::read(path)
        .await
        .map_err(|e| ConfigError::Load(format!("{}: {}", path.display(), e)))?;
    serde_json::from_slice(&bytes).map_err(|e| ConfigError::Load(format!("{}: {}", path.display(), e)))
}

/// Parse a config from JSON strings; used by tests and embedded configs.
pub fn from_json_strs(models: &str, fields: &str, overrides: Option<&str>) -> Result<FullConfig, ConfigError> {
    let models: Vec<ModelConfig> = serde_json::from_str(models).map_err(|e| ConfigError::Load(e.to_string()))?;
    let fields: Vec<FieldConfig> = serde_json::from_str(fields).map_err(|e| ConfigError::Load(e.to_string()))?;
    let schema = match overrides {
        Some(s) => serde_json::from_str(s).map_err(|e| ConfigError::Load(e.to_string()))?,
        None => SchemaOverrides::knowledgebase_defaults(),
    };
    let config = FullConfig { models, fields, schema };
    validate(&config)?;
    Ok(config)
}

/// Load config from `<schema>.kb_models`, `<schema>.kb_fields` and
/// `<schema>.kb_schema_overrides`, each a `payload JSONB` table ordered by `id`.
pub async fn load_from_pool(pool: &PgPool, schema: &str) -> Result<FullConfig, ConfigError> {
    let models = load_config_table::<ModelConfig>(pool, &format!("{}.kb_models", schema)).await?;
    let fields = load_config_table::<FieldConfig>(pool, &format!("{}.kb_fields", schema)).await?;
    let overrides = load_config_table::<SchemaOverrides>(pool, &format!("{}.kb_schema_overrides", schema)).await?;
    let schema = overrides
        .into_iter()
        .next()
        .unwrap_or_else(SchemaOverrides::knowledgebase_defaults);

    let config = FullConfig { models, fields, schema };
    validate(&config)?;
    Ok(config)
}

async fn load_config_table<T>(pool: &PgPool, table: &str) -> Result<Vec<T>, ConfigError>
where
    T: for<'de> serde::Deserialize<'de>,
{
    let sql = format!("SELECT payload FROM {} ORDER BY id", table);
    tracing::debug!(sql = %sql, "query");
    let rows = sqlx::query_scalar::<_, serde_json::Value>(&sql)
        .fetch_all(pool)
        .await
        .map_err(|e| ConfigError::Load(e.to_string()))?;

    let mut out = Vec::with_capacity(rows.len());
    for row in rows {
        let value: T = serde_json::from_value(row).map_err(|e| ConfigError::Load(e.to_string()))?;
        out.push(value);
    }
    Ok(out)
}
