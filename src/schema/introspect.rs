//! PostgreSQL information_schema reads.

use sqlx::PgPool;

#[derive(Clone, Debug, sqlx::FromRow)]
pub struct ColumnRow {
    pub table_name: String,
    pub column_name: String,
    pub data_type: String,
}

#[derive(Clone, Debug, sqlx::FromRow)]
pub struct KeyRow {
    pub table_name: String,
    pub column_name: String,
    pub constraint_type: String,
    pub foreign_table_name: Option<String>,
    pub foreign_column_name: Option<String>,
}

const COLUMNS_SQL: &str = r#"
SELECT table_name::text AS table_name,
       column_name::text AS column_name,
       data_type::text AS data_type
FROM information_schema.columns
WHERE table_schema = $1
ORDER BY table_name, ordinal_position
"#;

const KEYS_SQL: &str = r#"
SELECT tc.table_name::text AS table_name,
       kcu.column_name::text AS column_name,
       tc.constraint_type::text AS constraint_type,
       ccu.table_name::text AS foreign_table_name,
       ccu.column_name::text AS foreign_column_name
FROM information_schema.table_constraints tc
JOIN information_schema.key_column_usage kcu
  ON kcu.constraint_name = tc.constraint_name AND kcu.table_schema = tc.table_schema
LEFT JOIN information_schema.constraint_column_usage ccu
  ON ccu.constraint_name = tc.constraint_name
 AND ccu.constraint_schema = tc.constraint_schema
 AND tc.constraint_type = 'FOREIGN KEY'
WHERE tc.table_schema = $1
  AND tc.constraint_type IN ('PRIMARY KEY', 'FOREIGN KEY')
ORDER BY tc.table_name, tc.constraint_type DESC, kcu.ordinal_position
"#;

/// Read column types and key constraints for every table of `schema`.
pub async fn introspect(pool: &PgPool, schema: &str) -> Result<(Vec<ColumnRow>, Vec<KeyRow>), sqlx::Error> {
    tracing::debug!(sql = %COLUMNS_SQL.trim(), schema = %schema, "query");
    let columns = sqlx::query_as::<_, ColumnRow>(COLUMNS_SQL)
        .bind(schema)
        .fetch_all(pool)
        .await?;
    tracing::debug!(sql = %KEYS_SQL.trim(), schema = %schema, "query");
    let keys = sqlx::query_as::<_, KeyRow>(KEYS_SQL)
        .bind(schema)
        .fetch_all(pool)
        .await?;
    Ok((columns, keys))
}
