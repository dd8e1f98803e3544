//! Table metadata: keys, links and column types from introspection, plus the
//! static relationships declared constraints cannot express.

mod introspect;

pub use introspect::{introspect, ColumnRow, KeyRow};

use crate::config::SchemaOverrides;
use crate::error::AppError;
use sqlx::PgPool;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::watch;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TableLink {
    pub column: String,
    pub other_table: String,
    pub other_column: String,
}

/// Tri-state numeric detection: `Unknown` until column types are known.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Numeric {
    Yes,
    No,
    Unknown,
}

#[derive(Clone, Debug, Default)]
pub struct TableMetadata {
    pub name: String,
    pub primary_key: Option<String>,
    pub column_types: HashMap<String, String>,
    pub links: Vec<TableLink>,
    pub is_sparse: bool,
    pub is_type_discriminated: bool,
    pub discriminator_column: Option<String>,
}

/// Column pair joining two tables: `left.left_column = right.right_column`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LinkPredicate {
    pub left_column: String,
    pub right_column: String,
}

const NUMERIC_TYPES: &[&str] = &[
    "smallint",
    "integer",
    "bigint",
    "numeric",
    "decimal",
    "real",
    "double precision",
];

pub fn is_numeric_type(data_type: &str) -> bool {
    NUMERIC_TYPES.contains(&data_type.to_lowercase().as_str())
}

/// Immutable after construction; shared behind `Arc`.
#[derive(Clone, Debug, Default)]
pub struct SchemaCatalog {
    tables: HashMap<String, TableMetadata>,
    overrides: SchemaOverrides,
}

impl SchemaCatalog {
    /// Build from introspected rows. Extra links from `overrides` are added to
    /// the table that owns the column.
    pub fn from_rows(columns: Vec<ColumnRow>, keys: Vec<KeyRow>, overrides: SchemaOverrides) -> Self {
        let mut tables: HashMap<String, TableMetadata> = HashMap::new();
        for c in columns {
            tables
                .entry(c.table_name.clone())
                .or_insert_with(|| new_table(&c.table_name, &overrides))
                .column_types
                .insert(c.column_name, c.data_type);
        }
        for k in keys {
            let t = tables
                .entry(k.table_name.clone())
                .or_insert_with(|| new_table(&k.table_name, &overrides));
            match (k.constraint_type.as_str(), k.foreign_table_name, k.foreign_column_name) {
                ("PRIMARY KEY", _, _) => {
                    if t.primary_key.is_none() {
                        t.primary_key = Some(k.column_name);
                    }
                }
                ("FOREIGN KEY", Some(other_table), Some(other_column)) => {
                    let link = TableLink {
                        column: k.column_name,
                        other_table,
                        other_column,
                    };
                    if !t.links.contains(&link) {
                        t.links.push(link);
                    }
                }
                _ => {}
            }
        }
        for extra in &overrides.extra_links {
            let t = tables
                .entry(extra.table.clone())
                .or_insert_with(|| new_table(&extra.table, &overrides));
            let link = TableLink {
                column: extra.column.clone(),
                other_table: extra.other_table.clone(),
                other_column: extra.other_column.clone(),
            };
            if !t.links.contains(&link) {
                t.links.push(link);
            }
        }
        SchemaCatalog { tables, overrides }
    }

    pub fn describe_table(&self, name: &str) -> Option<&TableMetadata> {
        self.tables.get(name)
    }

    pub fn table_count(&self) -> usize {
        self.tables.len()
    }

    pub fn primary_key(&self, table: &str) -> Option<&str> {
        self.tables.get(table).and_then(|t| t.primary_key.as_deref())
    }

    pub fn column_is_numeric(&self, table: &str, column: &str) -> Numeric {
        match self.tables.get(table).and_then(|t| t.column_types.get(column)) {
            Some(ty) if is_numeric_type(ty) => Numeric::Yes,
            Some(_) => Numeric::No,
            None => Numeric::Unknown,
        }
    }

    pub fn is_text_numeric(&self, table: &str, column: &str) -> bool {
        self.overrides
            .text_numeric_columns
            .iter()
            .any(|c| c.table == table && c.column == column)
    }

    pub fn is_sparse(&self, table: &str) -> bool {
        self.overrides.sparse_tables.iter().any(|t| t == table)
    }

    pub fn is_type_table(&self, table: &str) -> bool {
        self.overrides.type_tables.iter().any(|t| t.table == table)
    }

    pub fn discriminator(&self, table: &str) -> Option<&str> {
        self.overrides
            .type_tables
            .iter()
            .find(|t| t.table == table)
            .map(|t| t.discriminator_column.as_str())
    }

    /// Value column of a type table for one discriminator value.
    pub fn type_value_column(&self, table: &str, modifier: &str) -> Option<&str> {
        self.overrides
            .type_tables
            .iter()
            .find(|t| t.table == table)
            .and_then(|t| t.value_columns.get(modifier))
            .map(String::as_str)
    }

    /// Intermediate tables required between `a` and `b`, in either direction.
    pub fn required_links(&self, a: &str, b: &str) -> Option<&[String]> {
        self.overrides
            .required_links
            .iter()
            .find(|r| (r.from == a && r.to == b) || (r.from == b && r.to == a))
            .map(|r| r.via.as_slice())
    }

    fn preferred_column(&self, table: &str, other_table: &str) -> Option<&str> {
        self.overrides
            .preferred_links
            .iter()
            .find(|p| p.table == table && p.other_table == other_table)
            .map(|p| p.column.as_str())
    }

    /// Direct link between two tables, from `a`'s declared links first, then `b`'s.
    /// Where several columns link the same pair, the preferred link wins.
    pub fn link_between(&self, a: &str, b: &str) -> Option<LinkPredicate> {
        if let Some(l) = self.pick_link(a, b) {
            return Some(LinkPredicate {
                left_column: l.column.clone(),
                right_column: l.other_column.clone(),
            });
        }
        self.pick_link(b, a).map(|l| LinkPredicate {
            left_column: l.other_column.clone(),
            right_column: l.column.clone(),
        })
    }

    fn pick_link(&self, from: &str, to: &str) -> Option<&TableLink> {
        let t = self.tables.get(from)?;
        let mut candidates = t.links.iter().filter(|l| l.other_table == to);
        match self.preferred_column(from, to) {
            Some(col) => {
                let all: Vec<&TableLink> = candidates.collect();
                all.iter().find(|l| l.column == col).or(all.first()).copied()
            }
            None => candidates.next(),
        }
    }
}

fn new_table(name: &str, overrides: &SchemaOverrides) -> TableMetadata {
    let type_table = overrides.type_tables.iter().find(|t| t.table == name);
    TableMetadata {
        name: name.to_string(),
        is_sparse: overrides.sparse_tables.iter().any(|t| t == name),
        is_type_discriminated: type_table.is_some(),
        discriminator_column: type_table.map(|t| t.discriminator_column.clone()),
        ..Default::default()
    }
}

/// Publishes the schema catalog once; readers see `None` until it is loaded.
#[derive(Clone)]
pub struct SchemaHandle {
    tx: Arc<watch::Sender<Option<Arc<SchemaCatalog>>>>,
}

impl Default for SchemaHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl SchemaHandle {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(None);
        SchemaHandle { tx: Arc::new(tx) }
    }

    pub fn ready(catalog: SchemaCatalog) -> Self {
        let handle = Self::new();
        handle.publish(catalog);
        handle
    }

    pub fn current(&self) -> Option<Arc<SchemaCatalog>> {
        self.tx.borrow().clone()
    }

    /// Returns false (and keeps the first catalog) when one was already published.
    pub fn publish(&self, catalog: SchemaCatalog) -> bool {
        let catalog = Arc::new(catalog);
        let published = self.tx.send_if_modified(|slot| {
            if slot.is_some() {
                return false;
            }
            *slot = Some(catalog.clone());
            true
        });
        if !published {
            tracing::warn!("schema catalog already published; ignoring reload");
        }
        published
    }

    /// Introspect `db_schema` and publish the result.
    pub async fn load(&self, pool: &PgPool, db_schema: &str, overrides: SchemaOverrides) -> Result<(), AppError> {
        match introspect(pool, db_schema).await {
            Ok((columns, keys)) => {
                let catalog = SchemaCatalog::from_rows(columns, keys, overrides);
                tracing::info!(schema = %db_schema, tables = catalog.table_count(), "schema catalog ready");
                self.publish(catalog);
                Ok(())
            }
            Err(e) => {
                tracing::error!(schema = %db_schema, error = %e, "schema introspection failed");
                Err(e.into())
            }
        }
    }
}
