//! Shared harness for the service integration tests: an in-memory knowledgebase
//! schema, a small catalog config and an executor that records every query.

#![allow(dead_code)]

use async_trait::async_trait;
use biokb_query::config::{from_json_strs, SchemaOverrides};
use biokb_query::schema::{ColumnRow, KeyRow};
use biokb_query::sql::QueryBuf;
use biokb_query::{AppError, Catalogs, QueryExecutor, QuerySettings, SchemaCatalog, SchemaHandle};
use serde_json::Value;
use std::sync::Mutex;

pub const MODELS: &str = r#"[
  {"name": "Target", "kind": "Target", "root_table": "protein", "id_column": "uniprot"}
]"#;

pub const FIELDS: &str = r#"[
  {"model": "Target", "context": "list", "name": "UniProt", "table": "protein", "column": "uniprot", "order": 1},
  {"model": "Target", "context": "list", "name": "Symbol", "table": "protein", "column": "sym", "order": 2},
  {"model": "Target", "context": "list", "name": "Novelty", "table": "tinx_novelty", "column": "score", "alias": "novelty", "value_kind": "numeric", "order": 3},
  {"model": "Target", "context": "facet", "name": "Target Development Level", "table": "target", "column": "tdl", "order": 1},
  {"model": "Target", "context": "facet", "name": "Family", "table": "target", "column": "fam", "order": 2},
  {"model": "Target", "context": "overlap", "name": "GO Process", "table": "goa", "column": "go_term"}
]"#;

pub fn col(table: &str, column: &str, ty: &str) -> ColumnRow {
    ColumnRow {
        table_name: table.into(),
        column_name: column.into(),
        data_type: ty.into(),
    }
}

pub fn key(table: &str, column: &str, foreign: Option<(&str, &str)>) -> KeyRow {
    KeyRow {
        table_name: table.into(),
        column_name: column.into(),
        constraint_type: if foreign.is_some() { "FOREIGN KEY" } else { "PRIMARY KEY" }.into(),
        foreign_table_name: foreign.map(|f| f.0.into()),
        foreign_column_name: foreign.map(|f| f.1.into()),
    }
}

pub fn schema() -> SchemaCatalog {
    SchemaCatalog::from_rows(
        vec![
            col("protein", "id", "integer"),
            col("protein", "uniprot", "character varying"),
            col("protein", "sym", "character varying"),
            col("target", "id", "integer"),
            col("target", "tdl", "character varying"),
            col("target", "fam", "character varying"),
            col("tinx_novelty", "score", "double precision"),
            col("goa", "go_term", "text"),
        ],
        vec![
            key("protein", "id", None),
            key("target", "id", None),
            key("tinx_novelty", "protein_id", Some(("protein", "id"))),
            key("goa", "protein_id", Some(("protein", "id"))),
        ],
        SchemaOverrides::knowledgebase_defaults(),
    )
}

pub fn catalogs() -> Catalogs {
    let config = from_json_strs(MODELS, FIELDS, None).expect("test config parses");
    Catalogs::build(SchemaHandle::ready(schema()), &config, QuerySettings::default())
}

/// Answers each query with the rows of the first rule whose pattern occurs in
/// the SQL text, and remembers every query it saw.
pub struct RecordingExecutor {
    rules: Vec<(&'static str, Vec<Value>)>,
    fallback: Vec<Value>,
    seen: Mutex<Vec<QueryBuf>>,
}

impl RecordingExecutor {
    pub fn new(fallback: Vec<Value>) -> Self {
        RecordingExecutor {
            rules: Vec::new(),
            fallback,
            seen: Mutex::new(Vec::new()),
        }
    }

    pub fn when(mut self, pattern: &'static str, rows: Vec<Value>) -> Self {
        self.rules.push((pattern, rows));
        self
    }

    pub fn seen(&self) -> Vec<QueryBuf> {
        self.seen.lock().unwrap().clone()
    }
}

#[async_trait]
impl QueryExecutor for RecordingExecutor {
    async fn fetch_all(&self, query: &QueryBuf) -> Result<Vec<Value>, AppError> {
        self.seen.lock().unwrap().push(query.clone());
        let rows = self
            .rules
            .iter()
            .find(|(pattern, _)| query.sql.contains(pattern))
            .map(|(_, rows)| rows.clone())
            .unwrap_or_else(|| self.fallback.clone());
        Ok(rows)
    }
}
