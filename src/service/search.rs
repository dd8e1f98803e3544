//! Free-text relevance, consumed as an opaque `{entity_id, score}` subquery.

use crate::catalog::RequestScope;
use crate::sql::{column_ref, BindValue, Fragment, SelectQuery};

pub trait TextSearch: Send + Sync {
    /// One row per matching root entity: `entity_id` and a relevance `score`.
    fn scored_query(&self, scope: &RequestScope, term: &str) -> SelectQuery;
}

/// PostgreSQL full-text search over the model's search columns.
#[derive(Clone, Debug, Default)]
pub struct PgTextSearch {
    pub config: Option<String>,
}

impl PgTextSearch {
    fn config(&self) -> &str {
        self.config.as_deref().unwrap_or("english")
    }
}

impl TextSearch for PgTextSearch {
    fn scored_query(&self, scope: &RequestScope, term: &str) -> SelectQuery {
        let columns: Vec<String> = scope
            .kind
            .search_columns()
            .iter()
            .map(|c| column_ref(&scope.root_table, c))
            .collect();
        let config = self.config().replace('\'', "''");
        let document = format!("to_tsvector('{}', concat_ws(' ', {}))", config, columns.join(", "));
        let query = format!("websearch_to_tsquery('{}', ?)", config);

        let mut q = SelectQuery::from_table(&scope.root_table);
        q.select(Fragment::raw(column_ref(&scope.root_table, &scope.key_column)), "entity_id");
        q.select(
            Fragment::bound(format!("ts_rank({}, {})", document, query), vec![BindValue::text(term)]),
            "score",
        );
        q.filter(Fragment::bound(format!("{} @@ {}", document, query), vec![BindValue::text(term)]));
        q
    }
}
