//! Shared-value overlap and Jaccard index between a base entity and every
//! other entity of the same model, over one multi-valued facet.

use crate::catalog::FieldDescriptor;
use crate::compose::{single_field, QueryComposer};
use crate::schema::SchemaCatalog;
use crate::sql::{column_ref, Fragment, SelectQuery};
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;

const OVERLAP_ALIAS: &str = "overlapQuery";
const METRICS_ALIAS: &str = "similarity";

#[derive(Clone, Debug)]
pub struct SimilarityEngine {
    schema: Option<Arc<SchemaCatalog>>,
    root_table: String,
    key_column: String,
    /// Predicate on the root table selecting the base entity.
    match_selector: Fragment,
    facet: Option<FieldDescriptor>,
}

impl SimilarityEngine {
    pub fn new(
        schema: Option<Arc<SchemaCatalog>>,
        root_table: &str,
        key_column: &str,
        match_selector: Fragment,
        facet: Option<FieldDescriptor>,
    ) -> Self {
        SimilarityEngine {
            schema,
            root_table: root_table.to_string(),
            key_column: key_column.to_string(),
            match_selector,
            facet,
        }
    }

    pub fn facet(&self) -> Option<&FieldDescriptor> {
        self.facet.as_ref()
    }

    /// Similarity rows keyed by `entity_id`. With `for_list` false only the
    /// ids are projected. `None` when the facet is not registered for overlap
    /// or cannot be joined.
    pub fn list_query(&self, for_list: bool) -> Option<SelectQuery> {
        let facet = self.facet.as_ref()?;
        let composer = QueryComposer::new(self.schema.as_deref(), &self.root_table, &self.key_column);
        let (source, expr) = match single_field(&composer, facet) {
            Ok(found) => found,
            Err(e) => {
                tracing::warn!(facet = %facet.name, error = %e, "similarity facet cannot be composed");
                return None;
            }
        };
        let key = composer.key_ref();

        let mut base_values = source.clone();
        base_values.set_distinct(true);
        base_values.select(Fragment::raw(expr.clone()), "value");
        base_values.filter(self.match_selector.clone());

        let mut overlap = source.clone();
        overlap.select(Fragment::raw(key.clone()), "testID");
        overlap.select(
            Fragment::raw(format!("string_agg(DISTINCT CAST({} AS text), '|')", expr)),
            "commonOptions",
        );
        overlap.select(Fragment::raw(format!("COUNT(DISTINCT {})", expr)), "overlap");
        let mut in_base = Fragment::raw(format!("{} IN (", expr));
        in_base.append(base_values.to_fragment());
        in_base.push_sql(")");
        overlap.filter(in_base);
        overlap.group_by(&key);

        let test_id = column_ref(OVERLAP_ALIAS, "testID");
        if !for_list {
            let mut q = SelectQuery::from_subquery(&overlap, OVERLAP_ALIAS);
            q.select(Fragment::raw(test_id), "entity_id");
            return Some(q);
        }

        let set_size = |condition: Fragment| {
            let mut q = source.clone();
            q.select(Fragment::raw(format!("COUNT(DISTINCT {})", expr)), "value");
            q.filter(condition);
            q.to_fragment().wrap("(", ")")
        };
        let base_size = set_size(self.match_selector.clone());
        let test_size = set_size(Fragment::raw(format!("{} = {}", key, test_id)));

        let mut metrics = SelectQuery::from_subquery(&overlap, OVERLAP_ALIAS);
        metrics.select(Fragment::raw(test_id), "entity_id");
        metrics.select(Fragment::raw(column_ref(OVERLAP_ALIAS, "overlap")), "overlap");
        metrics.select(Fragment::raw(column_ref(OVERLAP_ALIAS, "commonOptions")), "commonOptions");
        metrics.select(base_size, "baseSize");
        metrics.select(test_size, "testSize");

        let m = |c: &str| column_ref(METRICS_ALIAS, c);
        let mut q = SelectQuery::from_subquery(&metrics, METRICS_ALIAS);
        for c in ["entity_id", "overlap", "commonOptions", "baseSize", "testSize"] {
            q.select(Fragment::raw(m(c)), c);
        }
        q.select(
            Fragment::raw(format!(
                "CAST({} AS double precision) / NULLIF({} + {} - {}, 0)",
                m("overlap"),
                m("baseSize"),
                m("testSize"),
                m("overlap")
            )),
            "jaccard",
        );
        Some(q)
    }

    /// Most similar entities first, for detail views.
    pub fn neighbors_query(&self, top: u64) -> Option<SelectQuery> {
        let mut q = self.list_query(true)?;
        q.order_by(Fragment::raw("\"jaccard\" DESC NULLS LAST"));
        q.order_by(Fragment::raw("\"overlap\" DESC"));
        q.order_by(Fragment::raw("\"entity_id\" ASC"));
        q.set_limit(Some(top));
        Some(q)
    }
}

/// `overlap / (base + test - overlap)`; zero for two empty sets.
pub fn jaccard_index(overlap: u64, base_size: u64, test_size: u64) -> f64 {
    let union = (base_size + test_size).saturating_sub(overlap);
    if union == 0 {
        0.0
    } else {
        overlap as f64 / union as f64
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SimilarityRow {
    #[serde(rename = "entity_id")]
    pub entity_id: Value,
    pub overlap: u64,
    pub base_size: u64,
    pub test_size: u64,
    pub jaccard: f64,
    pub common_options: Vec<String>,
}

impl SimilarityRow {
    pub fn from_json(row: &Value) -> Option<Self> {
        let count = |name: &str| row.get(name).and_then(Value::as_u64).unwrap_or(0);
        let overlap = count("overlap");
        let base_size = count("baseSize");
        let test_size = count("testSize");
        let jaccard = row
            .get("jaccard")
            .and_then(Value::as_f64)
            .unwrap_or_else(|| jaccard_index(overlap, base_size, test_size));
        let common_options = row
            .get("commonOptions")
            .and_then(Value::as_str)
            .map(|s| s.split('|').filter(|v| !v.is_empty()).map(String::from).collect())
            .unwrap_or_default();
        Some(SimilarityRow {
            entity_id: row.get("entity_id")?.clone(),
            overlap,
            base_size,
            test_size,
            jaccard,
            common_options,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compose::tests::{field, tcrd_schema};
    use crate::sql::BindValue;
    use serde_json::json;

    fn engine(facet: Option<FieldDescriptor>) -> SimilarityEngine {
        SimilarityEngine::new(
            Some(Arc::new(tcrd_schema())),
            "protein",
            "id",
            Fragment::bound("\"protein\".\"sym\" = ?", vec![BindValue::text("DRD2")]),
            facet,
        )
    }

    #[test]
    fn jaccard_of_worked_example() {
        // {A,B,C} vs {B,C,D}
        assert_eq!(jaccard_index(2, 3, 3), 0.5);
        assert_eq!(jaccard_index(3, 3, 3), 1.0);
        assert_eq!(jaccard_index(0, 0, 0), 0.0);
        for (o, b, t) in [(1, 4, 2), (0, 3, 5), (2, 2, 9)] {
            let j = jaccard_index(o, b, t);
            assert!((0.0..=1.0).contains(&j));
            assert!(j < 1.0);
        }
    }

    #[test]
    fn no_overlap_field_means_unavailable() {
        assert!(engine(None).list_query(true).is_none());
        let unreachable = field("GO Process", "nowhere", "term");
        assert!(engine(Some(unreachable)).list_query(false).is_none());
    }

    #[test]
    fn list_query_projects_metrics() {
        let q = engine(Some(field("GO Process", "goa", "go_term"))).list_query(true).unwrap().build();
        assert!(q.sql.contains("string_agg(DISTINCT CAST(\"goa\".\"go_term\" AS text), '|') AS \"commonOptions\""));
        assert!(q.sql.contains("\"protein\".\"id\" = \"overlapQuery\".\"testID\""));
        assert!(q.sql.contains(
            "CAST(\"similarity\".\"overlap\" AS double precision) / NULLIF(\"similarity\".\"baseSize\" + \"similarity\".\"testSize\" - \"similarity\".\"overlap\", 0) AS \"jaccard\""
        ));
        // Base value set, then the base size subquery.
        assert_eq!(q.params, vec![BindValue::text("DRD2"), BindValue::text("DRD2")]);
    }

    #[test]
    fn id_query_projects_only_ids() {
        let q = engine(Some(field("GO Process", "goa", "go_term"))).list_query(false).unwrap().build();
        assert!(q.sql.starts_with("SELECT \"overlapQuery\".\"testID\" AS \"entity_id\" FROM (SELECT"));
        assert!(!q.sql.contains("jaccard"));
        assert_eq!(q.params.len(), 1);
    }

    #[test]
    fn parses_rows() {
        let row = SimilarityRow::from_json(&json!({
            "entity_id": 7, "overlap": 2, "baseSize": 3, "testSize": 3, "commonOptions": "B|C"
        }))
        .unwrap();
        assert_eq!(row.jaccard, 0.5);
        assert_eq!(row.common_options, vec!["B", "C"]);
        assert!(SimilarityRow::from_json(&json!({"overlap": 1})).is_none());
    }
}
