//! Join-path composition: from a root table and a set of fields to one SELECT.

pub mod facet;

pub use facet::{constraint_query, count_query, NumericRange};
pub(crate) use facet::single_field;

use crate::catalog::{FieldDescriptor, SCOPE_QUERY_ALIAS};
use crate::error::CompositionError;
use crate::schema::{Numeric, SchemaCatalog};
use crate::sql::{column_ref, BindValue, Fragment, JoinKind, SelectQuery, SortDirection};
use std::collections::HashMap;

/// One joined table in a plan.
#[derive(Clone, Debug)]
pub struct JoinStep {
    pub table: String,
    pub alias: String,
    pub kind: JoinKind,
    pub on: Fragment,
}

/// Joins needed for a field set, in placement order, plus where each field reads from.
#[derive(Clone, Debug, Default)]
pub struct JoinPlan {
    pub steps: Vec<JoinStep>,
    /// (field name, source alias or the reason it was dropped)
    pub placements: Vec<(String, Result<String, CompositionError>)>,
    /// Extra WHERE predicates from fields on inner-joined or root tables.
    pub filters: Vec<Fragment>,
}

impl JoinPlan {
    pub fn alias_of(&self, field: &str) -> Option<&str> {
        self.placements
            .iter()
            .find(|(name, _)| name == field)
            .and_then(|(_, r)| r.as_ref().ok())
            .map(String::as_str)
    }
}

/// A projected field of a composed query.
#[derive(Clone, Debug, PartialEq)]
pub struct ComposedColumn {
    pub field: String,
    pub alias: String,
    pub source: String,
    /// Expression before aggregation.
    pub expr: String,
    /// Expression as projected (aggregated when the field aggregates or is collapsed).
    pub projected: String,
    pub aggregated: bool,
}

#[derive(Clone, Debug)]
pub struct ComposedQuery {
    pub query: SelectQuery,
    pub columns: Vec<ComposedColumn>,
    pub grouped: bool,
    pub dropped: Vec<CompositionError>,
}

impl ComposedQuery {
    pub fn column(&self, field: &str) -> Option<&ComposedColumn> {
        self.columns.iter().find(|c| c.field == field)
    }

    pub fn has_table(&self, alias: &str) -> bool {
        self.query.has_source(alias)
    }

    pub fn has_aggregates(&self) -> bool {
        self.columns.iter().any(|c| c.aggregated)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum SortKind {
    Numeric,
    TextNumeric,
    Lexical,
}

pub struct QueryComposer<'a> {
    schema: Option<&'a SchemaCatalog>,
    root_table: String,
    key_column: String,
    table_filters: HashMap<String, Fragment>,
    negate_numeric_ascending: bool,
}

struct Planner<'c, 'a> {
    composer: &'c QueryComposer<'a>,
    plan: JoinPlan,
    /// (alias, table), root first
    placed: Vec<(String, String)>,
    /// (table, modifier, alias)
    type_aliases: Vec<(String, String, String)>,
    /// (table, where clause, alias) of sparse joins private to a filtered field
    filtered_aliases: Vec<(String, String, String)>,
}

impl<'a> QueryComposer<'a> {
    pub fn new(schema: Option<&'a SchemaCatalog>, root_table: &str, key_column: &str) -> Self {
        QueryComposer {
            schema,
            root_table: root_table.to_string(),
            key_column: key_column.to_string(),
            table_filters: HashMap::new(),
            negate_numeric_ascending: true,
        }
    }

    /// Predicates added to the ON clause whenever the named table is joined.
    pub fn with_table_filters(mut self, filters: HashMap<String, Fragment>) -> Self {
        self.table_filters = filters;
        self
    }

    pub fn with_negated_ascending(mut self, negate: bool) -> Self {
        self.negate_numeric_ascending = negate;
        self
    }

    pub fn root_table(&self) -> &str {
        &self.root_table
    }

    pub fn schema(&self) -> Option<&'a SchemaCatalog> {
        self.schema
    }

    /// `"root"."key"`
    pub fn key_ref(&self) -> String {
        column_ref(&self.root_table, &self.key_column)
    }

    pub fn plan(&self, fields: &[FieldDescriptor]) -> JoinPlan {
        let mut planner = Planner {
            composer: self,
            plan: JoinPlan::default(),
            placed: vec![(self.root_table.clone(), self.root_table.clone())],
            type_aliases: Vec::new(),
            filtered_aliases: Vec::new(),
        };
        for f in fields {
            let result = planner.place(f);
            if let Err(e) = &result {
                tracing::warn!(field = %f.name, error = %e, "field dropped from query");
            }
            planner.plan.placements.push((f.name.clone(), result));
        }
        planner.plan
    }

    /// One SELECT over the root table projecting every placeable field. With
    /// `grouped` and an aggregated field, the query groups by the root key plus
    /// plain root and scope columns; plain fields from joined tables read as `MIN`.
    pub fn generate_base_query(&self, fields: &[FieldDescriptor], grouped: bool) -> ComposedQuery {
        let plan = self.plan(fields);
        let mut query = SelectQuery::from_table(&self.root_table);
        for step in &plan.steps {
            query.join_table(step.kind, &step.table, &step.alias, step.on.clone());
        }
        for f in &plan.filters {
            query.filter(f.clone());
        }

        let grouped = grouped
            && fields
                .iter()
                .zip(plan.placements.iter())
                .any(|(f, (_, p))| f.aggregation.is_some() && p.is_ok());
        let mut columns = Vec::new();
        let mut dropped = Vec::new();
        for (f, (_, placement)) in fields.iter().zip(plan.placements.iter()) {
            let source = match placement {
                Ok(source) => source,
                Err(e) => {
                    dropped.push(e.clone());
                    continue;
                }
            };
            let Some(expr) = self.field_expression(f, source) else {
                continue;
            };
            // Joined tables may hold several rows per entity; under grouping a
            // plain field from one collapses to a single value.
            let collapse = grouped && f.aggregation.is_none() && source != &self.root_table && !f.from_scope_query;
            let projected = match f.aggregation {
                Some(agg) => agg.apply(&expr),
                None if collapse => format!("MIN({})", expr),
                None => expr.clone(),
            };
            query.select(Fragment::raw(projected.clone()), &f.alias);
            columns.push(ComposedColumn {
                field: f.name.clone(),
                alias: f.alias.clone(),
                source: source.clone(),
                expr,
                projected,
                aggregated: f.aggregation.is_some() || collapse,
            });
        }
        if query.column_count() == 0 {
            query.select(Fragment::raw(self.key_ref()), "id");
        }

        if grouped {
            query.group_by(&self.key_ref());
            for c in columns.iter().filter(|c| !c.aggregated) {
                query.group_by(&c.expr);
            }
        }
        ComposedQuery {
            query,
            columns,
            grouped,
            dropped,
        }
    }

    /// Expression reading `f` from `source`; numeric-typed columns are read as double precision.
    fn field_expression(&self, f: &FieldDescriptor, source: &str) -> Option<String> {
        let expr = f.expression(source, self.schema)?;
        if f.select.is_some() || f.from_scope_query {
            return Some(expr);
        }
        let is_decimal = match (self.schema, f.resolved_column(self.schema)) {
            (Some(s), Some(col)) => s
                .describe_table(&f.table)
                .and_then(|t| t.column_types.get(&col))
                .map(|ty| ty == "numeric")
                .unwrap_or(false),
            _ => false,
        };
        Some(if is_decimal {
            format!("CAST({} AS double precision)", expr)
        } else {
            expr
        })
    }

    fn sort_kind(&self, f: &FieldDescriptor) -> SortKind {
        if f.aggregation == Some(crate::config::Aggregation::Count) || f.is_numeric() {
            return SortKind::Numeric;
        }
        if f.from_scope_query {
            return SortKind::Lexical;
        }
        let (Some(schema), Some(column)) = (self.schema, f.resolved_column(self.schema)) else {
            return SortKind::Lexical;
        };
        if schema.is_text_numeric(&f.table, &column) {
            return SortKind::TextNumeric;
        }
        match schema.column_is_numeric(&f.table, &column) {
            Numeric::Yes => SortKind::Numeric,
            Numeric::No | Numeric::Unknown => SortKind::Lexical,
        }
    }

    /// ORDER BY item for a projected field. Aggregated fields order by the
    /// aggregate. Numeric ascending order is `-(expr) DESC NULLS LAST` unless
    /// negation is turned off.
    pub fn order_fragment(&self, composed: &ComposedQuery, f: &FieldDescriptor, direction: SortDirection) -> Option<Fragment> {
        let col = composed.column(&f.name)?;
        let expr = col.projected.as_str();
        let sql = match self.sort_kind(f) {
            SortKind::Lexical => format!("{} {}", expr, direction.keyword()),
            kind => {
                let e = if kind == SortKind::TextNumeric {
                    format!("CAST(NULLIF(CAST({} AS text), '') AS double precision)", expr)
                } else {
                    expr.to_string()
                };
                match (direction, self.negate_numeric_ascending) {
                    (SortDirection::Asc, true) => format!("-({}) DESC NULLS LAST", e),
                    (SortDirection::Asc, false) => format!("{} ASC NULLS LAST", e),
                    (SortDirection::Desc, _) => format!("{} DESC NULLS LAST", e),
                }
            }
        };
        Some(Fragment::raw(sql))
    }
}

impl<'c, 'a> Planner<'c, 'a> {
    fn place(&mut self, f: &FieldDescriptor) -> Result<String, CompositionError> {
        let composer = self.composer;
        if f.from_scope_query {
            return Ok(SCOPE_QUERY_ALIAS.to_string());
        }
        if f.table == composer.root_table {
            if let Some(w) = f.where_expression(&composer.root_table) {
                self.plan.filters.push(Fragment::raw(w));
            }
            return Ok(composer.root_table.clone());
        }
        let schema = composer.schema.ok_or(CompositionError::SchemaUnavailable)?;

        if schema.is_type_table(&f.table) {
            return self.place_type_table(schema, f);
        }
        if f.select.is_none() && f.resolved_column(Some(schema)).is_none() {
            return Err(CompositionError::Unsupported(format!("field '{}' names no column", f.name)));
        }
        if schema.is_sparse(&f.table) && f.where_clause.is_some() {
            return self.place_filtered_sparse(schema, f);
        }
        if self.kind_of(&f.table).is_some() {
            if let Some(w) = f.where_expression(&f.table) {
                self.plan.filters.push(Fragment::raw(w));
            }
            return Ok(f.table.clone());
        }

        let mut pending: Vec<String> = match schema.required_links(&composer.root_table, &f.table) {
            Some(via) => via.iter().chain(std::iter::once(&f.table)).cloned().collect(),
            None => vec![f.table.clone()],
        };
        pending.retain(|t| self.kind_of(t).is_none());
        self.place_chain(schema, f, pending)?;
        Ok(f.table.clone())
    }

    /// Joins `pending` tables in link order; the where clause of `f` lands on `f.table`.
    fn place_chain(&mut self, schema: &SchemaCatalog, f: &FieldDescriptor, mut pending: Vec<String>) -> Result<(), CompositionError> {
        let composer = self.composer;
        // Attach onto a copy so a broken chain leaves no partial joins behind.
        let mut steps = Vec::new();
        let mut placed = self.placed.clone();
        while !pending.is_empty() {
            let next = pending
                .iter()
                .enumerate()
                .find_map(|(i, t)| find_link(schema, &placed, t).map(|l| (i, l)));
            let Some((i, (placed_alias, on))) = next else {
                return Err(CompositionError::NoJoinPath {
                    root: composer.root_table.clone(),
                    table: f.table.clone(),
                    field: f.name.clone(),
                });
            };
            let table = pending.remove(i);
            let kind = if schema.is_sparse(&table) {
                JoinKind::Left
            } else {
                JoinKind::Inner
            };
            let mut parts = vec![on];
            if table == f.table {
                if let Some(w) = f.where_expression(&table) {
                    parts.push(Fragment::raw(w));
                }
            }
            if let Some(extra) = composer.table_filters.get(&table) {
                parts.push(extra.clone());
            }
            tracing::trace!(table = %table, via = %placed_alias, "join placed");
            steps.push(JoinStep {
                table: table.clone(),
                alias: table.clone(),
                kind,
                on: join_predicate(parts),
            });
            placed.push((table.clone(), table));
        }
        self.plan.steps.extend(steps);
        self.placed = placed;
        Ok(())
    }

    /// A filtered field on a sparse table reads through its own outer join,
    /// with the predicate in ON, so neither the root rows nor other fields on
    /// that table are filtered by it.
    fn place_filtered_sparse(&mut self, schema: &SchemaCatalog, f: &FieldDescriptor) -> Result<String, CompositionError> {
        let clause = f.where_clause.clone().unwrap_or_default();
        if let Some((_, _, alias)) = self.filtered_aliases.iter().find(|(t, w, _)| t == &f.table && w == &clause) {
            return Ok(alias.clone());
        }
        if let Some(via) = schema.required_links(&self.composer.root_table, &f.table) {
            let via: Vec<String> = via
                .iter()
                .filter(|t| *t != &f.table && self.kind_of(t).is_none())
                .cloned()
                .collect();
            self.place_chain(schema, f, via)?;
        }
        let n = self.filtered_aliases.iter().filter(|(t, _, _)| t == &f.table).count() + 1;
        let alias = format!("{}_{}", f.table, n);
        let (_, on) = find_link_as(schema, &self.placed, &f.table, &alias).ok_or_else(|| CompositionError::NoJoinPath {
            root: self.composer.root_table.clone(),
            table: f.table.clone(),
            field: f.name.clone(),
        })?;
        let mut parts = vec![on];
        if let Some(w) = f.where_expression(&alias) {
            parts.push(Fragment::raw(w));
        }
        self.plan.steps.push(JoinStep {
            table: f.table.clone(),
            alias: alias.clone(),
            kind: JoinKind::Left,
            on: join_predicate(parts),
        });
        self.filtered_aliases.push((f.table.clone(), clause, alias.clone()));
        self.placed.push((alias.clone(), f.table.clone()));
        Ok(alias)
    }

    fn place_type_table(&mut self, schema: &SchemaCatalog, f: &FieldDescriptor) -> Result<String, CompositionError> {
        let modifier = f
            .type_modifier
            .as_deref()
            .filter(|m| !m.is_empty())
            .ok_or_else(|| CompositionError::MissingTypeModifier {
                table: f.table.clone(),
                field: f.name.clone(),
            })?;
        if f.select.is_none() && f.resolved_column(Some(schema)).is_none() {
            return Err(CompositionError::Unsupported(format!(
                "no value column for '{}' on {}",
                modifier, f.table
            )));
        }
        if let Some((_, _, alias)) = self.type_aliases.iter().find(|(t, m, _)| t == &f.table && m == modifier) {
            return Ok(alias.clone());
        }
        let n = self.type_aliases.iter().filter(|(t, _, _)| t == &f.table).count() + 1;
        let alias = format!("{}_{}", f.table, n);
        let (_, on) = find_link_as(schema, &self.placed, &f.table, &alias).ok_or_else(|| CompositionError::NoJoinPath {
            root: self.composer.root_table.clone(),
            table: f.table.clone(),
            field: f.name.clone(),
        })?;
        let mut parts = vec![on];
        if let Some(disc) = schema.discriminator(&f.table) {
            parts.push(Fragment::bound(
                format!("{} = ?", column_ref(&alias, disc)),
                vec![BindValue::text(modifier)],
            ));
        }
        if let Some(w) = f.where_expression(&alias) {
            parts.push(Fragment::raw(w));
        }
        self.plan.steps.push(JoinStep {
            table: f.table.clone(),
            alias: alias.clone(),
            kind: JoinKind::Left,
            on: join_predicate(parts),
        });
        self.type_aliases.push((f.table.clone(), modifier.to_string(), alias.clone()));
        self.placed.push((alias.clone(), f.table.clone()));
        Ok(alias)
    }

    fn kind_of(&self, alias: &str) -> Option<JoinKind> {
        if alias == self.composer.root_table {
            return Some(JoinKind::Inner);
        }
        self.plan.steps.iter().find(|s| s.alias == alias).map(|s| s.kind)
    }
}

fn join_predicate(parts: Vec<Fragment>) -> Fragment {
    if parts.len() == 1 {
        parts.into_iter().next().unwrap_or_default()
    } else {
        Fragment::and(parts)
    }
}

fn find_link(schema: &SchemaCatalog, placed: &[(String, String)], table: &str) -> Option<(String, Fragment)> {
    find_link_as(schema, placed, table, table)
}

/// Link from `table` (joined as `alias`) to a placed source: the root first,
/// then the most recently placed.
fn find_link_as(schema: &SchemaCatalog, placed: &[(String, String)], table: &str, alias: &str) -> Option<(String, Fragment)> {
    let (root, rest) = placed.split_first()?;
    std::iter::once(root).chain(rest.iter().rev()).find_map(|(p_alias, p_table)| {
        schema.link_between(p_table, table).map(|l| {
            let on = format!(
                "{} = {}",
                column_ref(alias, &l.right_column),
                column_ref(p_alias, &l.left_column)
            );
            (p_alias.clone(), Fragment::raw(on))
        })
    })
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::config::{Aggregation, SchemaOverrides, ValueKind};
    use crate::schema::tests::{col, fk, pk};

    pub fn tcrd_schema() -> SchemaCatalog {
        SchemaCatalog::from_rows(
            vec![
                col("protein", "id", "integer"),
                col("protein", "uniprot", "character varying"),
                col("protein", "sym", "character varying"),
                col("protein", "name", "character varying"),
                col("target", "id", "integer"),
                col("target", "tdl", "character varying"),
                col("target", "fam", "character varying"),
                col("tdl_info", "number_value", "numeric"),
                col("tdl_info", "integer_value", "integer"),
                col("tinx_novelty", "score", "double precision"),
                col("goa", "go_term", "text"),
                col("disease", "pvalue", "text"),
                col("disease", "name", "text"),
                col("ncats_ppi", "score", "double precision"),
            ],
            vec![
                pk("protein", "id"),
                pk("target", "id"),
                fk("tdl_info", "protein_id", "protein", "id"),
                fk("tinx_novelty", "protein_id", "protein", "id"),
                fk("goa", "protein_id", "protein", "id"),
                fk("disease", "protein_id", "protein", "id"),
                fk("ncats_ppi", "protein_id", "protein", "id"),
                fk("ncats_ppi", "other_id", "protein", "id"),
            ],
            SchemaOverrides::knowledgebase_defaults(),
        )
    }

    pub fn field(name: &str, table: &str, column: &str) -> FieldDescriptor {
        FieldDescriptor::column(table, column, name)
    }

    pub fn tdl_info(name: &str, modifier: &str) -> FieldDescriptor {
        let mut f = field(name, "tdl_info", "x");
        f.column = None;
        f.type_modifier = Some(modifier.into());
        f
    }

    #[test]
    fn required_chain_places_link_table_first() {
        let schema = tcrd_schema();
        let c = QueryComposer::new(Some(&schema), "protein", "id");
        let q = c.generate_base_query(&[field("Family", "target", "fam")], false);
        let sql = q.query.build().sql;
        assert!(sql.contains(
            "INNER JOIN \"t2tc\" ON \"t2tc\".\"protein_id\" = \"protein\".\"id\" \
             INNER JOIN \"target\" ON \"target\".\"id\" = \"t2tc\".\"target_id\""
        ));
        assert!(q.dropped.is_empty());
    }

    #[test]
    fn sparse_and_type_tables_are_outer_joined_per_modifier() {
        let schema = tcrd_schema();
        let c = QueryComposer::new(Some(&schema), "protein", "id");
        let fields = vec![
            field("Novelty", "tinx_novelty", "score"),
            tdl_info("PubMed Score", "JensenLab PubMed Score"),
            tdl_info("Ab Count", "Ab Count"),
            tdl_info("PubMed Score again", "JensenLab PubMed Score"),
        ];
        let q = c.generate_base_query(&fields, false);
        assert_eq!(q.query.join_kind("tinx_novelty"), Some(JoinKind::Left));
        assert_eq!(q.query.join_kind("tdl_info_1"), Some(JoinKind::Left));
        assert_eq!(q.query.join_kind("tdl_info_2"), Some(JoinKind::Left));
        assert!(!q.query.has_source("tdl_info_3"));
        let built = q.query.build();
        assert!(built.sql.contains("\"tdl_info_1\".\"itype\" = $1"));
        assert!(built.sql.contains("\"tdl_info_2\".\"itype\" = $2"));
        assert!(built.sql.contains("CAST(\"tdl_info_1\".\"number_value\" AS double precision) AS \"PubMed Score\""));
        assert!(built.sql.contains("\"tdl_info_2\".\"integer_value\" AS \"Ab Count\""));
        assert_eq!(
            built.params,
            vec![BindValue::text("JensenLab PubMed Score"), BindValue::text("Ab Count")]
        );
    }

    #[test]
    fn missing_modifier_or_path_drops_field() {
        let schema = tcrd_schema();
        let c = QueryComposer::new(Some(&schema), "protein", "id");
        let mut no_modifier = tdl_info("Score", "");
        no_modifier.type_modifier = None;
        let fields = vec![no_modifier, field("Island", "nowhere", "x"), field("Symbol", "protein", "sym")];
        let q = c.generate_base_query(&fields, false);
        assert_eq!(q.dropped.len(), 2);
        assert!(matches!(q.dropped[0], CompositionError::MissingTypeModifier { .. }));
        assert!(matches!(q.dropped[1], CompositionError::NoJoinPath { .. }));
        assert_eq!(q.columns.len(), 1);
        assert!(q.query.join_aliases().is_empty());
    }

    #[test]
    fn unloaded_schema_keeps_root_fields_only() {
        let c = QueryComposer::new(None, "protein", "id");
        let q = c.generate_base_query(&[field("Symbol", "protein", "sym"), field("Family", "target", "fam")], false);
        assert_eq!(q.columns.len(), 1);
        assert_eq!(q.dropped, vec![CompositionError::SchemaUnavailable]);
        let order = c.order_fragment(&q, &field("Symbol", "protein", "sym"), SortDirection::Asc).unwrap();
        assert_eq!(order.sql(), "\"protein\".\"sym\" ASC");
    }

    #[test]
    fn aggregation_groups_by_key_and_plain_columns() {
        let schema = tcrd_schema();
        let c = QueryComposer::new(Some(&schema), "protein", "id");
        let go = field("GO Count", "goa", "go_term").with_aggregation(Aggregation::Count);
        let q = c.generate_base_query(&[field("Symbol", "protein", "sym"), go.clone()], true);
        let sql = q.query.build().sql;
        assert!(sql.contains("COUNT(DISTINCT \"goa\".\"go_term\") AS \"GO Count\""));
        assert!(sql.ends_with("GROUP BY \"protein\".\"id\", \"protein\".\"sym\""));
        let order = c.order_fragment(&q, &go, SortDirection::Asc).unwrap();
        assert_eq!(order.sql(), "-(COUNT(DISTINCT \"goa\".\"go_term\")) DESC NULLS LAST");
    }

    #[test]
    fn joined_plain_fields_collapse_next_to_aggregates() {
        let schema = tcrd_schema();
        let c = QueryComposer::new(Some(&schema), "protein", "id");
        let go = field("GO Count", "goa", "go_term").with_aggregation(Aggregation::Count);
        let fields = [field("Symbol", "protein", "sym"), field("Family", "target", "fam"), go];
        let q = c.generate_base_query(&fields, true);
        assert!(q.dropped.is_empty());
        let sql = q.query.build().sql;
        assert!(sql.contains("MIN(\"target\".\"fam\") AS \"Family\""));
        assert!(sql.ends_with("GROUP BY \"protein\".\"id\", \"protein\".\"sym\""));

        let ungrouped = c.generate_base_query(&fields[..2], true);
        assert!(!ungrouped.grouped);
        assert!(ungrouped.query.build().sql.contains("\"target\".\"fam\" AS \"Family\""));
    }

    #[test]
    fn filtered_field_on_sparse_table_gets_its_own_outer_join() {
        let schema = tcrd_schema();
        let c = QueryComposer::new(Some(&schema), "protein", "id");
        let plain = field("Novelty", "tinx_novelty", "score");
        let mut recent = field("Recent Novelty", "tinx_novelty", "score");
        recent.where_clause = Some("{alias}.\"year\" >= 2020".into());

        let q = c.generate_base_query(&[plain.clone(), recent.clone()], false);
        assert!(q.dropped.is_empty());
        let sql = q.query.build().sql;
        assert!(sql.contains("LEFT JOIN \"tinx_novelty\" ON \"tinx_novelty\".\"protein_id\" = \"protein\".\"id\" "));
        assert!(sql.contains(
            "LEFT JOIN \"tinx_novelty\" AS \"tinx_novelty_1\" ON (\"tinx_novelty_1\".\"protein_id\" = \"protein\".\"id\") AND (\"tinx_novelty_1\".\"year\" >= 2020)"
        ));
        assert!(sql.contains("\"tinx_novelty\".\"score\" AS \"Novelty\""));
        assert!(sql.contains("\"tinx_novelty_1\".\"score\" AS \"Recent Novelty\""));
        assert!(!sql.contains("WHERE"));

        let q = c.generate_base_query(&[recent, plain], false);
        let sql = q.query.build().sql;
        assert_eq!(q.column("Recent Novelty").unwrap().source, "tinx_novelty_1");
        assert_eq!(q.column("Novelty").unwrap().source, "tinx_novelty");
        assert!(!sql.contains("WHERE"));
    }

    #[test]
    fn numeric_sort_negates_ascending() {
        let schema = tcrd_schema();
        let c = QueryComposer::new(Some(&schema), "protein", "id");
        let novelty = field("Novelty", "tinx_novelty", "score");
        let pvalue = field("P-value", "disease", "pvalue");
        let q = c.generate_base_query(&[novelty.clone(), pvalue.clone()], false);
        assert_eq!(
            c.order_fragment(&q, &novelty, SortDirection::Asc).unwrap().sql(),
            "-(\"tinx_novelty\".\"score\") DESC NULLS LAST"
        );
        assert_eq!(
            c.order_fragment(&q, &novelty, SortDirection::Desc).unwrap().sql(),
            "\"tinx_novelty\".\"score\" DESC NULLS LAST"
        );
        assert_eq!(
            c.order_fragment(&q, &pvalue, SortDirection::Asc).unwrap().sql(),
            "-(CAST(NULLIF(CAST(\"disease\".\"pvalue\" AS text), '') AS double precision)) DESC NULLS LAST"
        );
        let plain = QueryComposer::new(Some(&schema), "protein", "id").with_negated_ascending(false);
        assert_eq!(
            plain.order_fragment(&q, &novelty, SortDirection::Asc).unwrap().sql(),
            "\"tinx_novelty\".\"score\" ASC NULLS LAST"
        );
    }

    #[test]
    fn table_filters_ride_on_join() {
        let schema = tcrd_schema();
        let mut filters = HashMap::new();
        filters.insert(
            "ncats_ppi".to_string(),
            Fragment::bound("\"ncats_ppi\".\"score\" >= ?", vec![BindValue::F64(0.5)]),
        );
        let c = QueryComposer::new(Some(&schema), "protein", "id").with_table_filters(filters);
        let q = c.generate_base_query(&[field("PPI Score", "ncats_ppi", "score")], false);
        let built = q.query.build();
        assert!(built.sql.contains(
            "INNER JOIN \"ncats_ppi\" ON (\"ncats_ppi\".\"protein_id\" = \"protein\".\"id\") AND (\"ncats_ppi\".\"score\" >= $1)"
        ));
    }

    #[test]
    fn composition_is_deterministic() {
        let schema = tcrd_schema();
        let c = QueryComposer::new(Some(&schema), "protein", "id");
        let fields = vec![
            field("Family", "target", "fam"),
            tdl_info("PubMed Score", "JensenLab PubMed Score"),
            field("Novelty", "tinx_novelty", "score"),
        ];
        assert_eq!(
            c.generate_base_query(&fields, true).query.build(),
            c.generate_base_query(&fields, true).query.build()
        );
        let mut numeric = field("Score", "tinx_novelty", "score");
        numeric.value_kind = ValueKind::Numeric;
        assert!(c.plan(&[numeric]).alias_of("Score").is_some());
    }
}
