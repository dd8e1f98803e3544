//! One list request: resolves fields, facets and scope once, then produces the
//! count, list and facet queries over the same entity set.

use crate::catalog::{Catalogs, FieldCatalog, FieldDescriptor, ModelInfo, RequestScope, SCOPE_QUERY_ALIAS};
use crate::compose::{constraint_query, count_query, ComposedQuery, QueryComposer};
use crate::config::{ContextType, ModelKind};
use crate::error::AppError;
use crate::list::model::SortKey;
use crate::list::request::{ListRequest, ListRequestState};
use crate::list::scope::ScopingMode;
use crate::schema::SchemaCatalog;
use crate::service::TextSearch;
use crate::settings::QuerySettings;
use crate::similarity::SimilarityEngine;
use crate::sql::{column_ref, Fragment, JoinKind, KeyList, SelectQuery, SortDirection};
use std::collections::HashMap;
use std::sync::Arc;

const SCOPE_IDS_ALIAS: &str = "scopeQuery";
const BATCH_ALIAS: &str = "batchQuery";

/// Value-count query for one facet.
#[derive(Clone, Debug)]
pub struct FacetQuery {
    pub field: FieldDescriptor,
    pub query: SelectQuery,
}

pub struct ListOrchestrator {
    schema: Option<Arc<SchemaCatalog>>,
    search: Arc<dyn TextSearch>,
    negate_numeric_ascending: bool,
    model: ModelInfo,
    scope: Arc<RequestScope>,
    state: ListRequestState,
    /// Active facet constraints, each known to compose.
    filters: Vec<FieldDescriptor>,
    data_fields: Vec<FieldDescriptor>,
    sort: Option<(FieldDescriptor, SortDirection)>,
    facet_fields: Vec<FieldDescriptor>,
    similarity: Option<SimilarityEngine>,
    row_limit: Option<u64>,
    scope_ids: Option<KeyList>,
    warnings: Vec<String>,
}

struct Resolved {
    filters: Vec<FieldDescriptor>,
    data_fields: Vec<FieldDescriptor>,
    sort: Option<(FieldDescriptor, SortDirection)>,
    facet_fields: Vec<FieldDescriptor>,
    row_limit: Option<u64>,
}

impl ListOrchestrator {
    pub fn new(catalogs: &Catalogs, search: Arc<dyn TextSearch>, kind: ModelKind, req: &ListRequest) -> Result<Self, AppError> {
        let model = catalogs
            .fields
            .model_for_kind(kind)
            .cloned()
            .ok_or_else(|| AppError::BadRequest(format!("model {} is not registered", kind.as_str())))?;
        let schema = catalogs.schema.current();
        let (mut state, mut warnings) = ListRequestState::from_request(req, &catalogs.settings);

        if state.scope.is_association()
            && kind
                .association_id_query(&state.scope, &model.root_table, &model.key_column)
                .is_none()
        {
            warnings.push(format!("{} is not supported for {}; ignored", state.scope.label(), model.name));
            state.scope = ScopingMode::None;
        }

        let mut similarity = None;
        if let ScopingMode::Similarity { match_, facet } = &state.scope {
            let engine = SimilarityEngine::new(
                schema.clone(),
                &model.root_table,
                &model.key_column,
                kind.match_selector(&model.root_table, match_),
                catalogs.fields.overlap_field(&model.name, facet),
            );
            if engine.list_query(false).is_some() {
                similarity = Some(engine);
            } else {
                tracing::warn!(model = %model.name, facet = %facet, "similarity unavailable");
                warnings.push(format!("similarity unavailable for facet '{}'", facet));
            }
        }
        if state.scope.is_similarity() && similarity.is_none() {
            state.scope = ScopingMode::None;
        }

        let mut request_scope = RequestScope::new(&model.name, kind, &model.root_table, &model.key_column);
        request_scope.associated_model = state.scope.associated_model().to_string();
        request_scope.similarity_active = similarity.is_some();
        request_scope.association = kind
            .association_table(&state.scope)
            .zip(ModelKind::association_label(&state.scope))
            .map(|(table, label)| (table.to_string(), label));

        let mut orchestrator = ListOrchestrator {
            schema,
            search,
            negate_numeric_ascending: catalogs.settings.negate_numeric_ascending,
            model,
            scope: Arc::new(request_scope),
            state,
            filters: Vec::new(),
            data_fields: Vec::new(),
            sort: None,
            facet_fields: Vec::new(),
            similarity,
            row_limit: None,
            scope_ids: None,
            warnings,
        };
        let resolved = orchestrator.resolve(&catalogs.fields, &catalogs.settings);
        orchestrator.filters = resolved.filters;
        orchestrator.data_fields = resolved.data_fields;
        orchestrator.sort = resolved.sort;
        orchestrator.facet_fields = resolved.facet_fields;
        orchestrator.row_limit = resolved.row_limit;
        tracing::debug!(
            model = %orchestrator.model.name,
            scope = orchestrator.state.scope.label(),
            filters = orchestrator.filters.len(),
            fields = orchestrator.data_fields.len(),
            "list request resolved"
        );
        Ok(orchestrator)
    }

    fn resolve(&mut self, catalog: &FieldCatalog, settings: &QuerySettings) -> Resolved {
        let mut warnings = Vec::new();
        let composer = self.composer();

        let (found, unknown) = catalog.get_these_filtering_fields(&self.scope, ContextType::Facet, &self.state.facets);
        warnings.extend(unknown.iter().map(|e| format!("facet ignored: {}", e)));
        let filters: Vec<FieldDescriptor> = found
            .into_iter()
            .filter(|f| match constraint_query(&composer, f) {
                Ok(_) => true,
                Err(e) => {
                    tracing::warn!(facet = %f.name, error = %e, "facet constraint dropped");
                    warnings.push(format!("facet '{}' ignored: {}", f.name, e));
                    false
                }
            })
            .collect();

        let mut data_fields = if self.state.fields.is_empty() {
            catalog.get_default_fields(&self.scope, ContextType::List, "")
        } else {
            let (fields, unknown) =
                catalog.get_these_fields(&self.scope, &self.model, ContextType::Download, &self.state.fields);
            warnings.extend(unknown.iter().map(|e| format!("field ignored: {}", e)));
            fields
        };

        let mut sort = None;
        if let Some(spec) = &self.state.sort {
            let field = data_fields
                .iter()
                .find(|f| f.name == spec.field)
                .cloned()
                .map(Ok)
                .unwrap_or_else(|| catalog.get_one_field(&self.scope, ContextType::List, &spec.field, ""));
            match field {
                Ok(f) => {
                    if !data_fields.iter().any(|d| d.name == f.name) {
                        data_fields.push(f.clone());
                    }
                    sort = Some((f, spec.direction));
                }
                Err(e) => warnings.push(format!("sort ignored: {}", e)),
            }
        }
        for (name, placement) in composer.plan(&data_fields).placements {
            if let Err(e) = placement {
                warnings.push(format!("field '{}' dropped: {}", name, e));
            }
        }

        let mut facet_fields: Vec<FieldDescriptor> = filters.clone();
        let requested = if self.state.requested_facets.is_empty() {
            catalog.get_default_fields(&self.scope, ContextType::Facet, "")
        } else {
            self.state
                .requested_facets
                .iter()
                .filter_map(|name| {
                    let found = catalog.lookup_in_context(&self.scope, ContextType::Facet, name);
                    if found.is_none() {
                        warnings.push(format!("unknown facet '{}' for model {}", name, self.model.name));
                    }
                    found
                })
                .collect()
        };
        for f in requested {
            if !facet_fields.iter().any(|e| e.name == f.name) {
                facet_fields.push(f);
            }
        }
        facet_fields.retain(|f| match count_query(&composer, f) {
            Ok(_) => true,
            Err(e) => {
                warnings.push(format!("facet '{}' not counted: {}", f.name, e));
                false
            }
        });

        let mut row_limit = self.state.top;
        let heavy = data_fields
            .iter()
            .any(|f| settings.high_payload_fields.iter().any(|h| h == &f.name));
        let cap = settings.high_payload_row_cap;
        if heavy && row_limit.map_or(true, |top| top > cap) {
            row_limit = Some(cap);
            warnings.push(format!("row count capped at {} for high-payload fields", cap));
        }

        drop(composer);
        self.warnings.extend(warnings);
        Resolved {
            filters,
            data_fields,
            sort,
            facet_fields,
            row_limit,
        }
    }

    pub fn model(&self) -> &ModelInfo {
        &self.model
    }

    pub fn state(&self) -> &ListRequestState {
        &self.state
    }

    pub fn request_scope(&self) -> &Arc<RequestScope> {
        &self.scope
    }

    pub fn warnings(&self) -> &[String] {
        &self.warnings
    }

    pub fn facet_fields(&self) -> &[FieldDescriptor] {
        &self.facet_fields
    }

    fn composer(&self) -> QueryComposer<'_> {
        let mut table_filters = HashMap::new();
        let kind = self.model.kind;
        if let (Some(table), Some(filter)) = (
            kind.association_table(&self.state.scope),
            kind.association_filter(&self.state.scope),
        ) {
            table_filters.insert(table.to_string(), filter);
        }
        QueryComposer::new(self.schema.as_deref(), &self.model.root_table, &self.model.key_column)
            .with_table_filters(table_filters)
            .with_negated_ascending(self.negate_numeric_ascending)
    }

    fn key_ref(&self) -> String {
        column_ref(&self.model.root_table, &self.model.key_column)
    }

    fn on_key(&self, alias: &str) -> Fragment {
        Fragment::raw(format!("{} = {}", column_ref(alias, "entity_id"), self.key_ref()))
    }

    /// Distinct root keys of the active scope, when it resolves to an identifier list.
    pub fn scope_id_query(&self) -> Option<SelectQuery> {
        let scope = &self.state.scope;
        match scope {
            ScopingMode::Term(term) => Some(self.search.scored_query(&self.scope, term)),
            ScopingMode::Similarity { .. } => self.similarity.as_ref()?.list_query(false),
            s if s.is_association() => {
                self.model
                    .kind
                    .association_id_query(s, &self.model.root_table, &self.model.key_column)
            }
            _ => None,
        }
    }

    /// Identifier list computed once by the executor; later queries bind it instead of
    /// re-running the scope subquery.
    pub fn cache_scope_ids(&mut self, ids: KeyList) {
        tracing::debug!(ids = ids.len(), scope = self.state.scope.label(), "scope ids cached");
        self.scope_ids = Some(ids);
    }

    pub fn scope_ids(&self) -> Option<&KeyList> {
        self.scope_ids.as_ref()
    }

    fn apply_facets(&self, composer: &QueryComposer<'_>, q: &mut SelectQuery, except: Option<&str>) {
        for f in self.filters.iter().filter(|f| Some(f.name.as_str()) != except) {
            if let Ok(sub) = constraint_query(composer, f) {
                q.join_subquery(JoinKind::Inner, &sub, &f.name, self.on_key(&f.name));
            }
        }
    }

    fn apply_scope_ids(&self, q: &mut SelectQuery) {
        if !self.state.scope.resolves_to_ids() {
            return;
        }
        if let Some(ids) = &self.scope_ids {
            q.filter(Fragment::bound(format!("{} = ANY(?)", self.key_ref()), vec![ids.to_bind()]));
        } else if let Some(sub) = self.scope_id_query() {
            q.join_subquery(JoinKind::Inner, &sub, SCOPE_IDS_ALIAS, self.on_key(SCOPE_IDS_ALIAS));
        }
    }

    fn apply_batch(&self, q: &mut SelectQuery) {
        if let ScopingMode::Batch(batch) = &self.state.scope {
            let sub = self
                .model
                .kind
                .batch_query(&self.model.root_table, &self.model.key_column, batch);
            q.join_subquery(JoinKind::Inner, &sub, BATCH_ALIAS, self.on_key(BATCH_ALIAS));
        }
    }

    /// The association predicate already restricts an inner join in `composed`.
    fn association_on_join(&self, composed: &ComposedQuery) -> bool {
        self.model
            .kind
            .association_table(&self.state.scope)
            .map(|t| composed.query.join_kind(t) == Some(JoinKind::Inner))
            .unwrap_or(false)
    }

    /// `COUNT(DISTINCT key)` of entities passing every facet and the scope. Never paginated.
    pub fn count_query(&self) -> SelectQuery {
        let composer = self.composer();
        let mut q = SelectQuery::from_table(&self.model.root_table);
        q.select(Fragment::raw(format!("COUNT(DISTINCT {})", self.key_ref())), "count");
        self.apply_facets(&composer, &mut q, None);
        self.apply_scope_ids(&mut q);
        self.apply_batch(&mut q);
        q
    }

    pub fn list_query(&self) -> SelectQuery {
        let composer = self.composer();
        let composed = composer.generate_base_query(&self.data_fields, true);
        let mut q = composed.query.clone();
        self.apply_facets(&composer, &mut q, None);

        let scoring = match &self.state.scope {
            ScopingMode::Term(term) => Some(self.search.scored_query(&self.scope, term)),
            ScopingMode::Similarity { .. } => self.similarity.as_ref().and_then(|s| s.list_query(true)),
            _ => None,
        };
        let scored = scoring.is_some();
        if let Some(sub) = scoring {
            q.join_subquery(JoinKind::Inner, &sub, SCOPE_QUERY_ALIAS, self.on_key(SCOPE_QUERY_ALIAS));
        } else if !self.association_on_join(&composed) {
            self.apply_scope_ids(&mut q);
        }
        self.apply_batch(&mut q);

        let explicit = self
            .sort
            .as_ref()
            .and_then(|(f, dir)| composer.order_fragment(&composed, f, *dir));
        match explicit {
            Some(order) => q.order_by(order),
            None => {
                for (key, dir) in self.model.kind.default_sort(&self.state.scope, !self.state.fields.is_empty()) {
                    match key {
                        SortKey::Output(alias) => {
                            let order = self
                                .data_fields
                                .iter()
                                .find(|f| f.alias == alias)
                                .and_then(|f| composer.order_fragment(&composed, f, dir));
                            if let Some(order) = order {
                                q.order_by(order);
                            }
                        }
                        SortKey::Scope(column) if scored => {
                            q.order_by(Fragment::raw(key.render(dir)));
                            if composed.grouped {
                                q.group_by(&column_ref(SCOPE_QUERY_ALIAS, column));
                            }
                        }
                        SortKey::Scope(_) => {}
                    }
                }
            }
        }
        q.order_by(Fragment::raw(format!("{} ASC", self.key_ref())));
        if self.state.skip > 0 {
            q.set_offset(Some(self.state.skip));
        }
        q.set_limit(self.row_limit);
        q
    }

    /// One count query per facet. Each applies every other facet's constraint
    /// but not its own, plus the scope.
    pub fn facet_queries(&self) -> Vec<FacetQuery> {
        let composer = self.composer();
        self.facet_fields
            .iter()
            .filter_map(|f| {
                let mut q = count_query(&composer, f).ok()?;
                self.apply_facets(&composer, &mut q, Some(&f.name));
                self.apply_scope_ids(&mut q);
                self.apply_batch(&mut q);
                Some(FacetQuery {
                    field: f.clone(),
                    query: q,
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::SINGLE_VALUE_FIELDS;
    use crate::compose::tests::tcrd_schema;
    use crate::config::{FieldConfig, FullConfig, ModelConfig, ValueKind};
    use crate::schema::SchemaHandle;
    use crate::service::PgTextSearch;
    use crate::sql::BindValue;
    use serde_json::json;

    fn fc(name: &str, context: ContextType, table: &str, column: &str, order: i32) -> FieldConfig {
        FieldConfig {
            model: "Target".into(),
            associated_model: String::new(),
            context,
            list_name: String::new(),
            name: name.into(),
            description: String::new(),
            table: table.into(),
            column: Some(column.into()),
            alias: None,
            select: None,
            where_clause: None,
            group_method: None,
            type_modifier: None,
            value_kind: ValueKind::Category,
            bin_size: None,
            order,
        }
    }

    fn catalogs() -> Catalogs {
        let mut novelty = fc("novelty", ContextType::List, "tinx_novelty", "score", 3);
        novelty.value_kind = ValueKind::Numeric;
        let mut name = fc("Name", ContextType::List, "protein", "name", 4);
        name.alias = Some("name".into());
        let mut symbol = fc("Symbol", ContextType::Download, "protein", "sym", 0);
        symbol.list_name = SINGLE_VALUE_FIELDS.into();
        let config = FullConfig {
            models: vec![ModelConfig {
                name: "Target".into(),
                kind: ModelKind::Target,
                root_table: "protein".into(),
                key_column: None,
                id_column: "uniprot".into(),
            }],
            fields: vec![
                fc("UniProt", ContextType::List, "protein", "uniprot", 1),
                fc("Symbol", ContextType::List, "protein", "sym", 2),
                novelty,
                name,
                fc("Target Development Level", ContextType::Facet, "target", "tdl", 1),
                fc("Family", ContextType::Facet, "target", "fam", 2),
                fc("GO Process", ContextType::Facet, "goa", "go_term", 0),
                fc("GO Process", ContextType::Overlap, "goa", "go_term", 0),
                symbol,
                fc("Abstract", ContextType::Download, "protein", "sym", 0),
            ],
            ..Default::default()
        };
        Catalogs::build(SchemaHandle::ready(tcrd_schema()), &config, QuerySettings::default())
    }

    fn orchestrator(req: serde_json::Value) -> ListOrchestrator {
        let req: ListRequest = serde_json::from_value(req).unwrap();
        ListOrchestrator::new(&catalogs(), Arc::new(PgTextSearch::default()), ModelKind::Target, &req).unwrap()
    }

    #[test]
    fn tdl_facet_limits_list_but_not_count() {
        let o = orchestrator(json!({"top": 10, "filter": {"facets": [{"facet": "Target Development Level", "values": ["Tclin"]}]}}));
        let count = o.count_query().build();
        assert!(count.sql.starts_with("SELECT COUNT(DISTINCT \"protein\".\"id\") AS \"count\" FROM \"protein\" INNER JOIN (SELECT DISTINCT"));
        assert!(count.sql.ends_with("AS \"Target Development Level\" ON \"Target Development Level\".\"entity_id\" = \"protein\".\"id\""));
        assert!(!count.sql.contains("LIMIT"));
        assert_eq!(count.params, vec![BindValue::TextArray(vec!["Tclin".into()])]);

        let list = o.list_query().build();
        assert!(list.sql.ends_with(
            "ORDER BY \"tinx_novelty\".\"score\" DESC NULLS LAST, \"protein\".\"id\" ASC LIMIT 10"
        ));
        assert!(list.sql.contains("LEFT JOIN \"tinx_novelty\""));
        assert!(o.warnings().is_empty());
    }

    #[test]
    fn facet_counts_exclude_their_own_constraint() {
        let o = orchestrator(json!({"filter": {"facets": [
            {"facet": "Target Development Level", "values": ["Tclin"]},
            {"facet": "Family", "values": ["GPCR"]}
        ]}}));
        let facets = o.facet_queries();
        assert_eq!(facets.len(), 2);
        let tdl = facets[0].query.build();
        assert!(!tdl.sql.contains("AS \"Target Development Level\" ON"));
        assert!(tdl.sql.contains("AS \"Family\" ON"));
        assert_eq!(tdl.params, vec![BindValue::TextArray(vec!["GPCR".into()])]);
    }

    #[test]
    fn requested_facets_replace_defaults() {
        let o = orchestrator(json!({"facets": ["GO Process", "Nope"]}));
        let names: Vec<&str> = o.facet_fields().iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["GO Process"]);
        assert_eq!(o.warnings().len(), 1);
        let defaults = orchestrator(json!({}));
        assert_eq!(defaults.facet_fields().len(), 2);
    }

    #[test]
    fn association_uses_ids_until_cached() {
        let mut o = orchestrator(json!({"filter": {"associatedDisease": "asthma"}}));
        assert!(o.scope_id_query().is_some());
        let before = o.count_query().build();
        assert!(before.sql.contains("AS \"scopeQuery\" ON \"scopeQuery\".\"entity_id\" = \"protein\".\"id\""));
        o.cache_scope_ids(KeyList::Ints(vec![1, 2]));
        let after = o.count_query().build();
        assert!(after.sql.ends_with("WHERE (\"protein\".\"id\" = ANY($1))"));
        assert_eq!(after.params, vec![BindValue::I64Array(vec![1, 2])]);
        assert_eq!(o.facet_queries()[0].query.build().params, vec![BindValue::I64Array(vec![1, 2])]);
    }

    #[test]
    fn term_joins_scoring_subquery_and_sorts_by_relevance() {
        let o = orchestrator(json!({"term": "dopamine", "batch": ["DRD2"]}));
        assert_eq!(o.warnings().len(), 1);
        let list = o.list_query().build();
        assert!(list.sql.contains("AS \"filterQuery\" ON \"filterQuery\".\"entity_id\" = \"protein\".\"id\""));
        assert!(list.sql.contains(
            "ORDER BY \"filterQuery\".\"score\" DESC NULLS LAST, \"protein\".\"name\" ASC, \"protein\".\"id\" ASC"
        ));
        assert!(!list.sql.contains("batchQuery"));
    }

    #[test]
    fn explicit_fields_order_by_key_only() {
        let o = orchestrator(json!({"term": "dopamine", "fields": ["Symbol"]}));
        let list = o.list_query().build();
        assert!(list.sql.ends_with("ORDER BY \"protein\".\"id\" ASC LIMIT 10"));
    }

    #[test]
    fn zero_top_lists_without_limit() {
        let o = orchestrator(json!({"top": 0}));
        let list = o.list_query();
        assert_eq!(list.limit(), None);
        assert!(!list.build().sql.contains("LIMIT"));
    }

    #[test]
    fn batch_is_always_a_joined_subquery() {
        let mut o = orchestrator(json!({"batch": ["DRD2", "P14416"]}));
        assert!(o.scope_id_query().is_none());
        o.cache_scope_ids(KeyList::Ints(vec![9]));
        let count = o.count_query().build();
        assert!(count.sql.contains("AS \"batchQuery\" ON \"batchQuery\".\"entity_id\" = \"protein\".\"id\""));
        assert!(!count.sql.contains("ANY($4)"));
    }

    #[test]
    fn explicit_sort_and_pagination() {
        let o = orchestrator(json!({"skip": 20, "top": 5, "fields": ["Symbol"], "filter": {"order": "^novelty"}}));
        let list = o.list_query().build();
        assert!(list.sql.starts_with("SELECT \"protein\".\"uniprot\" AS \"id\", \"protein\".\"sym\" AS \"Symbol\", \"tinx_novelty\".\"score\" AS \"novelty\""));
        assert!(list.sql.ends_with(
            "ORDER BY -(\"tinx_novelty\".\"score\") DESC NULLS LAST, \"protein\".\"id\" ASC LIMIT 5 OFFSET 20"
        ));
    }

    #[test]
    fn similarity_scope_projects_metrics() {
        let o = orchestrator(json!({"filter": {"similarity": "(DRD2, GO Process)"}}));
        assert!(o.request_scope().similarity_active);
        let list = o.list_query().build();
        assert!(list.sql.contains("\"filterQuery\".\"jaccard\" AS \"Similarity: Jaccard Distance\""));
        assert!(list.sql.contains("ORDER BY \"filterQuery\".\"jaccard\" DESC NULLS LAST"));

        let missing = orchestrator(json!({"filter": {"similarity": "(DRD2, Family)"}}));
        assert_eq!(missing.state().scope, ScopingMode::None);
        assert_eq!(missing.warnings(), ["similarity unavailable for facet 'Family'".to_string()]);
    }

    #[test]
    fn high_payload_fields_cap_rows() {
        let o = orchestrator(json!({"top": 50000, "fields": ["Abstract"]}));
        assert_eq!(o.list_query().limit(), Some(10000));
        assert_eq!(o.warnings().len(), 1);
    }

    #[test]
    fn unregistered_model_is_rejected() {
        let req = ListRequest::default();
        let err = ListOrchestrator::new(&catalogs(), Arc::new(PgTextSearch::default()), ModelKind::Disease, &req)
            .err()
            .unwrap();
        assert_eq!(err.code(), "bad_request");
    }
}
