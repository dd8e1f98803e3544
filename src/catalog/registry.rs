//! Field registry keyed by (model, associated model, context, list name).

use crate::catalog::field::{FieldDescriptor, RequestScope};
use crate::config::{ContextType, FullConfig, ModelKind};
use crate::error::CompositionError;
use crate::list::FacetFilter;
use crate::schema::SchemaCatalog;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

pub const SINGLE_VALUE_FIELDS: &str = "Single Value Fields";
pub const BUCKET: &str = "bucket";

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ListContext {
    pub model: String,
    pub associated_model: String,
    pub context: ContextType,
    pub list_name: String,
}

impl ListContext {
    pub fn new(model: &str, associated_model: &str, context: ContextType, list_name: &str) -> Self {
        ListContext {
            model: model.to_string(),
            associated_model: associated_model.to_string(),
            context,
            list_name: list_name.to_string(),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct ModelInfo {
    pub name: String,
    pub kind: ModelKind,
    pub root_table: String,
    pub key_column: String,
    pub id_column: String,
}

/// Immutable after build; per-request specialization happens on stamped clones.
#[derive(Clone, Debug, Default)]
pub struct FieldCatalog {
    lists: HashMap<ListContext, Vec<FieldDescriptor>>,
    models: Vec<ModelInfo>,
}

impl FieldCatalog {
    /// Register every model and field of `config`. With a schema, models whose
    /// root table has no primary key (and no configured key) are left out.
    pub fn build(config: &FullConfig, schema: Option<&SchemaCatalog>) -> Self {
        let mut catalog = FieldCatalog::default();
        for m in &config.models {
            let key = m
                .key_column
                .clone()
                .or_else(|| schema.and_then(|s| s.primary_key(&m.root_table)).map(String::from));
            let key_column = match (key, schema) {
                (Some(k), _) => k,
                (None, Some(_)) => {
                    tracing::error!(model = %m.name, table = %m.root_table, "root table has no primary key; model excluded");
                    continue;
                }
                (None, None) => {
                    tracing::warn!(model = %m.name, "schema not loaded; assuming key column id");
                    "id".to_string()
                }
            };
            catalog.models.push(ModelInfo {
                name: m.name.clone(),
                kind: m.kind,
                root_table: m.root_table.clone(),
                key_column,
                id_column: m.id_column.clone(),
            });
        }
        for f in &config.fields {
            if catalog.model(&f.model).is_none() {
                continue;
            }
            catalog.add_field(
                &f.model,
                &f.associated_model,
                f.context,
                &f.list_name,
                FieldDescriptor::from_config(f),
            );
        }
        tracing::info!(models = catalog.models.len(), lists = catalog.lists.len(), "field catalog ready");
        catalog
    }

    /// Download fields outside "Single Value Fields" are also kept in the model's bucket.
    pub fn add_field(&mut self, model: &str, associated_model: &str, context: ContextType, list_name: &str, field: FieldDescriptor) {
        if context == ContextType::Download && list_name != SINGLE_VALUE_FIELDS {
            self.lists
                .entry(ListContext::new(model, "", ContextType::Download, BUCKET))
                .or_default()
                .push(field.clone());
        }
        self.lists
            .entry(ListContext::new(model, associated_model, context, list_name))
            .or_default()
            .push(field);
    }

    pub fn model(&self, name: &str) -> Option<&ModelInfo> {
        self.models.iter().find(|m| m.name == name)
    }

    pub fn model_for_kind(&self, kind: ModelKind) -> Option<&ModelInfo> {
        self.models.iter().find(|m| m.kind == kind)
    }

    fn list(&self, model: &str, associated_model: &str, context: ContextType, list_name: &str) -> &[FieldDescriptor] {
        self.lists
            .get(&ListContext::new(model, associated_model, context, list_name))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    fn find(list: &[FieldDescriptor], name: &str, scope: &Arc<RequestScope>) -> Option<FieldDescriptor> {
        list.iter().find(|f| f.name == name).map(|f| f.stamped(scope))
    }

    /// Fields with `order > 0`, ascending. Falls back from the associated-model
    /// list to the unassociated one.
    pub fn get_default_fields(&self, scope: &Arc<RequestScope>, context: ContextType, list_name: &str) -> Vec<FieldDescriptor> {
        let mut list = self.list(&scope.model, &scope.associated_model, context, list_name);
        if list.is_empty() {
            list = self.list(&scope.model, "", context, list_name);
        }
        let mut fields: Vec<FieldDescriptor> = list.iter().filter(|f| f.order > 0).map(|f| f.stamped(scope)).collect();
        fields.sort_by_key(|f| f.order);
        if context == ContextType::List && scope.similarity_active {
            fields.extend(FieldDescriptor::similarity_fields().iter().map(|f| f.stamped(scope)));
        }
        fields
    }

    /// Exact list, then the bucket (download only), then the model's and the
    /// associated model's "Single Value Fields", then similarity fields.
    pub fn get_one_field(
        &self,
        scope: &Arc<RequestScope>,
        context: ContextType,
        name: &str,
        list_name: &str,
    ) -> Result<FieldDescriptor, CompositionError> {
        let model = scope.model.as_str();
        let assoc = scope.associated_model.as_str();
        let mut found = Self::find(self.list(model, assoc, context, list_name), name, scope);
        if found.is_none() && context == ContextType::Download {
            found = Self::find(self.list(model, "", ContextType::Download, BUCKET), name, scope);
        }
        if found.is_none() {
            found = Self::find(self.list(model, "", ContextType::Download, SINGLE_VALUE_FIELDS), name, scope);
        }
        if found.is_none() && !assoc.is_empty() {
            found = Self::find(self.list(model, assoc, ContextType::Download, SINGLE_VALUE_FIELDS), name, scope);
        }
        if found.is_none() && scope.similarity_active {
            found = Self::find(&FieldDescriptor::similarity_fields(), name, scope);
        }
        found.ok_or_else(|| CompositionError::UnknownField {
            model: model.to_string(),
            name: name.to_string(),
        })
    }

    /// Resolve requested facets with their allowed values. Unknown names come
    /// back as errors so the caller can record them and carry on.
    pub fn get_these_filtering_fields(
        &self,
        scope: &Arc<RequestScope>,
        context: ContextType,
        requested: &[FacetFilter],
    ) -> (Vec<FieldDescriptor>, Vec<CompositionError>) {
        let mut found = Vec::new();
        let mut unknown = Vec::new();
        for r in requested {
            match self.lookup_in_context(scope, context, &r.facet) {
                Some(f) => found.push(f.with_allowed_values(r.values.clone())),
                None => unknown.push(CompositionError::UnknownField {
                    model: scope.model.clone(),
                    name: r.facet.clone(),
                }),
            }
        }
        (found, unknown)
    }

    /// Facet lookup: the associated-model list first, then the unassociated one.
    pub fn lookup_in_context(&self, scope: &Arc<RequestScope>, context: ContextType, name: &str) -> Option<FieldDescriptor> {
        Self::find(self.list(&scope.model, &scope.associated_model, context, ""), name, scope)
            .or_else(|| Self::find(self.list(&scope.model, "", context, ""), name, scope))
    }

    /// Explicitly named fields; download requests also get the model's `id` column first.
    pub fn get_these_fields(
        &self,
        scope: &Arc<RequestScope>,
        model: &ModelInfo,
        context: ContextType,
        names: &[String],
    ) -> (Vec<FieldDescriptor>, Vec<CompositionError>) {
        let mut fields = Vec::new();
        let mut unknown = Vec::new();
        if context == ContextType::Download {
            fields.push(FieldDescriptor::column(&model.root_table, &model.id_column, "id").stamped(scope));
        }
        for name in names {
            match self.get_one_field(scope, context, name, "") {
                Ok(mut f) => {
                    f.alias = name.clone();
                    fields.push(f);
                }
                Err(e) => unknown.push(e),
            }
        }
        (fields, unknown)
    }

    pub fn get_all_fields(&self, scope: &Arc<RequestScope>, context: ContextType, list_name: &str) -> Vec<FieldDescriptor> {
        self.list(&scope.model, &scope.associated_model, context, list_name)
            .iter()
            .map(|f| f.stamped(scope))
            .collect()
    }

    /// Download field lists by list name, for the model and its association.
    /// "Single Value Fields" gains the similarity fields under a similarity scope.
    pub fn download_lists(&self, scope: &Arc<RequestScope>) -> BTreeMap<String, Vec<FieldDescriptor>> {
        let mut out: BTreeMap<String, Vec<FieldDescriptor>> = BTreeMap::new();
        let mut contexts: Vec<(&ListContext, &Vec<FieldDescriptor>)> = self
            .lists
            .iter()
            .filter(|(ctx, _)| {
                ctx.model == scope.model
                    && (ctx.associated_model.is_empty() || ctx.associated_model == scope.associated_model)
                    && ctx.context == ContextType::Download
                    && ctx.list_name != BUCKET
            })
            .collect();
        // Unassociated lists first so their fields lead each group.
        contexts.sort_by(|a, b| (&a.0.associated_model, &a.0.list_name).cmp(&(&b.0.associated_model, &b.0.list_name)));
        for (ctx, fields) in contexts {
            out.entry(ctx.list_name.clone())
                .or_default()
                .extend(fields.iter().map(|f| f.stamped(scope)));
        }
        if scope.similarity_active {
            if let Some(svf) = out.get_mut(SINGLE_VALUE_FIELDS) {
                svf.extend(FieldDescriptor::similarity_fields().iter().map(|f| f.stamped(scope)));
            }
        }
        out
    }

    /// Multi-valued facet usable for similarity, registered in the model's overlap context.
    pub fn overlap_field(&self, model: &str, name: &str) -> Option<FieldDescriptor> {
        self.list(model, "", ContextType::Overlap, "")
            .iter()
            .find(|f| f.name == name)
            .cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{FieldConfig, ModelConfig, ValueKind};

    fn field(name: &str, context: ContextType, list_name: &str, associated: &str, order: i32) -> FieldConfig {
        FieldConfig {
            model: "Target".into(),
            associated_model: associated.into(),
            context,
            list_name: list_name.into(),
            name: name.into(),
            description: String::new(),
            table: "target".into(),
            column: Some("tdl".into()),
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

    fn catalog() -> FieldCatalog {
        let config = FullConfig {
            models: vec![ModelConfig {
                name: "Target".into(),
                kind: ModelKind::Target,
                root_table: "protein".into(),
                key_column: Some("id".into()),
                id_column: "uniprot".into(),
            }],
            fields: vec![
                field("Name", ContextType::List, "", "", 2),
                field("UniProt", ContextType::List, "", "", 1),
                field("Hidden", ContextType::List, "", "", 0),
                field("PPI Score", ContextType::List, "", "Target", 1),
                field("Novelty", ContextType::Download, SINGLE_VALUE_FIELDS, "", 0),
                field("GO Term", ContextType::Download, "GO Terms", "", 0),
                field("Interactor", ContextType::Download, SINGLE_VALUE_FIELDS, "Target", 0),
                field("GO Process", ContextType::Overlap, "", "", 0),
                field("Family", ContextType::Facet, "", "", 1),
            ],
            ..Default::default()
        };
        FieldCatalog::build(&config, None)
    }

    fn scope(assoc: &str, similarity: bool) -> Arc<RequestScope> {
        let mut s = RequestScope::new("Target", ModelKind::Target, "protein", "id");
        s.associated_model = assoc.into();
        s.similarity_active = similarity;
        Arc::new(s)
    }

    #[test]
    fn defaults_sorted_by_order_with_fallback() {
        let c = catalog();
        let names: Vec<String> = c.get_default_fields(&scope("", false), ContextType::List, "").into_iter().map(|f| f.name).collect();
        assert_eq!(names, vec!["UniProt", "Name"]);
        let assoc: Vec<String> = c.get_default_fields(&scope("Target", false), ContextType::List, "").into_iter().map(|f| f.name).collect();
        assert_eq!(assoc, vec!["PPI Score"]);
        let disease: Vec<String> = c.get_default_fields(&scope("Disease", true), ContextType::List, "").into_iter().map(|f| f.name).collect();
        assert_eq!(disease.len(), 2 + 5);
        assert_eq!(disease[2], "Similarity: Common Count");
    }

    #[test]
    fn single_field_fallback_chain() {
        let c = catalog();
        let s = scope("Target", false);
        assert!(c.get_one_field(&s, ContextType::Download, "GO Term", "").is_ok());
        assert!(c.get_one_field(&s, ContextType::List, "Novelty", "").is_ok());
        assert!(c.get_one_field(&s, ContextType::List, "Interactor", "").is_ok());
        assert!(c.get_one_field(&scope("", false), ContextType::List, "Interactor", "").is_err());
        assert!(c.get_one_field(&s, ContextType::List, "Similarity: Jaccard Distance", "").is_err());
        let f = c.get_one_field(&scope("", true), ContextType::List, "Similarity: Jaccard Distance", "").unwrap();
        assert!(f.from_scope_query);
        assert!(f.request().is_some());
    }

    #[test]
    fn filtering_fields_carry_values() {
        let c = catalog();
        let requested = vec![
            FacetFilter {
                facet: "Family".into(),
                values: vec!["GPCR".into()],
            },
            FacetFilter {
                facet: "Nope".into(),
                values: vec!["x".into()],
            },
        ];
        let (found, unknown) = c.get_these_filtering_fields(&scope("Target", false), ContextType::Facet, &requested);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].allowed_values, vec!["GPCR".to_string()]);
        assert_eq!(unknown.len(), 1);
    }

    #[test]
    fn download_lists_skip_bucket() {
        let c = catalog();
        let lists = c.download_lists(&scope("", true));
        assert!(lists.contains_key("GO Terms"));
        assert!(!lists.contains_key(BUCKET));
        assert_eq!(lists[SINGLE_VALUE_FIELDS].len(), 1 + 5);
        assert!(c.overlap_field("Target", "GO Process").is_some());
        assert!(c.overlap_field("Target", "Family").is_none());
    }

    #[test]
    fn model_without_key_is_excluded_once_schema_is_known() {
        let mut config = FullConfig::default();
        config.models.push(ModelConfig {
            name: "Ortholog".into(),
            kind: ModelKind::Ortholog,
            root_table: "ortholog".into(),
            key_column: None,
            id_column: "symbol".into(),
        });
        let schema = SchemaCatalog::default();
        assert!(FieldCatalog::build(&config, Some(&schema)).model("Ortholog").is_none());
        assert_eq!(FieldCatalog::build(&config, None).model("Ortholog").unwrap().key_column, "id");
    }
}
