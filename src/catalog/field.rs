//! Field descriptors: one queryable column or expression, specialized per request.

use crate::config::{Aggregation, ContextType, FieldConfig, ModelKind, ValueKind};
use crate::schema::SchemaCatalog;
use crate::sql::{column_ref, quoted};
use std::sync::Arc;

/// Alias of the scoring subquery joined into list queries.
pub const SCOPE_QUERY_ALIAS: &str = "filterQuery";

/// What a request contributes to the descriptors it receives.
#[derive(Clone, Debug, PartialEq)]
pub struct RequestScope {
    pub model: String,
    pub kind: ModelKind,
    pub root_table: String,
    pub key_column: String,
    /// "Target" / "Disease" when the list is scoped by an association, else empty.
    pub associated_model: String,
    pub similarity_active: bool,
    /// Association table and the label shown as the modifier of its fields.
    pub association: Option<(String, String)>,
}

impl RequestScope {
    pub fn new(model: &str, kind: ModelKind, root_table: &str, key_column: &str) -> Self {
        RequestScope {
            model: model.to_string(),
            kind,
            root_table: root_table.to_string(),
            key_column: key_column.to_string(),
            associated_model: String::new(),
            similarity_active: false,
            association: None,
        }
    }
}

#[derive(Clone, Debug)]
pub struct FieldDescriptor {
    pub name: String,
    pub description: String,
    pub model: String,
    pub context: ContextType,
    pub list_name: String,
    pub table: String,
    pub column: Option<String>,
    pub alias: String,
    pub select: Option<String>,
    pub where_clause: Option<String>,
    pub aggregation: Option<Aggregation>,
    /// Empty means the field is not used as a filter.
    pub allowed_values: Vec<String>,
    pub type_modifier: Option<String>,
    pub value_kind: ValueKind,
    pub bin_size: Option<f64>,
    pub order: i32,
    /// Read from the scoring subquery rather than a joined table.
    pub from_scope_query: bool,
    request: Option<Arc<RequestScope>>,
}

impl PartialEq for FieldDescriptor {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
            && self.table == other.table
            && self.column == other.column
            && self.alias == other.alias
            && self.type_modifier == other.type_modifier
            && self.allowed_values == other.allowed_values
    }
}

impl FieldDescriptor {
    pub fn from_config(c: &FieldConfig) -> Self {
        FieldDescriptor {
            name: c.name.clone(),
            description: c.description.clone(),
            model: c.model.clone(),
            context: c.context,
            list_name: c.list_name.clone(),
            table: c.table.clone(),
            column: c.column.clone(),
            alias: c.alias.clone().unwrap_or_else(|| c.name.clone()),
            select: c.select.clone(),
            where_clause: c.where_clause.clone(),
            aggregation: c.group_method,
            allowed_values: Vec::new(),
            type_modifier: c.type_modifier.clone(),
            value_kind: c.value_kind,
            bin_size: c.bin_size,
            order: c.order,
            from_scope_query: false,
            request: None,
        }
    }

    /// Plain column projection, e.g. the `id` column of a model.
    pub fn column(table: &str, column: &str, alias: &str) -> Self {
        FieldDescriptor {
            name: alias.to_string(),
            description: String::new(),
            model: String::new(),
            context: ContextType::List,
            list_name: String::new(),
            table: table.to_string(),
            column: Some(column.to_string()),
            alias: alias.to_string(),
            select: None,
            where_clause: None,
            aggregation: None,
            allowed_values: Vec::new(),
            type_modifier: None,
            value_kind: ValueKind::Category,
            bin_size: None,
            order: 0,
            from_scope_query: false,
            request: None,
        }
    }

    /// Column of the scoring subquery (relevance score, similarity metrics).
    pub fn scope_column(column: &str, name: &str, description: &str) -> Self {
        let mut f = Self::column(SCOPE_QUERY_ALIAS, column, name);
        f.description = description.to_string();
        f.from_scope_query = true;
        f
    }

    pub fn with_aggregation(mut self, aggregation: Aggregation) -> Self {
        self.aggregation = Some(aggregation);
        self
    }

    pub fn with_allowed_values(mut self, values: Vec<String>) -> Self {
        self.allowed_values = values;
        self
    }

    /// Clone carrying a back-reference to the request it serves.
    pub fn stamped(&self, scope: &Arc<RequestScope>) -> Self {
        let mut f = self.clone();
        f.request = Some(Arc::clone(scope));
        f
    }

    pub fn request(&self) -> Option<&RequestScope> {
        self.request.as_deref()
    }

    pub fn is_filter(&self) -> bool {
        !self.allowed_values.is_empty()
    }

    pub fn is_numeric(&self) -> bool {
        self.value_kind == ValueKind::Numeric
    }

    /// Modifier shown with facet results: the configured type modifier, or the
    /// association label when this field reads the request's association table.
    pub fn effective_modifier(&self) -> Option<String> {
        if let Some(m) = &self.type_modifier {
            return Some(m.clone());
        }
        let (table, label) = self.request()?.association.as_ref()?;
        (table == &self.table).then(|| label.clone())
    }

    /// Column to read, falling back to the type table's value column for the modifier.
    pub fn resolved_column(&self, schema: Option<&SchemaCatalog>) -> Option<String> {
        if let Some(c) = &self.column {
            return Some(c.clone());
        }
        let modifier = self.type_modifier.as_deref()?;
        schema?.type_value_column(&self.table, modifier).map(String::from)
    }

    /// SQL expression reading this field from the source aliased `table_alias`.
    pub fn expression(&self, table_alias: &str, schema: Option<&SchemaCatalog>) -> Option<String> {
        if let Some(select) = &self.select {
            return Some(select.replace("{alias}", &quoted(table_alias)));
        }
        self.resolved_column(schema).map(|c| column_ref(table_alias, &c))
    }

    pub fn where_expression(&self, table_alias: &str) -> Option<String> {
        self.where_clause
            .as_ref()
            .map(|w| w.replace("{alias}", &quoted(table_alias)))
    }

    pub fn similarity_fields() -> Vec<FieldDescriptor> {
        [
            (
                "overlap",
                "Similarity: Common Count",
                "Count of shared values between the base entity and the test entity",
            ),
            ("baseSize", "Similarity: Base Count", "Count of values for the base entity"),
            ("testSize", "Similarity: Test Count", "Count of values for the test entity"),
            (
                "commonOptions",
                "Similarity: Common Elements",
                "Pipe-delimited list of values shared by the two entities",
            ),
            (
                "jaccard",
                "Similarity: Jaccard Distance",
                "Jaccard index between the value sets of the two entities",
            ),
        ]
        .into_iter()
        .map(|(column, name, description)| {
            let mut f = FieldDescriptor::scope_column(column, name, description);
            if column != "commonOptions" {
                f.value_kind = ValueKind::Numeric;
            }
            f
        })
        .collect()
    }
}
