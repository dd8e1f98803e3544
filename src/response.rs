//! Result envelopes returned by the list and detail services.

use crate::catalog::FieldDescriptor;
use serde::Serialize;
use serde_json::Value;

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct FacetValue {
    /// Facet value, or the lower bound of the bin for binned numeric facets.
    pub name: Value,
    pub value: u64,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct FacetResult {
    pub facet: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub modifier: Option<String>,
    pub count: usize,
    pub values: Vec<FacetValue>,
}

impl FacetResult {
    pub fn from_rows(field: &FieldDescriptor, rows: Vec<Value>) -> Self {
        let values: Vec<FacetValue> = rows
            .into_iter()
            .filter_map(|mut row| {
                let name = row.get_mut("name").map(Value::take)?;
                let value = row.get("value").and_then(Value::as_u64).unwrap_or(0);
                Some(FacetValue { name, value })
            })
            .collect();
        FacetResult {
            facet: field.name.clone(),
            modifier: field.effective_modifier(),
            count: values.len(),
            values,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct ListResult {
    pub count: u64,
    pub rows: Vec<Value>,
    pub facets: Vec<FacetResult>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}
