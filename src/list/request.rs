//! List request shape (camelCase JSON) and its per-request normalized state.

use crate::list::scope::ScopingMode;
use crate::settings::QuerySettings;
use crate::sql::SortDirection;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct FacetFilter {
    pub facet: String,
    #[serde(default)]
    pub values: Vec<String>,
}

/// Base entity and overlap facet of a similarity scope.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "SimilarityRepr")]
pub struct SimilarityFilter {
    #[serde(rename = "match")]
    pub match_: String,
    pub facet: String,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum SimilarityRepr {
    Object {
        #[serde(rename = "match")]
        match_: String,
        facet: String,
    },
    Text(String),
}

impl TryFrom<SimilarityRepr> for SimilarityFilter {
    type Error = String;

    fn try_from(repr: SimilarityRepr) -> Result<Self, Self::Error> {
        match repr {
            SimilarityRepr::Object { match_, facet } => Ok(SimilarityFilter { match_, facet }),
            SimilarityRepr::Text(s) => SimilarityFilter::parse(&s),
        }
    }
}

impl SimilarityFilter {
    /// Parse `"(match, facet)"`; the parentheses are optional.
    pub fn parse(s: &str) -> Result<Self, String> {
        let (match_, facet) = s
            .split_once(',')
            .ok_or_else(|| format!("similarity must look like \"(match, facet)\": {}", s))?;
        let match_ = match_.trim().trim_start_matches('(').trim();
        let facet = facet.trim().trim_end_matches(')').trim();
        if match_.is_empty() || facet.is_empty() {
            return Err(format!("similarity needs both a match and a facet: {}", s));
        }
        Ok(SimilarityFilter {
            match_: match_.to_string(),
            facet: facet.to_string(),
        })
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ListFilter {
    pub term: String,
    pub facets: Vec<FacetFilter>,
    pub associated_target: String,
    pub associated_disease: String,
    pub associated_ligand: String,
    pub associated_smiles: String,
    pub similarity: Option<SimilarityFilter>,
    /// `^Field` sorts ascending; any other prefix character sorts descending.
    pub order: Option<String>,
    pub ppi_confidence: Option<f64>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ListRequest {
    pub term: String,
    pub fields: Vec<String>,
    pub filter: ListFilter,
    pub batch: Vec<String>,
    pub skip: Option<u64>,
    pub top: Option<u64>,
    /// Facets to count; empty means the model's default facets.
    pub facets: Vec<String>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct SortSpec {
    pub field: String,
    pub direction: SortDirection,
}

impl SortSpec {
    pub fn parse(order: &str) -> Option<Self> {
        let mut chars = order.chars();
        let prefix = chars.next()?;
        let field = chars.as_str().trim();
        if field.is_empty() {
            return None;
        }
        let direction = if prefix == '^' {
            SortDirection::Asc
        } else {
            SortDirection::Desc
        };
        Some(SortSpec {
            field: field.to_string(),
            direction,
        })
    }
}

/// Normalized, per-request view of a `ListRequest`.
#[derive(Clone, Debug)]
pub struct ListRequestState {
    pub facets: Vec<FacetFilter>,
    pub fields: Vec<String>,
    pub skip: u64,
    /// `None` when the caller asked for `top: 0`, which means no limit.
    pub top: Option<u64>,
    pub sort: Option<SortSpec>,
    pub scope: ScopingMode,
    pub ppi_confidence: f64,
    pub requested_facets: Vec<String>,
}

impl ListRequestState {
    /// Returns the state and a warning for every scoping input that lost on precedence.
    pub fn from_request(req: &ListRequest, settings: &QuerySettings) -> (Self, Vec<String>) {
        let ppi_confidence = req.filter.ppi_confidence.unwrap_or(settings.default_ppi_confidence);
        let (scope, ignored) = ScopingMode::select(req, ppi_confidence);
        let warnings = ignored
            .into_iter()
            .map(|name| format!("{} ignored: list is already scoped by {}", name, scope.label()))
            .collect();
        let facets = req
            .filter
            .facets
            .iter()
            .filter(|f| !f.facet.is_empty() && !f.values.is_empty())
            .cloned()
            .collect();
        let state = ListRequestState {
            facets,
            fields: req.fields.clone(),
            skip: req.skip.unwrap_or(0),
            top: Some(req.top.unwrap_or(settings.default_top)).filter(|&t| t > 0),
            sort: req.filter.order.as_deref().and_then(SortSpec::parse),
            scope,
            ppi_confidence,
            requested_facets: req.facets.clone(),
        };
        (state, warnings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn similarity_accepts_object_and_string() {
        let a: ListFilter = serde_json::from_value(json!({"similarity": {"match": "DRD2", "facet": "GO Process"}})).unwrap();
        let b: ListFilter = serde_json::from_value(json!({"similarity": "(DRD2, GO Process)"})).unwrap();
        assert_eq!(a.similarity, b.similarity);
        assert_eq!(b.similarity.unwrap().facet, "GO Process");
        assert!(serde_json::from_value::<ListFilter>(json!({"similarity": "DRD2"})).is_err());
    }

    #[test]
    fn order_prefix_sets_direction() {
        assert_eq!(
            SortSpec::parse("^Novelty"),
            Some(SortSpec {
                field: "Novelty".into(),
                direction: SortDirection::Asc
            })
        );
        assert_eq!(SortSpec::parse("!Novelty").unwrap().direction, SortDirection::Desc);
        assert_eq!(SortSpec::parse("^"), None);
    }

    #[test]
    fn state_applies_defaults() {
        let req: ListRequest = serde_json::from_value(json!({
            "filter": {"facets": [{"facet": "Target Development Level", "values": ["Tclin"]}, {"facet": "Family", "values": []}]}
        }))
        .unwrap();
        let (state, warnings) = ListRequestState::from_request(&req, &QuerySettings::default());
        assert_eq!(state.top, Some(10));
        assert_eq!(state.skip, 0);
        assert_eq!(state.ppi_confidence, 0.46);
        assert_eq!(state.facets.len(), 1);
        assert_eq!(state.scope, ScopingMode::None);
        assert!(warnings.is_empty());
    }

    #[test]
    fn zero_top_means_unlimited() {
        let req: ListRequest = serde_json::from_value(json!({"top": 0})).unwrap();
        let (state, _) = ListRequestState::from_request(&req, &QuerySettings::default());
        assert_eq!(state.top, None);
    }
}
