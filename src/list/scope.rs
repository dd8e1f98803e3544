//! The one scoping mode active for a list request.

use crate::list::request::ListRequest;

#[derive(Clone, Debug, PartialEq)]
pub enum ScopingMode {
    None,
    Term(String),
    Batch(Vec<String>),
    AssociatedTarget { target: String, ppi_confidence: f64 },
    AssociatedDisease(String),
    AssociatedLigand(String),
    AssociatedStructure(String),
    Similarity { match_: String, facet: String },
}

impl ScopingMode {
    /// Pick the scope by precedence: term, batch, associated target, disease,
    /// ligand, structure, similarity. Also returns the names of the supplied
    /// inputs that lost.
    pub fn select(req: &ListRequest, ppi_confidence: f64) -> (ScopingMode, Vec<&'static str>) {
        let f = &req.filter;
        let term = if f.term.trim().is_empty() { req.term.trim() } else { f.term.trim() };
        let mut candidates: Vec<(&'static str, ScopingMode)> = Vec::new();
        if !term.is_empty() {
            candidates.push(("term", ScopingMode::Term(term.to_string())));
        }
        if !req.batch.is_empty() {
            candidates.push(("batch", ScopingMode::Batch(req.batch.clone())));
        }
        if !f.associated_target.is_empty() {
            candidates.push((
                "associatedTarget",
                ScopingMode::AssociatedTarget {
                    target: f.associated_target.clone(),
                    ppi_confidence,
                },
            ));
        }
        if !f.associated_disease.is_empty() {
            candidates.push(("associatedDisease", ScopingMode::AssociatedDisease(f.associated_disease.clone())));
        }
        if !f.associated_ligand.is_empty() {
            candidates.push(("associatedLigand", ScopingMode::AssociatedLigand(f.associated_ligand.clone())));
        }
        if !f.associated_smiles.is_empty() {
            candidates.push(("associatedSmiles", ScopingMode::AssociatedStructure(f.associated_smiles.clone())));
        }
        if let Some(s) = &f.similarity {
            candidates.push((
                "similarity",
                ScopingMode::Similarity {
                    match_: s.match_.clone(),
                    facet: s.facet.clone(),
                },
            ));
        }
        let mut iter = candidates.into_iter();
        match iter.next() {
            Some((_, mode)) => (mode, iter.map(|(name, _)| name).collect()),
            None => (ScopingMode::None, Vec::new()),
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            ScopingMode::None => "nothing",
            ScopingMode::Term(_) => "term",
            ScopingMode::Batch(_) => "batch",
            ScopingMode::AssociatedTarget { .. } => "associatedTarget",
            ScopingMode::AssociatedDisease(_) => "associatedDisease",
            ScopingMode::AssociatedLigand(_) => "associatedLigand",
            ScopingMode::AssociatedStructure(_) => "associatedSmiles",
            ScopingMode::Similarity { .. } => "similarity",
        }
    }

    /// Model name used to pick association-specific field lists.
    pub fn associated_model(&self) -> &'static str {
        match self {
            ScopingMode::AssociatedTarget { .. } => "Target",
            ScopingMode::AssociatedDisease(_) => "Disease",
            _ => "",
        }
    }

    /// Scopes resolved to an identifier list once per request.
    pub fn resolves_to_ids(&self) -> bool {
        !matches!(self, ScopingMode::None | ScopingMode::Batch(_))
    }

    pub fn is_association(&self) -> bool {
        matches!(
            self,
            ScopingMode::AssociatedTarget { .. }
                | ScopingMode::AssociatedDisease(_)
                | ScopingMode::AssociatedLigand(_)
                | ScopingMode::AssociatedStructure(_)
        )
    }

    pub fn is_similarity(&self) -> bool {
        matches!(self, ScopingMode::Similarity { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn request(v: serde_json::Value) -> ListRequest {
        serde_json::from_value(v).unwrap()
    }

    #[test]
    fn term_beats_everything() {
        let req = request(json!({
            "batch": ["P14416"],
            "filter": {"term": "dopamine", "associatedDisease": "asthma"}
        }));
        let (mode, ignored) = ScopingMode::select(&req, 0.46);
        assert_eq!(mode, ScopingMode::Term("dopamine".into()));
        assert_eq!(ignored, vec!["batch", "associatedDisease"]);
    }

    #[test]
    fn associations_follow_precedence() {
        let req = request(json!({"filter": {"associatedLigand": "CHEMBL1", "associatedSmiles": "CCO", "associatedDisease": "asthma"}}));
        let (mode, _) = ScopingMode::select(&req, 0.46);
        assert_eq!(mode, ScopingMode::AssociatedDisease("asthma".into()));

        let req = request(json!({"filter": {"associatedSmiles": "CCO", "similarity": "(DRD2, GO Process)"}}));
        let (mode, ignored) = ScopingMode::select(&req, 0.46);
        assert_eq!(mode, ScopingMode::AssociatedStructure("CCO".into()));
        assert_eq!(ignored, vec!["similarity"]);
    }

    #[test]
    fn associated_target_carries_confidence() {
        let req = request(json!({"filter": {"associatedTarget": "DRD2"}}));
        let (mode, _) = ScopingMode::select(&req, 0.9);
        assert_eq!(mode.associated_model(), "Target");
        assert!(mode.resolves_to_ids());
        assert_eq!(
            mode,
            ScopingMode::AssociatedTarget {
                target: "DRD2".into(),
                ppi_confidence: 0.9
            }
        );
    }
}
