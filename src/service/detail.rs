//! Detail-view helpers: similarity neighbors and the expression hierarchy.

use crate::catalog::Catalogs;
use crate::config::ModelKind;
use crate::error::AppError;
use crate::hierarchy::{HierarchyAggregator, ObservationRow, OntologyNode};
use crate::service::QueryExecutor;
use crate::similarity::{SimilarityEngine, SimilarityRow};

pub struct DetailService;

impl DetailService {
    /// Entities sharing the most `facet` values with the entity named `match_`.
    /// An unknown overlap facet yields no rows.
    pub async fn similar(
        executor: &dyn QueryExecutor,
        catalogs: &Catalogs,
        kind: ModelKind,
        match_: &str,
        facet: &str,
        top: u64,
    ) -> Result<Vec<SimilarityRow>, AppError> {
        let model = catalogs
            .fields
            .model_for_kind(kind)
            .ok_or_else(|| AppError::BadRequest(format!("model {} is not registered", kind.as_str())))?;
        let engine = SimilarityEngine::new(
            catalogs.schema.current(),
            &model.root_table,
            &model.key_column,
            kind.match_selector(&model.root_table, match_),
            catalogs.fields.overlap_field(&model.name, facet),
        );
        let Some(q) = engine.neighbors_query(top) else {
            tracing::warn!(model = %model.name, facet = %facet, "similarity unavailable");
            return Ok(Vec::new());
        };
        let rows = executor.fetch_all(&q.build()).await?;
        Ok(rows.iter().filter_map(SimilarityRow::from_json).collect())
    }

    pub async fn expression_hierarchy(executor: &dyn QueryExecutor, entity_id: i64) -> Result<Vec<OntologyNode>, AppError> {
        let aggregator = HierarchyAggregator::default();
        let rows = executor.fetch_all(&aggregator.query(entity_id)).await?;
        let observations: Vec<ObservationRow> = rows.iter().filter_map(ObservationRow::from_json).collect();
        Ok(aggregator.build(&observations))
    }
}
