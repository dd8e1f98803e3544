//! Executes a list request: scope ids once, then count, list and facets concurrently.

use crate::catalog::Catalogs;
use crate::config::ModelKind;
use crate::error::AppError;
use crate::list::{ListOrchestrator, ListRequest};
use crate::response::{FacetResult, ListResult};
use crate::service::{QueryExecutor, TextSearch};
use crate::sql::{KeyList, QueryBuf};
use futures::future::try_join_all;
use serde_json::Value;
use std::sync::Arc;

pub struct ListService;

impl ListService {
    pub async fn run(
        executor: &dyn QueryExecutor,
        catalogs: &Catalogs,
        search: Arc<dyn TextSearch>,
        kind: ModelKind,
        req: &ListRequest,
    ) -> Result<ListResult, AppError> {
        let mut orchestrator = ListOrchestrator::new(catalogs, search, kind, req)?;
        Self::execute(executor, &mut orchestrator).await
    }

    pub async fn execute(executor: &dyn QueryExecutor, orchestrator: &mut ListOrchestrator) -> Result<ListResult, AppError> {
        if let Some(q) = orchestrator.scope_id_query() {
            let rows = executor.fetch_all(&q.build()).await?;
            orchestrator.cache_scope_ids(KeyList::from_rows(&rows, "entity_id"));
        }

        let count_q = orchestrator.count_query().build();
        let list_q = orchestrator.list_query().build();
        let facet_qs = orchestrator.facet_queries();
        let facet_bufs: Vec<QueryBuf> = facet_qs.iter().map(|f| f.query.build()).collect();

        let (count_rows, rows, facet_rows) = futures::try_join!(
            executor.fetch_all(&count_q),
            executor.fetch_all(&list_q),
            try_join_all(facet_bufs.iter().map(|q| executor.fetch_all(q))),
        )?;

        let count = count_rows
            .first()
            .and_then(|r| r.get("count"))
            .and_then(Value::as_u64)
            .unwrap_or(0);
        let facets = facet_qs
            .iter()
            .zip(facet_rows)
            .map(|(fq, rows)| FacetResult::from_rows(&fq.field, rows))
            .collect();
        tracing::info!(
            model = %orchestrator.model().name,
            scope = orchestrator.state().scope.label(),
            count,
            rows = rows.len(),
            "list served"
        );
        Ok(ListResult {
            count,
            rows,
            facets,
            warnings: orchestrator.warnings().to_vec(),
        })
    }
}
