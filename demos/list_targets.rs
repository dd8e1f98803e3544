//! Lists targets against a live knowledgebase and prints the result as JSON.
//!
//! `cargo run --example list_targets -- '{"filter":{"facets":[{"facet":"Target Development Level","values":["Tclin"]}]}}'`
//!
//! Reads `DATABASE_URL` and the `KB_*` settings from the environment (or `.env`).
//! Point `KB_CONFIG_PATH` at `demos/config` to use the bundled catalog files.

use biokb_query::{AppState, ListRequest, ListService, ModelKind, Settings};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("biokb_query=info")),
        )
        .init();

    let req: ListRequest = match std::env::args().nth(1) {
        Some(arg) => serde_json::from_str(&arg)?,
        None => ListRequest::default(),
    };
    let settings = Settings::from_env();
    let state = AppState::connect(&settings).await?;
    tracing::info!(schema_ready = state.catalogs.schema.current().is_some(), "catalogs initialized");

    let result = ListService::run(
        state.executor.as_ref(),
        &state.catalogs,
        state.search.clone(),
        ModelKind::Target,
        &req,
    )
    .await?;
    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(())
}
