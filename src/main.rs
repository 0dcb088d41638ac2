use std::sync::Arc;

use analytics_ingest::{
    api,
    config::{AppConfig, StoreBackend},
    db::{bigquery::BigQueryEventStore, memory::MemoryEventStore, EventStore},
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "analytics_ingest=info,tower_http=info".into()),
        )
        .init();

    let config = AppConfig::from_env().map_err(|err| anyhow::anyhow!(err))?;

    let store: Arc<dyn EventStore> = match config.store {
        StoreBackend::BigQuery => {
            let project_id = config
                .project_id
                .as_deref()
                .ok_or_else(|| anyhow::anyhow!("bigquery store requires a project id"))?;
            Arc::new(BigQueryEventStore::new(
                reqwest::Client::new(),
                &config.bigquery_api_url,
                project_id,
                config.token_source(),
            ))
        }
        StoreBackend::Memory => Arc::new(MemoryEventStore::default()),
    };

    let app = api::router(api::AppState { store });

    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    tracing::info!(addr = %config.bind_addr, store = %config.store, "server listening");
    axum::serve(listener, app).await?;

    Ok(())
}
