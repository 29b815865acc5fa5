use std::sync::Arc;

use anyhow::Context;

use lumberyard_infra::{Services, Settings};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    lumberyard_observability::init();

    let settings = Settings::from_env();
    let services = Services::from_settings(&settings)
        .await
        .context("failed to wire services")?;

    let app = lumberyard_api::app::build_app(Arc::new(services));

    let listener = tokio::net::TcpListener::bind(settings.bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", settings.bind_addr))?;

    tracing::info!("listening on {}", listener.local_addr()?);

    axum::serve(listener, app).await.context("server error")?;
    Ok(())
}
