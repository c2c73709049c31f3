use std::sync::Arc;

use anyhow::Result;
use tracing_subscriber::EnvFilter;

use image_edit_quota::{
    api::{self, AppState},
    config::AppConfig,
    gemini::GeminiClient,
    pipeline::RequestPipeline,
    quota::{QuotaStore, ReferenceClock},
};

#[tokio::main]
async fn main() -> Result<()> {
    let config = AppConfig::from_env()?;
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    if config.default_api_key.is_none() {
        tracing::warn!("GOOGLE_API_KEY is not set; requests must supply their own apiKey");
    }

    let clock = ReferenceClock::new(config.quota_offset);
    let quota = Arc::new(QuotaStore::new(Arc::new(clock)));
    let client = GeminiClient::new(
        config.gemini_base_url.clone(),
        config.gemini_model.clone(),
        config.default_api_key.clone(),
        config.generation_timeout,
    )?;
    let pipeline = Arc::new(RequestPipeline::new(
        quota,
        Arc::new(client),
        config.default_daily_limit,
    ));
    let router = api::router(AppState::new(pipeline, &config.user_id_header));

    let tcp_listener = tokio::net::TcpListener::bind(&config.bind_address).await?;
    tracing::info!(
        address = %config.bind_address,
        model = %config.gemini_model,
        daily_limit = config.default_daily_limit,
        "image edit server started"
    );

    axum::serve(tcp_listener, router)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await?;
    Ok(())
}
