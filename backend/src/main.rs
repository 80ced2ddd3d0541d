use payroll_backend::api;
use payroll_backend::config::BackendConfig;
use payroll_backend::state::AppState;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("info".parse()?))
        .init();

    let config = BackendConfig::from_env()?;
    let state = AppState::init(&config).await?;

    let app = api::router(state);

    let listener = tokio::net::TcpListener::bind(&config.addr).await?;

    tracing::info!(addr = %config.addr, "backend listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await?;

    Ok(())
}
