use actix_web::{web, App, HttpServer};
use anyhow::Context;
use tracing::info;
use tracing_subscriber::EnvFilter;

use distsoc::config::Config;
use distsoc::handlers::handle_all;
use distsoc::state::AppState;

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = Config::load();
    let bind = config.bind.clone();
    let state = web::Data::new(AppState::new(config).context("failed to initialize node")?);

    info!(
        host = %state.config.host,
        remote_nodes = state.nodes.nodes().len(),
        "Server listening on http://{bind}"
    );

    HttpServer::new(move || {
        App::new()
            .app_data(state.clone())
            .app_data(web::PayloadConfig::new(4 * 1024 * 1024))
            .default_service(web::route().to(handle_all))
    })
    .bind(&bind)
    .with_context(|| format!("failed to bind {bind}"))?
    .run()
    .await
    .context("server error")
}
