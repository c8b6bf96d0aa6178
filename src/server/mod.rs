//! HTTP surface: `POST /run`, `POST /explain`, `GET /health`
//!
//! Executions run on actix's blocking pool; a semaphore bounds how many run
//! at once.

mod handlers;

#[cfg(test)]
mod tests;

use std::sync::Arc;

use actix_web::{web, App, HttpServer};
use anyhow::{Context, Result};
use tokio::sync::Semaphore;
use tracing::info;

use crate::config::Config;
use crate::engine::Engine;
use crate::explain::Explainer;

pub use handlers::{ErrorBody, ExplainResponse, HealthResponse};

/// Shared by every worker
pub struct AppState {
    pub engine: Engine,
    pub explainer: Explainer,
    pub limiter: Arc<Semaphore>,
}

impl AppState {
    pub fn from_config(config: &Config) -> Result<Self> {
        let explainer = Explainer::from_config(&config.explain).context("Failed to build explanation client")?;
        Ok(Self {
            engine: Engine::new(config.engine.clone()),
            explainer,
            limiter: Arc::new(Semaphore::new(config.server.max_concurrent_executions)),
        })
    }
}

/// Route table and JSON limits, shared by the server and tests
pub fn configure(max_body_bytes: usize) -> impl FnOnce(&mut web::ServiceConfig) {
    move |cfg: &mut web::ServiceConfig| {
        cfg.app_data(
            web::JsonConfig::default()
                .limit(max_body_bytes)
                .error_handler(handlers::json_error),
        )
        .route("/run", web::post().to(handlers::run_code))
        .route("/explain", web::post().to(handlers::explain_code))
        .route("/health", web::get().to(handlers::health));
    }
}

pub async fn start_server(config: Config) -> Result<()> {
    let state = web::Data::new(AppState::from_config(&config)?);
    let addr = format!("{}:{}", config.server.host, config.server.port);
    let max_body_bytes = config.server.max_body_bytes;

    info!(
        %addr,
        workers = config.server.workers,
        max_concurrent_executions = config.server.max_concurrent_executions,
        "starting stepwise server"
    );

    HttpServer::new(move || {
        App::new()
            .app_data(state.clone())
            .configure(configure(max_body_bytes))
    })
    .workers(config.server.workers)
    .bind(&addr)
    .with_context(|| format!("Failed to bind {}", addr))?
    .run()
    .await
    .context("Server terminated with an error")
}
