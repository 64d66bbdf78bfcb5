use std::sync::Arc;

use anyhow::Context;
use axum::{
    extract::DefaultBodyLimit,
    http::HeaderValue,
    routing::{get, post},
    Router,
};
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use voice_application::ProcessAudioUseCase;
use voice_configuration::{CorsConfig, ServerConfig};

pub mod error;
pub mod handlers;

pub use error::{error_mapper, HttpError};
pub use handlers::*;

#[derive(Clone)]
pub struct AppState {
    pub usecase: Arc<dyn ProcessAudioUseCase>,
}

impl AppState {
    pub fn new(usecase: Arc<dyn ProcessAudioUseCase>) -> Self {
        Self { usecase }
    }
}

pub fn build_router(
    state: AppState,
    server: &ServerConfig,
    cors: &CorsConfig,
) -> anyhow::Result<Router> {
    // Uploads arrive as raw container bytes; the default 2 MiB limit is too small.
    let process_route =
        post(process_audio).layer(DefaultBodyLimit::max(server.max_upload_bytes));

    Ok(Router::new()
        .route("/health", get(health_check))
        .route("/process-audio", process_route)
        .layer(cors_layer(cors)?)
        .with_state(state))
}

/// Fixed origin allow-list; credentials stay disabled.
pub fn cors_layer(cors: &CorsConfig) -> anyhow::Result<CorsLayer> {
    let origins = cors
        .allowed_origins
        .iter()
        .map(|origin| {
            HeaderValue::from_str(origin).with_context(|| format!("invalid CORS origin `{origin}`"))
        })
        .collect::<anyhow::Result<Vec<_>>>()?;

    Ok(CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods(Any)
        .allow_headers(Any)
        .expose_headers(Any))
}
