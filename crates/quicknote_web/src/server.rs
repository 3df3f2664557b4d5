use crate::config::ServerConfig;
use crate::error::{ApiError, Result, WebError};
use crate::routes::note_routes;
use crate::state::AppState;
use axum::extract::DefaultBodyLimit;
use axum::handler::HandlerWithoutStateExt;
use axum::http::{header, Method};
use axum::Router;
use log::info;
use std::path::Path;
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::ServeDir;

const MAX_BODY_SIZE_1MB: usize = 1024 * 1024;

/// Builds the application router. Exposed for in-process tests.
pub fn build_router(state: AppState, static_dir: Option<&Path>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE]);

    let router = note_routes().with_state(state);
    let router = match static_dir {
        Some(dir) => router.fallback_service(
            ServeDir::new(dir).not_found_service(not_found.into_service()),
        ),
        None => router.fallback(not_found),
    };

    router
        .layer(DefaultBodyLimit::max(MAX_BODY_SIZE_1MB))
        .layer(cors)
}

pub async fn start_server(config: &ServerConfig) -> Result<()> {
    let addr = config.socket_addr().map_err(WebError::Config)?;
    let state = AppState::new(config.db_path.clone());

    info!(
        "event=server_start module=web status=start addr={addr} db_path={} static_dir={}",
        state.db_path().display(),
        config
            .static_dir
            .as_deref()
            .map_or_else(|| "-".to_string(), |dir| dir.display().to_string())
    );

    let app = build_router(state, config.static_dir.as_deref());
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

async fn not_found() -> ApiError {
    ApiError::NotFound("Not Found".to_string())
}
