// Copyright 2025 Gitship Team
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! The authenticated web tier embedding of the console.
//!
//! Unlike the standalone relay, routes here sit behind the dashboard's
//! session cookie. The tier mints console tokens for front-ends that talk to
//! a separate relay, and also mounts the bridge in-process at `/api/console`
//! for deployments that skip the extra hop. Both paths end in the same
//! [`crate::bridge`] semantics; they differ only in how the target is
//! authorized.

pub mod error;
pub mod handlers;
pub mod middleware;
pub mod state;

use std::sync::Arc;

use axum::{
    Router,
    http::{HeaderValue, Method, StatusCode, header},
    response::IntoResponse,
    routing::{get, post},
};
use tower_http::{compression::CompressionLayer, cors::CorsLayer, trace::TraceLayer};
use tracing::info;

use crate::exec::ExecBackend;
use crate::token::SigningSecret;
use self::state::AppState;

/// Dashboard origin allowed by CORS; override for non-local deployments.
const WEB_ORIGIN_ENV: &str = "GITSHIP_WEB_ORIGIN";

/// Starts the console HTTP server.
pub async fn run(
    port: u16,
    secret: SigningSecret,
    backend: Arc<dyn ExecBackend>,
) -> Result<(), Box<dyn std::error::Error>> {
    info!("Starting Gitship console tier on port {}", port);

    let web_origin =
        std::env::var(WEB_ORIGIN_ENV).unwrap_or_else(|_| "http://localhost:3000".to_string());

    let state = AppState::new(secret, backend);

    let app = Router::new()
        // Health checks (no auth)
        .route("/healthz", get(health_check))
        .route("/readyz", get(ready_check))
        // In-process console WebSocket (session authenticated)
        .route("/api/console", get(handlers::attach_console))
        // API v1 routes
        .nest("/api/v1", api_routes())
        .with_state(state.clone())
        .layer(TraceLayer::new_for_http())
        .layer(CompressionLayer::new())
        .layer(
            CorsLayer::new()
                .allow_origin(web_origin.parse::<HeaderValue>()?)
                .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
                .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION, header::COOKIE])
                .allow_credentials(true),
        )
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            middleware::session_middleware,
        ));

    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr).await?;

    info!("Console tier listening on http://{}", addr);
    info!("API endpoints:");
    info!("  - POST /api/v1/console/token");
    info!("  - GET  /api/console");
    info!("  - GET  /healthz");

    axum::serve(listener, app).await?;

    Ok(())
}

fn api_routes() -> Router<AppState> {
    Router::new().route("/console/token", post(handlers::mint_token))
}

async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

async fn ready_check() -> impl IntoResponse {
    (StatusCode::OK, "Ready")
}
