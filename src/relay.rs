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

//! The standalone console relay.
//!
//! This process carries no dashboard session state: every WebSocket upgrade
//! must present a console token minted by the authenticated web tier. The
//! token is the entire authorization; once verified, its claims are the exec
//! target.

use std::sync::Arc;

use axum::{
    Router,
    extract::ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade, close_code},
    extract::{Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::get,
};
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::bridge;
use crate::exec::{ExecBackend, ExecTarget};
use crate::token::{self, SigningSecret};

#[derive(Clone)]
pub struct RelayState {
    secret: SigningSecret,
    backend: Arc<dyn ExecBackend>,
}

#[derive(Debug, Deserialize)]
pub struct ConsoleQuery {
    pub token: Option<String>,
    pub container: Option<String>,
}

/// Starts the relay HTTP server.
pub async fn run(
    port: u16,
    secret: SigningSecret,
    backend: Arc<dyn ExecBackend>,
) -> Result<(), Box<dyn std::error::Error>> {
    let state = RelayState { secret, backend };

    let app = Router::new()
        .route("/healthz", get(health_check))
        .route("/console", get(attach_console))
        .with_state(state)
        .layer(TraceLayer::new_for_http());

    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr).await?;

    info!("Console relay listening on http://{}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}

async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

async fn attach_console(
    ws: WebSocketUpgrade,
    Query(query): Query<ConsoleQuery>,
    State(state): State<RelayState>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_console(socket, state, query))
}

async fn handle_console(socket: WebSocket, state: RelayState, query: ConsoleQuery) {
    let target = match authorize_target(&state.secret, &query) {
        Ok(target) => target,
        Err(message) => {
            let (mut ws_tx, _) = socket.split();
            let _ = ws_tx.send(Message::Text(message.into())).await;
            let _ = ws_tx
                .send(Message::Close(Some(CloseFrame {
                    code: close_code::POLICY,
                    reason: "unauthorized".into(),
                })))
                .await;
            return;
        }
    };

    let (ws_tx, ws_rx) = socket.split();
    bridge::serve(ws_tx, ws_rx, state.backend.clone(), target).await;
}

/// Validates the presented token and resolves the exec target it is bound
/// to. Runs before any remote resource is allocated; a rejected upgrade
/// never touches the cluster.
fn authorize_target(secret: &SigningSecret, query: &ConsoleQuery) -> Result<ExecTarget, &'static str> {
    let Some(token) = query.token.as_deref() else {
        return Err("Error: Authorization token required\r\n");
    };

    let claims = token::verify_console_token(secret, token).map_err(|error| {
        warn!(%error, "console token rejected");
        "Error: Invalid or expired token\r\n"
    })?;

    info!(
        namespace = %claims.namespace,
        pod = %claims.pod_name,
        requester = %claims.internal_id,
        "console token accepted"
    );

    Ok(ExecTarget::new(
        claims.namespace,
        claims.pod_name,
        query.container.clone(),
    ))
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::token::{CONSOLE_TOKEN_TTL_SECS, mint_console_token, mint_console_token_at};

    fn secret() -> SigningSecret {
        SigningSecret::new("unit-test-secret").unwrap()
    }

    fn query(token: Option<String>, container: Option<String>) -> ConsoleQuery {
        ConsoleQuery { token, container }
    }

    #[test]
    fn test_missing_token_rejected() {
        let err = authorize_target(&secret(), &query(None, None)).unwrap_err();
        assert_eq!(err, "Error: Authorization token required\r\n");
    }

    #[test]
    fn test_malformed_token_rejected() {
        let err =
            authorize_target(&secret(), &query(Some("not-a-jwt".into()), None)).unwrap_err();
        assert_eq!(err, "Error: Invalid or expired token\r\n");
    }

    // A token older than its window is rejected at upgrade time, before
    // any exec stream could be opened.
    #[test]
    fn test_expired_token_rejected() {
        let now = chrono::Utc::now().timestamp();
        let stale = mint_console_token_at(
            &secret(),
            "gitship-u-42",
            "web-7c9",
            "u-42",
            now - CONSOLE_TOKEN_TTL_SECS - 1,
        )
        .unwrap();

        let err = authorize_target(&secret(), &query(Some(stale), None)).unwrap_err();
        assert_eq!(err, "Error: Invalid or expired token\r\n");
    }

    #[test]
    fn test_valid_token_resolves_bound_target() {
        let token = mint_console_token(&secret(), "gitship-u-42", "web-7c9", "u-42").unwrap();

        let target = authorize_target(&secret(), &query(Some(token.clone()), None)).unwrap();
        assert_eq!(target.namespace, "gitship-u-42");
        assert_eq!(target.pod, "web-7c9");
        assert_eq!(target.container, "app");

        let target =
            authorize_target(&secret(), &query(Some(token), Some("sidecar".into()))).unwrap();
        assert_eq!(target.container, "sidecar");
    }
}
