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

use axum::{
    Extension, Json,
    extract::ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade, close_code},
    extract::{Query, State},
    response::Response,
};
use chrono::Utc;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::bridge;
use crate::console::{
    error::{Error, Result},
    state::{AppState, SessionClaims},
};
use crate::exec::ExecTarget;
use crate::token::{CONSOLE_TOKEN_TTL_SECS, mint_console_token};

#[derive(Debug, Deserialize)]
pub struct MintTokenRequest {
    pub namespace: String,
    #[serde(rename = "podName")]
    pub pod_name: String,
}

#[derive(Debug, Serialize)]
pub struct MintTokenResponse {
    pub token: String,
    #[serde(rename = "expiresAt")]
    pub expires_at: String,
}

/// Mints a console token for a pod the session may access.
///
/// The returned token is the credential the browser terminal presents to the
/// standalone relay; it is bound to the target and to the requesting user
/// and expires 60 seconds after minting.
pub async fn mint_token(
    State(state): State<AppState>,
    Extension(session): Extension<SessionClaims>,
    Json(req): Json<MintTokenRequest>,
) -> Result<Json<MintTokenResponse>> {
    if req.namespace.is_empty() || req.pod_name.is_empty() {
        return Err(Error::BadRequest {
            message: "namespace and podName are required".to_string(),
        });
    }

    if !session.allows_namespace(&req.namespace) {
        warn!(
            user = %session.sub,
            namespace = %req.namespace,
            "console token request denied"
        );
        return Err(Error::Forbidden {
            message: "Access Denied".to_string(),
        });
    }

    let token = mint_console_token(&state.secret, &req.namespace, &req.pod_name, &session.sub)
        .map_err(|e| Error::InternalServer {
            message: format!("failed to mint console token: {e}"),
        })?;

    info!(
        user = %session.sub,
        namespace = %req.namespace,
        pod = %req.pod_name,
        "minted console token"
    );

    let expires_at = (Utc::now() + chrono::Duration::seconds(CONSOLE_TOKEN_TTL_SECS)).to_rfc3339();

    Ok(Json(MintTokenResponse { token, expires_at }))
}

#[derive(Debug, Deserialize)]
pub struct EmbeddedConsoleQuery {
    pub namespace: Option<String>,
    pub name: Option<String>,
    pub container: Option<String>,
}

/// The in-process console WebSocket.
///
/// Authorization is the session cookie plus the namespace grant; no console
/// token is involved. Relay semantics past this point are identical to the
/// standalone process.
pub async fn attach_console(
    ws: WebSocketUpgrade,
    Query(query): Query<EmbeddedConsoleQuery>,
    Extension(session): Extension<SessionClaims>,
    State(state): State<AppState>,
) -> Response {
    ws.on_upgrade(move |socket| handle_console(socket, state, session, query))
}

async fn handle_console(
    mut socket: WebSocket,
    state: AppState,
    session: SessionClaims,
    query: EmbeddedConsoleQuery,
) {
    let target = match resolve_target(&session, query) {
        Ok(target) => target,
        Err(message) => {
            let _ = socket.send(Message::Text(message.into())).await;
            let _ = socket
                .send(Message::Close(Some(CloseFrame {
                    code: close_code::POLICY,
                    reason: "denied".into(),
                })))
                .await;
            return;
        }
    };

    let (ws_tx, ws_rx) = socket.split();
    bridge::serve(ws_tx, ws_rx, state.backend.clone(), target).await;
}

fn resolve_target(
    session: &SessionClaims,
    query: EmbeddedConsoleQuery,
) -> std::result::Result<ExecTarget, &'static str> {
    let (Some(namespace), Some(name)) = (
        query.namespace.filter(|s| !s.is_empty()),
        query.name.filter(|s| !s.is_empty()),
    ) else {
        return Err("Error: namespace and pod name required\r\n");
    };

    if !session.allows_namespace(&namespace) {
        warn!(user = %session.sub, namespace = %namespace, "console attach denied");
        return Err("Error: Access denied\r\n");
    }

    Ok(ExecTarget::new(namespace, name, query.container))
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::exec::{self, ExecBackend, ExecStreams};
    use crate::token::{SigningSecret, verify_console_token};

    use std::sync::Arc;

    use futures::FutureExt;
    use futures::future::BoxFuture;

    struct NoBackend;

    impl ExecBackend for NoBackend {
        fn open(
            &self,
            _target: ExecTarget,
        ) -> BoxFuture<'static, std::result::Result<ExecStreams, exec::Error>> {
            async { exec::ChannelUnavailableSnafu { channel: "stdin" }.fail() }.boxed()
        }
    }

    fn state() -> AppState {
        let secret = SigningSecret::new("unit-test-secret").unwrap();
        AppState::new(secret, Arc::new(NoBackend))
    }

    fn session() -> SessionClaims {
        SessionClaims::new("u-42", vec!["gitship-user-alice".to_string()])
    }

    #[tokio::test]
    async fn test_mint_token_for_granted_namespace() {
        let state = state();
        let req = MintTokenRequest {
            namespace: "gitship-user-alice".to_string(),
            pod_name: "web-7c9".to_string(),
        };

        let Json(resp) = mint_token(State(state.clone()), Extension(session()), Json(req))
            .await
            .expect("mint succeeds");

        let claims = verify_console_token(&state.secret, &resp.token).expect("token verifies");
        assert_eq!(claims.namespace, "gitship-user-alice");
        assert_eq!(claims.pod_name, "web-7c9");
        assert_eq!(claims.internal_id, "u-42");
    }

    #[tokio::test]
    async fn test_mint_token_denied_outside_grant() {
        let req = MintTokenRequest {
            namespace: "gitship-user-bob".to_string(),
            pod_name: "web-7c9".to_string(),
        };

        let err = mint_token(State(state()), Extension(session()), Json(req))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Forbidden { .. }));
    }

    #[tokio::test]
    async fn test_mint_token_rejects_empty_target() {
        let req = MintTokenRequest {
            namespace: String::new(),
            pod_name: "web-7c9".to_string(),
        };

        let err = mint_token(State(state()), Extension(session()), Json(req))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::BadRequest { .. }));
    }

    #[test]
    fn test_resolve_target_requires_namespace_and_name() {
        let query = EmbeddedConsoleQuery {
            namespace: Some("gitship-user-alice".to_string()),
            name: None,
            container: None,
        };
        assert_eq!(
            resolve_target(&session(), query).unwrap_err(),
            "Error: namespace and pod name required\r\n"
        );

        let query = EmbeddedConsoleQuery {
            namespace: Some(String::new()),
            name: Some("web-7c9".to_string()),
            container: None,
        };
        assert!(resolve_target(&session(), query).is_err());
    }

    #[test]
    fn test_resolve_target_enforces_namespace_grant() {
        let query = EmbeddedConsoleQuery {
            namespace: Some("gitship-user-bob".to_string()),
            name: Some("web-7c9".to_string()),
            container: None,
        };
        assert_eq!(
            resolve_target(&session(), query).unwrap_err(),
            "Error: Access denied\r\n"
        );
    }

    #[test]
    fn test_resolve_target_defaults_container() {
        let query = EmbeddedConsoleQuery {
            namespace: Some("gitship-user-alice".to_string()),
            name: Some("web-7c9".to_string()),
            container: None,
        };
        let target = resolve_target(&session(), query).unwrap();
        assert_eq!(target.container, "app");
    }
}
