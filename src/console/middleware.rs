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
    extract::{Request, State},
    http::header,
    middleware::Next,
    response::Response,
};
use jsonwebtoken::{Validation, decode};

use crate::console::error::{Error, Result};
use crate::console::state::{AppState, SessionClaims};

/// Session authentication middleware.
///
/// Extracts the dashboard session JWT from the `session` cookie, validates
/// it, and injects the claims into the request extensions. WebSocket upgrade
/// requests pass through here too: browsers send cookies on upgrade.
pub async fn session_middleware(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response> {
    // Skip public paths
    let path = request.uri().path();
    if path == "/healthz" || path == "/readyz" {
        return Ok(next.run(request).await);
    }

    let cookies = request
        .headers()
        .get(header::COOKIE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");

    let token = parse_session_cookie(cookies).ok_or_else(|| Error::Unauthorized {
        message: "session cookie required".to_string(),
    })?;

    let mut validation = Validation::default();
    validation.leeway = 0;

    let claims = decode::<SessionClaims>(&token, &state.secret.decoding_key(), &validation)
        .map_err(|source| {
            tracing::warn!("session validation failed: {}", source);
            Error::Jwt { source }
        })?
        .claims;

    let now = chrono::Utc::now().timestamp() as usize;
    if claims.exp < now {
        tracing::warn!("session expired");
        return Err(Error::Unauthorized {
            message: "session expired".to_string(),
        });
    }

    request.extensions_mut().insert(claims);

    Ok(next.run(request).await)
}

/// Parses the session token out of a Cookie header value.
fn parse_session_cookie(cookies: &str) -> Option<String> {
    cookies.split(';').find_map(|cookie| {
        let parts: Vec<&str> = cookie.trim().splitn(2, '=').collect();
        if parts.len() == 2 && parts[0] == "session" {
            Some(parts[1].to_string())
        } else {
            None
        }
    })
}
