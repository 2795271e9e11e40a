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

use std::sync::Arc;

use crate::exec::ExecBackend;
use crate::token::SigningSecret;

/// Console tier application state.
#[derive(Clone)]
pub struct AppState {
    /// Signs console tokens and verifies session cookies.
    pub secret: Arc<SigningSecret>,
    /// Opens interactive exec sessions for the in-process console route.
    pub backend: Arc<dyn ExecBackend>,
}

impl AppState {
    pub fn new(secret: SigningSecret, backend: Arc<dyn ExecBackend>) -> Self {
        Self {
            secret: Arc::new(secret),
            backend,
        }
    }
}

/// Claims carried by the dashboard session cookie.
///
/// Sessions are issued by the dashboard sign-in flow, which lives outside
/// this crate; this tier only validates them. `namespaces` is the set of
/// workload namespaces the user may access, provisioned per user by the
/// platform controller.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct SessionClaims {
    /// Internal user id, e.g. `u-42`.
    pub sub: String,
    #[serde(default)]
    pub namespaces: Vec<String>,
    /// Unix timestamp of expiry.
    pub exp: usize,
    /// Unix timestamp of issuance.
    pub iat: usize,
}

impl SessionClaims {
    /// Creates new claims with a 12 hour validity, mirroring what the
    /// sign-in flow issues.
    pub fn new(sub: impl Into<String>, namespaces: Vec<String>) -> Self {
        let now = chrono::Utc::now().timestamp() as usize;
        Self {
            sub: sub.into(),
            namespaces,
            iat: now,
            exp: now + 12 * 3600,
        }
    }

    /// The namespace-access check backing the console routes. Minting and
    /// attaching both refuse namespaces outside the session's grant.
    pub fn allows_namespace(&self, namespace: &str) -> bool {
        self.namespaces.iter().any(|ns| ns == namespace)
    }
}
