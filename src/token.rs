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

use chrono::Utc;
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use snafu::{Snafu, ensure};

/// Environment variable holding the shared HMAC key. The web tier and the
/// relay process must be configured with the same value.
pub const SECRET_ENV: &str = "AUTH_SECRET";

/// Console tokens are a connection handshake credential, not a session:
/// the front-end redeems them immediately after minting.
pub const CONSOLE_TOKEN_TTL_SECS: i64 = 60;

const MIN_SECRET_LEN: usize = 8;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum Error {
    #[snafu(display("signing secret is not configured (set {})", SECRET_ENV))]
    SecretMissing,

    #[snafu(display(
        "signing secret must be at least {} bytes (got {})",
        MIN_SECRET_LEN,
        length
    ))]
    SecretTooShort { length: usize },

    #[snafu(display("console target namespace and pod name must be non-empty"))]
    EmptyTarget,

    #[snafu(display("JWT error: {}", source))]
    Jwt { source: jsonwebtoken::errors::Error },

    #[snafu(display("token expired"))]
    Expired,
}

/// HMAC key used to sign and verify console tokens.
///
/// There is intentionally no default value: a relay started without a
/// configured secret refuses to start rather than minting tokens anyone
/// could forge.
#[derive(Clone)]
pub struct SigningSecret(String);

impl SigningSecret {
    pub fn new(secret: impl Into<String>) -> Result<Self, Error> {
        let secret = secret.into();
        ensure!(
            secret.len() >= MIN_SECRET_LEN,
            SecretTooShortSnafu {
                length: secret.len()
            }
        );
        Ok(Self(secret))
    }

    pub fn from_env() -> Result<Self, Error> {
        let secret = std::env::var(SECRET_ENV).map_err(|_| Error::SecretMissing)?;
        Self::new(secret)
    }

    pub fn encoding_key(&self) -> EncodingKey {
        EncodingKey::from_secret(self.0.as_bytes())
    }

    pub fn decoding_key(&self) -> DecodingKey {
        DecodingKey::from_secret(self.0.as_bytes())
    }
}

impl std::fmt::Debug for SigningSecret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SigningSecret(..)")
    }
}

/// Claims bound into a console token. Field names match the wire format the
/// browser terminal already speaks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsoleClaims {
    pub namespace: String,
    #[serde(rename = "podName")]
    pub pod_name: String,
    #[serde(rename = "internalId")]
    pub internal_id: String,
    pub iat: i64,
    pub exp: i64,
}

/// Mints a single-use console token for `(namespace, pod_name)` on behalf of
/// `internal_id`.
///
/// The caller must have already checked that `internal_id` may access
/// `namespace`; minting itself is a pure signing operation with no
/// persistence.
pub fn mint_console_token(
    secret: &SigningSecret,
    namespace: &str,
    pod_name: &str,
    internal_id: &str,
) -> Result<String, Error> {
    mint_console_token_at(secret, namespace, pod_name, internal_id, Utc::now().timestamp())
}

pub(crate) fn mint_console_token_at(
    secret: &SigningSecret,
    namespace: &str,
    pod_name: &str,
    internal_id: &str,
    issued_at: i64,
) -> Result<String, Error> {
    ensure!(!namespace.is_empty() && !pod_name.is_empty(), EmptyTargetSnafu);

    let claims = ConsoleClaims {
        namespace: namespace.to_owned(),
        pod_name: pod_name.to_owned(),
        internal_id: internal_id.to_owned(),
        iat: issued_at,
        exp: issued_at + CONSOLE_TOKEN_TTL_SECS,
    };

    encode(&Header::default(), &claims, &secret.encoding_key()).map_err(|source| Error::Jwt { source })
}

/// Verifies signature integrity and expiry, returning the bound target.
///
/// Every failure mode (malformed, bad signature, expired) is an `Err`; the
/// caller decides how to report it. Expiry is strict: a token is rejected at
/// `exp`, not one leeway window later.
pub fn verify_console_token(secret: &SigningSecret, token: &str) -> Result<ConsoleClaims, Error> {
    let mut validation = Validation::default();
    validation.leeway = 0;

    let claims = decode::<ConsoleClaims>(token, &secret.decoding_key(), &validation)
        .map_err(|source| Error::Jwt { source })?
        .claims;

    let now = Utc::now().timestamp();
    ensure!(now < claims.exp, ExpiredSnafu);

    Ok(claims)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn secret() -> SigningSecret {
        SigningSecret::new("unit-test-secret").unwrap()
    }

    #[test]
    fn test_mint_and_verify_roundtrip() {
        let token = mint_console_token(&secret(), "gitship-user-alice", "web-7c9", "u-42")
            .expect("mint");

        let claims = verify_console_token(&secret(), &token).expect("verify");
        assert_eq!(claims.namespace, "gitship-user-alice");
        assert_eq!(claims.pod_name, "web-7c9");
        assert_eq!(claims.internal_id, "u-42");
        assert_eq!(claims.exp, claims.iat + CONSOLE_TOKEN_TTL_SECS);
    }

    #[test]
    fn test_empty_target_rejected() {
        assert!(mint_console_token(&secret(), "", "web-7c9", "u-42").is_err());
        assert!(mint_console_token(&secret(), "gitship-user-alice", "", "u-42").is_err());
    }

    #[test]
    fn test_short_secret_rejected() {
        assert!(SigningSecret::new("").is_err());
        assert!(SigningSecret::new("short").is_err());
        assert!(SigningSecret::new("exactly8").is_ok());
    }

    // Valid within [iat, iat + ttl), rejected at and after the boundary.
    #[test]
    fn test_expiry_window() {
        let now = Utc::now().timestamp();

        let fresh = mint_console_token_at(&secret(), "ns", "pod", "u-1", now).expect("mint");
        assert!(verify_console_token(&secret(), &fresh).is_ok());

        // exp == now: jsonwebtoken's own check passes here, the strict check
        // must not.
        let boundary =
            mint_console_token_at(&secret(), "ns", "pod", "u-1", now - CONSOLE_TOKEN_TTL_SECS)
                .expect("mint");
        assert!(matches!(
            verify_console_token(&secret(), &boundary),
            Err(Error::Expired) | Err(Error::Jwt { .. })
        ));

        let stale =
            mint_console_token_at(&secret(), "ns", "pod", "u-1", now - CONSOLE_TOKEN_TTL_SECS - 61)
                .expect("mint");
        assert!(verify_console_token(&secret(), &stale).is_err());
    }

    // Any mutation of claims or signature invalidates the token.
    #[test]
    fn test_tampered_token_rejected() {
        let token =
            mint_console_token(&secret(), "gitship-user-alice", "web-7c9", "u-42").expect("mint");

        let flip = |s: &str, idx: usize| -> String {
            let mut bytes = s.as_bytes().to_vec();
            bytes[idx] = if bytes[idx] == b'A' { b'B' } else { b'A' };
            String::from_utf8(bytes).expect("ascii token")
        };

        let parts: Vec<&str> = token.split('.').collect();
        assert_eq!(parts.len(), 3);
        let header_len = parts[0].len();
        let payload_len = parts[1].len();

        // Flip one character inside the payload segment.
        let tampered_claims = flip(&token, header_len + 1 + payload_len / 2);
        assert!(verify_console_token(&secret(), &tampered_claims).is_err());

        // Flip one character inside the signature segment.
        let tampered_sig = flip(&token, token.len() - 2);
        assert!(verify_console_token(&secret(), &tampered_sig).is_err());
    }

    #[test]
    fn test_wrong_secret_rejected() {
        let token = mint_console_token(&secret(), "ns", "pod", "u-1").expect("mint");
        let other = SigningSecret::new("another-secret").expect("secret");
        assert!(verify_console_token(&other, &token).is_err());
    }
}
