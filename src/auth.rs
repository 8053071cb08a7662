//! Authentication policy for the passthrough chat endpoint.

use axum::http::header::AUTHORIZATION;
use axum::http::HeaderMap;

use crate::error::GatewayError;

/// How inbound credentials are checked.
///
/// No variant accepts a credential without checking it: authentication is
/// either switched off or the bearer token must match.
#[derive(Clone)]
pub enum AuthPolicy {
    Disabled,
    BearerToken(String),
}

impl std::fmt::Debug for AuthPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AuthPolicy::Disabled => write!(f, "Disabled"),
            AuthPolicy::BearerToken(_) => write!(f, "BearerToken(<redacted>)"),
        }
    }
}

impl AuthPolicy {
    pub fn bearer(token: impl Into<String>) -> Self {
        AuthPolicy::BearerToken(token.into())
    }

    /// Check the request headers against this policy.
    pub fn authorize(&self, headers: &HeaderMap) -> Result<(), GatewayError> {
        let expected = match self {
            AuthPolicy::Disabled => return Ok(()),
            AuthPolicy::BearerToken(token) => token,
        };

        let presented = headers
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(parse_bearer)
            .ok_or_else(|| GatewayError::Unauthorized("missing bearer credentials".to_string()))?;

        if constant_time_eq(presented.as_bytes(), expected.as_bytes()) {
            Ok(())
        } else {
            Err(GatewayError::Unauthorized("invalid bearer token".to_string()))
        }
    }
}

/// Extract the credential from an `Authorization: Bearer <token>` value.
fn parse_bearer(value: &str) -> Option<&str> {
    let (scheme, token) = value.trim().split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    let token = token.trim();
    (!token.is_empty()).then_some(token)
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}
