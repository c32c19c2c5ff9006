//! Bearer and Basic authentication for the agent server
//!
//! Paths listed as public (the descriptor path by default) are never
//! checked. Secrets are compared as SHA-256 digests in constant time,
//! against every configured credential.

use agency_framework::prelude::{AgentServerConfig, Credentials};
use axum::{
    extract::{Request, State},
    http::{StatusCode, header},
    middleware::Next,
    response::{IntoResponse, Json, Response},
};
use base64::{Engine as _, engine::general_purpose::STANDARD};
use serde_json::json;
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use std::sync::Arc;
use subtle::{Choice, ConstantTimeEq};
use tracing::{debug, warn};

/// Name of the caller, attached to the request once authenticated
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthenticatedUser(pub String);

#[derive(Debug, Clone)]
pub struct Authenticator {
    enabled: bool,
    credentials: Credentials,
    public_paths: HashSet<String>,
}

impl Authenticator {
    pub fn from_config(config: &AgentServerConfig) -> Self {
        Self {
            enabled: config.auth_enabled(),
            credentials: config.credentials.clone(),
            public_paths: config.public_paths.clone(),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    fn is_public(&self, path: &str) -> bool {
        self.public_paths.contains(path)
    }

    fn user_for_api_key(&self, token: &str) -> Option<String> {
        if self.credentials.api_keys.is_empty() {
            warn!("No API keys configured. All API key checks will fail.");
        }
        let presented = digest(token);
        let mut matched = None;
        for (user, key) in &self.credentials.api_keys {
            if bool::from(digest(key).ct_eq(&presented)) {
                matched = Some(user.clone());
            }
        }
        matched
    }

    fn verify_password(&self, username: &str, password: &str) -> bool {
        if self.credentials.users.is_empty() {
            warn!("No users configured. All basic auth checks will fail.");
        }
        let stored = self.credentials.users.get(username);
        let known = Choice::from(u8::from(stored.is_some()));
        // Unknown users still pay for a full comparison
        let stored = digest(stored.map(String::as_str).unwrap_or_default());
        bool::from(known & stored.ct_eq(&digest(password)))
    }

    /// Resolve the caller from an `Authorization` header value
    pub fn authenticate(&self, header_value: Option<&str>) -> Result<AuthenticatedUser, &'static str> {
        let value = header_value.ok_or("Authentication required")?;

        if let Some(token) = value.strip_prefix("Bearer ") {
            return self
                .user_for_api_key(token.trim())
                .map(AuthenticatedUser)
                .ok_or("Invalid API key");
        }

        if let Some(encoded) = value.strip_prefix("Basic ") {
            let decoded = STANDARD
                .decode(encoded.trim())
                .ok()
                .and_then(|bytes| String::from_utf8(bytes).ok())
                .ok_or("Invalid credentials")?;
            let (username, password) = decoded.split_once(':').ok_or("Invalid credentials")?;
            if !self.verify_password(username, password) {
                return Err("Invalid credentials");
            }
            return Ok(AuthenticatedUser(username.to_string()));
        }

        Err("Unsupported authentication method")
    }
}

fn digest(secret: &str) -> Vec<u8> {
    Sha256::digest(secret.as_bytes()).to_vec()
}

fn unauthorized(detail: &str) -> Response {
    (
        StatusCode::UNAUTHORIZED,
        [(header::WWW_AUTHENTICATE, "Bearer, Basic")],
        Json(json!({ "detail": detail, "kind": "unauthorized" })),
    )
        .into_response()
}

/// Middleware rejecting unauthenticated requests to non-public paths
pub async fn require_auth(
    State(auth): State<Arc<Authenticator>>,
    mut request: Request,
    next: Next,
) -> Response {
    let path = request.uri().path().to_string();
    debug!("Processing request: {} {}", request.method(), path);

    if !auth.is_enabled() || auth.is_public(&path) {
        return next.run(request).await;
    }

    let header_value = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok());

    match auth.authenticate(header_value) {
        Ok(user) => {
            debug!("Authenticated {} for {}", user.0, path);
            request.extensions_mut().insert(user);
            next.run(request).await
        }
        Err(detail) => {
            warn!("Rejected request to {}: {}", path, detail);
            unauthorized(detail)
        }
    }
}
