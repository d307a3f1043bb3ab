// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Retrieval of the realm's public signing keys.
//!
//! ## Security
//!
//! - The key set is fetched from the realm's well-known certs endpoint
//! - An extra CA certificate can be trusted for private Keycloak installations
//! - There is no retry here; the cache decides when to ask again

use std::fs;
use std::time::Duration;

use async_trait::async_trait;
use http::StatusCode;
use reqwest::{Certificate, Client};
use serde_json::Value;
use tracing::{debug, instrument, warn};
use url::Url;

use super::error::{AuthError, FailureKind};
use super::jwks::KeySet;
use crate::config::{Config, ConfigError};

/// Total request timeout for the certs endpoint.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Connect timeout for the certs endpoint.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Longest response body kept for diagnostics.
const MAX_DIAGNOSTIC_BODY: usize = 1024;

/// Something that can produce the current key set.
#[async_trait]
pub trait KeySource: Send + Sync {
    async fn fetch_keys(&self) -> Result<KeySet, AuthError>;
}

/// The key endpoint answered with a non-success status.
#[derive(Debug, thiserror::Error)]
#[error("HTTP {status} from {url}")]
pub struct ResponseError {
    pub status: StatusCode,
    pub url: String,
    /// Start of the response body.
    pub body: String,
}

/// HTTP client for `{server}/realms/{realm}/protocol/openid-connect/certs`.
#[derive(Debug, Clone)]
pub struct KeyFetcher {
    certs_url: Url,
    http: Client,
}

impl KeyFetcher {
    /// Build a fetcher for the configured realm, trusting the configured CA
    /// certificate in addition to the system roots.
    pub fn new(config: &Config) -> Result<Self, ConfigError> {
        let certs_url = config.certs_url()?;

        let mut builder = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .connect_timeout(CONNECT_TIMEOUT);

        if let Some(path) = &config.ca_certificate_file {
            let pem = fs::read(path).map_err(|source| ConfigError::CaCertificate {
                path: path.clone(),
                source,
            })?;
            let certificate =
                Certificate::from_pem(&pem).map_err(|source| ConfigError::InvalidCaCertificate {
                    path: path.clone(),
                    source,
                })?;
            builder = builder.add_root_certificate(certificate);
        }

        let http = builder.build().map_err(ConfigError::HttpClient)?;

        Ok(Self { certs_url, http })
    }

    /// Use a caller-built HTTP client.
    pub fn with_client(certs_url: Url, http: Client) -> Self {
        Self { certs_url, http }
    }

    pub fn certs_url(&self) -> &Url {
        &self.certs_url
    }
}

#[async_trait]
impl KeySource for KeyFetcher {
    #[instrument(skip(self), fields(url = %self.certs_url))]
    async fn fetch_keys(&self) -> Result<KeySet, AuthError> {
        debug!("Fetching JWKS from Keycloak");

        let response = self
            .http
            .get(self.certs_url.clone())
            .send()
            .await
            .map_err(|e| {
                warn!(error = %e, "Failed to reach JWKS endpoint");
                transport_failure(e)
            })?;

        let status = response.status();
        if !status.is_success() {
            let kind = classify_status(status);
            warn!(status = %status, code = kind.code(), "JWKS endpoint returned error");

            let mut body = response.text().await.unwrap_or_default();
            truncate(&mut body, MAX_DIAGNOSTIC_BODY);

            return Err(
                AuthError::new(kind, status_message(kind, status, &self.certs_url)).with_cause(
                    ResponseError {
                        status,
                        url: self.certs_url.to_string(),
                        body,
                    },
                ),
            );
        }

        let body = response.bytes().await.map_err(|e| {
            AuthError::new(
                FailureKind::InvalidResponse,
                format!("Could not read response body: {e}"),
            )
            .with_cause(e)
        })?;

        let document: Value = serde_json::from_slice(&body).map_err(|e| {
            warn!(error = %e, "JWKS endpoint returned invalid JSON");
            AuthError::new(
                FailureKind::InvalidResponse,
                format!("Response was not valid JSON: {e}"),
            )
            .with_cause(e)
        })?;

        KeySet::from_json(document)
    }
}

/// Map a non-success status onto a failure kind.
pub fn classify_status(status: StatusCode) -> FailureKind {
    match status {
        StatusCode::BAD_REQUEST => FailureKind::BadRequest,
        StatusCode::UNAUTHORIZED => FailureKind::Unauthorized,
        StatusCode::FORBIDDEN => FailureKind::Forbidden,
        StatusCode::NOT_FOUND => FailureKind::NotFound,
        StatusCode::GATEWAY_TIMEOUT => FailureKind::GatewayTimeout,
        s if s.is_client_error() => FailureKind::ClientError,
        s if s.is_server_error() => FailureKind::ServerError,
        _ => FailureKind::UnknownError,
    }
}

fn status_message(kind: FailureKind, status: StatusCode, url: &Url) -> String {
    match kind {
        FailureKind::BadRequest => "Bad Request".to_string(),
        FailureKind::Unauthorized => "Unauthorized".to_string(),
        FailureKind::Forbidden => "Forbidden".to_string(),
        FailureKind::NotFound => format!("Not Found: {url}"),
        FailureKind::GatewayTimeout => "Gateway Timeout".to_string(),
        FailureKind::ClientError => format!("Client Error: HTTP {}", status.as_u16()),
        FailureKind::ServerError => format!("Server Error: HTTP {}", status.as_u16()),
        _ => "Unknown Error".to_string(),
    }
}

/// The request never produced a response.
fn transport_failure(error: reqwest::Error) -> AuthError {
    let (kind, message) = if error.is_timeout() {
        (FailureKind::GatewayTimeout, "Gateway Timeout")
    } else {
        (FailureKind::UnknownError, "Unknown Error")
    };
    AuthError::new(kind, format!("{message}: {error}")).with_cause(error)
}

fn truncate(body: &mut String, max: usize) {
    if body.len() > max {
        let mut end = max;
        while !body.is_char_boundary(end) {
            end -= 1;
        }
        body.truncate(end);
    }
}
