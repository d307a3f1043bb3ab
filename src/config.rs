// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Runtime Configuration
//!
//! [`Config`] is immutable input to the verifier. Hosts may build it by hand,
//! deserialize it from their own configuration files, or load it from the
//! environment with [`Config::from_env`].
//!
//! ## Environment Variables
//!
//! | Variable | Description | Default |
//! |----------|-------------|---------|
//! | `KEYCLOAK_SERVER_URL` | Base URL of the Keycloak installation (include `/auth` if needed) | Required |
//! | `KEYCLOAK_REALM_ID` | Realm whose tokens are accepted | Required |
//! | `KEYCLOAK_CA_CERTIFICATE_FILE` | Extra PEM CA certificate for the key endpoint | None |
//! | `KEYCLOAK_SKIP_PATHS` | JSON object of method to path rules | `{}` |
//! | `KEYCLOAK_TOKEN_LEEWAY` | Clock skew tolerance in seconds | `10` |
//! | `KEYCLOAK_CACHE_TTL` | Public key cache lifetime in seconds | `86400` |
//! | `KEYCLOAK_ALLOW_ANONYMOUS` | Allow requests without a token | `false` |
//! | `LOG_FORMAT` | Logging format for the binary (`json` or `pretty`) | `pretty` |
//! | `RUST_LOG` | Log level filter for the binary | `info` |

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;
use url::Url;

pub const SERVER_URL_ENV: &str = "KEYCLOAK_SERVER_URL";
pub const REALM_ID_ENV: &str = "KEYCLOAK_REALM_ID";
pub const CA_CERTIFICATE_FILE_ENV: &str = "KEYCLOAK_CA_CERTIFICATE_FILE";
pub const SKIP_PATHS_ENV: &str = "KEYCLOAK_SKIP_PATHS";
pub const TOKEN_LEEWAY_ENV: &str = "KEYCLOAK_TOKEN_LEEWAY";
pub const CACHE_TTL_ENV: &str = "KEYCLOAK_CACHE_TTL";
pub const ALLOW_ANONYMOUS_ENV: &str = "KEYCLOAK_ALLOW_ANONYMOUS";

/// Default clock skew tolerance (10 seconds).
pub const DEFAULT_TOKEN_LEEWAY: u64 = 10;

/// Default public key cache lifetime (1 day).
pub const DEFAULT_CACHE_TTL: u64 = 86_400;

/// Errors raised while building configuration or the components that use it.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing required environment variable {0}")]
    MissingEnv(&'static str),

    #[error("invalid value for {var}: {reason}")]
    InvalidEnv { var: &'static str, reason: String },

    #[error("invalid server URL {url:?}: {reason}")]
    InvalidServerUrl { url: String, reason: String },

    #[error("could not read CA certificate {}: {source}", .path.display())]
    CaCertificate {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid CA certificate {}: {source}", .path.display())]
    InvalidCaCertificate {
        path: PathBuf,
        #[source]
        source: reqwest::Error,
    },

    #[error("failed to build HTTP client: {0}")]
    HttpClient(#[source] reqwest::Error),

    #[error("invalid skip path pattern {pattern:?} for {method}: {source}")]
    InvalidSkipPattern {
        method: String,
        pattern: String,
        #[source]
        source: regex::Error,
    },
}

/// One configured skip rule for a path.
///
/// Serialized as a plain string for an exact match, or as
/// `{"pattern": "<regex>"}` for a regular-expression search.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum PathRule {
    Exact(String),
    Pattern { pattern: String },
}

impl PathRule {
    pub fn exact(path: impl Into<String>) -> Self {
        PathRule::Exact(path.into())
    }

    pub fn pattern(pattern: impl Into<String>) -> Self {
        PathRule::Pattern {
            pattern: pattern.into(),
        }
    }
}

/// Verifier configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Base URL of the Keycloak installation.
    pub server_url: String,

    /// Realm whose tokens are accepted.
    pub realm_id: String,

    /// Additional CA certificate (PEM) trusted for the key endpoint.
    #[serde(default)]
    pub ca_certificate_file: Option<PathBuf>,

    /// Request method to path rules that bypass verification.
    #[serde(default)]
    pub skip_paths: HashMap<String, Vec<PathRule>>,

    /// Seconds a token may be past its expiry and still be accepted.
    #[serde(default = "default_token_leeway")]
    pub token_leeway: u64,

    /// Seconds a fetched key set is served before it is refetched.
    #[serde(default = "default_cache_ttl")]
    pub cache_ttl: u64,

    /// Whether requests without a token are let through as anonymous.
    #[serde(default)]
    pub allow_anonymous: bool,
}

fn default_token_leeway() -> u64 {
    DEFAULT_TOKEN_LEEWAY
}

fn default_cache_ttl() -> u64 {
    DEFAULT_CACHE_TTL
}

impl Config {
    pub fn new(server_url: impl Into<String>, realm_id: impl Into<String>) -> Self {
        Self {
            server_url: server_url.into(),
            realm_id: realm_id.into(),
            ca_certificate_file: None,
            skip_paths: HashMap::new(),
            token_leeway: DEFAULT_TOKEN_LEEWAY,
            cache_ttl: DEFAULT_CACHE_TTL,
            allow_anonymous: false,
        }
    }

    pub fn with_ca_certificate_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.ca_certificate_file = Some(path.into());
        self
    }

    /// Add a skip rule for a method. Method names are stored lowercased.
    pub fn with_skip_path(mut self, method: &str, rule: PathRule) -> Self {
        self.skip_paths
            .entry(method.to_lowercase())
            .or_default()
            .push(rule);
        self
    }

    pub fn with_token_leeway(mut self, seconds: u64) -> Self {
        self.token_leeway = seconds;
        self
    }

    pub fn with_cache_ttl(mut self, seconds: u64) -> Self {
        self.cache_ttl = seconds;
        self
    }

    pub fn with_allow_anonymous(mut self, allow: bool) -> Self {
        self.allow_anonymous = allow;
        self
    }

    pub fn leeway(&self) -> Duration {
        Duration::from_secs(self.token_leeway)
    }

    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl)
    }

    /// URL of the realm's key set endpoint.
    pub fn certs_url(&self) -> Result<Url, ConfigError> {
        let invalid = |reason: String| ConfigError::InvalidServerUrl {
            url: self.server_url.clone(),
            reason,
        };

        let mut url = Url::parse(&self.server_url).map_err(|e| invalid(e.to_string()))?;
        {
            let mut segments = url
                .path_segments_mut()
                .map_err(|_| invalid("URL cannot be a base".to_string()))?;
            segments.pop_if_empty().extend([
                "realms",
                self.realm_id.as_str(),
                "protocol",
                "openid-connect",
                "certs",
            ]);
        }
        Ok(url)
    }

    /// Load configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let server_url = get(SERVER_URL_ENV).ok_or(ConfigError::MissingEnv(SERVER_URL_ENV))?;
        let realm_id = get(REALM_ID_ENV).ok_or(ConfigError::MissingEnv(REALM_ID_ENV))?;

        let mut config = Config::new(server_url, realm_id);

        if let Some(path) = get(CA_CERTIFICATE_FILE_ENV) {
            config.ca_certificate_file = Some(PathBuf::from(path));
        }

        if let Some(raw) = get(SKIP_PATHS_ENV) {
            let rules: HashMap<String, Vec<PathRule>> =
                serde_json::from_str(&raw).map_err(|e| ConfigError::InvalidEnv {
                    var: SKIP_PATHS_ENV,
                    reason: e.to_string(),
                })?;
            config.skip_paths = rules
                .into_iter()
                .map(|(method, rules)| (method.to_lowercase(), rules))
                .collect();
        }

        if let Some(raw) = get(TOKEN_LEEWAY_ENV) {
            config.token_leeway = parse_seconds(TOKEN_LEEWAY_ENV, &raw)?;
        }

        if let Some(raw) = get(CACHE_TTL_ENV) {
            config.cache_ttl = parse_seconds(CACHE_TTL_ENV, &raw)?;
        }

        if let Some(raw) = get(ALLOW_ANONYMOUS_ENV) {
            config.allow_anonymous = parse_flag(ALLOW_ANONYMOUS_ENV, &raw)?;
        }

        Ok(config)
    }
}

fn parse_seconds(var: &'static str, raw: &str) -> Result<u64, ConfigError> {
    raw.trim().parse().map_err(|e| ConfigError::InvalidEnv {
        var,
        reason: format!("expected a number of seconds: {e}"),
    })
}

fn parse_flag(var: &'static str, raw: &str) -> Result<bool, ConfigError> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(ConfigError::InvalidEnv {
            var,
            reason: format!("expected a boolean, got {other:?}"),
        }),
    }
}
