// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Per-request authentication pipeline.
//!
//! For each request:
//!
//! 1. Skip rules and CORS preflights short-circuit to [`AuthOutcome::Skipped`]
//! 2. The bearer token is read from `Authorization`
//! 3. Without a token the request is anonymous (when allowed) or fails
//!    with `no_token`
//! 4. Public keys come from the shared [`JwksCache`]
//! 5. The token is verified and projected into a [`DecodedToken`]
//!
//! The outcome is returned, never raised; hosts decide how to respond.
//!
//! ```rust,ignore
//! let authenticator = Authenticator::from_config(&Config::from_env()?)?;
//! let session = authenticator.session(&request).await;
//! session.authorize_realm("uploader")?;
//! ```

use std::sync::Arc;

use tracing::{debug, instrument, warn};

use super::claims::DecodedToken;
use super::error::AuthError;
use super::extractor::{read_token, AuthRequest};
use super::jwks::{JwksCache, KeySet};
use super::session::Session;
use super::skip::SkipEvaluator;
use super::verify::TokenVerifier;
use crate::clock::Clock;
use crate::config::{Config, ConfigError};

/// Result of authenticating one request.
#[derive(Debug, Clone)]
pub enum AuthOutcome {
    /// A skip rule matched; nothing was checked.
    Skipped,
    /// No token was presented and anonymous access is allowed.
    Unauthenticated,
    /// The token verified.
    Authenticated(Box<DecodedToken>),
    /// Authentication failed.
    Failed(AuthError),
}

impl AuthOutcome {
    /// Everything except `Failed`.
    pub fn is_success(&self) -> bool {
        !matches!(self, AuthOutcome::Failed(_))
    }

    pub fn token(&self) -> Option<&DecodedToken> {
        match self {
            AuthOutcome::Authenticated(token) => Some(token),
            _ => None,
        }
    }

    pub fn error(&self) -> Option<&AuthError> {
        match self {
            AuthOutcome::Failed(error) => Some(error),
            _ => None,
        }
    }
}

/// Authenticates requests against one realm.
#[derive(Debug)]
pub struct Authenticator {
    skip: SkipEvaluator,
    keys: Arc<JwksCache>,
    verifier: TokenVerifier,
    allow_anonymous: bool,
}

impl Authenticator {
    /// Build from configuration around an existing key cache.
    pub fn new(config: &Config, keys: Arc<JwksCache>) -> Result<Self, ConfigError> {
        Ok(Self {
            skip: SkipEvaluator::new(&config.skip_paths)?,
            keys,
            verifier: TokenVerifier::new(config.leeway()),
            allow_anonymous: config.allow_anonymous,
        })
    }

    /// Build from configuration with a key cache over the realm's certs
    /// endpoint.
    pub fn from_config(config: &Config) -> Result<Self, ConfigError> {
        let keys = Arc::new(JwksCache::from_config(config)?);
        Self::new(config, keys)
    }

    /// Clock used for token expiry.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.verifier = self.verifier.with_clock(clock);
        self
    }

    pub fn keys(&self) -> &Arc<JwksCache> {
        &self.keys
    }

    /// Refetch the realm's keys now.
    pub async fn refresh_keys(&self) -> Result<Arc<KeySet>, AuthError> {
        self.keys.refresh().await
    }

    #[instrument(skip_all, fields(method = %request.method(), path = request.path()))]
    pub async fn authenticate<R: AuthRequest + ?Sized>(&self, request: &R) -> AuthOutcome {
        if self.skip.should_skip(request) {
            debug!("Authentication skipped");
            return AuthOutcome::Skipped;
        }

        let Some(token) = read_token(request.headers()) else {
            return if self.allow_anonymous {
                debug!("No token, continuing anonymously");
                AuthOutcome::Unauthenticated
            } else {
                debug!("No token presented");
                AuthOutcome::Failed(AuthError::no_token())
            };
        };

        match self.verify_token(token).await {
            Ok(decoded) => {
                debug!(sub = decoded.sub(), "Token authenticated");
                AuthOutcome::Authenticated(Box::new(decoded))
            }
            Err(e) if e.kind().is_key_retrieval() => {
                warn!(code = e.code(), error = %e, "Could not retrieve signing keys");
                AuthOutcome::Failed(e)
            }
            Err(e) => {
                debug!(code = e.code(), error = %e, "Token rejected");
                AuthOutcome::Failed(e)
            }
        }
    }

    /// Authenticate and wrap the outcome for authorization checks.
    pub async fn session<R: AuthRequest + ?Sized>(&self, request: &R) -> Session {
        Session::new(self.authenticate(request).await)
    }

    /// Verify a raw token, bypassing skip rules.
    pub async fn verify_token(&self, token: &str) -> Result<DecodedToken, AuthError> {
        let keys = self.keys.find_public_keys().await?;
        let verified = self.verifier.verify(token, &keys)?;
        DecodedToken::from_parts(verified.claims, verified.headers).map_err(|e| e.with_token(token))
    }
}
