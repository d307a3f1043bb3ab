// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Authentication and authorization failures.
//!
//! Every failure produced while authenticating a request is an [`AuthError`]
//! value tagged with a [`FailureKind`]. The hosting layer decides what to send
//! back to the client from the kind; nothing in this crate picks status codes.

use std::error::Error as StdError;
use std::fmt;
use std::sync::Arc;

/// Shared, clonable error cause.
pub type Cause = Arc<dyn StdError + Send + Sync + 'static>;

/// Classification of an authentication or authorization failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureKind {
    /// No bearer token and anonymous access is not allowed
    NoToken,
    /// Signature is valid but the token expired beyond the leeway
    Expired,
    /// Malformed token, bad signature, disallowed algorithm or bad claims
    DecodingFailed,
    /// The key set did not yield a usable signature algorithm
    NoAlgorithms,
    /// The key endpoint answered with JSON that is not a key set
    InvalidPublicKeys,
    /// HTTP 400 from the key endpoint
    BadRequest,
    /// HTTP 401 from the key endpoint, or a missing role
    Unauthorized,
    /// HTTP 403 from the key endpoint
    Forbidden,
    /// HTTP 404 from the key endpoint
    NotFound,
    /// HTTP 504 from the key endpoint, or a transport timeout
    GatewayTimeout,
    /// Any other 4xx from the key endpoint
    ClientError,
    /// Any 5xx from the key endpoint
    ServerError,
    /// Anything else the key endpoint did
    UnknownError,
    /// 2xx from the key endpoint with a body that is not JSON
    InvalidResponse,
    /// A role check was made without an authenticated token
    Unauthenticated,
    /// A claim lookup did not resolve
    UnknownAttribute,
}

impl FailureKind {
    /// Stable snake_case code for this kind.
    pub fn code(&self) -> &'static str {
        match self {
            FailureKind::NoToken => "no_token",
            FailureKind::Expired => "expired",
            FailureKind::DecodingFailed => "decoding_failed",
            FailureKind::NoAlgorithms => "no_algorithms",
            FailureKind::InvalidPublicKeys => "invalid_public_keys",
            FailureKind::BadRequest => "bad_request",
            FailureKind::Unauthorized => "unauthorized",
            FailureKind::Forbidden => "forbidden",
            FailureKind::NotFound => "not_found",
            FailureKind::GatewayTimeout => "gateway_timeout",
            FailureKind::ClientError => "client_error",
            FailureKind::ServerError => "server_error",
            FailureKind::UnknownError => "unknown_error",
            FailureKind::InvalidResponse => "invalid_response",
            FailureKind::Unauthenticated => "unauthenticated",
            FailureKind::UnknownAttribute => "unknown_attribute",
        }
    }

    /// Whether this kind describes a failure to retrieve the signing keys.
    pub fn is_key_retrieval(&self) -> bool {
        matches!(
            self,
            FailureKind::InvalidPublicKeys
                | FailureKind::BadRequest
                | FailureKind::Unauthorized
                | FailureKind::Forbidden
                | FailureKind::NotFound
                | FailureKind::GatewayTimeout
                | FailureKind::ClientError
                | FailureKind::ServerError
                | FailureKind::UnknownError
                | FailureKind::InvalidResponse
        )
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// A classified failure.
///
/// Carries the kind, a human-readable message, the token that was being
/// processed (when there was one) and the underlying cause (when there was
/// one). Cheap to clone so that a cached key-retrieval failure can be handed
/// to every request that observes it.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{message}")]
pub struct AuthError {
    kind: FailureKind,
    message: String,
    token: Option<String>,
    #[source]
    cause: Option<Cause>,
}

impl AuthError {
    /// Create a failure with a kind and message.
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            token: None,
            cause: None,
        }
    }

    /// Attach the token that was being processed.
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    /// Attach the underlying cause.
    pub fn with_cause<E>(mut self, cause: E) -> Self
    where
        E: StdError + Send + Sync + 'static,
    {
        self.cause = Some(Arc::new(cause));
        self
    }

    /// What went wrong.
    pub fn kind(&self) -> FailureKind {
        self.kind
    }

    /// Human-readable message, safe to return to clients.
    pub fn message(&self) -> &str {
        &self.message
    }

    /// The raw token, when one was being processed.
    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    /// The lower-level error, if any.
    pub fn cause(&self) -> Option<&Cause> {
        self.cause.as_ref()
    }

    /// Stable code of the failure kind.
    pub fn code(&self) -> &'static str {
        self.kind.code()
    }

    pub(crate) fn no_token() -> Self {
        Self::new(FailureKind::NoToken, "No JWT provided")
    }

    pub(crate) fn unauthenticated() -> Self {
        Self::new(FailureKind::Unauthenticated, "You are not authenticated")
    }

    pub(crate) fn unknown_attribute(key: &str) -> Self {
        Self::new(
            FailureKind::UnknownAttribute,
            format!("Cannot fetch {key:?}"),
        )
    }
}
