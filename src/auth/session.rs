// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Per-request authentication state and role-based authorization.
//!
//! A [`Session`] wraps the [`AuthOutcome`] of one request. Role checks go
//! through an [`Authorizer`] bound to the session's token, which is built on
//! demand.

use super::claims::DecodedToken;
use super::error::{AuthError, FailureKind};
use super::middleware::AuthOutcome;
use super::roles::DEFAULT_RESOURCE;

/// A satisfied authorization check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Grant {
    Realm { role: String },
    Resource { resource: String, role: String },
}

/// Role checks against an optional token.
#[derive(Debug, Clone, Copy)]
pub struct Authorizer<'a> {
    token: Option<&'a DecodedToken>,
}

impl<'a> Authorizer<'a> {
    pub fn new(token: Option<&'a DecodedToken>) -> Self {
        Self { token }
    }

    /// Require a realm role.
    pub fn authorize_realm(&self, role: &str) -> Result<Grant, AuthError> {
        let token = self.token.ok_or_else(AuthError::unauthenticated)?;
        if token.has_realm_role(role) {
            Ok(Grant::Realm {
                role: role.to_string(),
            })
        } else {
            Err(AuthError::new(
                FailureKind::Unauthorized,
                format!("You do not have \"{role}\" access"),
            ))
        }
    }

    /// Require a role on a resource.
    pub fn authorize_resource(&self, resource: &str, role: &str) -> Result<Grant, AuthError> {
        let token = self.token.ok_or_else(AuthError::unauthenticated)?;
        if token.has_resource_role(resource, role) {
            Ok(Grant::Resource {
                resource: resource.to_string(),
                role: role.to_string(),
            })
        } else {
            Err(AuthError::new(
                FailureKind::Unauthorized,
                format!("You do not have \"{role}\" access on \"{resource}\""),
            ))
        }
    }

    /// Require a role on the `account` resource.
    pub fn authorize_account(&self, role: &str) -> Result<Grant, AuthError> {
        self.authorize_resource(DEFAULT_RESOURCE, role)
    }
}

/// Authentication state of one request.
#[derive(Debug, Clone)]
pub struct Session {
    outcome: AuthOutcome,
}

impl Session {
    pub fn new(outcome: AuthOutcome) -> Self {
        Self { outcome }
    }

    pub fn outcome(&self) -> &AuthOutcome {
        &self.outcome
    }

    pub fn into_outcome(self) -> AuthOutcome {
        self.outcome
    }

    /// A token was presented and verified.
    pub fn is_authenticated(&self) -> bool {
        matches!(self.outcome, AuthOutcome::Authenticated(_))
    }

    /// The request went through without a verified token: it was skipped, or
    /// no token was presented and anonymous access is allowed.
    pub fn is_anonymous(&self) -> bool {
        matches!(
            self.outcome,
            AuthOutcome::Skipped | AuthOutcome::Unauthenticated
        )
    }

    pub fn is_skipped(&self) -> bool {
        matches!(self.outcome, AuthOutcome::Skipped)
    }

    pub fn token(&self) -> Option<&DecodedToken> {
        self.outcome.token()
    }

    /// The verified token, nothing for skipped or anonymous requests, or
    /// the failure.
    pub fn result(&self) -> Result<Option<&DecodedToken>, &AuthError> {
        match &self.outcome {
            AuthOutcome::Failed(error) => Err(error),
            outcome => Ok(outcome.token()),
        }
    }

    /// Owned form of [`Session::result`].
    pub fn into_result(self) -> Result<Option<DecodedToken>, AuthError> {
        match self.outcome {
            AuthOutcome::Authenticated(token) => Ok(Some(*token)),
            AuthOutcome::Skipped | AuthOutcome::Unauthenticated => Ok(None),
            AuthOutcome::Failed(error) => Err(error),
        }
    }

    pub fn has_realm_role(&self, role: &str) -> bool {
        self.token().is_some_and(|token| token.has_realm_role(role))
    }

    pub fn has_resource_role(&self, resource: &str, role: &str) -> bool {
        self.token()
            .is_some_and(|token| token.has_resource_role(resource, role))
    }

    pub fn authorizer(&self) -> Authorizer<'_> {
        Authorizer::new(self.token())
    }

    pub fn authorize_realm(&self, role: &str) -> Result<Grant, AuthError> {
        self.authorizer().authorize_realm(role)
    }

    pub fn authorize_resource(&self, resource: &str, role: &str) -> Result<Grant, AuthError> {
        self.authorizer().authorize_resource(resource, role)
    }
}
