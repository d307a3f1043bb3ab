// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Keycloak Verifier - Bearer Token Verification for Keycloak Realms
//!
//! Verifies access tokens issued by a Keycloak realm against the realm's
//! published signing keys and answers role questions about the caller.
//!
//! ## Modules
//!
//! - `auth` - Token reading, key retrieval, verification and authorization
//! - `clock` - Injectable time source
//! - `config` - Runtime configuration

pub mod auth;
pub mod clock;
pub mod config;

pub use auth::{AuthError, AuthOutcome, Authenticator, DecodedToken, FailureKind, Session};
pub use config::{Config, ConfigError};
