// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Authentication Module
//!
//! Keycloak bearer token verification for the host's request handling.
//!
//! ## Auth Flow
//!
//! 1. A Keycloak client obtains an access token for the realm
//! 2. The client sends `Authorization: Bearer <token>`
//! 3. The host passes each request to [`Authenticator::authenticate`]:
//!    - Skip rules and CORS preflights bypass verification
//!    - Realm public keys are fetched from the certs endpoint and cached
//!    - The signature and expiry are verified
//!    - The payload is projected into a [`DecodedToken`]
//! 4. Handlers ask the [`Session`] for realm or resource roles
//!
//! ## Security
//!
//! - Only algorithms the realm publishes are accepted
//! - Encryption keys are never used for signature checks
//! - Clock skew tolerance defaults to 10 seconds
//! - Key retrieval failures fail the request with a classified error

pub mod claims;
pub mod error;
pub mod extractor;
pub mod fetcher;
pub mod jwks;
pub mod middleware;
pub mod roles;
pub mod session;
pub mod skip;
pub mod verify;

#[cfg(test)]
pub(crate) mod testing;

pub use claims::{ClaimMap, DecodedToken};
pub use error::{AuthError, FailureKind};
pub use extractor::{read_token, AuthRequest};
pub use fetcher::{KeyFetcher, KeySource};
pub use jwks::{JwksCache, KeySet, PublicKey};
pub use middleware::{AuthOutcome, Authenticator};
pub use roles::{ResourceRoleMap, RoleSet};
pub use session::{Authorizer, Grant, Session};
pub use skip::SkipEvaluator;
pub use verify::{TokenVerifier, VerifiedToken};
