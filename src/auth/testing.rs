// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Fixtures shared by the unit tests.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use serde_json::{json, Value};

use super::error::{AuthError, FailureKind};
use super::fetcher::KeySource;
use super::jwks::KeySet;

pub(crate) const SIGNING_KEY_PEM: &str = include_str!("../../tests/fixtures/signing_key.pem");
pub(crate) const OTHER_KEY_PEM: &str = include_str!("../../tests/fixtures/other_key.pem");
pub(crate) const JWKS_JSON: &str = include_str!("../../tests/fixtures/jwks.json");
pub(crate) const SIGNING_KID: &str = "rs256-signing";

pub(crate) fn key_set() -> KeySet {
    KeySet::from_json(serde_json::from_str(JWKS_JSON).unwrap()).unwrap()
}

/// A Keycloak access token payload expiring at `exp`.
pub(crate) fn claims(exp: i64) -> Value {
    json!({
        "exp": exp,
        "iat": exp - 300,
        "auth_time": exp - 300,
        "jti": "6f1c2f0e-1111-4222-8333-444455556666",
        "iss": "https://kc.example.com/realms/widgets",
        "aud": "account",
        "sub": "9a1b2c3d-0000-4000-8000-000000000001",
        "typ": "Bearer",
        "azp": "widgets-web",
        "session_state": "a1b2c3",
        "allowed-origins": ["https://widgets.example.com"],
        "realm_access": {"roles": ["offline_access", "uploader"]},
        "resource_access": {
            "widgets-api": {"roles": ["recombobulate"]},
            "account": {"roles": ["manage-account"]}
        },
        "scope": "openid email profile",
        "email_verified": true,
        "name": "Ada Lovelace",
        "preferred_username": "ada",
        "given_name": "Ada",
        "family_name": "Lovelace",
        "email": "ada@example.com",
        "org": "analytical-engines"
    })
}

/// Sign `claims` with RS256 under `kid`.
pub(crate) fn mint(claims: &Value, kid: &str, pem: &str) -> String {
    let mut header = Header::new(Algorithm::RS256);
    header.kid = Some(kid.to_string());
    let key = EncodingKey::from_rsa_pem(pem.as_bytes()).unwrap();
    encode(&header, claims, &key).unwrap()
}

/// Key source that replays queued outcomes and counts calls.
pub(crate) struct ScriptedSource {
    outcomes: Mutex<VecDeque<Result<KeySet, AuthError>>>,
    yields: usize,
    pub(crate) calls: AtomicUsize,
}

impl ScriptedSource {
    pub(crate) fn new<I>(outcomes: I) -> Self
    where
        I: IntoIterator<Item = Result<KeySet, AuthError>>,
    {
        Self {
            outcomes: Mutex::new(outcomes.into_iter().collect()),
            yields: 0,
            calls: AtomicUsize::new(0),
        }
    }

    /// Yield to the scheduler this many times inside each fetch.
    pub(crate) fn with_yields(mut self, yields: usize) -> Self {
        self.yields = yields;
        self
    }
}

#[async_trait]
impl KeySource for ScriptedSource {
    async fn fetch_keys(&self) -> Result<KeySet, AuthError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        for _ in 0..self.yields {
            tokio::task::yield_now().await;
        }
        let next = self.outcomes.lock().unwrap().pop_front();
        next.unwrap_or_else(|| {
            Err(AuthError::new(
                FailureKind::UnknownError,
                "scripted source exhausted",
            ))
        })
    }
}
