// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! JWKS (JSON Web Key Set) parsing and caching.
//!
//! ## Security
//!
//! - Keys marked for encryption (`"use": "enc"`) are never handed out for
//!   signature checks
//! - A failed refresh replaces the cached keys; every request then fails
//!   with the same classified error until a refresh succeeds
//! - Concurrent requests that find the cache stale share one fetch
//!
//! ## Usage
//!
//! Build one `JwksCache` per realm and share it behind an `Arc`. The
//! authenticator calls `find_public_keys` on every request.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use jsonwebtoken::jwk::Jwk;
use jsonwebtoken::DecodingKey;
use serde_json::Value;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

use super::error::{AuthError, FailureKind};
use super::fetcher::{KeyFetcher, KeySource};
use crate::clock::{Clock, SystemClock};
use crate::config::{Config, ConfigError};

/// One published key.
#[derive(Debug, Clone, PartialEq)]
pub struct PublicKey {
    key_id: Option<String>,
    algorithm: Option<String>,
    key_use: Option<String>,
    jwk: Value,
}

impl PublicKey {
    /// Wrap a JWK object. Anything other than a JSON object is rejected.
    pub fn from_json(jwk: Value) -> Result<Self, AuthError> {
        if !jwk.is_object() {
            return Err(AuthError::new(
                FailureKind::InvalidPublicKeys,
                "JWKS entry is not an object",
            ));
        }
        let field = |name: &str| jwk.get(name).and_then(Value::as_str).map(str::to_string);

        Ok(Self {
            key_id: field("kid"),
            algorithm: field("alg"),
            key_use: field("use"),
            jwk,
        })
    }

    pub fn key_id(&self) -> Option<&str> {
        self.key_id.as_deref()
    }

    pub fn algorithm(&self) -> Option<&str> {
        self.algorithm.as_deref()
    }

    /// Whether the key may verify signatures. Keys without `use` qualify.
    pub fn is_signing_key(&self) -> bool {
        self.key_use.as_deref().is_none_or(|u| u == "sig")
    }

    /// Build the verification key from the JWK parameters.
    pub fn decoding_key(&self) -> Result<DecodingKey, jsonwebtoken::errors::Error> {
        let jwk: Jwk = serde_json::from_value(self.jwk.clone())?;
        DecodingKey::from_jwk(&jwk)
    }
}

/// The realm's published key set.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct KeySet {
    keys: Vec<PublicKey>,
}

impl KeySet {
    pub fn new(keys: Vec<PublicKey>) -> Self {
        Self { keys }
    }

    /// Parse a `{"keys": [...]}` document.
    pub fn from_json(document: Value) -> Result<Self, AuthError> {
        let Value::Object(mut document) = document else {
            return Err(AuthError::new(
                FailureKind::InvalidPublicKeys,
                "JWKS response is not a JSON object",
            ));
        };
        let Some(Value::Array(entries)) = document.remove("keys") else {
            return Err(AuthError::new(
                FailureKind::InvalidPublicKeys,
                "JWKS response has no \"keys\" array",
            ));
        };

        let keys = entries
            .into_iter()
            .map(PublicKey::from_json)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self { keys })
    }

    pub fn keys(&self) -> &[PublicKey] {
        &self.keys
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Key with the given id, if any.
    pub fn find(&self, key_id: &str) -> Option<&PublicKey> {
        self.keys.iter().find(|key| key.key_id() == Some(key_id))
    }

    /// Distinct `alg` values in publication order.
    pub fn algorithms(&self) -> Vec<&str> {
        let mut seen = HashSet::new();
        self.keys
            .iter()
            .filter_map(PublicKey::algorithm)
            .filter(|alg| seen.insert(*alg))
            .collect()
    }
}

#[derive(Debug, Clone)]
struct CacheEntry {
    keys: Result<Arc<KeySet>, AuthError>,
    retrieved_at: Option<DateTime<Utc>>,
    expires_at: Option<DateTime<Utc>>,
    /// Bumped on every store; lets waiters see that someone else refreshed.
    generation: u64,
}

impl CacheEntry {
    fn empty() -> Self {
        Self {
            keys: Err(AuthError::new(
                FailureKind::InvalidPublicKeys,
                "No public keys have been fetched",
            )),
            retrieved_at: None,
            expires_at: None,
            generation: 0,
        }
    }
}

/// Time-bounded cache over a [`KeySource`].
///
/// The last outcome is kept, success or failure. A cached success is served
/// until its expiry; a cached failure is retried on the next access.
pub struct JwksCache {
    source: Arc<dyn KeySource>,
    ttl: TimeDelta,
    clock: Arc<dyn Clock>,
    entry: RwLock<CacheEntry>,
    refresh_lock: Mutex<()>,
}

impl std::fmt::Debug for JwksCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JwksCache")
            .field("ttl", &self.ttl)
            .field("clock", &self.clock)
            .finish_non_exhaustive()
    }
}

impl JwksCache {
    pub fn new(source: Arc<dyn KeySource>, ttl: Duration) -> Self {
        Self {
            source,
            ttl: TimeDelta::from_std(ttl).unwrap_or(TimeDelta::MAX),
            clock: Arc::new(SystemClock),
            entry: RwLock::new(CacheEntry::empty()),
            refresh_lock: Mutex::new(()),
        }
    }

    /// Cache over the realm's certs endpoint with the configured TTL.
    pub fn from_config(config: &Config) -> Result<Self, ConfigError> {
        let fetcher = KeyFetcher::new(config)?;
        Ok(Self::new(Arc::new(fetcher), config.ttl()))
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Current key set, fetching when the cache is empty, expired, or holds
    /// a failure.
    pub async fn find_public_keys(&self) -> Result<Arc<KeySet>, AuthError> {
        let observed = {
            let entry = self.entry.read().await;
            if !self.is_stale(&entry) {
                debug!("JWKS cache hit");
                return entry.keys.clone();
            }
            entry.generation
        };

        let _refreshing = self.refresh_lock.lock().await;

        {
            let entry = self.entry.read().await;
            if entry.generation != observed {
                debug!("JWKS refreshed by a concurrent request");
                return entry.keys.clone();
            }
        }

        self.fetch_and_store().await
    }

    /// Fetch unconditionally and replace the cached outcome.
    pub async fn refresh(&self) -> Result<Arc<KeySet>, AuthError> {
        let _refreshing = self.refresh_lock.lock().await;
        self.fetch_and_store().await
    }

    /// When the last fetch attempt finished. `None` before the first one.
    pub async fn retrieved_at(&self) -> Option<DateTime<Utc>> {
        self.entry.read().await.retrieved_at
    }

    /// When the cached outcome stops being served.
    pub async fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.entry.read().await.expires_at
    }

    fn is_stale(&self, entry: &CacheEntry) -> bool {
        match (&entry.keys, entry.expires_at) {
            (Ok(_), Some(expires_at)) => self.clock.now() > expires_at,
            _ => true,
        }
    }

    /// Caller must hold `refresh_lock`.
    async fn fetch_and_store(&self) -> Result<Arc<KeySet>, AuthError> {
        let keys = self.source.fetch_keys().await.map(Arc::new);
        let retrieved_at = self.clock.now();
        let expires_at = retrieved_at
            .checked_add_signed(self.ttl)
            .unwrap_or(DateTime::<Utc>::MAX_UTC);

        match &keys {
            Ok(set) => info!(
                key_count = set.len(),
                expires_at = %expires_at,
                "JWKS cache refreshed"
            ),
            Err(e) => warn!(code = e.code(), error = %e, "JWKS refresh failed"),
        }

        let mut entry = self.entry.write().await;
        let generation = entry.generation + 1;
        *entry = CacheEntry {
            keys: keys.clone(),
            retrieved_at: Some(retrieved_at),
            expires_at: Some(expires_at),
            generation,
        };

        keys
    }
}
