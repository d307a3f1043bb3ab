// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Signature and expiry verification of bearer tokens.
//!
//! ## Security
//!
//! - The token's `alg` must be one the key set publishes; `none` and HMAC
//!   are never accepted unless the realm publishes them
//! - The key is chosen by `kid` and must be a signing key
//! - `exp` is checked against the injected clock with a fixed leeway
//! - Issuer, audience and `nbf` are not checked

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use jsonwebtoken::errors::{Error as JwtError, ErrorKind};
use jsonwebtoken::{decode, decode_header, Algorithm, Validation};
use serde_json::Value;
use tracing::debug;

use super::claims::ClaimMap;
use super::error::{AuthError, FailureKind};
use super::jwks::KeySet;
use crate::clock::{Clock, SystemClock};

/// Why a token could not be matched to a key.
#[derive(Debug, thiserror::Error)]
pub enum KeyMatchError {
    #[error("token header has no key id")]
    MissingKeyId,
    #[error("no signing key with id {0:?}")]
    UnknownKeyId(String),
    #[error("algorithm {0:?} is not published by the realm")]
    DisallowedAlgorithm(Algorithm),
    #[error("key {kid:?} is published for {published}, token uses {used:?}")]
    AlgorithmMismatch {
        kid: String,
        published: String,
        used: Algorithm,
    },
    #[error("exp claim is not a number")]
    InvalidExpiry,
}

/// A token whose signature and expiry have been checked.
#[derive(Debug, Clone)]
pub struct VerifiedToken {
    pub claims: ClaimMap,
    pub headers: ClaimMap,
}

/// Signature algorithms usable with a key set.
///
/// Fails with `no_algorithms` when no published `alg` names a signature
/// algorithm.
pub fn signing_algorithms(keys: &KeySet) -> Result<Vec<Algorithm>, AuthError> {
    let algorithms: Vec<Algorithm> = keys
        .algorithms()
        .into_iter()
        .filter_map(|alg| Algorithm::from_str(alg).ok())
        .collect();

    if algorithms.is_empty() {
        return Err(AuthError::new(
            FailureKind::NoAlgorithms,
            "Could not derive algorithms from JWKS",
        ));
    }
    Ok(algorithms)
}

/// Checks tokens against a key set.
#[derive(Debug, Clone)]
pub struct TokenVerifier {
    leeway: u64,
    clock: Arc<dyn Clock>,
}

impl TokenVerifier {
    pub fn new(leeway: Duration) -> Self {
        Self {
            leeway: leeway.as_secs(),
            clock: Arc::new(SystemClock),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn leeway(&self) -> Duration {
        Duration::from_secs(self.leeway)
    }

    pub fn verify(&self, token: &str, keys: &KeySet) -> Result<VerifiedToken, AuthError> {
        let algorithms = signing_algorithms(keys)?;

        let header = decode_header(token).map_err(|e| decoding_failed(token, e))?;
        if !algorithms.contains(&header.alg) {
            return Err(decoding_failed(
                token,
                KeyMatchError::DisallowedAlgorithm(header.alg),
            ));
        }

        let kid = header
            .kid
            .as_deref()
            .ok_or_else(|| decoding_failed(token, KeyMatchError::MissingKeyId))?;
        let key = keys
            .find(kid)
            .filter(|key| key.is_signing_key())
            .ok_or_else(|| decoding_failed(token, KeyMatchError::UnknownKeyId(kid.to_string())))?;

        if let Some(published) = key.algorithm() {
            if Algorithm::from_str(published).ok() != Some(header.alg) {
                return Err(decoding_failed(
                    token,
                    KeyMatchError::AlgorithmMismatch {
                        kid: kid.to_string(),
                        published: published.to_string(),
                        used: header.alg,
                    },
                ));
            }
        }

        let decoding_key = key.decoding_key().map_err(|e| decoding_failed(token, e))?;

        let mut validation = Validation::new(header.alg);
        validation.validate_exp = false;
        validation.validate_aud = false;
        validation.required_spec_claims.clear();

        let data = decode::<ClaimMap>(token, &decoding_key, &validation)
            .map_err(|e| decoding_failed(token, e))?;

        self.check_expiry(token, &data.claims)?;

        let headers = match serde_json::to_value(&data.header) {
            Ok(Value::Object(map)) => map,
            _ => ClaimMap::new(),
        };

        debug!(kid, "Token signature verified");

        Ok(VerifiedToken {
            claims: data.claims,
            headers,
        })
    }

    /// Accept while `now <= exp + leeway`. A token without `exp` never expires.
    fn check_expiry(&self, token: &str, claims: &ClaimMap) -> Result<(), AuthError> {
        let Some(exp) = claims.get("exp") else {
            return Ok(());
        };
        let exp = exp
            .as_i64()
            .or_else(|| exp.as_f64().map(|f| f as i64))
            .ok_or_else(|| decoding_failed(token, KeyMatchError::InvalidExpiry))?;

        let leeway = i64::try_from(self.leeway).unwrap_or(i64::MAX);
        if self.clock.now().timestamp() > exp.saturating_add(leeway) {
            return Err(AuthError::new(FailureKind::Expired, "JWT is expired")
                .with_token(token)
                .with_cause(JwtError::from(ErrorKind::ExpiredSignature)));
        }
        Ok(())
    }
}

fn decoding_failed<E>(token: &str, cause: E) -> AuthError
where
    E: std::error::Error + Send + Sync + 'static,
{
    AuthError::new(FailureKind::DecodingFailed, "Failed to decode JWT")
        .with_token(token)
        .with_cause(cause)
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};
    use jsonwebtoken::{encode, EncodingKey, Header};
    use serde_json::json;

    use super::*;
    use crate::auth::testing::{
        claims, key_set, mint, OTHER_KEY_PEM, SIGNING_KEY_PEM, SIGNING_KID,
    };
    use crate::clock::manual::ManualClock;

    const LEEWAY: u64 = 10;

    fn now() -> i64 {
        Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap().timestamp()
    }

    fn verifier() -> TokenVerifier {
        let clock = ManualClock::at(Utc.timestamp_opt(now(), 0).unwrap());
        TokenVerifier::new(Duration::from_secs(LEEWAY)).with_clock(Arc::new(clock))
    }

    fn kind_of(result: Result<VerifiedToken, AuthError>) -> FailureKind {
        result.unwrap_err().kind()
    }

    #[test]
    fn verifies_valid_token() {
        let token = mint(&claims(now() + 3600), SIGNING_KID, SIGNING_KEY_PEM);
        let verified = verifier().verify(&token, &key_set()).unwrap();

        assert_eq!(verified.claims["sub"], json!("9a1b2c3d-0000-4000-8000-000000000001"));
        assert_eq!(verified.headers["alg"], json!("RS256"));
        assert_eq!(verified.headers["kid"], json!(SIGNING_KID));
    }

    #[test]
    fn leeway_boundary() {
        let keys = key_set();
        let verifier = verifier();

        let late = mint(&claims(now() - LEEWAY as i64 - 1), SIGNING_KID, SIGNING_KEY_PEM);
        let err = verifier.verify(&late, &keys).unwrap_err();
        assert_eq!(err.kind(), FailureKind::Expired);
        assert_eq!(err.message(), "JWT is expired");
        assert_eq!(err.token(), Some(late.as_str()));
        assert!(err.cause().is_some());

        let edge = mint(&claims(now() - LEEWAY as i64), SIGNING_KID, SIGNING_KEY_PEM);
        assert!(verifier.verify(&edge, &keys).is_ok());

        let inside = mint(&claims(now() - LEEWAY as i64 + 1), SIGNING_KID, SIGNING_KEY_PEM);
        assert!(verifier.verify(&inside, &keys).is_ok());
    }

    #[test]
    fn token_without_exp_does_not_expire() {
        let mut payload = claims(0);
        payload.as_object_mut().unwrap().remove("exp");
        let token = mint(&payload, SIGNING_KID, SIGNING_KEY_PEM);
        assert!(verifier().verify(&token, &key_set()).is_ok());
    }

    #[test]
    fn non_numeric_exp_fails_decoding() {
        let mut payload = claims(0);
        payload["exp"] = json!("tomorrow");
        let token = mint(&payload, SIGNING_KID, SIGNING_KEY_PEM);
        assert_eq!(kind_of(verifier().verify(&token, &key_set())), FailureKind::DecodingFailed);
    }

    #[test]
    fn wrong_signature_fails_decoding() {
        let token = mint(&claims(now() + 300), SIGNING_KID, OTHER_KEY_PEM);
        let err = verifier().verify(&token, &key_set()).unwrap_err();
        assert_eq!(err.kind(), FailureKind::DecodingFailed);
        assert_eq!(err.message(), "Failed to decode JWT");
        assert_eq!(err.token(), Some(token.as_str()));
    }

    #[test]
    fn unknown_or_missing_kid_fails_decoding() {
        let unknown = mint(&claims(now() + 300), "rotated-away", SIGNING_KEY_PEM);
        assert_eq!(kind_of(verifier().verify(&unknown, &key_set())), FailureKind::DecodingFailed);

        let header = Header::new(Algorithm::RS256);
        let key = EncodingKey::from_rsa_pem(SIGNING_KEY_PEM.as_bytes()).unwrap();
        let no_kid = encode(&header, &claims(now() + 300), &key).unwrap();
        assert_eq!(kind_of(verifier().verify(&no_kid, &key_set())), FailureKind::DecodingFailed);
    }

    #[test]
    fn encryption_key_is_not_used_for_signatures() {
        let token = mint(&claims(now() + 300), "rsa-oaep-encryption", SIGNING_KEY_PEM);
        assert_eq!(kind_of(verifier().verify(&token, &key_set())), FailureKind::DecodingFailed);
    }

    #[test]
    fn unpublished_algorithm_is_rejected() {
        let mut header = Header::new(Algorithm::HS256);
        header.kid = Some(SIGNING_KID.to_string());
        let token = encode(
            &header,
            &claims(now() + 300),
            &EncodingKey::from_secret(b"guessable"),
        )
        .unwrap();

        let err = verifier().verify(&token, &key_set()).unwrap_err();
        assert_eq!(err.kind(), FailureKind::DecodingFailed);
        assert!(err
            .cause()
            .unwrap()
            .to_string()
            .contains("not published by the realm"));
    }

    #[test]
    fn malformed_token_fails_decoding() {
        for token in ["", "not-a-jwt", "a.b.c"] {
            assert_eq!(kind_of(verifier().verify(token, &key_set())), FailureKind::DecodingFailed);
        }
    }

    #[test]
    fn key_set_without_signature_algorithms() {
        let token = mint(&claims(now() + 300), SIGNING_KID, SIGNING_KEY_PEM);

        let empty = KeySet::default();
        assert_eq!(kind_of(verifier().verify(&token, &empty)), FailureKind::NoAlgorithms);

        let mut document: Value = serde_json::from_str(crate::auth::testing::JWKS_JSON).unwrap();
        for key in document["keys"].as_array_mut().unwrap() {
            key.as_object_mut().unwrap().remove("alg");
        }
        let unlabelled = KeySet::from_json(document).unwrap();
        assert_eq!(kind_of(verifier().verify(&token, &unlabelled)), FailureKind::NoAlgorithms);

        let encryption_only = KeySet::from_json(json!({"keys": [
            {"kid": "enc", "kty": "RSA", "alg": "RSA-OAEP", "use": "enc", "n": "AQAB", "e": "AQAB"}
        ]}))
        .unwrap();
        let err = verifier().verify(&token, &encryption_only).unwrap_err();
        assert_eq!(err.kind(), FailureKind::NoAlgorithms);
        assert_eq!(err.message(), "Could not derive algorithms from JWKS");
    }
}
