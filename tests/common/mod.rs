// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Shared helpers for the integration tests.

#![allow(dead_code)]

use chrono::Utc;
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use serde_json::{json, Value};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub const SIGNING_KEY_PEM: &str = include_str!("../fixtures/signing_key.pem");
pub const OTHER_KEY_PEM: &str = include_str!("../fixtures/other_key.pem");
pub const JWKS_JSON: &str = include_str!("../fixtures/jwks.json");
pub const SIGNING_KID: &str = "rs256-signing";
pub const REALM: &str = "widgets";
pub const CERTS_PATH: &str = "/realms/widgets/protocol/openid-connect/certs";

pub fn jwks() -> Value {
    serde_json::from_str(JWKS_JSON).unwrap()
}

/// Access token payload for a user of the widgets realm.
pub fn claims(expires_in: i64) -> Value {
    let now = Utc::now().timestamp();
    json!({
        "exp": now + expires_in,
        "iat": now,
        "jti": "0f9e8d7c-aaaa-4bbb-8ccc-dddddddddddd",
        "iss": "http://keycloak.test/realms/widgets",
        "aud": ["widgets-api", "account"],
        "sub": "5c0ffee0-0000-4000-8000-000000000042",
        "typ": "Bearer",
        "azp": "widgets-web",
        "realm_access": {"roles": ["uploader"]},
        "resource_access": {"widgets-api": {"roles": ["recombobulate"]}},
        "preferred_username": "grace",
        "given_name": "Grace",
        "family_name": "Hopper",
        "email": "grace@example.com"
    })
}

pub fn mint(claims: &Value, kid: &str, pem: &str) -> String {
    let mut header = Header::new(Algorithm::RS256);
    header.kid = Some(kid.to_string());
    let key = EncodingKey::from_rsa_pem(pem.as_bytes()).unwrap();
    encode(&header, claims, &key).unwrap()
}

/// Start a Keycloak stand-in serving `template` at the realm's certs path.
pub async fn keycloak(template: ResponseTemplate) -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(CERTS_PATH))
        .respond_with(template)
        .mount(&server)
        .await;
    server
}
