// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Verified token claims and the typed view over them.
//!
//! Keycloak uses the short registered claim names (`exp`, `iat`, `typ`, ...).
//! [`DecodedToken`] renames those to legible names before projecting the
//! payload into typed attributes. Anything it does not model stays reachable
//! through [`DecodedToken::fetch`], which falls back to the untouched payload.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use super::error::{AuthError, FailureKind};
use super::roles::{ResourceRoleMap, RoleSet};

/// A JSON object of claims or header fields.
pub type ClaimMap = Map<String, Value>;

/// Wire claim name to attribute name.
const CLAIM_RENAMES: &[(&str, &str)] = &[
    ("allowed-origins", "allowed_origins"),
    ("auth_time", "authorized_at"),
    ("aud", "audience"),
    ("azp", "authorized_party"),
    ("exp", "expires_at"),
    ("iat", "issued_at"),
    ("typ", "type"),
];

/// Ergonomic name to attribute name.
const ATTRIBUTE_ALIASES: &[(&str, &str)] = &[
    ("keycloak_id", "sub"),
    ("first_name", "given_name"),
    ("last_name", "family_name"),
];

/// Attributes a token cannot be projected without.
const REQUIRED_ATTRIBUTES: &[&str] = &["sub", "realm_access", "jti", "type"];

/// Attribute name for a wire claim name.
pub fn canonical_claim(name: &str) -> &str {
    CLAIM_RENAMES
        .iter()
        .find(|(wire, _)| *wire == name)
        .map_or(name, |(_, attribute)| *attribute)
}

/// Wire claim name for an attribute name (`expires_at` becomes `exp`).
pub fn unalias_claim(name: &str) -> &str {
    CLAIM_RENAMES
        .iter()
        .find(|(_, attribute)| *attribute == name)
        .map_or(name, |(wire, _)| *wire)
}

fn alias_target(name: &str) -> Option<&'static str> {
    ATTRIBUTE_ALIASES
        .iter()
        .find(|(alias, _)| *alias == name)
        .map(|(_, attribute)| *attribute)
}

/// A required claim was absent from the payload.
#[derive(Debug, thiserror::Error)]
#[error("missing claim {0}")]
pub struct MissingClaim(pub String);

/// Typed projection of the renamed payload.
#[derive(Deserialize)]
struct Projection {
    sub: String,
    realm_access: RoleSet,
    #[serde(default)]
    resource_access: Option<ResourceRoleMap>,
    #[serde(default)]
    email_verified: Option<bool>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    preferred_username: Option<String>,
    #[serde(default)]
    given_name: Option<String>,
    #[serde(default)]
    family_name: Option<String>,
    #[serde(default)]
    email: Option<String>,
    #[serde(default, deserialize_with = "deserialize_numeric_date")]
    expires_at: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "deserialize_numeric_date")]
    issued_at: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "deserialize_numeric_date")]
    authorized_at: Option<DateTime<Utc>>,
    jti: String,
    #[serde(default, deserialize_with = "deserialize_audience")]
    audience: Option<Vec<String>>,
    #[serde(rename = "type")]
    token_type: String,
    #[serde(default)]
    authorized_party: Option<String>,
    #[serde(default)]
    nonce: Option<String>,
    #[serde(default)]
    scope: Option<String>,
    #[serde(default)]
    session_state: Option<String>,
    #[serde(default)]
    locale: Option<String>,
    #[serde(default)]
    allowed_origins: Option<Vec<String>>,
}

/// `aud` may be a single string or a list.
fn deserialize_audience<'de, D>(deserializer: D) -> Result<Option<Vec<String>>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Audience {
        One(String),
        Many(Vec<String>),
    }

    Ok(
        Option::<Audience>::deserialize(deserializer)?.map(|audience| match audience {
            Audience::One(one) => vec![one],
            Audience::Many(many) => many,
        }),
    )
}

/// NumericDate: seconds since the epoch, integer or fractional.
fn deserialize_numeric_date<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let Some(number) = Option::<serde_json::Number>::deserialize(deserializer)? else {
        return Ok(None);
    };
    let seconds = number
        .as_i64()
        .or_else(|| number.as_f64().map(|f| f.trunc() as i64))
        .ok_or_else(|| serde::de::Error::custom("timestamp out of range"))?;
    DateTime::from_timestamp(seconds, 0)
        .map(Some)
        .ok_or_else(|| serde::de::Error::custom("timestamp out of range"))
}

/// A verified Keycloak access token.
///
/// Immutable once built. Role checks are exact, case-sensitive matches.
#[derive(Debug, Clone, Serialize)]
pub struct DecodedToken {
    /// Keycloak user id. Suitable for linking local user records.
    sub: String,
    realm_access: RoleSet,
    resource_access: ResourceRoleMap,
    email_verified: Option<bool>,
    name: Option<String>,
    preferred_username: Option<String>,
    given_name: Option<String>,
    family_name: Option<String>,
    email: Option<String>,
    #[serde(with = "chrono::serde::ts_seconds_option")]
    expires_at: Option<DateTime<Utc>>,
    #[serde(with = "chrono::serde::ts_seconds_option")]
    issued_at: Option<DateTime<Utc>>,
    #[serde(with = "chrono::serde::ts_seconds_option")]
    authorized_at: Option<DateTime<Utc>>,
    jti: String,
    audience: Option<Vec<String>>,
    #[serde(rename = "type")]
    token_type: String,
    authorized_party: Option<String>,
    nonce: Option<String>,
    scope: Option<String>,
    session_state: Option<String>,
    locale: Option<String>,
    allowed_origins: Vec<String>,
    /// Verification headers, kept for debugging.
    headers: ClaimMap,
    /// The payload exactly as it was signed.
    original_payload: ClaimMap,
}

impl DecodedToken {
    /// Project a verified payload and its headers.
    ///
    /// Fails with `decoding_failed` when a required claim is missing or a
    /// claim has the wrong type. The message names the wire claim.
    pub fn from_parts(payload: ClaimMap, headers: ClaimMap) -> Result<Self, AuthError> {
        let renamed: ClaimMap = payload
            .iter()
            .map(|(key, value)| (canonical_claim(key).to_string(), value.clone()))
            .collect();

        if let Some(missing) = REQUIRED_ATTRIBUTES
            .iter()
            .find(|attribute| renamed.get(**attribute).is_none_or(Value::is_null))
        {
            let claim = unalias_claim(missing);
            return Err(AuthError::new(
                FailureKind::DecodingFailed,
                format!("Missing expected JWT claim: {claim}"),
            )
            .with_cause(MissingClaim(claim.to_string())));
        }

        let projection: Projection =
            serde_json::from_value(Value::Object(renamed)).map_err(|e| {
                AuthError::new(
                    FailureKind::DecodingFailed,
                    "Unexpected issue with JWT claim types",
                )
                .with_cause(e)
            })?;

        Ok(Self {
            sub: projection.sub,
            realm_access: projection.realm_access,
            resource_access: projection.resource_access.unwrap_or_default(),
            email_verified: projection.email_verified,
            name: projection.name,
            preferred_username: projection.preferred_username,
            given_name: projection.given_name,
            family_name: projection.family_name,
            email: projection.email,
            expires_at: projection.expires_at,
            issued_at: projection.issued_at,
            authorized_at: projection.authorized_at,
            jti: projection.jti,
            audience: projection.audience,
            token_type: projection.token_type,
            authorized_party: projection.authorized_party,
            nonce: projection.nonce,
            scope: projection.scope,
            session_state: projection.session_state,
            locale: projection.locale,
            allowed_origins: projection.allowed_origins.unwrap_or_default(),
            headers,
            original_payload: payload,
        })
    }

    /// The `sub` claim: the Keycloak user id.
    pub fn sub(&self) -> &str {
        &self.sub
    }

    /// Alias of [`DecodedToken::sub`].
    pub fn keycloak_id(&self) -> &str {
        &self.sub
    }

    /// Realm-level roles.
    pub fn realm_access(&self) -> &RoleSet {
        &self.realm_access
    }

    /// Roles per client resource.
    pub fn resource_access(&self) -> &ResourceRoleMap {
        &self.resource_access
    }

    /// Whether Keycloak has verified the email address.
    pub fn email_verified(&self) -> Option<bool> {
        self.email_verified
    }

    /// Full display name.
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Login name chosen by the user.
    pub fn preferred_username(&self) -> Option<&str> {
        self.preferred_username.as_deref()
    }

    /// The `given_name` claim.
    pub fn given_name(&self) -> Option<&str> {
        self.given_name.as_deref()
    }

    /// Alias of [`DecodedToken::given_name`].
    pub fn first_name(&self) -> Option<&str> {
        self.given_name()
    }

    /// The `family_name` claim.
    pub fn family_name(&self) -> Option<&str> {
        self.family_name.as_deref()
    }

    /// Alias of [`DecodedToken::family_name`].
    pub fn last_name(&self) -> Option<&str> {
        self.family_name()
    }

    /// The `email` claim.
    pub fn email(&self) -> Option<&str> {
        self.email.as_deref()
    }

    /// The `exp` claim.
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.expires_at
    }

    /// The `iat` claim.
    pub fn issued_at(&self) -> Option<DateTime<Utc>> {
        self.issued_at
    }

    /// The `auth_time` claim.
    pub fn authorized_at(&self) -> Option<DateTime<Utc>> {
        self.authorized_at
    }

    /// The `jti` claim.
    pub fn token_id(&self) -> &str {
        &self.jti
    }

    /// The `aud` claim, always as a list.
    pub fn audience(&self) -> Option<&[String]> {
        self.audience.as_deref()
    }

    /// The `typ` claim. Keycloak sets this to `"Bearer"` for access tokens.
    pub fn token_type(&self) -> &str {
        &self.token_type
    }

    /// The `azp` claim.
    pub fn authorized_party(&self) -> Option<&str> {
        self.authorized_party.as_deref()
    }

    /// The `nonce` claim.
    pub fn nonce(&self) -> Option<&str> {
        self.nonce.as_deref()
    }

    /// Space-separated granted scopes.
    pub fn scope(&self) -> Option<&str> {
        self.scope.as_deref()
    }

    /// Keycloak session id.
    pub fn session_state(&self) -> Option<&str> {
        self.session_state.as_deref()
    }

    /// The `locale` claim.
    pub fn locale(&self) -> Option<&str> {
        self.locale.as_deref()
    }

    /// The `allowed-origins` claim. Empty when absent.
    pub fn allowed_origins(&self) -> &[String] {
        &self.allowed_origins
    }

    /// JOSE header of the token.
    pub fn headers(&self) -> &ClaimMap {
        &self.headers
    }

    /// The payload exactly as decoded.
    pub fn original_payload(&self) -> &ClaimMap {
        &self.original_payload
    }

    /// Whether the realm grants `name`.
    pub fn has_realm_role(&self, name: &str) -> bool {
        self.realm_access.has_role(name)
    }

    /// Whether `resource` grants `role`.
    pub fn has_resource_role(&self, resource: &str, role: &str) -> bool {
        self.resource_access.has_role(resource, role)
    }

    /// Look up a value by name.
    ///
    /// Resolution order: typed attribute, ergonomic alias (`keycloak_id`,
    /// `first_name`, `last_name`), then the original payload. Typed
    /// attributes that the token did not carry resolve to `null`.
    pub fn fetch(&self, key: &str) -> Result<Value, AuthError> {
        if let Some(value) = self.attribute(key) {
            return Ok(value);
        }

        if let Some(value) = alias_target(key).and_then(|target| self.attribute(target)) {
            return Ok(value);
        }

        self.original_payload
            .get(key)
            .cloned()
            .ok_or_else(|| AuthError::unknown_attribute(key))
    }

    /// Fetch several values at once. Fails on the first unresolved key.
    pub fn slice<I, K>(&self, keys: I) -> Result<ClaimMap, AuthError>
    where
        I: IntoIterator<Item = K>,
        K: AsRef<str>,
    {
        keys.into_iter()
            .map(|key| {
                let key = key.as_ref();
                self.fetch(key).map(|value| (key.to_string(), value))
            })
            .collect()
    }

    fn attribute(&self, name: &str) -> Option<Value> {
        let value = match name {
            "sub" => Value::from(self.sub.as_str()),
            "realm_access" => to_json(&self.realm_access),
            "resource_access" => to_json(&self.resource_access),
            "email_verified" => to_json(&self.email_verified),
            "name" => to_json(&self.name),
            "preferred_username" => to_json(&self.preferred_username),
            "given_name" => to_json(&self.given_name),
            "family_name" => to_json(&self.family_name),
            "email" => to_json(&self.email),
            "expires_at" => timestamp(self.expires_at),
            "issued_at" => timestamp(self.issued_at),
            "authorized_at" => timestamp(self.authorized_at),
            "jti" => Value::from(self.jti.as_str()),
            "audience" => to_json(&self.audience),
            "type" => Value::from(self.token_type.as_str()),
            "authorized_party" => to_json(&self.authorized_party),
            "nonce" => to_json(&self.nonce),
            "scope" => to_json(&self.scope),
            "session_state" => to_json(&self.session_state),
            "locale" => to_json(&self.locale),
            "allowed_origins" => to_json(&self.allowed_origins),
            "headers" => Value::Object(self.headers.clone()),
            "original_payload" => Value::Object(self.original_payload.clone()),
            _ => return None,
        };
        Some(value)
    }
}

fn to_json<T: Serialize>(value: &T) -> Value {
    serde_json::to_value(value).unwrap_or(Value::Null)
}

fn timestamp(value: Option<DateTime<Utc>>) -> Value {
    value.map_or(Value::Null, |at| Value::from(at.timestamp()))
}
