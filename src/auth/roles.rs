// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Realm and resource roles carried by a token.
//!
//! Keycloak encodes realm roles as `{"roles": [...]}` under `realm_access`
//! and per-client roles as a map of the same shape under `resource_access`.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Resource that Keycloak always grants an entry for.
pub const DEFAULT_RESOURCE: &str = "account";

/// A set of role names.
///
/// Membership is a case-sensitive exact match.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleSet {
    #[serde(default)]
    roles: Vec<String>,
}

impl RoleSet {
    /// Build a set from role names.
    pub fn new<I, S>(roles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            roles: roles.into_iter().map(Into::into).collect(),
        }
    }

    /// Whether `name` is in the set.
    pub fn has_role(&self, name: &str) -> bool {
        self.roles.iter().any(|role| role == name)
    }

    /// Role names in token order.
    pub fn roles(&self) -> &[String] {
        &self.roles
    }

    /// No roles granted.
    pub fn is_empty(&self) -> bool {
        self.roles.is_empty()
    }
}

/// Role sets keyed by resource (client) name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResourceRoleMap(HashMap<String, RoleSet>);

impl ResourceRoleMap {
    /// Wrap an already parsed map.
    pub fn new(map: HashMap<String, RoleSet>) -> Self {
        Self(map)
    }

    /// Roles for a resource. `None` when the token says nothing about it.
    pub fn get(&self, resource: &str) -> Option<&RoleSet> {
        self.0.get(resource)
    }

    /// Check a role on a resource. An absent resource has no roles.
    pub fn has_role(&self, resource: &str, role: &str) -> bool {
        self.get(resource).is_some_and(|roles| roles.has_role(role))
    }

    /// Names of the resources the token mentions.
    pub fn resources(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }
}

impl Default for ResourceRoleMap {
    /// `{"account": []}`, which is what Keycloak issues for a bare user.
    fn default() -> Self {
        let mut map = HashMap::new();
        map.insert(DEFAULT_RESOURCE.to_string(), RoleSet::default());
        Self(map)
    }
}
