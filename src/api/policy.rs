//! Purpose: Manage access policy documents on one storage host.
//! Exports: `PolicyClient`, `PolicyInfo`, `Principal`, `CANNED_POLICIES`, `is_canned`.
//! Role: Typed wrapper over the canned-policy admin operations.
//! Invariants: `add` is an upsert; documents travel inline as the request body.
//! Invariants: Canned policies are rejected locally on removal, before any request.
//! Invariants: Documents are opaque JSON; this module never interprets them.
#![allow(clippy::result_large_err)]

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::transport::{ApiResult, Method, Transport, code_entity};
use crate::core::error::{EntityKind, Error, ErrorKind};

/// Policies every host ships with; they cannot be removed.
pub const CANNED_POLICIES: [&str; 3] = ["readonly", "readwrite", "writeonly"];

pub fn is_canned(name: &str) -> bool {
    CANNED_POLICIES.contains(&name)
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct PolicyInfo {
    pub name: String,
    pub document: Value,
}

/// Identity a policy can be attached to.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Principal {
    User(String),
    Group(String),
}

impl Principal {
    pub fn user(access_key: impl Into<String>) -> Self {
        Self::User(access_key.into())
    }

    pub fn group(name: impl Into<String>) -> Self {
        Self::Group(name.into())
    }

    pub fn name(&self) -> &str {
        match self {
            Principal::User(name) | Principal::Group(name) => name,
        }
    }

    fn entity(&self) -> EntityKind {
        match self {
            Principal::User(_) => EntityKind::User,
            Principal::Group(_) => EntityKind::Group,
        }
    }

    fn is_group(&self) -> bool {
        matches!(self, Principal::Group(_))
    }
}

#[derive(Deserialize)]
struct RemotePolicyInfo {
    #[serde(rename = "PolicyName", default)]
    policy_name: Option<String>,
    #[serde(rename = "Policy")]
    policy: Value,
}

#[derive(Clone, Debug)]
pub struct PolicyClient {
    transport: Transport,
}

impl PolicyClient {
    pub fn new(transport: Transport) -> Self {
        Self { transport }
    }

    pub fn host(&self) -> &str {
        self.transport.host()
    }

    /// Creates or replaces `policy` with `document`.
    pub fn add<T: Serialize + ?Sized>(&self, policy: &str, document: &T) -> ApiResult<()> {
        let body = self
            .transport
            .encode(document)
            .map_err(|err| err.with_entity(EntityKind::Policy, policy))?;
        self.transport
            .call(Method::Put, "add-canned-policy", &[("name", policy)], &body)
            .map_err(|err| err.or_entity(EntityKind::Policy, policy))?;
        Ok(())
    }

    pub fn info(&self, policy: &str) -> ApiResult<PolicyInfo> {
        let remote: Option<RemotePolicyInfo> = self
            .transport
            .call_json(
                Method::Get,
                "info-canned-policy",
                &[("name", policy), ("v", "2")],
                b"",
            )
            .map_err(|err| err.or_entity(EntityKind::Policy, policy))?;
        let remote = remote.ok_or_else(|| {
            Error::new(ErrorKind::NotFound)
                .with_message("policy was not found")
                .with_entity(EntityKind::Policy, policy)
                .with_host(self.host())
        })?;
        Ok(PolicyInfo {
            name: remote
                .policy_name
                .filter(|name| !name.is_empty())
                .unwrap_or_else(|| policy.to_string()),
            document: remote.policy,
        })
    }

    /// Sorted policy names, canned ones included.
    pub fn list(&self) -> ApiResult<Vec<String>> {
        let policies: Option<BTreeMap<String, Value>> =
            self.transport
                .call_json(Method::Get, "list-canned-policies", &[], b"")?;
        Ok(policies.unwrap_or_default().into_keys().collect())
    }

    pub fn remove(&self, policy: &str) -> ApiResult<()> {
        if is_canned(policy) {
            return Err(Error::new(ErrorKind::ProtectedPolicy)
                .with_message("canned policies cannot be removed")
                .with_entity(EntityKind::Policy, policy)
                .with_host(self.host()));
        }
        self.transport
            .call(Method::Delete, "remove-canned-policy", &[("name", policy)], b"")
            .map_err(|err| err.or_entity(EntityKind::Policy, policy))?;
        Ok(())
    }

    /// Sets `policy` as the policy of `principal`.
    pub fn attach(&self, policy: &str, principal: &Principal) -> ApiResult<()> {
        let is_group = if principal.is_group() { "true" } else { "false" };
        self.transport
            .call(
                Method::Put,
                "set-user-or-group-policy",
                &[
                    ("policyName", policy),
                    ("userOrGroup", principal.name()),
                    ("isGroup", is_group),
                ],
                b"",
            )
            .map_err(|err| match err.code().and_then(code_entity) {
                Some(EntityKind::Policy) | None => err.or_entity(EntityKind::Policy, policy),
                Some(_) => err.or_entity(principal.entity(), principal.name()),
            })?;
        Ok(())
    }
}
