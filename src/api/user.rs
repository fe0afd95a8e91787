//! Purpose: Manage user principals on one storage host.
//! Exports: `UserClient`, `UserStatus`, `UserInfo`.
//! Role: Typed wrapper over the user admin operations.
//! Invariants: `add` is an upsert; re-adding only rotates the secret key.
//! Invariants: `enable`/`disable` are idempotent; absent users are `NotFound`.
//! Invariants: Secret keys are write-only and never appear in results.
#![allow(clippy::result_large_err)]

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::transport::{ApiResult, Method, Transport};
use crate::core::error::{EntityKind, Error, ErrorKind};

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserStatus {
    Enabled,
    Disabled,
}

impl UserStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            UserStatus::Enabled => "enabled",
            UserStatus::Disabled => "disabled",
        }
    }
}

impl fmt::Display for UserStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for UserStatus {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "enabled" => Ok(UserStatus::Enabled),
            "disabled" => Ok(UserStatus::Disabled),
            other => Err(format!("unknown user status '{other}'")),
        }
    }
}

/// Everything the service reports about a user, minus credentials.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserInfo {
    pub access_key: String,
    pub status: UserStatus,
    pub policy: Option<String>,
    pub member_of: Vec<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RemoteUserInfo {
    status: UserStatus,
    #[serde(default)]
    policy_name: Option<String>,
    #[serde(default)]
    member_of: Option<Vec<String>>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct AddUserRequest<'a> {
    secret_key: &'a str,
}

#[derive(Clone, Debug)]
pub struct UserClient {
    transport: Transport,
}

impl UserClient {
    pub fn new(transport: Transport) -> Self {
        Self { transport }
    }

    pub fn host(&self) -> &str {
        self.transport.host()
    }

    /// Creates `access_key` (enabled) or rotates its secret key.
    pub fn add(&self, access_key: &str, secret_key: &str) -> ApiResult<()> {
        let body = self.transport.encode(&AddUserRequest { secret_key })?;
        self.transport
            .call(Method::Put, "add-user", &[("accessKey", access_key)], &body)
            .map_err(|err| err.or_entity(EntityKind::User, access_key))?;
        Ok(())
    }

    pub fn enable(&self, access_key: &str) -> ApiResult<()> {
        self.set_status(access_key, UserStatus::Enabled)
    }

    pub fn disable(&self, access_key: &str) -> ApiResult<()> {
        self.set_status(access_key, UserStatus::Disabled)
    }

    pub fn set_status(&self, access_key: &str, status: UserStatus) -> ApiResult<()> {
        self.transport
            .call(
                Method::Put,
                "set-user-status",
                &[("accessKey", access_key), ("status", status.as_str())],
                b"",
            )
            .map_err(|err| err.or_entity(EntityKind::User, access_key))?;
        Ok(())
    }

    pub fn info(&self, access_key: &str) -> ApiResult<UserStatus> {
        Ok(self.details(access_key)?.status)
    }

    pub fn details(&self, access_key: &str) -> ApiResult<UserInfo> {
        let remote: Option<RemoteUserInfo> = self
            .transport
            .call_json(Method::Get, "user-info", &[("accessKey", access_key)], b"")
            .map_err(|err| err.or_entity(EntityKind::User, access_key))?;
        let remote = remote.ok_or_else(|| {
            Error::new(ErrorKind::NotFound)
                .with_message("user was not found")
                .with_entity(EntityKind::User, access_key)
                .with_host(self.host())
        })?;
        Ok(UserInfo {
            access_key: access_key.to_string(),
            status: remote.status,
            policy: remote.policy_name.filter(|policy| !policy.is_empty()),
            member_of: remote.member_of.unwrap_or_default(),
        })
    }

    pub fn list(&self) -> ApiResult<BTreeMap<String, UserStatus>> {
        let users: Option<BTreeMap<String, RemoteUserInfo>> =
            self.transport
                .call_json(Method::Get, "list-users", &[], b"")?;
        Ok(users
            .unwrap_or_default()
            .into_iter()
            .map(|(access_key, info)| (access_key, info.status))
            .collect())
    }

    pub fn remove(&self, access_key: &str) -> ApiResult<()> {
        self.transport
            .call(Method::Delete, "remove-user", &[("accessKey", access_key)], b"")
            .map_err(|err| err.or_entity(EntityKind::User, access_key))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::{RemoteUserInfo, UserStatus};
    use std::collections::BTreeMap;

    #[test]
    fn status_round_trips_through_strings() {
        assert_eq!("enabled".parse::<UserStatus>(), Ok(UserStatus::Enabled));
        assert_eq!(UserStatus::Disabled.to_string(), "disabled");
        assert!("paused".parse::<UserStatus>().is_err());
    }

    #[test]
    fn list_payload_decodes_service_shape() {
        let body = r#"{
            "alice": {"status": "enabled", "policyName": "readwrite"},
            "bob": {"status": "disabled", "memberOf": ["g1"]}
        }"#;
        let users: BTreeMap<String, RemoteUserInfo> = serde_json::from_str(body).expect("json");
        assert_eq!(users["alice"].status, UserStatus::Enabled);
        assert_eq!(users["alice"].policy_name.as_deref(), Some("readwrite"));
        assert_eq!(users["bob"].status, UserStatus::Disabled);
        assert_eq!(users["bob"].member_of.as_deref(), Some(&["g1".to_string()][..]));
    }
}
