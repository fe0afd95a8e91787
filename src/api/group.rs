//! Purpose: Manage groups and group membership on one storage host.
//! Exports: `GroupClient`, `GroupStatus`, `GroupInfo`.
//! Role: Typed wrapper over the group admin operations.
//! Invariants: Members are added deduplicated in first-seen order.
//! Invariants: Removing named members is idempotent; removing the group itself requires it to be empty.
//! Invariants: `list` never yields null; an empty service reply is an empty Vec.
#![allow(clippy::result_large_err)]

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::transport::{ApiResult, Method, Transport, code_entity};
use crate::core::error::{EntityKind, Error, ErrorKind};

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GroupStatus {
    Enabled,
    Disabled,
}

impl GroupStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            GroupStatus::Enabled => "enabled",
            GroupStatus::Disabled => "disabled",
        }
    }
}

impl fmt::Display for GroupStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for GroupStatus {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "enabled" => Ok(GroupStatus::Enabled),
            "disabled" => Ok(GroupStatus::Disabled),
            other => Err(format!("unknown group status '{other}'")),
        }
    }
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct GroupInfo {
    pub name: String,
    pub members: Vec<String>,
    pub status: GroupStatus,
    pub policy: Option<String>,
}

// Some service builds report a command-level `status` next to `groupStatus`.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RemoteGroupDesc {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    group_status: Option<GroupStatus>,
    #[serde(default)]
    members: Option<Vec<String>>,
    #[serde(default)]
    policy: Option<String>,
}

impl RemoteGroupDesc {
    fn resolved_status(&self) -> Option<GroupStatus> {
        self.group_status
            .or_else(|| self.status.as_deref().and_then(|status| status.parse().ok()))
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct UpdateGroupMembersRequest<'a> {
    group: &'a str,
    members: &'a [String],
    is_remove: bool,
}

#[derive(Clone, Debug)]
pub struct GroupClient {
    transport: Transport,
}

impl GroupClient {
    pub fn new(transport: Transport) -> Self {
        Self { transport }
    }

    pub fn host(&self) -> &str {
        self.transport.host()
    }

    /// Creates `group` if needed and adds the given members; every member must be an existing user.
    pub fn add<S: AsRef<str>>(&self, group: &str, member: &str, more_members: &[S]) -> ApiResult<()> {
        let members = dedup_members(
            std::iter::once(member).chain(more_members.iter().map(AsRef::as_ref)),
        );
        self.update_members(group, &members, false)
    }

    pub fn enable(&self, group: &str) -> ApiResult<()> {
        self.set_status(group, GroupStatus::Enabled)
    }

    pub fn disable(&self, group: &str) -> ApiResult<()> {
        self.set_status(group, GroupStatus::Disabled)
    }

    pub fn set_status(&self, group: &str, status: GroupStatus) -> ApiResult<()> {
        self.transport
            .call(
                Method::Put,
                "set-group-status",
                &[("group", group), ("status", status.as_str())],
                b"",
            )
            .map_err(|err| err.or_entity(EntityKind::Group, group))?;
        Ok(())
    }

    pub fn info(&self, group: &str) -> ApiResult<GroupInfo> {
        let remote: Option<RemoteGroupDesc> = self
            .transport
            .call_json(Method::Get, "group", &[("group", group)], b"")
            .map_err(|err| err.or_entity(EntityKind::Group, group))?;
        let not_found = || {
            Error::new(ErrorKind::NotFound)
                .with_message("group was not found")
                .with_entity(EntityKind::Group, group)
                .with_host(self.host())
        };
        let remote = remote.ok_or_else(not_found)?;
        let status = remote.resolved_status().ok_or_else(|| {
            Error::new(ErrorKind::Transport)
                .with_message("group info is missing its status")
                .with_entity(EntityKind::Group, group)
                .with_host(self.host())
        })?;
        Ok(GroupInfo {
            name: remote.name.unwrap_or_else(|| group.to_string()),
            members: remote.members.unwrap_or_default(),
            status,
            policy: remote.policy.filter(|policy| !policy.is_empty()),
        })
    }

    pub fn list(&self) -> ApiResult<Vec<String>> {
        let groups: Option<Vec<String>> = self.transport.call_json(Method::Get, "groups", &[], b"")?;
        Ok(groups.unwrap_or_default())
    }

    /// Removes the named members, or deletes the (empty) group when `members` is empty.
    pub fn remove<S: AsRef<str>>(&self, group: &str, members: &[S]) -> ApiResult<()> {
        let members = dedup_members(members.iter().map(AsRef::as_ref));
        self.update_members(group, &members, true)
    }

    /// Deletes an empty group; same as `remove` with no members.
    pub fn delete(&self, group: &str) -> ApiResult<()> {
        self.update_members(group, &[], true)
    }

    fn update_members(&self, group: &str, members: &[String], is_remove: bool) -> ApiResult<()> {
        let body = self.transport.encode(&UpdateGroupMembersRequest {
            group,
            members,
            is_remove,
        })?;
        self.transport
            .call(Method::Put, "update-group-members", &[], &body)
            .map_err(|err| scope_member_error(err, group, members))?;
        Ok(())
    }
}

fn dedup_members<'a>(members: impl IntoIterator<Item = &'a str>) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for member in members {
        if !out.iter().any(|seen| seen == member) {
            out.push(member.to_string());
        }
    }
    out
}

fn scope_member_error(err: Error, group: &str, members: &[String]) -> Error {
    match err.code().and_then(code_entity) {
        Some(EntityKind::User) => err.or_entity(EntityKind::User, members.join(",")),
        _ => err.or_entity(EntityKind::Group, group),
    }
}
