//! Purpose: Resolve a host alias into typed admin clients sharing one transport.
//! Exports: `AdminClient`.
//! Role: Entry point for library callers; the CLI builds every admin command on it.
//! Invariants: One `Transport` per handle; user/group/policy clients share it.
//! Invariants: Unknown aliases fail with `NotFound` (entity: host) before any request.
#![allow(clippy::result_large_err)]

use std::time::Duration;

use super::group::GroupClient;
use super::policy::PolicyClient;
use super::transport::{ApiResult, Transport};
use super::user::UserClient;
use crate::core::registry::HostRegistry;

#[derive(Clone, Debug)]
pub struct AdminClient {
    transport: Transport,
}

impl AdminClient {
    pub fn new(transport: Transport) -> Self {
        Self { transport }
    }

    /// Looks `alias` up in `registry` and connects to its endpoint.
    pub fn connect(registry: &HostRegistry, alias: &str) -> ApiResult<Self> {
        let entry = registry.get(alias)?;
        tracing::debug!(alias, url = %entry.url, "connecting admin client");
        Ok(Self::new(Transport::from_entry(&entry)?))
    }

    pub fn with_timeout(self, timeout: Duration) -> Self {
        Self {
            transport: self.transport.with_timeout(timeout),
        }
    }

    pub fn host(&self) -> &str {
        self.transport.host()
    }

    pub fn transport(&self) -> &Transport {
        &self.transport
    }

    pub fn user(&self) -> UserClient {
        UserClient::new(self.transport.clone())
    }

    pub fn group(&self) -> GroupClient {
        GroupClient::new(self.transport.clone())
    }

    pub fn policy(&self) -> PolicyClient {
        PolicyClient::new(self.transport.clone())
    }
}
