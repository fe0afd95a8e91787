//! Purpose: Define the public Rust API for administering object-storage hosts.
//! Exports: Registry, transport, typed admin clients, and the error taxonomy.
//! Role: The only public path into the crate; the CLI consumes it like any caller.
//! Invariants: Every operation is one blocking round trip returning `ApiResult`.
//! Invariants: Internal helpers (signing internals, wire structs) stay private.

mod client;
mod group;
mod policy;
mod transport;
mod user;

#[doc(hidden)]
pub use crate::core::error::to_exit_code;
pub use crate::core::error::{EntityKind, Error, ErrorKind};
pub use crate::core::registry::{HostEntry, HostRegistry};
pub use crate::core::sign::Credentials;
pub use client::AdminClient;
pub use group::{GroupClient, GroupInfo, GroupStatus};
pub use policy::{CANNED_POLICIES, PolicyClient, PolicyInfo, Principal, is_canned};
pub use transport::{ADMIN_PREFIX, ApiResult, Transport};
pub use user::{UserClient, UserInfo, UserStatus};
