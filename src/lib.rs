//! Purpose: Typed admin client for object-storage hosts, shared by the `objadm` CLI and tests.
//! Exports: `api` (admin clients, registry, errors), `core`, `config_paths`.
//! Role: Library backing the binary; `api` is the supported surface.
//! Invariants: No background work; every call completes or fails before returning.
//! Invariants: Core modules prefer explicit inputs/outputs over hidden state.
pub mod api;
pub mod config_paths;
pub mod core;
