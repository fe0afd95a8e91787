// Core modules implementing errors, request signing, and the host registry.
pub mod error;
pub mod registry;
pub mod sign;
