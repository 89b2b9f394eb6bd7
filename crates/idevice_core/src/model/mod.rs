//! Domain model for generic iDevices.
//!
//! # Responsibility
//! - Define the versioned node, its fields, field identities and resource
//!   handles.
//!
//! # Invariants
//! - A node exclusively owns its fields; fields refer back by node id only.
//! - Resource handles are weak: resolving them never transfers ownership.

pub mod field;
pub mod field_id;
pub mod idevice;
pub mod resource;
