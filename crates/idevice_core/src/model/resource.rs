//! Package resource handles.
//!
//! # Responsibility
//! - Identify binary assets (images, attachments) embedded in a package.
//!
//! # Invariants
//! - Equality is identity equality: two handles are equal only when they
//!   name the same package resource, regardless of asset content.
//! - Holding a `ResourceRef` never implies ownership of the asset.

use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};
use uuid::Uuid;

/// Weak, comparable handle to a package-embedded binary asset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResourceRef(Uuid);

impl ResourceRef {
    /// Creates a handle for a newly registered package resource.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Rebuilds a handle from an identity recorded by the package store.
    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for ResourceRef {
    fn default() -> Self {
        Self::new()
    }
}

impl Display for ResourceRef {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
