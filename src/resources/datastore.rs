use serde::{Deserialize, Serialize};
use std::fmt;

pub const BYTES_IN_MB: u64 = 1024 * 1024;

/// Opaque handle the virtualization client uses to address an inventory object.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ManagedRef(String);

impl ManagedRef {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ManagedRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Capacity snapshot of a datastore as observed when the inventory was read.
/// Free space may have moved on by the time a disk is physically placed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Datastore {
    pub name: String,
    pub reference: ManagedRef,
    pub free_space_mb: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub capacity_mb: Option<u64>,
}

impl Datastore {
    pub fn new(name: impl Into<String>, reference: ManagedRef, free_space_mb: u64) -> Self {
        Self {
            name: name.into(),
            reference,
            free_space_mb,
            capacity_mb: None,
        }
    }

    pub fn with_capacity(mut self, capacity_mb: u64) -> Self {
        self.capacity_mb = Some(capacity_mb);
        self
    }

    /// Builds a datastore from the byte figures of a hypervisor summary.
    pub fn from_summary(
        name: impl Into<String>,
        reference: ManagedRef,
        capacity_bytes: u64,
        free_bytes: u64,
    ) -> Self {
        Self::new(name, reference, free_bytes / BYTES_IN_MB)
            .with_capacity(capacity_bytes / BYTES_IN_MB)
    }

    /// Free space left once `headroom_mb` is reserved, or `None` when the
    /// datastore is already inside its headroom.
    pub fn surplus_mb(&self, headroom_mb: u64) -> Option<u64> {
        self.free_space_mb.checked_sub(headroom_mb)
    }

    pub fn used_space_mb(&self) -> Option<u64> {
        self.capacity_mb
            .map(|capacity| capacity.saturating_sub(self.free_space_mb))
    }
}

impl fmt::Display for Datastore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<Datastore: {} / {}>", self.reference, self.name)
    }
}
