pub mod memory;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::errors::ClientError;
use crate::resources::{Datastore, Disk, ManagedRef};

pub use memory::{ClientCall, InMemoryClient};

/// Handle for a long-running hypervisor operation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Task(String);

impl Task {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn id(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DiskType {
    Preallocated,
}

impl DiskType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DiskType::Preallocated => "preallocated",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum AdapterType {
    LsiLogic,
}

impl AdapterType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AdapterType::LsiLogic => "lsiLogic",
        }
    }
}

/// File-backed virtual disk specification sent with a create request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiskSpec {
    pub disk_type: DiskType,
    pub capacity_kb: u64,
    pub adapter_type: AdapterType,
}

impl DiskSpec {
    /// Preallocated, lsiLogic-attached disk of `size_mb` megabytes. Persistent
    /// disks are always created this way. `None` if the size does not fit in
    /// kilobytes.
    pub fn persistent(size_mb: u64) -> Option<Self> {
        Some(Self {
            disk_type: DiskType::Preallocated,
            capacity_kb: size_mb.checked_mul(1024)?,
            adapter_type: AdapterType::LsiLogic,
        })
    }

    pub fn size_mb(&self) -> u64 {
        self.capacity_kb / 1024
    }
}

/// Operations the disk provider needs from the hypervisor.
///
/// Every error returned here reaches the caller of the disk provider
/// unchanged; retry policy belongs to the implementation or the caller.
#[async_trait]
pub trait VirtualizationClient: Send + Sync {
    /// Queues creation of a virtual disk at `path`.
    async fn create_virtual_disk(
        &self,
        path: &str,
        datacenter: &ManagedRef,
        spec: &DiskSpec,
    ) -> Result<Task, ClientError>;

    /// Resolves once `task` has completed or failed.
    async fn wait_for_task(&self, task: &Task) -> Result<(), ClientError>;

    /// Looks for `<base_path>/<cid>.vmdk` on `datastore`.
    async fn find_disk(
        &self,
        cid: &str,
        datastore: &Datastore,
        base_path: &str,
    ) -> Result<Option<Disk>, ClientError>;

    /// Moves a disk file, waiting for the underlying task.
    async fn move_disk(
        &self,
        src_datacenter: &str,
        src_path: &str,
        dst_datacenter: &str,
        dst_path: &str,
    ) -> Result<(), ClientError>;

    /// Creates a datastore folder. Creating one that exists is not an error.
    async fn create_datastore_folder(
        &self,
        folder_path: &str,
        datacenter: &ManagedRef,
    ) -> Result<(), ClientError>;
}
