//! In-memory hypervisor used by the CLI simulator and by tests.
//!
//! It keeps its own free-space ledger per datastore, so it can refuse a
//! create or move the selector thought would fit.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::{debug, info};

use super::{DiskSpec, Task, VirtualizationClient};
use crate::errors::ClientError;
use crate::resources::disk::split_datastore_path;
use crate::resources::{disk_path, parent_folder, Datastore, Disk, ManagedRef};

/// One remote call as observed by the in-memory client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientCall {
    CreateVirtualDisk {
        path: String,
        datacenter: ManagedRef,
        spec: DiskSpec,
    },
    WaitForTask {
        task: Task,
    },
    FindDisk {
        cid: String,
        datastore: String,
        base_path: String,
    },
    MoveDisk {
        src_datacenter: String,
        src_path: String,
        dst_datacenter: String,
        dst_path: String,
    },
    CreateDatastoreFolder {
        folder_path: String,
        datacenter: ManagedRef,
    },
}

#[derive(Debug, Clone)]
struct StoredDisk {
    cid: String,
    size_in_mb: u64,
}

#[derive(Debug, Clone)]
struct PendingCreate {
    path: String,
    spec: DiskSpec,
}

#[derive(Debug, Default)]
struct State {
    free_space_mb: HashMap<String, u64>,
    folders: BTreeSet<String>,
    disks: BTreeMap<String, StoredDisk>,
    pending: HashMap<Task, PendingCreate>,
    journal: Vec<ClientCall>,
    next_task: u64,
}

impl State {
    /// Takes `size_mb` out of the ledger for `datastore`. Datastores the
    /// client was never told about are not accounted.
    fn reserve(&mut self, datastore: &str, size_mb: u64) -> Result<(), ClientError> {
        if let Some(free) = self.free_space_mb.get_mut(datastore) {
            if *free < size_mb {
                return Err(ClientError::InsufficientSpace {
                    datastore: datastore.to_string(),
                    requested_mb: size_mb,
                });
            }
            *free -= size_mb;
        }
        Ok(())
    }

    fn release(&mut self, datastore: &str, size_mb: u64) {
        if let Some(free) = self.free_space_mb.get_mut(datastore) {
            *free += size_mb;
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct InMemoryClient {
    state: Arc<RwLock<State>>,
}

impl InMemoryClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds the free-space ledger from a capacity snapshot.
    pub fn with_datastores<'a>(datastores: impl IntoIterator<Item = &'a Datastore>) -> Self {
        let state = State {
            free_space_mb: datastores
                .into_iter()
                .map(|ds| (ds.name.clone(), ds.free_space_mb))
                .collect(),
            ..State::default()
        };
        Self {
            state: Arc::new(RwLock::new(state)),
        }
    }

    /// Places an existing disk without going through the journal or the
    /// ledger.
    pub async fn seed_disk(&self, disk: &Disk) {
        let mut state = self.state.write().await;
        state.folders.insert(parent_folder(&disk.path).to_string());
        state.disks.insert(
            disk.path.clone(),
            StoredDisk {
                cid: disk.cid.clone(),
                size_in_mb: disk.size_in_mb,
            },
        );
    }

    pub async fn journal(&self) -> Vec<ClientCall> {
        self.state.read().await.journal.clone()
    }

    pub async fn moves(&self) -> Vec<ClientCall> {
        self.state
            .read()
            .await
            .journal
            .iter()
            .filter(|call| matches!(call, ClientCall::MoveDisk { .. }))
            .cloned()
            .collect()
    }

    pub async fn disk_paths(&self) -> Vec<String> {
        self.state.read().await.disks.keys().cloned().collect()
    }

    pub async fn has_folder(&self, folder_path: &str) -> bool {
        self.state.read().await.folders.contains(folder_path)
    }

    pub async fn free_space_mb(&self, datastore: &str) -> Option<u64> {
        self.state.read().await.free_space_mb.get(datastore).copied()
    }

    pub async fn pending_tasks(&self) -> usize {
        self.state.read().await.pending.len()
    }
}

fn datastore_of(path: &str) -> Result<&str, ClientError> {
    split_datastore_path(path)
        .map(|(datastore, _)| datastore)
        .ok_or_else(|| ClientError::Transport(format!("Malformed datastore path: {}", path)))
}

fn cid_of(path: &str) -> &str {
    let file = path.rsplit('/').next().unwrap_or(path);
    file.strip_suffix(".vmdk").unwrap_or(file)
}

#[async_trait]
impl VirtualizationClient for InMemoryClient {
    async fn create_virtual_disk(
        &self,
        path: &str,
        datacenter: &ManagedRef,
        spec: &DiskSpec,
    ) -> Result<Task, ClientError> {
        let mut state = self.state.write().await;
        state.journal.push(ClientCall::CreateVirtualDisk {
            path: path.to_string(),
            datacenter: datacenter.clone(),
            spec: *spec,
        });

        datastore_of(path)?;
        let folder = parent_folder(path);
        if !state.folders.contains(folder) {
            return Err(ClientError::FolderMissing {
                path: folder.to_string(),
            });
        }
        let already_queued = state.pending.values().any(|pending| pending.path == path);
        if state.disks.contains_key(path) || already_queued {
            return Err(ClientError::AlreadyExists {
                path: path.to_string(),
            });
        }

        state.next_task += 1;
        let task = Task::new(format!("task-{}", state.next_task));
        state.pending.insert(
            task.clone(),
            PendingCreate {
                path: path.to_string(),
                spec: *spec,
            },
        );
        debug!(task = %task, path, "Queued virtual disk creation");
        Ok(task)
    }

    async fn wait_for_task(&self, task: &Task) -> Result<(), ClientError> {
        let mut state = self.state.write().await;
        state.journal.push(ClientCall::WaitForTask { task: task.clone() });

        let pending = state
            .pending
            .remove(task)
            .ok_or_else(|| ClientError::UnknownTask {
                task: task.to_string(),
            })?;

        let datastore = datastore_of(&pending.path)?;
        let size_mb = pending.spec.size_mb();
        state.reserve(datastore, size_mb)?;

        let cid = cid_of(&pending.path).to_string();
        state.disks.insert(
            pending.path.clone(),
            StoredDisk {
                cid,
                size_in_mb: size_mb,
            },
        );
        debug!(task = %task, path = %pending.path, "Task completed");
        Ok(())
    }

    async fn find_disk(
        &self,
        cid: &str,
        datastore: &Datastore,
        base_path: &str,
    ) -> Result<Option<Disk>, ClientError> {
        let mut state = self.state.write().await;
        state.journal.push(ClientCall::FindDisk {
            cid: cid.to_string(),
            datastore: datastore.name.clone(),
            base_path: base_path.to_string(),
        });

        let path = disk_path(&datastore.name, base_path, cid);
        Ok(state.disks.get(&path).map(|stored| {
            Disk::new(stored.cid.clone(), stored.size_in_mb, datastore.clone(), path.clone())
        }))
    }

    async fn move_disk(
        &self,
        src_datacenter: &str,
        src_path: &str,
        dst_datacenter: &str,
        dst_path: &str,
    ) -> Result<(), ClientError> {
        let mut state = self.state.write().await;
        state.journal.push(ClientCall::MoveDisk {
            src_datacenter: src_datacenter.to_string(),
            src_path: src_path.to_string(),
            dst_datacenter: dst_datacenter.to_string(),
            dst_path: dst_path.to_string(),
        });

        let src_datastore = datastore_of(src_path)?.to_string();
        let dst_datastore = datastore_of(dst_path)?.to_string();
        let size_in_mb = match state.disks.get(src_path) {
            Some(stored) => stored.size_in_mb,
            None => {
                return Err(ClientError::DiskNotFound {
                    path: src_path.to_string(),
                })
            }
        };
        if state.disks.contains_key(dst_path) {
            return Err(ClientError::AlreadyExists {
                path: dst_path.to_string(),
            });
        }
        let folder = parent_folder(dst_path);
        if !state.folders.contains(folder) {
            return Err(ClientError::FolderMissing {
                path: folder.to_string(),
            });
        }

        state.reserve(&dst_datastore, size_in_mb)?;
        state.release(&src_datastore, size_in_mb);
        if let Some(stored) = state.disks.remove(src_path) {
            state.disks.insert(dst_path.to_string(), stored);
        }
        info!(src_path, dst_path, "Relocated disk file");
        Ok(())
    }

    async fn create_datastore_folder(
        &self,
        folder_path: &str,
        datacenter: &ManagedRef,
    ) -> Result<(), ClientError> {
        let mut state = self.state.write().await;
        state.journal.push(ClientCall::CreateDatastoreFolder {
            folder_path: folder_path.to_string(),
            datacenter: datacenter.clone(),
        });
        state.folders.insert(folder_path.to_string());
        Ok(())
    }
}
