use std::fmt;
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

use crate::client::{DiskSpec, VirtualizationClient};
use crate::errors::{DiskError, DiskResult};
use crate::resources::{disk_path, parent_folder, Cluster, Datacenter, Datastore, Disk};

type UuidSource = Arc<dyn Fn() -> String + Send + Sync>;

/// Creates, finds and migrates persistent disks.
///
/// The datacenter decides where a disk goes; the virtualization client does
/// the physical work. Each call runs its remote steps one after another and
/// waits on every hypervisor task before moving on. Capacity is not reserved
/// between picking a datastore and placing the disk, so concurrent callers
/// can overcommit a datastore; the client then reports a retryable capacity
/// failure.
#[derive(Clone)]
pub struct DiskProvider {
    datacenter: Arc<Datacenter>,
    disk_path: String,
    client: Arc<dyn VirtualizationClient>,
    uuid_source: UuidSource,
}

impl DiskProvider {
    pub fn new(
        datacenter: Arc<Datacenter>,
        disk_path: impl Into<String>,
        client: Arc<dyn VirtualizationClient>,
    ) -> Self {
        Self {
            datacenter,
            disk_path: disk_path.into(),
            client,
            uuid_source: Arc::new(|| Uuid::new_v4().to_string()),
        }
    }

    /// Replaces the generator for the unique part of new disk cids.
    pub fn with_uuid_source(mut self, source: impl Fn() -> String + Send + Sync + 'static) -> Self {
        self.uuid_source = Arc::new(source);
        self
    }

    pub fn datacenter(&self) -> &Datacenter {
        &self.datacenter
    }

    pub fn disk_path(&self) -> &str {
        &self.disk_path
    }

    pub async fn create(&self, size_mb: u64) -> DiskResult<Disk> {
        let spec = match DiskSpec::persistent(size_mb) {
            Some(spec) if size_mb > 0 => spec,
            _ => return Err(DiskError::InvalidDiskSize { size_mb }),
        };

        let datastore = self.find_datastore(size_mb)?;
        let cid = format!("disk-{}", (self.uuid_source)());
        debug!(
            cid = %cid,
            datastore = %datastore.name,
            size_mb,
            "Creating disk '{}' in datastore '{}'",
            cid,
            datastore.name
        );

        let path = self.path(&datastore, &cid);
        self.create_parent_folder(&path).await?;

        let task = self
            .client
            .create_virtual_disk(&path, self.datacenter.reference(), &spec)
            .await?;
        self.client.wait_for_task(&task).await?;

        Ok(Disk::new(cid, size_mb, datastore, path))
    }

    /// Searches every persistent datastore, in the datacenter's name order,
    /// and returns the first match.
    pub async fn find(&self, cid: &str) -> DiskResult<Disk> {
        for datastore in self.datacenter.persistent_datastores().values() {
            if let Some(disk) = self.client.find_disk(cid, datastore, &self.disk_path).await? {
                return Ok(disk);
            }
        }

        Err(DiskError::DiskNotFound { cid: cid.to_string() })
    }

    /// Makes sure the disk `cid` sits on one of `accessible_datastores`,
    /// moving it inside `cluster` if it does not. A disk already in place is
    /// returned as found and nothing is moved.
    pub async fn find_and_move<A: AsRef<str>>(
        &self,
        cid: &str,
        cluster: &Cluster,
        datacenter_name: &str,
        accessible_datastores: &[A],
    ) -> DiskResult<Disk> {
        let disk = self.find(cid).await?;
        if is_accessible(accessible_datastores, &disk.datastore.name) {
            return Ok(disk);
        }

        let destination = self
            .datacenter
            .pick_persistent_datastore_in_cluster(cluster, disk.size_in_mb)
            .ok_or_else(|| DiskError::NoClusterDiskSpace {
                cluster: cluster.name().to_string(),
                requested_mb: disk.size_in_mb,
            })?;

        if !is_accessible(accessible_datastores, &destination.name) {
            return Err(DiskError::AccessibilityViolation {
                datastore: destination.name,
                cluster: cluster.name().to_string(),
            });
        }

        let destination_path = self.path(&destination, cid);
        info!(cid, cluster = cluster.name(), "Moving {} to {}", disk.path, destination_path);
        self.create_parent_folder(&destination_path).await?;
        self.client
            .move_disk(datacenter_name, &disk.path, datacenter_name, &destination_path)
            .await?;
        info!(cid, datastore = %destination.name, "Moved disk successfully");

        Ok(Disk::new(cid, disk.size_in_mb, destination, destination_path))
    }

    fn path(&self, datastore: &Datastore, cid: &str) -> String {
        disk_path(&datastore.name, &self.disk_path, cid)
    }

    fn find_datastore(&self, size_mb: u64) -> DiskResult<Datastore> {
        self.datacenter
            .pick_persistent_datastore(size_mb)
            .ok_or(DiskError::NoDiskSpace { requested_mb: size_mb })
    }

    async fn create_parent_folder(&self, path: &str) -> DiskResult<()> {
        self.client
            .create_datastore_folder(parent_folder(path), self.datacenter.reference())
            .await?;
        Ok(())
    }
}

fn is_accessible<A: AsRef<str>>(accessible_datastores: &[A], name: &str) -> bool {
    accessible_datastores.iter().any(|candidate| candidate.as_ref() == name)
}

impl fmt::Debug for DiskProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DiskProvider")
            .field("datacenter", &self.datacenter.name())
            .field("disk_path", &self.disk_path)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::{ClientCall, InMemoryClient};
    use crate::errors::ErrorKind;
    use crate::placement::{CapacitySelector, DISK_HEADROOM_MB};
    use crate::resources::ManagedRef;

    fn datastore(name: &str, free_space_mb: u64) -> Datastore {
        Datastore::new(name, ManagedRef::new(format!("{}-ref", name)), free_space_mb)
    }

    fn provider(datastores: Vec<Datastore>) -> (DiskProvider, Arc<InMemoryClient>) {
        let client = Arc::new(InMemoryClient::with_datastores(&datastores));
        let datacenter = Datacenter::new(
            "fake-datacenter-name",
            ManagedRef::new("datacenter-1"),
            "fake-disk-path",
            CapacitySelector::new(DISK_HEADROOM_MB),
        )
        .with_cluster(Cluster::new("fake-cluster-name", "fake-datacenter-name", datastores));
        let provider = DiskProvider::new(Arc::new(datacenter), "fake-disk-path", client.clone())
            .with_uuid_source(|| "cid".to_string());
        (provider, client)
    }

    #[tokio::test]
    async fn test_create_builds_path_and_spec() {
        let (provider, client) =
            provider(vec![datastore("fake-datastore-name", DISK_HEADROOM_MB + 100)]);

        let disk = provider.create(24).await.unwrap();
        assert_eq!(disk.cid, "disk-cid");
        assert_eq!(disk.size_in_mb, 24);
        assert_eq!(disk.datastore.name, "fake-datastore-name");
        assert_eq!(disk.path, "[fake-datastore-name] fake-disk-path/disk-cid.vmdk");

        let journal = client.journal().await;
        assert_eq!(
            journal[0],
            ClientCall::CreateDatastoreFolder {
                folder_path: "[fake-datastore-name] fake-disk-path".into(),
                datacenter: ManagedRef::new("datacenter-1"),
            }
        );
        match &journal[1] {
            ClientCall::CreateVirtualDisk { path, datacenter, spec } => {
                assert_eq!(path, "[fake-datastore-name] fake-disk-path/disk-cid.vmdk");
                assert_eq!(datacenter.as_str(), "datacenter-1");
                assert_eq!(Some(*spec), DiskSpec::persistent(24));
            }
            other => panic!("unexpected call {:?}", other),
        }
        assert!(matches!(journal[2], ClientCall::WaitForTask { .. }));
    }

    #[tokio::test]
    async fn test_create_rejects_zero_size() {
        let (provider, client) = provider(vec![datastore("ds", DISK_HEADROOM_MB + 100)]);
        let err = provider.create(0).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);
        assert!(client.journal().await.is_empty());
    }

    #[tokio::test]
    async fn test_create_rejects_size_beyond_kilobyte_range() {
        let (provider, client) = provider(vec![datastore("huge", u64::MAX)]);
        let size_mb = (1 << 54) + 1;

        let err = provider.create(size_mb).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);
        assert!(!err.is_retryable());
        assert!(matches!(err, DiskError::InvalidDiskSize { size_mb: s } if s == size_mb));
        assert!(client.journal().await.is_empty());
    }

    #[tokio::test]
    async fn test_create_without_space() {
        let (provider, client) = provider(vec![datastore("ds", DISK_HEADROOM_MB + 10)]);
        let err = provider.create(24).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NoDiskSpace);
        assert!(err.is_retryable());
        assert_eq!(err.to_string(), "Not enough persistent space 24");
        assert!(client.journal().await.is_empty());
    }

    #[tokio::test]
    async fn test_find_is_repeatable() {
        let (provider, _client) = provider(vec![datastore("ds", DISK_HEADROOM_MB + 100)]);
        let created = provider.create(10).await.unwrap();

        let first = provider.find(&created.cid).await.unwrap();
        let second = provider.find(&created.cid).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(first.path, created.path);
    }
}
