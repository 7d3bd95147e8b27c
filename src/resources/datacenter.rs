use std::collections::btree_map::Entry;
use std::collections::BTreeMap;
use std::fmt;

use super::cluster::Cluster;
use super::datastore::{Datastore, ManagedRef};
use crate::placement::CapacitySelector;

/// A datacenter: its clusters, the base path disks are stored under, and
/// the selector used to place them.
#[derive(Debug, Clone)]
pub struct Datacenter {
    name: String,
    reference: ManagedRef,
    disk_path: String,
    clusters: BTreeMap<String, Cluster>,
    selector: CapacitySelector,
}

impl Datacenter {
    pub fn new(
        name: impl Into<String>,
        reference: ManagedRef,
        disk_path: impl Into<String>,
        selector: CapacitySelector,
    ) -> Self {
        Self {
            name: name.into(),
            reference,
            disk_path: disk_path.into(),
            clusters: BTreeMap::new(),
            selector,
        }
    }

    pub fn with_cluster(mut self, cluster: Cluster) -> Self {
        self.add_cluster(cluster);
        self
    }

    /// Registers `cluster`, returning the one it replaced, if any.
    pub fn add_cluster(&mut self, cluster: Cluster) -> Option<Cluster> {
        match self.clusters.entry(cluster.name().to_string()) {
            Entry::Occupied(mut slot) => Some(slot.insert(cluster)),
            Entry::Vacant(slot) => {
                slot.insert(cluster);
                None
            }
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn reference(&self) -> &ManagedRef {
        &self.reference
    }

    pub fn disk_path(&self) -> &str {
        &self.disk_path
    }

    pub fn selector(&self) -> &CapacitySelector {
        &self.selector
    }

    pub fn clusters(&self) -> &BTreeMap<String, Cluster> {
        &self.clusters
    }

    pub fn cluster(&self, name: &str) -> Option<&Cluster> {
        self.clusters.get(name)
    }

    /// Union of every cluster's persistent datastores, keyed by name and
    /// iterated in name order.
    ///
    /// A datastore shared between clusters appears once. If clusters report
    /// different snapshots for it, the cluster visited last (in cluster-name
    /// order) wins.
    pub fn persistent_datastores(&self) -> BTreeMap<String, Datastore> {
        let mut datastores = BTreeMap::new();
        for cluster in self.clusters.values() {
            for (name, datastore) in cluster.persistent_datastores() {
                datastores.insert(name.clone(), datastore.clone());
            }
        }
        datastores
    }

    pub fn pick_persistent_datastore(&self, size_mb: u64) -> Option<Datastore> {
        let datastores = self.persistent_datastores();
        self.selector.pick(datastores.values(), size_mb).cloned()
    }

    /// Picks only among `cluster`'s own datastores, keeping the result within
    /// that cluster's reach.
    pub fn pick_persistent_datastore_in_cluster(
        &self,
        cluster: &Cluster,
        size_mb: u64,
    ) -> Option<Datastore> {
        self.selector
            .pick(cluster.persistent_datastores().values(), size_mb)
            .cloned()
    }
}

impl fmt::Display for Datacenter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<Datacenter: {} / {}>", self.reference, self.name)
    }
}
