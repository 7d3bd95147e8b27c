use regex::Regex;
use std::collections::BTreeMap;

use super::datastore::Datastore;

/// A compute cluster and the datastores its hosts can place persistent
/// disks on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cluster {
    name: String,
    datacenter_name: String,
    persistent_datastores: BTreeMap<String, Datastore>,
}

impl Cluster {
    /// Every datastore given is treated as persistent-eligible.
    pub fn new(
        name: impl Into<String>,
        datacenter_name: impl Into<String>,
        datastores: impl IntoIterator<Item = Datastore>,
    ) -> Self {
        Self {
            name: name.into(),
            datacenter_name: datacenter_name.into(),
            persistent_datastores: datastores
                .into_iter()
                .map(|ds| (ds.name.clone(), ds))
                .collect(),
        }
    }

    /// Keeps only the datastores whose names match `persistent_pattern`.
    pub fn with_persistent_pattern(
        name: impl Into<String>,
        datacenter_name: impl Into<String>,
        datastores: impl IntoIterator<Item = Datastore>,
        persistent_pattern: &Regex,
    ) -> Self {
        Self::new(
            name,
            datacenter_name,
            datastores
                .into_iter()
                .filter(|ds| persistent_pattern.is_match(&ds.name)),
        )
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn datacenter_name(&self) -> &str {
        &self.datacenter_name
    }

    /// Persistent datastores keyed by name, iterated in name order.
    pub fn persistent_datastores(&self) -> &BTreeMap<String, Datastore> {
        &self.persistent_datastores
    }

    pub fn persistent_datastore(&self, name: &str) -> Option<&Datastore> {
        self.persistent_datastores.get(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resources::ManagedRef;

    fn datastore(name: &str) -> Datastore {
        Datastore::new(name, ManagedRef::new(name), 4096)
    }

    #[test]
    fn test_persistent_pattern_filters_datastores() {
        let pattern = Regex::new("^persistent-").unwrap();
        let cluster = Cluster::with_persistent_pattern(
            "cluster1",
            "dc",
            vec![datastore("persistent-a"), datastore("ephemeral-a"), datastore("persistent-b")],
            &pattern,
        );

        let names: Vec<&str> = cluster.persistent_datastores().keys().map(String::as_str).collect();
        assert_eq!(names, vec!["persistent-a", "persistent-b"]);
        assert!(cluster.persistent_datastore("ephemeral-a").is_none());
        assert_eq!(cluster.name(), "cluster1");
        assert_eq!(cluster.datacenter_name(), "dc");
    }
}
