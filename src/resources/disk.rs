use serde::{Deserialize, Serialize};

use super::datastore::Datastore;

/// A persistent disk and where it currently lives.
///
/// Migration never edits a `Disk` in place; it hands back a new record
/// pointing at the destination datastore.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Disk {
    pub cid: String,
    pub size_in_mb: u64,
    pub datastore: Datastore,
    pub path: String,
}

impl Disk {
    pub fn new(
        cid: impl Into<String>,
        size_in_mb: u64,
        datastore: Datastore,
        path: impl Into<String>,
    ) -> Self {
        Self {
            cid: cid.into(),
            size_in_mb,
            datastore,
            path: path.into(),
        }
    }
}

/// `[<datastore>] <base_path>/<cid>.vmdk`. The virtualization client parses
/// this exact shape, so it must not change.
pub fn disk_path(datastore_name: &str, base_path: &str, cid: &str) -> String {
    format!("[{}] {}/{}.vmdk", datastore_name, base_path, cid)
}

/// Directory portion of a datastore path, e.g. `[ds] disks` for
/// `[ds] disks/disk-1.vmdk`.
pub fn parent_folder(path: &str) -> &str {
    match path.rsplit_once('/') {
        Some((parent, _)) => parent,
        None => path,
    }
}

/// Splits `[<datastore>] <rest>` into its datastore name and relative path.
pub fn split_datastore_path(path: &str) -> Option<(&str, &str)> {
    let rest = path.strip_prefix('[')?;
    let (datastore, relative) = rest.split_once("] ")?;
    Some((datastore, relative))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disk_path_format() {
        assert_eq!(
            disk_path("fake-datastore-name", "fake-disk-path", "disk-cid"),
            "[fake-datastore-name] fake-disk-path/disk-cid.vmdk"
        );
    }

    #[test]
    fn test_parent_folder() {
        assert_eq!(
            parent_folder("[fake-datastore-name] fake-disk-path/disk-cid.vmdk"),
            "[fake-datastore-name] fake-disk-path"
        );
        assert_eq!(parent_folder("[ds] a/b/c.vmdk"), "[ds] a/b");
        assert_eq!(parent_folder("[ds] lonely.vmdk"), "[ds] lonely.vmdk");
    }

    #[test]
    fn test_split_datastore_path() {
        assert_eq!(
            split_datastore_path("[ds 1] disks/disk-a.vmdk"),
            Some(("ds 1", "disks/disk-a.vmdk"))
        );
        assert_eq!(split_datastore_path("disks/disk-a.vmdk"), None);
    }
}
