pub mod cluster;
pub mod datacenter;
pub mod datastore;
pub mod disk;

pub use cluster::Cluster;
pub use datacenter::Datacenter;
pub use datastore::{Datastore, ManagedRef, BYTES_IN_MB};
pub use disk::{disk_path, parent_folder, Disk};
