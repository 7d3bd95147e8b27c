pub mod cli;
pub mod client;
pub mod config;
pub mod disk_provider;
pub mod errors;
pub mod placement;
pub mod resources;

// Re-exports
pub use client::{InMemoryClient, VirtualizationClient};
pub use disk_provider::DiskProvider;
pub use errors::{ClientError, DiskError, DiskResult, ErrorKind};
pub use placement::{CapacitySelector, WeightedDraw, DISK_HEADROOM_MB};
pub use resources::{Cluster, Datacenter, Datastore, Disk, ManagedRef};
