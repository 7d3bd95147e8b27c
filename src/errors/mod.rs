use std::fmt;
use thiserror::Error;

/// Failures raised by disk placement, lookup and migration.
#[derive(Error, Debug)]
pub enum DiskError {
    #[error("Not enough persistent space {requested_mb}")]
    NoDiskSpace { requested_mb: u64 },

    #[error("Not enough persistent space on cluster '{cluster}', requested disk size: {requested_mb}Mb")]
    NoClusterDiskSpace { cluster: String, requested_mb: u64 },

    #[error("Could not find disk with id {cid}")]
    DiskNotFound { cid: String },

    // Integration tests match on this exact text.
    #[error("Datastore '{datastore}' is not accessible to cluster '{cluster}'")]
    AccessibilityViolation { datastore: String, cluster: String },

    #[error("Invalid disk size: {size_mb}Mb")]
    InvalidDiskSize { size_mb: u64 },

    #[error(transparent)]
    Client(#[from] ClientError),
}

/// Coarse classification callers branch on instead of message text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NoDiskSpace,
    DiskNotFound,
    AccessibilityViolation,
    InvalidInput,
    VirtualizationClient,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorKind::NoDiskSpace => write!(f, "NoDiskSpace"),
            ErrorKind::DiskNotFound => write!(f, "DiskNotFound"),
            ErrorKind::AccessibilityViolation => write!(f, "AccessibilityViolation"),
            ErrorKind::InvalidInput => write!(f, "InvalidInput"),
            ErrorKind::VirtualizationClient => write!(f, "VirtualizationClient"),
        }
    }
}

impl DiskError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            DiskError::NoDiskSpace { .. } | DiskError::NoClusterDiskSpace { .. } => {
                ErrorKind::NoDiskSpace
            }
            DiskError::DiskNotFound { .. } => ErrorKind::DiskNotFound,
            DiskError::AccessibilityViolation { .. } => ErrorKind::AccessibilityViolation,
            DiskError::InvalidDiskSize { .. } => ErrorKind::InvalidInput,
            DiskError::Client(_) => ErrorKind::VirtualizationClient,
        }
    }

    /// Whether repeating the same call later may succeed without the caller
    /// changing its inputs.
    pub fn is_retryable(&self) -> bool {
        match self {
            DiskError::NoDiskSpace { .. } | DiskError::NoClusterDiskSpace { .. } => true,
            DiskError::Client(err) => err.is_retryable(),
            _ => false,
        }
    }
}

/// Failures surfaced by a virtualization client. Passed through the disk
/// provider untouched.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ClientError {
    #[error("Task {task} failed: {message}")]
    TaskFailed { task: String, message: String },

    #[error("Unknown task: {task}")]
    UnknownTask { task: String },

    #[error("Datastore '{datastore}' cannot fit {requested_mb}Mb")]
    InsufficientSpace { datastore: String, requested_mb: u64 },

    #[error("Disk not found at {path}")]
    DiskNotFound { path: String },

    #[error("File already exists at {path}")]
    AlreadyExists { path: String },

    #[error("Folder does not exist: {path}")]
    FolderMissing { path: String },

    #[error("Transport error: {0}")]
    Transport(String),
}

impl ClientError {
    /// Hypervisor-side capacity exhaustion is the one client failure that a
    /// later attempt may get past; it reflects a stale capacity snapshot.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ClientError::InsufficientSpace { .. })
    }
}

/// Settings and inventory failures.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to load settings: {0}")]
    Load(#[from] config::ConfigError),

    #[error("Invalid persistent datastore pattern '{pattern}': {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error("Duplicate cluster name: {0}")]
    DuplicateCluster(String),

    #[error("Duplicate datastore '{datastore}' in cluster '{cluster}'")]
    DuplicateDatastore { cluster: String, datastore: String },

    #[error("Failed to write settings: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to serialize settings: {0}")]
    Serialize(#[from] serde_json::Error),
}

pub type DiskResult<T> = Result<T, DiskError>;
