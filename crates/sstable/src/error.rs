use std::io;
use std::path::PathBuf;

use config::ConfigError;
use thiserror::Error;

use crate::descriptor::Component;
use crate::key::DecoratedKey;

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, SSTableError>;

/// Errors surfaced by the SSTable write path.
///
/// Every variant except [`TruncatedRow`](SSTableError::TruncatedRow) is fatal
/// to the operation that produced it; the caller decides whether to abort the
/// owning flush or compaction.
#[derive(Debug, Error)]
pub enum SSTableError {
    /// An underlying I/O error while writing, seeking or syncing.
    #[error("io error: {0}")]
    Io(#[from] io::Error),

    /// A key was appended that sorts before the previously written key.
    #[error("keys must be written in ascending order (last written {last}, current {current})")]
    OutOfOrder {
        last: DecoratedKey,
        current: DecoratedKey,
    },

    /// A key with no bytes was appended.
    #[error("keys must not be empty")]
    MissingKey,

    /// The key does not fit the unsigned short length prefix.
    #[error("key of {0} bytes exceeds the 65535 byte limit")]
    KeyTooLong(usize),

    /// A raw value append carried no bytes.
    #[error("raw row values must not be empty")]
    EmptyValue,

    /// Publishing a component under its permanent name failed.
    #[error("failed to rename {} to {}: {source}", from.display(), to.display())]
    Rename {
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Recovery refuses to operate across format versions.
    #[error("cannot recover sstable with version {found} (current version {current})")]
    IncompatibleVersion {
        found: String,
        current: &'static str,
    },

    /// A path does not follow the component naming scheme.
    #[error("not an sstable component file name: {0}")]
    InvalidFilename(String),

    /// A table name that cannot be encoded in component file names.
    #[error("invalid table name {0:?}: must be non-empty and contain no '-' or path separator")]
    InvalidTableName(String),

    /// A component required to open the table is not on disk.
    #[error("missing {component} component: {}", path.display())]
    MissingComponent { component: Component, path: PathBuf },

    /// The data file ends in the middle of a row.
    #[error("data file truncated inside the row starting at offset {position}")]
    TruncatedRow { position: u64 },

    /// A component's content is structurally invalid.
    #[error("corrupt {component}: {reason}")]
    Corrupt { component: Component, reason: String },

    /// The supplied writer configuration is unusable.
    #[error(transparent)]
    Config(#[from] ConfigError),
}
