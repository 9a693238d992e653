//! Table directory management behind the `sstable-shell` binary.

mod store;

pub use store::{TableStore, VALUE_COLUMN};

use anyhow::{bail, Result};
use sstable::{ByteOrderedPartitioner, HashPartitioner, Partitioner};
use std::sync::Arc;

/// Resolves a partitioner by its shell name (`bytes` or `hash`).
pub fn partitioner_by_name(name: &str) -> Result<Arc<dyn Partitioner>> {
    match name.to_ascii_lowercase().as_str() {
        "bytes" | "byteordered" => Ok(Arc::new(ByteOrderedPartitioner)),
        "hash" => Ok(Arc::new(HashPartitioner)),
        other => bail!("unknown partitioner {:?} (expected bytes or hash)", other),
    }
}
