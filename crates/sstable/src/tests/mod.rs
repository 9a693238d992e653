mod descriptor_tests;
mod writer_tests;

use crate::*;
use config::Config;
use std::path::Path;
use std::sync::Arc;

// -------------------- Helpers --------------------

pub(crate) fn tmp_desc(dir: &Path, generation: u64) -> Descriptor {
    Descriptor::new(dir, "ks", "users", generation, true)
}

pub(crate) fn partitioner() -> Arc<dyn Partitioner> {
    Arc::new(ByteOrderedPartitioner)
}

pub(crate) fn metadata() -> Arc<TableMetadata> {
    Arc::new(TableMetadata::new("ks", "users"))
}

/// Small interval so summaries have several entries in short tests.
pub(crate) fn test_config() -> Config {
    Config {
        index_interval: 4,
        bloom_fpr: 0.01,
        data_buffer_bytes: 4096,
        index_buffer_bytes: 4096,
        ..Config::default()
    }
}

pub(crate) fn key(k: &str) -> DecoratedKey {
    ByteOrderedPartitioner.decorate_key(k.as_bytes().to_vec())
}

pub(crate) fn row(value: &str) -> ColumnFamily {
    let mut cf = ColumnFamily::new();
    cf.add_column("value", value, 1);
    cf
}

pub(crate) fn numbered_keys(n: usize) -> Vec<String> {
    (0..n).map(|i| format!("key{:05}", i)).collect()
}

pub(crate) fn open_writer(desc: &Descriptor, key_count: u64, config: &Config) -> Result<SSTableWriter> {
    SSTableWriter::new(desc.clone(), key_count, metadata(), partitioner(), config)
}

/// Writes one column-family row per key, without finalizing.
pub(crate) fn write_rows(desc: &Descriptor, keys: &[String], config: &Config) -> Result<SSTableWriter> {
    let mut writer = open_writer(desc, keys.len() as u64, config)?;
    for k in keys {
        writer.append(&key(k), &row(&format!("value-of-{}", k)))?;
    }
    Ok(writer)
}

pub(crate) fn scan_keys(desc: &Descriptor) -> Result<Vec<Vec<u8>>> {
    let mut keys = Vec::new();
    let mut scanner = DataScanner::open(desc)?;
    while let Some(header) = scanner.next_header()? {
        keys.push(header.key);
    }
    Ok(keys)
}

pub(crate) fn read_index_file(desc: &Descriptor) -> Result<Vec<(Vec<u8>, u64)>> {
    let bytes = std::fs::read(desc.filename_for(Component::PrimaryIndex))?;
    let mut input = bytes.as_slice();
    let mut entries = Vec::new();
    while !input.is_empty() {
        entries.push(read_index_entry(&mut input)?);
    }
    Ok(entries)
}
