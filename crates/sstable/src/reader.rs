use bloom::BloomFilter;
use config::Config;
use log::debug;
use std::collections::BTreeSet;
use std::fs::File;
use std::io::{self, BufReader};
use std::sync::Arc;
use std::time::UNIX_EPOCH;

use crate::descriptor::{components_for, Component, Descriptor};
use crate::error::{Result, SSTableError};
use crate::format::{read_index_entry, read_short_bytes};
use crate::histogram::EstimatedHistogram;
use crate::key::{DecoratedKey, Partitioner};
use crate::metadata::TableMetadata;
use crate::scanner::DataScanner;
use crate::segment::{SegmentedFile, SegmentedFileBuilder};
use crate::summary::{IndexSummary, IndexSummaryBuilder};
use crate::writer::now_millis;

/// Read-only handle to a finished table.
///
/// Built either directly from a writer's in-memory state when the writer
/// publishes the table, or by [`open`](SSTableReader::open) from the files
/// on disk. Holds the summary, filter and statistics in memory; row lookup
/// is left to the read path built on top of it.
pub struct SSTableReader {
    desc: Descriptor,
    components: BTreeSet<Component>,
    metadata: Arc<TableMetadata>,
    partitioner: Arc<dyn Partitioner>,
    index_file: SegmentedFile,
    data_file: SegmentedFile,
    summary: IndexSummary,
    filter: BloomFilter,
    /// Milliseconds since the epoch of the newest data in the table.
    max_data_age: u64,
    estimated_row_size: EstimatedHistogram,
    estimated_column_count: EstimatedHistogram,
}

impl SSTableReader {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn internal_open(
        desc: Descriptor,
        components: BTreeSet<Component>,
        metadata: Arc<TableMetadata>,
        partitioner: Arc<dyn Partitioner>,
        index_file: SegmentedFile,
        data_file: SegmentedFile,
        summary: IndexSummary,
        filter: BloomFilter,
        max_data_age: u64,
        estimated_row_size: EstimatedHistogram,
        estimated_column_count: EstimatedHistogram,
    ) -> Self {
        Self {
            desc,
            components,
            metadata,
            partitioner,
            index_file,
            data_file,
            summary,
            filter,
            max_data_age,
            estimated_row_size,
            estimated_column_count,
        }
    }

    /// Opens a finished table from disk.
    ///
    /// The filter is loaded from `Filter.db`; the summary and segment
    /// boundaries are rebuilt by one pass over `Index.db`. A missing
    /// `Statistics.db` yields empty histograms.
    ///
    /// # Errors
    ///
    /// [`SSTableError::MissingComponent`] if the data, index or filter file
    /// is absent; I/O or corruption errors while loading.
    pub fn open(
        desc: &Descriptor,
        metadata: Arc<TableMetadata>,
        partitioner: Arc<dyn Partitioner>,
        config: &Config,
    ) -> Result<Self> {
        let components = components_for(desc);
        for required in [Component::Data, Component::PrimaryIndex, Component::Filter] {
            if !components.contains(&required) {
                return Err(SSTableError::MissingComponent {
                    component: required,
                    path: desc.filename_for(required),
                });
            }
        }

        let filter_path = desc.filename_for(Component::Filter);
        let filter = BloomFilter::read_from(&mut BufReader::new(File::open(&filter_path)?))
            .map_err(|e| corrupt(Component::Filter, e))?;

        let (estimated_row_size, estimated_column_count) = if components.contains(&Component::Stats) {
            let mut input = BufReader::new(File::open(desc.filename_for(Component::Stats))?);
            let rows = EstimatedHistogram::read_from(&mut input).map_err(|e| corrupt(Component::Stats, e))?;
            let columns = EstimatedHistogram::read_from(&mut input).map_err(|e| corrupt(Component::Stats, e))?;
            (rows, columns)
        } else {
            (EstimatedHistogram::row_sizes(), EstimatedHistogram::column_counts())
        };

        let mut ibuilder = SegmentedFileBuilder::new(config.index_access_mode, config.max_segment_size);
        let mut dbuilder = SegmentedFileBuilder::new(config.disk_access_mode, config.max_segment_size);
        let summary = load_index(desc, partitioner.as_ref(), config, &mut ibuilder, &mut dbuilder)?;

        let data_path = desc.filename_for(Component::Data);
        let max_data_age = std::fs::metadata(&data_path)
            .and_then(|m| m.modified())
            .ok()
            .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
            .map(|d| d.as_millis() as u64)
            .unwrap_or_else(now_millis);

        let index_file = ibuilder.complete(desc.filename_for(Component::PrimaryIndex))?;
        let data_file = dbuilder.complete(&data_path)?;
        debug!("opened {} ({} keys)", desc, summary.key_count());

        Ok(Self::internal_open(
            desc.clone(),
            components,
            metadata,
            partitioner,
            index_file,
            data_file,
            summary,
            filter,
            max_data_age,
            estimated_row_size,
            estimated_column_count,
        ))
    }

    pub fn descriptor(&self) -> &Descriptor {
        &self.desc
    }

    pub fn components(&self) -> &BTreeSet<Component> {
        &self.components
    }

    pub fn metadata(&self) -> &TableMetadata {
        &self.metadata
    }

    pub fn partitioner(&self) -> &Arc<dyn Partitioner> {
        &self.partitioner
    }

    pub fn index_file(&self) -> &SegmentedFile {
        &self.index_file
    }

    pub fn data_file(&self) -> &SegmentedFile {
        &self.data_file
    }

    pub fn summary(&self) -> &IndexSummary {
        &self.summary
    }

    pub fn filter(&self) -> &BloomFilter {
        &self.filter
    }

    pub fn max_data_age(&self) -> u64 {
        self.max_data_age
    }

    pub fn estimated_row_size(&self) -> &EstimatedHistogram {
        &self.estimated_row_size
    }

    pub fn estimated_column_count(&self) -> &EstimatedHistogram {
        &self.estimated_column_count
    }

    /// Number of keys in the table, as counted while the index was written
    /// or loaded.
    pub fn estimated_keys(&self) -> u64 {
        self.summary.key_count()
    }

    /// `false` means `key` is definitely not in this table.
    pub fn may_contain(&self, key: &DecoratedKey) -> bool {
        self.filter.may_contain(key.key())
    }

    /// Decodes the index record starting at `index_position`.
    pub fn index_entry_at(&self, index_position: u64) -> Result<(Vec<u8>, u64)> {
        let mut len = [0u8; 2];
        self.index_file.read_exact_at(index_position, &mut len)?;
        let key_len = u16::from_be_bytes(len) as u64;

        let mut record = vec![0u8; (2 + key_len + 8) as usize];
        self.index_file.read_exact_at(index_position, &mut record)?;
        Ok(read_index_entry(&mut record.as_slice())?)
    }

    /// Reads the key of the row starting at `data_position`.
    pub fn key_at(&self, data_position: u64) -> Result<Vec<u8>> {
        let mut len = [0u8; 2];
        self.data_file.read_exact_at(data_position, &mut len)?;
        let mut record = vec![0u8; 2 + u16::from_be_bytes(len) as usize];
        self.data_file.read_exact_at(data_position, &mut record)?;
        Ok(read_short_bytes(&mut record.as_slice())?)
    }

    /// Sequential scan over every row of the data file.
    pub fn scanner(&self) -> Result<DataScanner<File>> {
        DataScanner::open(&self.desc)
    }
}

impl std::fmt::Debug for SSTableReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SSTableReader")
            .field("descriptor", &self.desc.to_string())
            .field("components", &self.components)
            .field("keys", &self.summary.key_count())
            .field("summary_entries", &self.summary.len())
            .field("data_bytes", &self.data_file.length())
            .field("max_data_age", &self.max_data_age)
            .finish()
    }
}

/// One pass over the index file: samples the summary and feeds both
/// segment builders.
fn load_index(
    desc: &Descriptor,
    partitioner: &dyn Partitioner,
    config: &Config,
    ibuilder: &mut SegmentedFileBuilder,
    dbuilder: &mut SegmentedFileBuilder,
) -> Result<IndexSummary> {
    let file = File::open(desc.filename_for(Component::PrimaryIndex))?;
    let length = file.metadata()?.len();
    let mut input = BufReader::new(file);
    let mut summary = IndexSummaryBuilder::new(config.index_interval);

    let mut index_position = 0u64;
    while index_position < length {
        let (key, data_position) = read_index_entry(&mut input).map_err(|e| corrupt(Component::PrimaryIndex, e))?;
        let record_len = 2 + key.len() as u64 + 8;
        let key = partitioner.decorate_key(key);

        summary.maybe_add_entry(&key, index_position);
        ibuilder.add_potential_boundary(index_position);
        dbuilder.add_potential_boundary(data_position);
        index_position += record_len;
    }
    Ok(summary.build())
}

fn corrupt(component: Component, e: io::Error) -> SSTableError {
    SSTableError::Corrupt {
        component,
        reason: e.to_string(),
    }
}
