use std::fs::File;
use std::io::{BufWriter, Write};

use bloom::{BloomFilter, BloomFilterBuilder};
use config::Config;
use log::{debug, trace};

use crate::descriptor::{Component, Descriptor};
use crate::error::Result;
use crate::file::RandomAccessWriter;
use crate::format::write_index_entry;
use crate::key::DecoratedKey;
use crate::segment::SegmentedFileBuilder;
use crate::summary::{IndexSummary, IndexSummaryBuilder};

/// Writes the primary index and maintains the filter and summary for one
/// table. Its products are only valid once [`close`](IndexWriter::close)
/// hands them out.
pub(crate) struct IndexWriter {
    desc: Descriptor,
    index_file: RandomAccessWriter,
    builder: SegmentedFileBuilder,
    summary: IndexSummaryBuilder,
    filter: BloomFilterBuilder,
}

/// What a closed [`IndexWriter`] leaves behind for the table reader.
pub(crate) struct IndexWriterParts {
    pub builder: SegmentedFileBuilder,
    pub summary: IndexSummary,
    pub filter: BloomFilter,
}

impl IndexWriter {
    pub(crate) fn new(desc: &Descriptor, key_count: u64, config: &Config) -> Result<Self> {
        let path = desc.filename_for(Component::PrimaryIndex);
        let index_file = RandomAccessWriter::create(&path, config.index_buffer_bytes)?;
        let expected = usize::try_from(key_count).unwrap_or(usize::MAX).max(1);
        Ok(Self {
            desc: desc.clone(),
            index_file,
            builder: SegmentedFileBuilder::new(config.index_access_mode, config.max_segment_size),
            summary: IndexSummaryBuilder::new(config.index_interval),
            filter: BloomFilterBuilder::new(expected, config.bloom_fpr),
        })
    }

    pub(crate) fn after_append(&mut self, key: &DecoratedKey, data_position: u64) -> Result<()> {
        self.filter.insert(key.key());
        let index_position = self.index_file.position();
        write_index_entry(&mut self.index_file, key.key(), data_position)?;
        trace!("wrote index of {} at {}", key, index_position);

        self.summary.maybe_add_entry(key, index_position);
        self.builder.add_potential_boundary(index_position);
        Ok(())
    }

    /// Syncs the index, then writes and syncs the filter.
    ///
    /// The writer syncs its data file before calling this, so a `Filter.db`
    /// on disk implies durable data and index files.
    pub(crate) fn close(self) -> Result<IndexWriterParts> {
        let index_path = self.index_file.path().to_path_buf();
        self.index_file.sync_and_close()?;

        let filter = self.filter.build();
        let filter_path = self.desc.filename_for(Component::Filter);
        let mut out = BufWriter::new(File::create(&filter_path)?);
        filter.write_to(&mut out)?;
        out.flush()?;
        out.into_inner().map_err(|e| e.into_error())?.sync_all()?;

        let summary = self.summary.build();
        debug!(
            "closed index {} ({} keys, {} summary entries, filter {:?})",
            index_path.display(),
            summary.key_count(),
            summary.len(),
            filter
        );

        Ok(IndexWriterParts {
            builder: self.builder,
            summary,
            filter,
        })
    }
}
