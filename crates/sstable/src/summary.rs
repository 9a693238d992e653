//! Sparse in-memory sample of the primary index.

use crate::key::DecoratedKey;

/// One sampled index record: the key and where its record starts in
/// `Index.db`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexSummaryEntry {
    pub key: DecoratedKey,
    pub index_position: u64,
}

/// Write-phase summary. Samples the first key and every
/// `interval`-th key after it.
#[derive(Debug)]
pub struct IndexSummaryBuilder {
    interval: u64,
    keys_written: u64,
    entries: Vec<IndexSummaryEntry>,
}

impl IndexSummaryBuilder {
    pub fn new(interval: usize) -> Self {
        Self {
            interval: interval.max(1) as u64,
            keys_written: 0,
            entries: Vec::new(),
        }
    }

    /// Called once per index record, in index order.
    pub fn maybe_add_entry(&mut self, key: &DecoratedKey, index_position: u64) {
        if self.keys_written % self.interval == 0 {
            self.entries.push(IndexSummaryEntry {
                key: key.clone(),
                index_position,
            });
        }
        self.keys_written += 1;
    }

    pub fn keys_written(&self) -> u64 {
        self.keys_written
    }

    /// Freezes the sampled entries for binary search.
    #[must_use]
    pub fn build(mut self) -> IndexSummary {
        self.entries.shrink_to_fit();
        IndexSummary {
            interval: self.interval,
            key_count: self.keys_written,
            entries: self.entries,
        }
    }
}

/// Completed, immutable index summary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexSummary {
    interval: u64,
    key_count: u64,
    entries: Vec<IndexSummaryEntry>,
}

impl IndexSummary {
    pub fn entries(&self) -> &[IndexSummaryEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn interval(&self) -> u64 {
        self.interval
    }

    /// Number of index records the summary was sampled from.
    pub fn key_count(&self) -> u64 {
        self.key_count
    }

    /// The last sampled entry whose key is `<= key`: the point in the index
    /// file from which a scan for `key` has to start. `None` if `key` sorts
    /// before every key in the table.
    pub fn floor(&self, key: &DecoratedKey) -> Option<&IndexSummaryEntry> {
        let idx = self.entries.partition_point(|e| e.key <= *key);
        idx.checked_sub(1).map(|i| &self.entries[i])
    }
}
