//! # SSTable - Sorted String Table write path
//!
//! Turns a stream of rows, supplied in ascending key order, into an
//! immutable set of component files and publishes them atomically.
//!
//! ## Components
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────────┐
//! │ <table>-[tmp-]<version>-<generation>-Data.db                   │
//! │   key_len (u16) | key | row_len (i64) | row bytes              │
//! │   ... one record per row, ascending key order ...              │
//! ├────────────────────────────────────────────────────────────────┤
//! │ ...-Index.db                                                   │
//! │   key_len (u16) | key | data_offset (i64)                      │
//! │   ... one record per row, same order ...                       │
//! ├────────────────────────────────────────────────────────────────┤
//! │ ...-Filter.db                                                  │
//! │   hash_count (i32) | word_count (i32) | words (i64 each)       │
//! ├────────────────────────────────────────────────────────────────┤
//! │ ...-Statistics.db                                              │
//! │   row-size histogram | column-count histogram                  │
//! └────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Every integer is big-endian.
//!
//! ## Lifecycle
//!
//! 1. [`SSTableWriter::new`] opens `Data.db` and `Index.db` under a
//!    temporary descriptor.
//! 2. `append*` writes one data record and one index record per row and
//!    feeds the membership filter, index summary and histograms.
//! 3. [`SSTableWriter::close_and_open_reader`] syncs everything, writes the
//!    filter and statistics, renames every component to its permanent name
//!    (data last) and returns an [`SSTableReader`].
//! 4. After a crash, [`recover_and_open`] finishes the job, rebuilding the
//!    index and filter from the data file when needed.

mod descriptor;
mod error;
mod file;
mod format;
mod histogram;
mod index_writer;
mod key;
mod metadata;
mod reader;
mod recovery;
mod row;
mod scanner;
mod segment;
mod summary;
mod writer;

pub use descriptor::{components_for, Component, Descriptor, CURRENT_VERSION};
pub use error::{Result, SSTableError};
pub use format::{read_index_entry, read_short_bytes, write_short_bytes, MAX_KEY_LEN};
pub use histogram::{EstimatedHistogram, COLUMN_COUNT_BUCKETS, ROW_SIZE_BUCKETS};
pub use key::{ByteOrderedPartitioner, DecoratedKey, HashPartitioner, Partitioner, Token};
pub use metadata::TableMetadata;
pub use reader::SSTableReader;
pub use recovery::{recover_and_open, IndexRebuilder, RecoveryProcessor};
pub use row::{Column, ColumnFamily, CompactedRow, PrecompactedRow, RowEncoder};
pub use scanner::{DataScanner, RowHeader};
pub use segment::{Segment, SegmentedFile, SegmentedFileBuilder};
pub use summary::{IndexSummary, IndexSummaryBuilder, IndexSummaryEntry};
pub use writer::{estimate_rows, rename, ClosedTable, SSTableWriter};

#[cfg(test)]
mod tests;
