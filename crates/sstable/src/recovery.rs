//! Completing a table whose finalization was interrupted.
//!
//! A table is recoverable while its data file still carries the temporary
//! name. If the index, filter and statistics were all closed and agree with
//! the data file, recovery only renames; otherwise the auxiliary files are
//! dropped and rebuilt from the data file before renaming. The data file
//! itself is never modified.

use config::Config;
use log::{debug, info, warn};
use std::fs::{self, File};
use std::io::{self, BufReader, Seek, SeekFrom};
use std::path::Path;
use std::sync::Arc;

use crate::descriptor::{Component, Descriptor, CURRENT_VERSION};
use crate::error::{Result, SSTableError};
use crate::format::{read_index_entry, read_row_size, read_short_bytes, row_size_width};
use crate::histogram::EstimatedHistogram;
use crate::index_writer::IndexWriter;
use crate::key::Partitioner;
use crate::metadata::TableMetadata;
use crate::reader::SSTableReader;
use crate::scanner::DataScanner;
use crate::writer::{estimate_rows, rename, write_statistics};

/// Regenerates the auxiliary components of a temporary table from its
/// data file, in place.
pub trait RecoveryProcessor {
    fn recover(&self, desc: &Descriptor) -> Result<()>;
}

/// Rebuilds `Index.db`, `Filter.db` and `Statistics.db` with one pass over
/// `Data.db`, reading keys and row lengths only.
///
/// Column counts cannot be known without decoding row bodies, so the
/// rebuilt column-count histogram is empty. A row cut short by a crash ends
/// the scan; it is left out of the index.
#[derive(Debug, Clone)]
pub struct IndexRebuilder {
    partitioner: Arc<dyn Partitioner>,
    config: Config,
}

impl IndexRebuilder {
    pub fn new(partitioner: Arc<dyn Partitioner>, config: Config) -> Self {
        Self { partitioner, config }
    }
}

impl RecoveryProcessor for IndexRebuilder {
    fn recover(&self, desc: &Descriptor) -> Result<()> {
        self.config.validate()?;
        let mut data = File::open(desc.filename_for(Component::Data))?;
        let estimated = estimate_rows(desc, &mut data)?;
        let mut iwriter = IndexWriter::new(desc, estimated, &self.config)?;
        let mut row_sizes = EstimatedHistogram::row_sizes();

        let mut scanner = DataScanner::new(data, desc)?;
        loop {
            match scanner.next_header() {
                Ok(Some(header)) => {
                    let key = self.partitioner.decorate_key(header.key);
                    iwriter.after_append(&key, header.position)?;
                    row_sizes.add(header.size_on_disk);
                }
                Ok(None) => break,
                Err(SSTableError::TruncatedRow { position }) => {
                    warn!("{}: ignoring incomplete row at offset {}", desc, position);
                    break;
                }
                Err(e) => return Err(e),
            }
        }

        iwriter.close()?;
        write_statistics(desc, &row_sizes, &EstimatedHistogram::column_counts())?;
        info!("rebuilt index and filter for {} ({} rows)", desc, row_sizes.count());
        Ok(())
    }
}

/// Takes `desc` out of temporary status and opens it, rebuilding the index,
/// filter and statistics first unless all three are intact.
///
/// On success the table is in the same state as after a normal
/// [`close_and_open_reader`](crate::SSTableWriter::close_and_open_reader).
///
/// # Errors
///
/// - [`SSTableError::IncompatibleVersion`] if `desc` is not the current
///   format version; no cross-version recovery is attempted.
/// - Anything raised by `processor`, the renames, or opening the table.
pub fn recover_and_open(
    desc: &Descriptor,
    processor: &dyn RecoveryProcessor,
    metadata: Arc<TableMetadata>,
    partitioner: Arc<dyn Partitioner>,
    config: &Config,
) -> Result<SSTableReader> {
    if !desc.is_latest_version() {
        return Err(SSTableError::IncompatibleVersion {
            found: desc.version.clone(),
            current: CURRENT_VERSION,
        });
    }
    debug!("recovering {}", desc);

    // the data rename is the commit point: past it there is nothing to redo
    let published = desc.as_temporary(false);
    if !desc.filename_for(Component::Data).exists() && published.filename_for(Component::Data).exists() {
        debug!("{} was already published", published);
        return SSTableReader::open(&published, metadata, partitioner, config);
    }

    if !auxiliary_intact(desc)? {
        for component in [Component::PrimaryIndex, Component::Filter, Component::Stats] {
            remove_if_exists(&desc.filename_for(component))?;
        }
        warn!("{}: auxiliary components incomplete, rebuilding from data", desc);
        processor.recover(desc)?;
    }

    // a component the processor failed to produce stops the rename before Data
    let newdesc = rename(desc, &Component::ALL.into_iter().collect())?;
    SSTableReader::open(&newdesc, metadata, partitioner, config)
}

/// `true` if the index, filter and statistics of `desc` can be published as
/// they are.
///
/// The filter is only created once the data file and index are durable, so
/// its presence vouches for both; the last index entry must still name a
/// row that ends exactly where the data file does, and the statistics must
/// parse.
fn auxiliary_intact(desc: &Descriptor) -> Result<bool> {
    let index_path = desc.filename_for(Component::PrimaryIndex);
    if !(index_path.exists() && desc.filename_for(Component::Filter).exists()) {
        return Ok(false);
    }
    if !stats_readable(desc)? {
        debug!("{}: statistics missing or unreadable", desc);
        return Ok(false);
    }

    let index_len = fs::metadata(&index_path)?.len();
    let mut index = BufReader::new(File::open(&index_path)?);
    let mut position = 0;
    let mut last = None;
    while position < index_len {
        let Ok((key, offset)) = read_index_entry(&mut index) else {
            debug!("{}: index ends inside an entry at {}", desc, position);
            return Ok(false);
        };
        position += 2 + key.len() as u64 + 8;
        last = Some((key, offset));
    }

    let data_path = desc.filename_for(Component::Data);
    let data_len = fs::metadata(&data_path)?.len();
    let Some((last_key, last_offset)) = last else {
        return Ok(data_len == 0);
    };
    if last_offset >= data_len {
        debug!("{}: index points at {} past the data end {}", desc, last_offset, data_len);
        return Ok(false);
    }

    let mut data = BufReader::new(File::open(&data_path)?);
    data.seek(SeekFrom::Start(last_offset))?;
    let row_end = read_short_bytes(&mut data)
        .ok()
        .filter(|key| *key == last_key)
        .and_then(|_| read_row_size(&mut data, desc).ok())
        .map(|size| last_offset + 2 + last_key.len() as u64 + row_size_width(desc) + size);
    if row_end != Some(data_len) {
        debug!("{}: last indexed row does not end at the data end {}", desc, data_len);
        return Ok(false);
    }
    Ok(true)
}

fn stats_readable(desc: &Descriptor) -> Result<bool> {
    let file = match File::open(desc.filename_for(Component::Stats)) {
        Ok(file) => file,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(false),
        Err(e) => return Err(e.into()),
    };
    let mut input = BufReader::new(file);
    Ok(EstimatedHistogram::read_from(&mut input).is_ok() && EstimatedHistogram::read_from(&mut input).is_ok())
}

fn remove_if_exists(path: &Path) -> io::Result<()> {
    match fs::remove_file(path) {
        Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e),
        _ => Ok(()),
    }
}
