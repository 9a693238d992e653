use byteorder::{BigEndian, WriteBytesExt};
use config::Config;
use log::{debug, trace, warn};
use std::collections::BTreeSet;
use std::fs::{self, File};
use std::io::{self, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::Path;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::descriptor::{Component, Descriptor};
use crate::error::{Result, SSTableError};
use crate::file::RandomAccessWriter;
use crate::format::{read_row_size, read_short_bytes, write_short_bytes, MAX_KEY_LEN, ROW_SIZE_BYTES, ROW_SIZE_PLACEHOLDER};
use crate::histogram::EstimatedHistogram;
use crate::index_writer::{IndexWriter, IndexWriterParts};
use crate::key::{DecoratedKey, Partitioner};
use crate::metadata::TableMetadata;
use crate::reader::SSTableReader;
use crate::row::{CompactedRow, RowEncoder};
use crate::segment::SegmentedFileBuilder;

/// Rows sampled by [`estimate_rows`].
const ESTIMATE_SAMPLES_CAP: u64 = 1000;
/// Bytes of the data file [`estimate_rows`] looks at, at most.
const ESTIMATE_BYTES_CAP: u64 = 100_000_000;

/// Streams rows, in ascending key order, into a new table.
///
/// The table is normally written under a temporary [`Descriptor`]; nothing
/// is visible under the permanent name until
/// [`close_and_open_reader`](SSTableWriter::close_and_open_reader) renames
/// every component.
///
/// # Append protocol
///
/// All three append variants run the same checks before writing a single
/// byte (non-empty key, key fits a short length prefix, key not smaller than
/// the previous one), so a rejected append leaves the data file, index,
/// filter and summary exactly as they were.
///
/// A writer is owned by one caller; appends take `&mut self` and closing
/// consumes the writer, so nothing can be appended once finalization starts.
pub struct SSTableWriter {
    desc: Descriptor,
    metadata: Arc<TableMetadata>,
    partitioner: Arc<dyn Partitioner>,
    components: BTreeSet<Component>,
    iwriter: IndexWriter,
    dbuilder: SegmentedFileBuilder,
    data_file: RandomAccessWriter,
    last_written_key: Option<DecoratedKey>,
    estimated_row_size: EstimatedHistogram,
    estimated_column_count: EstimatedHistogram,
}

impl SSTableWriter {
    /// Opens the data and index files of `desc` for writing.
    ///
    /// `key_count` is an estimate used to size the membership filter;
    /// over-estimating is safe, under-estimating raises the false-positive
    /// rate.
    ///
    /// # Errors
    ///
    /// Returns an error if `config` is invalid, the table name cannot be
    /// encoded in a file name, or a file cannot be created.
    pub fn new(
        desc: Descriptor,
        key_count: u64,
        metadata: Arc<TableMetadata>,
        partitioner: Arc<dyn Partitioner>,
        config: &Config,
    ) -> Result<Self> {
        config.validate()?;
        desc.validate()?;

        let iwriter = IndexWriter::new(&desc, key_count, config)?;
        let data_file = RandomAccessWriter::create(&desc.filename_for(Component::Data), config.data_buffer_bytes)?;
        debug!(
            "writing {} for {}.{} ({} keys expected, {})",
            desc,
            metadata.keyspace,
            metadata.name,
            key_count,
            partitioner.name()
        );

        Ok(Self {
            components: [
                Component::Data,
                Component::Filter,
                Component::PrimaryIndex,
                Component::Stats,
            ]
            .into_iter()
            .collect(),
            dbuilder: SegmentedFileBuilder::new(config.disk_access_mode, config.max_segment_size),
            desc,
            metadata,
            partitioner,
            iwriter,
            data_file,
            last_written_key: None,
            estimated_row_size: EstimatedHistogram::row_sizes(),
            estimated_column_count: EstimatedHistogram::column_counts(),
        })
    }

    /// Like [`new`](SSTableWriter::new), with the descriptor parsed from the
    /// path of any of the table's components and schema derived from it.
    pub fn create(
        path: &Path,
        key_count: u64,
        partitioner: Arc<dyn Partitioner>,
        config: &Config,
    ) -> Result<Self> {
        let (desc, _) = Descriptor::from_filename(path)?;
        let metadata = Arc::new(TableMetadata::for_descriptor(&desc));
        Self::new(desc, key_count, metadata, partitioner, config)
    }

    pub fn descriptor(&self) -> &Descriptor {
        &self.desc
    }

    pub fn partitioner(&self) -> &Arc<dyn Partitioner> {
        &self.partitioner
    }

    /// Current end of the data file.
    pub fn file_pointer(&self) -> u64 {
        self.data_file.position()
    }

    pub fn last_written_key(&self) -> Option<&DecoratedKey> {
        self.last_written_key.as_ref()
    }

    /// Number of rows appended so far.
    pub fn rows_written(&self) -> u64 {
        self.estimated_row_size.count()
    }

    fn before_append(&self, key: &DecoratedKey) -> Result<u64> {
        if key.key().is_empty() {
            return Err(SSTableError::MissingKey);
        }
        if key.key().len() > MAX_KEY_LEN {
            return Err(SSTableError::KeyTooLong(key.key().len()));
        }
        if let Some(last) = &self.last_written_key {
            if last > key {
                debug!("last written key: {}", last);
                debug!("current key: {}", key);
                debug!("writing into {}", self.desc);
                return Err(SSTableError::OutOfOrder {
                    last: last.clone(),
                    current: key.clone(),
                });
            }
        }
        Ok(self.data_file.position())
    }

    fn after_append(&mut self, key: &DecoratedKey, start: u64, column_count: Option<u64>) -> Result<()> {
        let end = self.data_file.position();
        self.last_written_key = Some(key.clone());
        trace!("wrote {} at {}", key, start);

        self.dbuilder.add_potential_boundary(start);
        self.iwriter.after_append(key, start)?;

        self.estimated_row_size.add(end - start);
        if let Some(count) = column_count {
            self.estimated_column_count.add(count);
        }
        Ok(())
    }

    /// Appends a row whose body is already framed with its length.
    pub fn append_row(&mut self, row: &dyn CompactedRow) -> Result<()> {
        let key = row.key();
        let start = self.before_append(key)?;
        write_short_bytes(&mut self.data_file, key.key())?;
        row.write(&mut self.data_file)?;
        self.after_append(key, start, Some(row.column_count()))
    }

    /// Appends a row serialized by `row`.
    ///
    /// The row length is not known until serialization finishes, so an
    /// 8-byte placeholder is written first and patched afterwards.
    pub fn append<E: RowEncoder + ?Sized>(&mut self, key: &DecoratedKey, row: &E) -> Result<()> {
        let start = self.before_append(key)?;
        write_short_bytes(&mut self.data_file, key.key())?;

        let size_position = self.data_file.position();
        self.data_file.write_i64::<BigEndian>(ROW_SIZE_PLACEHOLDER)?;
        let column_count = row.serialize(&mut self.data_file)?;

        // row size excludes the size field itself
        let end = self.data_file.position();
        self.data_file.seek(size_position)?;
        self.data_file
            .write_i64::<BigEndian>((end - (size_position + ROW_SIZE_BYTES)) as i64)?;
        self.data_file.seek(end)?;

        self.after_append(key, start, Some(column_count))
    }

    /// Appends an already serialized row body of known length. The column
    /// count of such a body is unknown, so it is not sampled.
    pub fn append_value(&mut self, key: &DecoratedKey, value: &[u8]) -> Result<()> {
        let start = self.before_append(key)?;
        if value.is_empty() {
            return Err(SSTableError::EmptyValue);
        }
        write_short_bytes(&mut self.data_file, key.key())?;
        self.data_file.write_i64::<BigEndian>(value.len() as i64)?;
        self.data_file.write_all(value)?;
        self.after_append(key, start, None)
    }

    /// First finalization phase: syncs and closes the data file, closes the
    /// index (writing the filter) and writes the statistics. Every component
    /// is still under the writer's descriptor afterwards.
    ///
    /// The data file is durable before `Filter.db` exists, so recovery can
    /// take a closed index and filter at their word.
    pub fn close(self) -> Result<ClosedTable> {
        self.data_file.sync_and_close()?;
        let index = self.iwriter.close()?;
        write_statistics(&self.desc, &self.estimated_row_size, &self.estimated_column_count)?;
        debug!("closed {} ({} rows)", self.desc, self.estimated_row_size.count());

        Ok(ClosedTable {
            desc: self.desc,
            metadata: self.metadata,
            partitioner: self.partitioner,
            components: self.components,
            index,
            dbuilder: self.dbuilder,
            estimated_row_size: self.estimated_row_size,
            estimated_column_count: self.estimated_column_count,
        })
    }

    /// Finalizes the table and returns a reader for it, stamped with the
    /// current time as its data age.
    pub fn close_and_open_reader(self) -> Result<SSTableReader> {
        self.close_and_open_reader_with_age(now_millis())
    }

    /// Finalizes the table: [`close`](SSTableWriter::close), then
    /// [`ClosedTable::publish`].
    pub fn close_and_open_reader_with_age(self, max_data_age: u64) -> Result<SSTableReader> {
        self.close()?.publish(max_data_age)
    }
}

impl std::fmt::Debug for SSTableWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SSTableWriter")
            .field("desc", &self.desc.to_string())
            .field("rows", &self.estimated_row_size.count())
            .field("file_pointer", &self.data_file.position())
            .field("last_written_key", &self.last_written_key)
            .finish()
    }
}

/// A table whose files are complete and durable but not yet renamed.
pub struct ClosedTable {
    desc: Descriptor,
    metadata: Arc<TableMetadata>,
    partitioner: Arc<dyn Partitioner>,
    components: BTreeSet<Component>,
    index: IndexWriterParts,
    dbuilder: SegmentedFileBuilder,
    estimated_row_size: EstimatedHistogram,
    estimated_column_count: EstimatedHistogram,
}

impl ClosedTable {
    pub fn descriptor(&self) -> &Descriptor {
        &self.desc
    }

    pub fn components(&self) -> &BTreeSet<Component> {
        &self.components
    }

    /// Second finalization phase: moves every component to its permanent
    /// name and builds the reader from the in-memory index state.
    pub fn publish(self, max_data_age: u64) -> Result<SSTableReader> {
        let desc = rename(&self.desc, &self.components)?;

        let ifile = self.index.builder.complete(desc.filename_for(Component::PrimaryIndex))?;
        let dfile = self.dbuilder.complete(desc.filename_for(Component::Data))?;
        Ok(SSTableReader::internal_open(
            desc,
            self.components,
            self.metadata,
            self.partitioner,
            ifile,
            dfile,
            self.index.summary,
            self.index.filter,
            max_data_age,
            self.estimated_row_size,
            self.estimated_column_count,
        ))
    }
}

/// Writes both histograms, back to back, to the stats component of `desc`.
pub(crate) fn write_statistics(
    desc: &Descriptor,
    row_sizes: &EstimatedHistogram,
    column_counts: &EstimatedHistogram,
) -> Result<()> {
    let mut out = BufWriter::new(File::create(desc.filename_for(Component::Stats))?);
    row_sizes.write_to(&mut out)?;
    column_counts.write_to(&mut out)?;
    out.flush()?;
    out.into_inner().map_err(|e| e.into_error())?.sync_all()?;
    Ok(())
}

/// Renames every component in `components` from `tmpdesc` to its permanent
/// descriptor, which is returned.
///
/// Auxiliary components are renamed first and `Data` last: the table counts
/// as published once its data file carries the permanent name. A crash
/// before that leaves the data file temporary, and recovery rebuilds or
/// re-renames whatever auxiliary files are still temporary.
///
/// # Errors
///
/// [`SSTableError::Rename`] on the first failed rename; nothing is retried.
pub fn rename(tmpdesc: &Descriptor, components: &BTreeSet<Component>) -> Result<Descriptor> {
    let newdesc = tmpdesc.as_temporary(false);
    let ordered = components
        .iter()
        .filter(|c| **c != Component::Data)
        .chain(components.iter().filter(|c| **c == Component::Data));

    for component in ordered {
        let from = tmpdesc.filename_for(*component);
        let to = newdesc.filename_for(*component);
        fs::rename(&from, &to).map_err(|source| SSTableError::Rename { from, to, source })?;
    }

    // Fsync the directory so the renames survive a crash. Some platforms
    // cannot open a directory at all; a failed sync of an open one is fatal.
    match File::open(&newdesc.directory) {
        Ok(dir) => dir.sync_all()?,
        Err(e) => warn!("cannot open {} to sync renames: {}", newdesc.directory.display(), e),
    }

    debug!("renamed {} to {}", tmpdesc, newdesc);
    Ok(newdesc)
}

/// Estimates the number of rows in a data file from the average size of
/// its first rows.
///
/// At most 1000 rows or the first 100 MB are sampled, reading only each
/// row's key and length; row bodies are skipped. A file that ends inside a
/// sampled row is estimated from the rows before it. The reader is rewound
/// to the start before returning.
pub fn estimate_rows<R: Read + Seek>(desc: &Descriptor, dfile: &mut R) -> Result<u64> {
    let length = dfile.seek(SeekFrom::End(0))?;
    let bytes_cap = ESTIMATE_BYTES_CAP.min(length);

    let mut keys = 0u64;
    let mut data_position = 0u64;
    while data_position < bytes_cap && keys < ESTIMATE_SAMPLES_CAP {
        dfile.seek(SeekFrom::Start(data_position))?;
        let size = match read_short_bytes(dfile).and_then(|_| read_row_size(dfile, desc)) {
            Ok(size) => size,
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => break,
            Err(e) => return Err(e.into()),
        };
        data_position = dfile.stream_position()? + size;
        keys += 1;
    }
    dfile.seek(SeekFrom::Start(0))?;

    if keys == 0 {
        return Ok(0);
    }
    let average = (data_position / keys).max(1);
    Ok(length / average)
}

pub(crate) fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
