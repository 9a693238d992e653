use anyhow::{bail, Context, Result};
use config::Config;
use log::{info, warn};
use sstable::{
    recover_and_open, ColumnFamily, Component, Descriptor, IndexRebuilder, Partitioner, SSTableReader,
    SSTableWriter, TableMetadata,
};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

/// Keys the filter of a new table is sized for.
const EXPECTED_KEYS: u64 = 10_000;

/// Column every shell value is stored under.
pub const VALUE_COLUMN: &[u8] = b"value";

/// The published tables of one column family in one directory, plus at most
/// one table being written.
///
/// The directory name is the keyspace. Generations are allocated above the
/// highest one found on disk, temporary tables included, so a new table never
/// reuses the name of an unfinished one.
pub struct TableStore {
    dir: PathBuf,
    metadata: Arc<TableMetadata>,
    partitioner: Arc<dyn Partitioner>,
    config: Config,
    tables: BTreeMap<u64, SSTableReader>,
    writer: Option<SSTableWriter>,
    next_generation: u64,
}

impl TableStore {
    /// Opens every published table of `table` under `dir`, creating the
    /// directory if needed. Temporary tables are left alone until
    /// [`recover`](TableStore::recover) is called.
    pub fn open<P: AsRef<Path>>(
        dir: P,
        table: &str,
        partitioner: Arc<dyn Partitioner>,
        config: Config,
    ) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        config.validate()?;
        let keyspace = dir
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        Descriptor::new(&dir, keyspace.clone(), table, 0, true).validate()?;
        fs::create_dir_all(&dir).with_context(|| format!("creating {}", dir.display()))?;
        let metadata = Arc::new(TableMetadata::new(keyspace, table));

        let mut store = Self {
            dir,
            metadata,
            partitioner,
            config,
            tables: BTreeMap::new(),
            writer: None,
            next_generation: 1,
        };

        for (desc, component) in store.list_components()? {
            store.next_generation = store.next_generation.max(desc.generation + 1);
            if component == Component::Data && !desc.temporary {
                let reader = SSTableReader::open(&desc, store.metadata.clone(), store.partitioner.clone(), &store.config)
                    .with_context(|| format!("opening {}", desc))?;
                store.tables.insert(desc.generation, reader);
            }
        }
        Ok(store)
    }

    /// Every component file of this store's table in the directory.
    fn list_components(&self) -> Result<Vec<(Descriptor, Component)>> {
        let mut found = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let path = entry?.path();
            match Descriptor::from_filename(&path) {
                Ok((desc, component)) if desc.table == self.metadata.name => found.push((desc, component)),
                Ok(_) => {}
                Err(_) => warn!("ignoring unrecognized file {}", path.display()),
            }
        }
        found.sort_by_key(|(desc, component)| (desc.generation, *component));
        Ok(found)
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn metadata(&self) -> &TableMetadata {
        &self.metadata
    }

    pub fn tables(&self) -> impl Iterator<Item = &SSTableReader> {
        self.tables.values()
    }

    pub fn table(&self, generation: u64) -> Option<&SSTableReader> {
        self.tables.get(&generation)
    }

    /// Rows appended to the table being written, 0 if none is open.
    pub fn pending_rows(&self) -> u64 {
        self.writer.as_ref().map_or(0, SSTableWriter::rows_written)
    }

    /// Appends `value` under `key` to the table being written, starting a
    /// new one if needed. Keys must arrive in ascending order per table.
    pub fn append(&mut self, key: &[u8], value: &[u8]) -> Result<()> {
        let key = self.partitioner.decorate_key(key.to_vec());
        let mut row = ColumnFamily::new();
        row.add_column(VALUE_COLUMN, value, now_micros());

        let writer = match self.writer.take() {
            Some(writer) => writer,
            None => self.start_table()?,
        };
        let writer = self.writer.insert(writer);
        writer.append(&key, &row)?;
        Ok(())
    }

    fn start_table(&mut self) -> Result<SSTableWriter> {
        let desc = Descriptor::new(
            &self.dir,
            self.metadata.keyspace.clone(),
            self.metadata.name.clone(),
            self.next_generation,
            true,
        );
        self.next_generation += 1;
        let writer = SSTableWriter::new(
            desc,
            EXPECTED_KEYS,
            self.metadata.clone(),
            self.partitioner.clone(),
            &self.config,
        )?;
        info!("started {}", writer.descriptor());
        Ok(writer)
    }

    /// Finalizes and publishes the table being written. Returns `None` if
    /// nothing was appended since the last flush.
    pub fn flush(&mut self) -> Result<Option<&SSTableReader>> {
        let Some(writer) = self.writer.take() else {
            return Ok(None);
        };
        let reader = writer.close_and_open_reader()?;
        info!("published {} ({} keys)", reader.descriptor(), reader.estimated_keys());
        let generation = reader.descriptor().generation;
        self.tables.insert(generation, reader);
        Ok(self.tables.get(&generation))
    }

    /// Drops the table being written without finalizing it; its temporary
    /// files stay on disk for [`recover`](TableStore::recover).
    pub fn abort(&mut self) -> Option<Descriptor> {
        self.writer.take().map(|w| w.descriptor().clone())
    }

    /// Finishes every temporary table in the directory other than the one
    /// being written, rebuilding index and filter where they are incomplete.
    /// Returns the generations recovered.
    pub fn recover(&mut self) -> Result<Vec<u64>> {
        let writing = self.writer.as_ref().map(|w| w.descriptor().generation);
        let rebuilder = IndexRebuilder::new(self.partitioner.clone(), self.config.clone());

        let mut recovered = Vec::new();
        for (desc, component) in self.list_components()? {
            if component != Component::Data || !desc.temporary || Some(desc.generation) == writing {
                continue;
            }
            let reader = recover_and_open(&desc, &rebuilder, self.metadata.clone(), self.partitioner.clone(), &self.config)
                .with_context(|| format!("recovering {}", desc))?;
            recovered.push(desc.generation);
            self.tables.insert(desc.generation, reader);
        }
        Ok(recovered)
    }

    /// Every row of a published table as `(key, value)`.
    pub fn scan(&self, generation: u64) -> Result<Vec<(Vec<u8>, Vec<u8>)>> {
        let Some(reader) = self.tables.get(&generation) else {
            bail!("no published table with generation {}", generation);
        };
        let mut rows = Vec::new();
        for row in reader.scanner()? {
            let (header, body) = row?;
            let cf = ColumnFamily::deserialize(&mut body.as_slice())
                .with_context(|| format!("decoding row at offset {}", header.position))?;
            let value = cf.get(VALUE_COLUMN).map(|c| c.value.clone()).unwrap_or_default();
            rows.push((header.key, value));
        }
        Ok(rows)
    }
}

impl std::fmt::Debug for TableStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TableStore")
            .field("dir", &self.dir)
            .field("table", &self.metadata.name)
            .field("partitioner", &self.partitioner.name())
            .field("tables", &self.tables.keys().collect::<Vec<_>>())
            .field("writing", &self.writer.as_ref().map(|w| w.descriptor().to_string()))
            .field("pending_rows", &self.pending_rows())
            .field("next_generation", &self.next_generation)
            .finish()
    }
}

fn now_micros() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_micros() as i64)
        .unwrap_or(0)
}
