//! Row content handed to the writer.
//!
//! The writer treats row bodies as opaque: a [`RowEncoder`] produces the
//! bytes and reports how many columns it wrote. [`ColumnFamily`] is the
//! encoder used by the shell and the tests; any other encoder works as long
//! as its output is deterministic.

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use std::collections::BTreeMap;
use std::io::{self, Read, Write};

use crate::format::{read_short_bytes, write_short_bytes};
use crate::key::DecoratedKey;

/// Serializes one row body.
pub trait RowEncoder {
    /// Writes the row body to `out` and returns the number of columns written.
    fn serialize(&self, out: &mut dyn Write) -> io::Result<u64>;
}

/// A row that already knows its framed, length-prefixed body, such as the
/// output of a merge.
pub trait CompactedRow {
    fn key(&self) -> &DecoratedKey;

    /// Writes `[row_len: i64 BE][row bytes]`.
    fn write(&self, out: &mut dyn Write) -> io::Result<()>;

    fn column_count(&self) -> u64;
}

/// A single named cell.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Column {
    pub value: Vec<u8>,
    pub timestamp: i64,
}

/// Columns of one row, sorted by name, plus row-level deletion info.
///
/// Encoding:
///
/// ```text
/// [local_deletion_time: i32][marked_for_delete_at: i64][column_count: i32]
/// column_count x [name_len: u16][name][timestamp: i64][value_len: i32][value]
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnFamily {
    columns: BTreeMap<Vec<u8>, Column>,
    local_deletion_time: i32,
    marked_for_delete_at: i64,
}

impl Default for ColumnFamily {
    fn default() -> Self {
        Self {
            columns: BTreeMap::new(),
            local_deletion_time: i32::MIN,
            marked_for_delete_at: i64::MIN,
        }
    }
}

impl ColumnFamily {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces a column; the newer timestamp wins.
    pub fn add_column(&mut self, name: impl Into<Vec<u8>>, value: impl Into<Vec<u8>>, timestamp: i64) {
        let name = name.into();
        if matches!(self.columns.get(&name), Some(existing) if existing.timestamp > timestamp) {
            return;
        }
        self.columns.insert(
            name,
            Column {
                value: value.into(),
                timestamp,
            },
        );
    }

    /// Marks the whole row deleted as of `marked_for_delete_at`.
    pub fn delete(&mut self, local_deletion_time: i32, marked_for_delete_at: i64) {
        self.local_deletion_time = self.local_deletion_time.max(local_deletion_time);
        self.marked_for_delete_at = self.marked_for_delete_at.max(marked_for_delete_at);
    }

    pub fn is_marked_for_delete(&self) -> bool {
        self.marked_for_delete_at > i64::MIN
    }

    pub fn get(&self, name: &[u8]) -> Option<&Column> {
        self.columns.get(name)
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn columns(&self) -> impl Iterator<Item = (&[u8], &Column)> {
        self.columns.iter().map(|(n, c)| (n.as_slice(), c))
    }

    /// Decodes a body written by [`RowEncoder::serialize`].
    pub fn deserialize<R: Read + ?Sized>(r: &mut R) -> io::Result<Self> {
        let local_deletion_time = r.read_i32::<BigEndian>()?;
        let marked_for_delete_at = r.read_i64::<BigEndian>()?;
        let count = r.read_i32::<BigEndian>()?;
        if count < 0 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("negative column count {}", count),
            ));
        }

        let mut columns = BTreeMap::new();
        for _ in 0..count {
            let name = read_short_bytes(r)?;
            let timestamp = r.read_i64::<BigEndian>()?;
            let len = r.read_i32::<BigEndian>()?;
            let len = usize::try_from(len).map_err(|_| {
                io::Error::new(io::ErrorKind::InvalidData, format!("negative value length {}", len))
            })?;
            let mut value = vec![0u8; len];
            r.read_exact(&mut value)?;
            columns.insert(name, Column { value, timestamp });
        }

        Ok(Self {
            columns,
            local_deletion_time,
            marked_for_delete_at,
        })
    }
}

impl RowEncoder for ColumnFamily {
    fn serialize(&self, out: &mut dyn Write) -> io::Result<u64> {
        out.write_i32::<BigEndian>(self.local_deletion_time)?;
        out.write_i64::<BigEndian>(self.marked_for_delete_at)?;
        let count = i32::try_from(self.columns.len())
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "too many columns"))?;
        out.write_i32::<BigEndian>(count)?;
        for (name, column) in &self.columns {
            write_short_bytes(out, name)?;
            out.write_i64::<BigEndian>(column.timestamp)?;
            let len = i32::try_from(column.value.len())
                .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "column value too large"))?;
            out.write_i32::<BigEndian>(len)?;
            out.write_all(&column.value)?;
        }
        Ok(self.columns.len() as u64)
    }
}

/// A row whose body has been serialized ahead of time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrecompactedRow {
    key: DecoratedKey,
    body: Vec<u8>,
    column_count: u64,
}

impl PrecompactedRow {
    /// Serializes `row` into memory so it can later be appended in one piece.
    pub fn new<E: RowEncoder + ?Sized>(key: DecoratedKey, row: &E) -> io::Result<Self> {
        let mut body = Vec::new();
        let column_count = row.serialize(&mut body)?;
        Ok(Self {
            key,
            body,
            column_count,
        })
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }
}

impl CompactedRow for PrecompactedRow {
    fn key(&self) -> &DecoratedKey {
        &self.key
    }

    fn write(&self, out: &mut dyn Write) -> io::Result<()> {
        out.write_i64::<BigEndian>(self.body.len() as i64)?;
        out.write_all(&self.body)
    }

    fn column_count(&self) -> u64 {
        self.column_count
    }
}
