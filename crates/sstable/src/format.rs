//! Record-level encoding shared by the data and index files.
//!
//! ## Data file (`Data.db`)
//!
//! ```text
//! [key_len: u16 BE][key][row_len: i64 BE][row bytes]     (version >= "b")
//! [key_len: u16 BE][key][row_len: i32 BE][row bytes]     (older versions)
//! ```
//!
//! ## Index file (`Index.db`)
//!
//! ```text
//! [key_len: u16 BE][key][data_offset: i64 BE]
//! ```
//!
//! Records are packed back to back in ascending key order, with no padding
//! and no footer. All integers are big-endian.

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use std::io::{self, Read, Write};

use crate::descriptor::Descriptor;

/// Longest key the short length prefix can describe.
pub const MAX_KEY_LEN: usize = u16::MAX as usize;

/// Value written into the row length field before it is back-patched.
pub const ROW_SIZE_PLACEHOLDER: i64 = -1;

/// Width of the row length field in current-version data files.
pub const ROW_SIZE_BYTES: u64 = 8;

/// Writes `bytes` prefixed by its length as an unsigned short.
pub fn write_short_bytes<W: Write + ?Sized>(w: &mut W, bytes: &[u8]) -> io::Result<()> {
    let len = u16::try_from(bytes.len()).map_err(|_| {
        io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("{} bytes do not fit a short length prefix", bytes.len()),
        )
    })?;
    w.write_u16::<BigEndian>(len)?;
    w.write_all(bytes)
}

/// Reads a value written by [`write_short_bytes`].
pub fn read_short_bytes<R: Read + ?Sized>(r: &mut R) -> io::Result<Vec<u8>> {
    let len = r.read_u16::<BigEndian>()? as usize;
    let mut bytes = vec![0u8; len];
    r.read_exact(&mut bytes)?;
    Ok(bytes)
}

/// Reads the length field that follows a row's key, honouring the width
/// used by `desc`'s format version.
pub fn read_row_size<R: Read + ?Sized>(r: &mut R, desc: &Descriptor) -> io::Result<u64> {
    let size = if desc.has_long_row_size() {
        r.read_i64::<BigEndian>()?
    } else {
        i64::from(r.read_i32::<BigEndian>()?)
    };
    u64::try_from(size).map_err(|_| {
        io::Error::new(io::ErrorKind::InvalidData, format!("negative row size {}", size))
    })
}

/// Width of the row length field for `desc`'s format version.
#[must_use]
pub fn row_size_width(desc: &Descriptor) -> u64 {
    if desc.has_long_row_size() {
        ROW_SIZE_BYTES
    } else {
        4
    }
}

/// Writes one index record.
pub fn write_index_entry<W: Write + ?Sized>(w: &mut W, key: &[u8], data_offset: u64) -> io::Result<()> {
    write_short_bytes(w, key)?;
    w.write_i64::<BigEndian>(data_offset as i64)
}

/// Reads one index record as `(key, data_offset)`.
pub fn read_index_entry<R: Read + ?Sized>(r: &mut R) -> io::Result<(Vec<u8>, u64)> {
    let key = read_short_bytes(r)?;
    let offset = r.read_i64::<BigEndian>()?;
    let offset = u64::try_from(offset).map_err(|_| {
        io::Error::new(io::ErrorKind::InvalidData, format!("negative data offset {}", offset))
    })?;
    Ok((key, offset))
}
