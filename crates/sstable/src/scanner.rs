use std::fs::File;
use std::io::{self, BufReader, Read, Seek, SeekFrom};

use crate::descriptor::{Component, Descriptor};
use crate::error::{Result, SSTableError};
use crate::format::{read_row_size, read_short_bytes, row_size_width};

/// Key and framing of one row in the data file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowHeader {
    pub key: Vec<u8>,
    /// Offset of the row's key length field.
    pub position: u64,
    /// Length of the row body.
    pub body_len: u64,
    /// Total bytes the row occupies, key prefix and length field included.
    pub size_on_disk: u64,
}

/// Sequential reader over a data file.
///
/// [`next_header`](DataScanner::next_header) skips row bodies without
/// reading them; the `Iterator` impl yields each header with its body.
pub struct DataScanner<R> {
    input: BufReader<R>,
    desc: Descriptor,
    position: u64,
    length: u64,
}

impl DataScanner<File> {
    /// Opens the data component of `desc`.
    pub fn open(desc: &Descriptor) -> Result<Self> {
        let file = File::open(desc.filename_for(Component::Data))?;
        Self::new(file, desc)
    }
}

impl<R: Read + Seek> DataScanner<R> {
    /// Scans `input` from its start, decoding rows the way `desc`'s
    /// version wrote them.
    pub fn new(mut input: R, desc: &Descriptor) -> Result<Self> {
        let length = input.seek(SeekFrom::End(0))?;
        input.seek(SeekFrom::Start(0))?;
        Ok(Self {
            input: BufReader::new(input),
            desc: desc.clone(),
            position: 0,
            length,
        })
    }

    /// Offset of the next row.
    pub fn position(&self) -> u64 {
        self.position
    }

    fn read_header(&mut self) -> Result<Option<RowHeader>> {
        if self.position >= self.length {
            return Ok(None);
        }
        let position = self.position;
        let truncated = |e: io::Error| {
            if e.kind() == io::ErrorKind::UnexpectedEof {
                SSTableError::TruncatedRow { position }
            } else {
                SSTableError::Io(e)
            }
        };

        let key = read_short_bytes(&mut self.input).map_err(truncated)?;
        let body_len = read_row_size(&mut self.input, &self.desc).map_err(truncated)?;
        let header_len = 2 + key.len() as u64 + row_size_width(&self.desc);
        let size_on_disk = header_len + body_len;
        if position + size_on_disk > self.length {
            return Err(SSTableError::TruncatedRow { position });
        }

        self.position += header_len;
        Ok(Some(RowHeader {
            key,
            position,
            body_len,
            size_on_disk,
        }))
    }

    /// Reads the next row's header and skips its body.
    pub fn next_header(&mut self) -> Result<Option<RowHeader>> {
        let header = self.read_header()?;
        if let Some(h) = &header {
            self.input.seek_relative(h.body_len as i64)?;
            self.position += h.body_len;
        }
        Ok(header)
    }

    /// Reads the next row's header and body.
    pub fn next_row(&mut self) -> Result<Option<(RowHeader, Vec<u8>)>> {
        let Some(header) = self.read_header()? else {
            return Ok(None);
        };
        let mut body = vec![0u8; header.body_len as usize];
        self.input.read_exact(&mut body)?;
        self.position += header.body_len;
        Ok(Some((header, body)))
    }
}

impl<R: Read + Seek> Iterator for DataScanner<R> {
    type Item = Result<(RowHeader, Vec<u8>)>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_row().transpose()
    }
}
