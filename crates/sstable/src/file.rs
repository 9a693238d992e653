use std::fs::{File, OpenOptions};
use std::io::{self, BufWriter, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

/// Buffered file writer that tracks its own position, so asking for the
/// current offset never forces a flush. Seeking flushes the buffer first.
pub(crate) struct RandomAccessWriter {
    path: PathBuf,
    out: BufWriter<File>,
    position: u64,
}

impl RandomAccessWriter {
    /// Creates (or truncates) `path` for writing.
    pub(crate) fn create(path: &Path, buffer_size: usize) -> io::Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(path)?;
        Ok(Self {
            path: path.to_path_buf(),
            out: BufWriter::with_capacity(buffer_size, file),
            position: 0,
        })
    }

    pub(crate) fn position(&self) -> u64 {
        self.position
    }

    pub(crate) fn path(&self) -> &Path {
        &self.path
    }

    pub(crate) fn seek(&mut self, position: u64) -> io::Result<()> {
        self.out.seek(SeekFrom::Start(position))?;
        self.position = position;
        Ok(())
    }

    /// Flushes, fsyncs and closes the file.
    pub(crate) fn sync_and_close(self) -> io::Result<()> {
        let file = self.out.into_inner().map_err(|e| e.into_error())?;
        file.sync_all()
    }
}

impl Write for RandomAccessWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.out.write(buf)?;
        self.position += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.out.flush()
    }
}
