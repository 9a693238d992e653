//! Segmented access to finished component files.
//!
//! While a component is written, its writer reports every record start as a
//! potential segment boundary. When the file is complete, the builder turns
//! the boundaries it kept into segments: in [`DiskAccessMode::Mmap`] each
//! segment no larger than the configured maximum is memory-mapped, while a
//! segment holding a single oversized record stays on buffered reads. In
//! [`DiskAccessMode::Standard`] the whole file is one buffered segment.

use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use config::DiskAccessMode;
use memmap2::{Mmap, MmapOptions};

/// Collects boundaries while a component file is being written.
#[derive(Debug)]
pub struct SegmentedFileBuilder {
    mode: DiskAccessMode,
    max_segment_size: u64,
    boundaries: Vec<u64>,
    current_start: u64,
    current_size: u64,
}

impl SegmentedFileBuilder {
    pub fn new(mode: DiskAccessMode, max_segment_size: u64) -> Self {
        Self {
            mode,
            max_segment_size: max_segment_size.max(1),
            boundaries: Vec::new(),
            current_start: 0,
            current_size: 0,
        }
    }

    /// Offers the start offset of a record as a place where a segment may
    /// begin. Offsets must be non-decreasing.
    pub fn add_potential_boundary(&mut self, boundary: u64) {
        if self.mode == DiskAccessMode::Standard {
            return;
        }
        if boundary - self.current_start <= self.max_segment_size {
            // still fits: grow the current segment up to this record
            self.current_size = boundary - self.current_start;
            return;
        }

        // close the current segment at the last boundary that fit
        if self.current_size > 0 {
            self.current_start += self.current_size;
            self.boundaries.push(self.current_start);
        }
        self.current_size = boundary - self.current_start;

        // a single record larger than a segment gets a segment of its own
        if self.current_size > self.max_segment_size {
            self.current_start = boundary;
            self.boundaries.push(boundary);
            self.current_size = 0;
        }
    }

    /// Boundaries chosen so far, excluding the implicit one at offset 0.
    pub fn boundaries(&self) -> &[u64] {
        &self.boundaries
    }

    /// Opens the finished file at `path` and splits it into segments.
    pub fn complete<P: AsRef<Path>>(mut self, path: P) -> io::Result<SegmentedFile> {
        let path = path.as_ref().to_path_buf();
        let file = File::open(&path)?;
        let length = file.metadata()?.len();
        // end of file closes the last segment like any other boundary
        self.add_potential_boundary(length);

        let mut starts = vec![0u64];
        starts.extend(self.boundaries.iter().copied().filter(|&b| b > 0 && b < length));
        starts.dedup();

        let mut segments = Vec::with_capacity(starts.len());
        for (i, &start) in starts.iter().enumerate() {
            let end = starts.get(i + 1).copied().unwrap_or(length);
            let len = end - start;
            let map = if self.mode == DiskAccessMode::Mmap && len > 0 && len <= self.max_segment_size {
                // SAFETY: component files are immutable once complete; the
                // table is never rewritten in place.
                Some(unsafe { MmapOptions::new().offset(start).len(len as usize).map(&file)? })
            } else {
                None
            };
            segments.push(Segment { start, len, map });
        }

        Ok(SegmentedFile {
            path,
            length,
            mode: self.mode,
            segments,
        })
    }
}

/// A contiguous byte range of a component file.
#[derive(Debug)]
pub struct Segment {
    pub start: u64,
    pub len: u64,
    map: Option<Mmap>,
}

impl Segment {
    pub fn is_mapped(&self) -> bool {
        self.map.is_some()
    }

    fn contains(&self, position: u64) -> bool {
        position >= self.start && position < self.start + self.len
    }
}

/// An immutable, segment-aware handle to a finished component file.
#[derive(Debug)]
pub struct SegmentedFile {
    path: PathBuf,
    length: u64,
    mode: DiskAccessMode,
    segments: Vec<Segment>,
}

impl SegmentedFile {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn length(&self) -> u64 {
        self.length
    }

    pub fn mode(&self) -> DiskAccessMode {
        self.mode
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// The segment containing `position`, if it lies inside the file.
    pub fn segment_for(&self, position: u64) -> Option<&Segment> {
        let idx = self.segments.partition_point(|s| s.start <= position);
        idx.checked_sub(1)
            .map(|i| &self.segments[i])
            .filter(|s| s.contains(position))
    }

    /// Fills `buf` with the bytes starting at `position`, from the mapped
    /// segment when the range lies inside one, otherwise from the file.
    pub fn read_exact_at(&self, position: u64, buf: &mut [u8]) -> io::Result<()> {
        let end = position + buf.len() as u64;
        if end > self.length {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!("read of {} bytes at {} past end of {}", buf.len(), position, self.path.display()),
            ));
        }
        if let Some(segment) = self.segment_for(position) {
            if let Some(map) = &segment.map {
                if end <= segment.start + segment.len {
                    let from = (position - segment.start) as usize;
                    buf.copy_from_slice(&map[from..from + buf.len()]);
                    return Ok(());
                }
            }
        }
        let mut file = File::open(&self.path)?;
        file.seek(SeekFrom::Start(position))?;
        file.read_exact(buf)
    }
}
