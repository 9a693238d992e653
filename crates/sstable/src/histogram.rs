//! Bucketed estimates of row sizes and column counts.
//!
//! Bucket `i` counts values in `(offsets[i - 1], offsets[i]]`; bucket 0
//! counts values up to `offsets[0]` and one extra bucket past the last
//! offset catches everything larger, so no value is ever rejected.

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use std::io::{self, Read, Write};

/// Offsets of the row-size histogram.
pub const ROW_SIZE_BUCKETS: usize = 150;
/// Offsets of the column-count histogram.
pub const COLUMN_COUNT_BUCKETS: usize = 114;

/// Guard against allocating absurd histograms from a damaged stats file.
const MAX_SERIALIZED_BUCKETS: usize = 10_000;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EstimatedHistogram {
    offsets: Vec<u64>,
    buckets: Vec<u64>,
}

impl EstimatedHistogram {
    /// Creates an empty histogram with `offset_count` geometric offsets
    /// (1, 2, 3, 4, 5, 6, 7, 8, 10, 12, ... growing by ~20%).
    pub fn new(offset_count: usize) -> Self {
        let offset_count = offset_count.max(1);
        let mut offsets = Vec::with_capacity(offset_count);
        let mut last = 1u64;
        offsets.push(last);
        for _ in 1..offset_count {
            let mut next = (last as f64 * 1.2).round() as u64;
            if next == last {
                next += 1;
            }
            offsets.push(next);
            last = next;
        }
        Self {
            buckets: vec![0; offsets.len() + 1],
            offsets,
        }
    }

    pub fn row_sizes() -> Self {
        Self::new(ROW_SIZE_BUCKETS)
    }

    pub fn column_counts() -> Self {
        Self::new(COLUMN_COUNT_BUCKETS)
    }

    pub fn add(&mut self, value: u64) {
        let index = match self.offsets.binary_search(&value) {
            Ok(i) | Err(i) => i,
        };
        self.buckets[index] += 1;
    }

    pub fn offsets(&self) -> &[u64] {
        &self.offsets
    }

    pub fn buckets(&self) -> &[u64] {
        &self.buckets
    }

    /// Total number of recorded values.
    #[must_use]
    pub fn count(&self) -> u64 {
        self.buckets.iter().sum()
    }

    /// `true` if some value exceeded the largest offset.
    #[must_use]
    pub fn is_overflowed(&self) -> bool {
        self.buckets[self.buckets.len() - 1] > 0
    }

    /// Lower bound of the smallest non-empty bucket, 0 if empty.
    #[must_use]
    pub fn min(&self) -> u64 {
        match self.buckets.iter().position(|&b| b > 0) {
            Some(0) | None => 0,
            Some(i) => self.offsets[i - 1],
        }
    }

    /// Upper bound of the largest non-empty bucket, `u64::MAX` if overflowed.
    #[must_use]
    pub fn max(&self) -> u64 {
        match self.buckets.iter().rposition(|&b| b > 0) {
            None => 0,
            Some(i) if i == self.offsets.len() => u64::MAX,
            Some(i) => self.offsets[i],
        }
    }

    /// Mean estimated from bucket upper bounds, rounded up. The overflow
    /// bucket is counted at the largest offset.
    #[must_use]
    pub fn mean(&self) -> u64 {
        let count = self.count();
        if count == 0 {
            return 0;
        }
        let last = self.offsets[self.offsets.len() - 1];
        let sum: u128 = self
            .buckets
            .iter()
            .enumerate()
            .map(|(i, &b)| b as u128 * self.offsets.get(i).copied().unwrap_or(last) as u128)
            .sum();
        sum.div_ceil(count as u128) as u64
    }

    /// Serialized form:
    ///
    /// ```text
    /// [bucket_count: i32 BE]
    /// bucket_count x [offset: i64 BE][count: i64 BE]
    /// ```
    ///
    /// Bucket `i` is paired with `offsets[i - 1]` (bucket 0 with `offsets[0]`).
    pub fn write_to<W: Write + ?Sized>(&self, w: &mut W) -> io::Result<()> {
        w.write_i32::<BigEndian>(self.buckets.len() as i32)?;
        for (i, &count) in self.buckets.iter().enumerate() {
            w.write_i64::<BigEndian>(self.offsets[i.saturating_sub(1)] as i64)?;
            w.write_i64::<BigEndian>(count as i64)?;
        }
        Ok(())
    }

    pub fn read_from<R: Read + ?Sized>(r: &mut R) -> io::Result<Self> {
        let size = r.read_i32::<BigEndian>()?;
        let size = usize::try_from(size).unwrap_or(0);
        if !(2..=MAX_SERIALIZED_BUCKETS).contains(&size) {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("invalid histogram bucket count {}", size),
            ));
        }

        let mut offsets = vec![0u64; size - 1];
        let mut buckets = vec![0u64; size];
        for (i, bucket) in buckets.iter_mut().enumerate() {
            offsets[i.saturating_sub(1)] = r.read_i64::<BigEndian>()? as u64;
            *bucket = r.read_i64::<BigEndian>()? as u64;
        }
        Ok(Self { offsets, buckets })
    }
}
