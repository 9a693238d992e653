//! # Bloom
//!
//! Membership filter persisted as a table's `Filter.db`. A negative answer is
//! exact; a positive one is wrong with roughly the configured probability.
//!
//! Keys are added to a [`BloomFilterBuilder`] while a table is written.
//! [`BloomFilterBuilder::build`] consumes it and yields the immutable
//! [`BloomFilter`] that is serialized and queried.
//!
//! ```rust,no_run
//! use bloom::BloomFilterBuilder;
//!
//! let mut builder = BloomFilterBuilder::new(1000, 0.01);
//! builder.insert(b"alice");
//! let filter = builder.build();
//! assert!(filter.may_contain(b"alice"));
//! ```
//!
//! ## Serialized form
//!
//! ```text
//! [hash_count: i32 BE][word_count: i32 BE][word: i64 BE] x word_count
//! ```

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use std::f64::consts::LN_2;
use std::io::{self, Read, Write};

/// Largest bitset accepted from disk: 16 Mi words, 128 MiB.
const MAX_WORDS: usize = 16 * 1024 * 1024;

/// More probes than this never pays off at any sane false-positive rate.
const MAX_HASH_COUNT: u32 = 64;

/// Bits per key and probes per key for a target false-positive rate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BloomSpec {
    pub buckets_per_element: u32,
    pub hash_count: u32,
}

impl BloomSpec {
    /// Smallest layout reaching `false_positive_rate`, from the usual
    /// `m/n = -ln(p) / ln(2)^2` and `k = m/n * ln(2)`.
    #[must_use]
    pub fn for_false_positive_rate(false_positive_rate: f64) -> Self {
        let buckets = (-false_positive_rate.ln() / (LN_2 * LN_2)).ceil().max(1.0);
        let hashes = (buckets * LN_2).round().clamp(1.0, MAX_HASH_COUNT as f64);
        Self {
            buckets_per_element: buckets as u32,
            hash_count: hashes as u32,
        }
    }
}

/// Write-phase filter.
pub struct BloomFilterBuilder {
    words: Vec<u64>,
    hash_count: u32,
    inserted: u64,
}

impl BloomFilterBuilder {
    /// Sizes an empty filter for `expected_items` keys.
    ///
    /// # Panics
    ///
    /// Panics if `expected_items` is 0 or `false_positive_rate` is not in `(0, 1)`.
    pub fn new(expected_items: usize, false_positive_rate: f64) -> Self {
        assert!(expected_items > 0, "expected_items must be > 0");
        assert!(
            false_positive_rate > 0.0 && false_positive_rate < 1.0,
            "false_positive_rate must be in (0, 1)"
        );

        let spec = BloomSpec::for_false_positive_rate(false_positive_rate);
        let bits = (expected_items as u64).saturating_mul(spec.buckets_per_element as u64);
        let word_count = bits.div_ceil(64).clamp(1, MAX_WORDS as u64) as usize;
        Self {
            words: vec![0; word_count],
            hash_count: spec.hash_count,
            inserted: 0,
        }
    }

    pub fn insert(&mut self, key: &[u8]) {
        let num_bits = self.words.len() as u64 * 64;
        for bit in probes(key, self.hash_count, num_bits) {
            self.words[(bit / 64) as usize] |= 1u64 << (bit % 64);
        }
        self.inserted += 1;
    }

    /// Keys inserted so far, duplicates included.
    #[must_use]
    pub fn inserted(&self) -> u64 {
        self.inserted
    }

    /// Freezes the filter; nothing can be added once it may have been persisted.
    #[must_use]
    pub fn build(self) -> BloomFilter {
        BloomFilter {
            words: self.words,
            hash_count: self.hash_count,
        }
    }
}

impl std::fmt::Debug for BloomFilterBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BloomFilterBuilder")
            .field("words", &self.words.len())
            .field("hash_count", &self.hash_count)
            .field("inserted", &self.inserted)
            .finish()
    }
}

/// Frozen filter, freshly built or loaded from disk.
#[derive(Clone, PartialEq, Eq)]
pub struct BloomFilter {
    words: Vec<u64>,
    hash_count: u32,
}

impl BloomFilter {
    /// `false` means `key` was never inserted.
    #[must_use]
    pub fn may_contain(&self, key: &[u8]) -> bool {
        probes(key, self.hash_count, self.num_bits())
            .all(|bit| self.words[(bit / 64) as usize] & (1u64 << (bit % 64)) != 0)
    }

    #[must_use]
    pub fn num_bits(&self) -> u64 {
        self.words.len() as u64 * 64
    }

    #[must_use]
    pub fn num_hashes(&self) -> u32 {
        self.hash_count
    }

    #[must_use]
    pub fn serialized_size(&self) -> usize {
        4 + 4 + 8 * self.words.len()
    }

    pub fn write_to<W: Write + ?Sized>(&self, w: &mut W) -> io::Result<()> {
        w.write_i32::<BigEndian>(self.hash_count as i32)?;
        w.write_i32::<BigEndian>(self.words.len() as i32)?;
        for &word in &self.words {
            w.write_u64::<BigEndian>(word)?;
        }
        Ok(())
    }

    /// Loads a filter written by [`write_to`](BloomFilter::write_to).
    ///
    /// Header values no builder could produce are rejected before anything
    /// is allocated.
    pub fn read_from<R: Read + ?Sized>(r: &mut R) -> io::Result<Self> {
        let hash_count = r.read_i32::<BigEndian>()?;
        let word_count = r.read_i32::<BigEndian>()?;

        let hash_count = u32::try_from(hash_count)
            .ok()
            .filter(|h| (1..=MAX_HASH_COUNT).contains(h))
            .ok_or_else(|| invalid(format!("bad hash count {}", hash_count)))?;
        let word_count = usize::try_from(word_count)
            .ok()
            .filter(|w| (1..=MAX_WORDS).contains(w))
            .ok_or_else(|| invalid(format!("bad bitset size {} words", word_count)))?;

        let mut words = vec![0u64; word_count];
        r.read_u64_into::<BigEndian>(&mut words)?;
        Ok(Self { words, hash_count })
    }
}

impl std::fmt::Debug for BloomFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BloomFilter")
            .field("num_bits", &self.num_bits())
            .field("hash_count", &self.hash_count)
            .field("bits_set", &self.words.iter().map(|w| w.count_ones() as u64).sum::<u64>())
            .finish()
    }
}

fn invalid(msg: String) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, msg)
}

/// Bit positions probed for `key`: `h1 + i * h2` over `num_bits`
/// (Kirsch-Mitzenmacher double hashing).
fn probes(key: &[u8], hash_count: u32, num_bits: u64) -> impl Iterator<Item = u64> {
    let h1 = fnv1a(key);
    let h2 = mix(h1) | 1;
    (0..hash_count as u64).map(move |i| h1.wrapping_add(i.wrapping_mul(h2)) % num_bits)
}

fn fnv1a(data: &[u8]) -> u64 {
    data.iter().fold(0xcbf2_9ce4_8422_2325_u64, |hash, &b| {
        (hash ^ b as u64).wrapping_mul(0x0000_0100_0000_01b3)
    })
}

/// SplitMix64 finalizer.
fn mix(mut z: u64) -> u64 {
    z = (z ^ (z >> 30)).wrapping_mul(0xbf58_476d_1ce4_e5b9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94d0_49bb_1331_11eb);
    z ^ (z >> 31)
}
