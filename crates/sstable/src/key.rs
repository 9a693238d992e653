//! Partition keys and their ordering.

use std::fmt;

use crc32fast::Hasher as Crc32;

/// Position of a key on the partitioner's ring, compared bytewise.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Token(Vec<u8>);

impl Token {
    pub fn new(bytes: Vec<u8>) -> Self {
        Token(bytes)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

/// A partition key paired with its token.
///
/// Keys order by token first and raw key bytes second; the derived `Ord`
/// relies on the field order below.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DecoratedKey {
    token: Token,
    key: Vec<u8>,
}

impl DecoratedKey {
    pub fn new(token: Token, key: Vec<u8>) -> Self {
        Self { token, key }
    }

    pub fn token(&self) -> &Token {
        &self.token
    }

    /// Raw key bytes, as written to the data and index files.
    pub fn key(&self) -> &[u8] {
        &self.key
    }

    pub fn into_key(self) -> Vec<u8> {
        self.key
    }
}

impl fmt::Display for DecoratedKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DecoratedKey({}, {})", self.token.0.escape_ascii(), self.key.escape_ascii())
    }
}

/// Derives tokens for keys; the writer's ascending-order check follows the
/// resulting [`DecoratedKey`] order.
pub trait Partitioner: Send + Sync + fmt::Debug {
    /// Name recorded in logs and diagnostics.
    fn name(&self) -> &'static str;

    fn token(&self, key: &[u8]) -> Token;

    fn decorate_key(&self, key: Vec<u8>) -> DecoratedKey {
        let token = self.token(&key);
        DecoratedKey::new(token, key)
    }
}

/// Orders keys by their raw bytes.
#[derive(Debug, Clone, Copy, Default)]
pub struct ByteOrderedPartitioner;

impl Partitioner for ByteOrderedPartitioner {
    fn name(&self) -> &'static str {
        "ByteOrderedPartitioner"
    }

    fn token(&self, key: &[u8]) -> Token {
        Token(key.to_vec())
    }
}

/// Spreads keys by the big-endian CRC32 of their bytes.
#[derive(Debug, Clone, Copy, Default)]
pub struct HashPartitioner;

impl Partitioner for HashPartitioner {
    fn name(&self) -> &'static str {
        "HashPartitioner"
    }

    fn token(&self, key: &[u8]) -> Token {
        let mut hasher = Crc32::new();
        hasher.update(key);
        Token(hasher.finalize().to_be_bytes().to_vec())
    }
}
