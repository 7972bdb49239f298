//! Chunk store - ordered, append-only record of written buffers

use bytes::Bytes;

/// One immutable buffer plus its position in the write sequence
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    seq: u64,
    data: Bytes,
}

impl Chunk {
    /// Zero-based position in the global write order
    pub fn seq(&self) -> u64 {
        self.seq
    }

    pub fn data(&self) -> &Bytes {
        &self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// Append-only chunk record
///
/// Every append is numbered. Chunks are retained for replay only when
/// `keep_cached` is set; otherwise only the counters advance.
#[derive(Debug)]
pub struct ChunkStore {
    keep_cached: bool,
    next_seq: u64,
    total_bytes: u64,
    cached: Vec<Chunk>,
}

impl ChunkStore {
    pub fn new(keep_cached: bool) -> Self {
        Self {
            keep_cached,
            next_seq: 0,
            total_bytes: 0,
            cached: Vec::new(),
        }
    }

    /// Record `data` as the next chunk
    pub fn append(&mut self, data: Bytes) -> Chunk {
        let chunk = Chunk {
            seq: self.next_seq,
            data,
        };
        self.next_seq += 1;
        self.total_bytes += chunk.len() as u64;
        if self.keep_cached {
            self.cached.push(chunk.clone());
        }
        chunk
    }

    /// Copy of the retained chunks in write order
    pub fn snapshot(&self) -> Vec<Chunk> {
        self.cached.clone()
    }

    /// Number of chunks recorded so far
    pub fn chunk_count(&self) -> u64 {
        self.next_seq
    }

    /// Number of bytes recorded so far
    pub fn total_bytes(&self) -> u64 {
        self.total_bytes
    }

    /// Number of chunks available for replay
    pub fn cached_count(&self) -> usize {
        self.cached.len()
    }
}
