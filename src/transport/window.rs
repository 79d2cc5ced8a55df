//! Bounded window over the most recently received bytes.
//!
//! When a push would overflow the window, the oldest half is dropped in one
//! go rather than evicting a byte at a time. The cost is that a token or
//! frame header straddling that boundary is lost for good; the stream heals
//! at the next complete occurrence. This is accepted for the small fixed
//! memory footprint.

/// Bounded byte window with half-capacity eviction
#[derive(Debug, Clone)]
pub struct RollingWindow {
    buf: Vec<u8>,
    capacity: usize,
    /// Bytes discarded since creation; absolute position of `buf[0]`
    evicted: u64,
}

impl RollingWindow {
    /// Creates an empty window. Capacities below 2 are raised to 2.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(2);
        RollingWindow {
            buf: Vec::with_capacity(capacity),
            capacity,
            evicted: 0,
        }
    }

    /// Appends a byte, discarding the oldest half first if full
    pub fn push(&mut self, byte: u8) {
        if self.buf.len() == self.capacity {
            let half = self.capacity / 2;
            self.buf.drain(..half);
            self.evicted += half as u64;
            tracing::trace!(evicted = self.evicted, "window evicted oldest half");
        }
        self.buf.push(byte);
    }

    /// Substring search over the retained bytes
    pub fn contains(&self, token: &[u8]) -> bool {
        find(&self.buf, token)
    }

    /// Whether the retained bytes end with `token`
    pub fn ends_with(&self, token: &[u8]) -> bool {
        !token.is_empty() && self.buf.ends_with(token)
    }

    /// Absolute stream position just past the newest byte
    pub fn position(&self) -> u64 {
        self.evicted + self.buf.len() as u64
    }

    /// Retained bytes at or after absolute position `pos`
    pub fn since(&self, pos: u64) -> &[u8] {
        let start = pos.saturating_sub(self.evicted).min(self.buf.len() as u64);
        &self.buf[start as usize..]
    }

    /// Retained bytes
    pub fn as_slice(&self) -> &[u8] {
        &self.buf
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Drops every retained byte; positions keep counting
    pub fn clear(&mut self) {
        self.evicted += self.buf.len() as u64;
        self.buf.clear();
    }
}

/// Naive substring search; haystacks are a few hundred bytes at most
pub(crate) fn find(haystack: &[u8], needle: &[u8]) -> bool {
    !needle.is_empty() && haystack.windows(needle.len()).any(|w| w == needle)
}
