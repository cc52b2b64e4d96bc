//! Memory reclaim hook for chunked exports.

/// Releases scratch buffer capacity between export chunks.
///
/// Best-effort: the hook only trims buffers it is handed and keeps a count of
/// how often it ran. Exports are correct with or without it.
#[derive(Debug, Clone, Default)]
pub struct MemoryReclaimer {
    limit_bytes: Option<usize>,
    cycles: usize,
    released_bytes: usize,
}

impl MemoryReclaimer {
    /// Creates a reclaimer that shrinks buffers above `limit_bytes`
    /// (or every buffer, when no limit is set).
    #[must_use]
    pub const fn new(limit_bytes: Option<usize>) -> Self {
        Self {
            limit_bytes,
            cycles: 0,
            released_bytes: 0,
        }
    }

    /// Clears `scratch` and releases capacity beyond the limit.
    pub fn reclaim<T>(&mut self, scratch: &mut Vec<T>) {
        self.cycles += 1;
        scratch.clear();

        let element = std::mem::size_of::<T>().max(1);
        let keep = self.limit_bytes.unwrap_or(0) / element;
        let before = scratch.capacity();
        if before > keep {
            scratch.shrink_to(keep);
        }
        let released = before.saturating_sub(scratch.capacity()) * element;
        self.released_bytes += released;

        tracing::trace!(cycle = self.cycles, released, "Reclaimed export scratch buffer");
    }

    /// Number of reclaim cycles run.
    #[must_use]
    pub const fn cycles(&self) -> usize {
        self.cycles
    }

    /// Total capacity released, in bytes.
    #[must_use]
    pub const fn released_bytes(&self) -> usize {
        self.released_bytes
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reclaim_shrinks_above_limit() {
        let mut reclaimer = MemoryReclaimer::new(Some(16));
        let mut scratch: Vec<u8> = Vec::with_capacity(4096);
        scratch.extend_from_slice(&[1u8; 100]);

        reclaimer.reclaim(&mut scratch);

        assert!(scratch.is_empty());
        assert!(scratch.capacity() < 4096);
        assert_eq!(reclaimer.cycles(), 1);
        assert!(reclaimer.released_bytes() > 0);
    }

    #[test]
    fn test_reclaim_leaves_small_buffers() {
        let mut reclaimer = MemoryReclaimer::new(Some(1024));
        let mut scratch: Vec<u64> = Vec::with_capacity(64);
        reclaimer.reclaim(&mut scratch);
        assert_eq!(reclaimer.released_bytes(), 0);
    }
}
