/// One data segment received out of order, pending in-order delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BufferedSegment {
    /// Logical byte offset of the segment's first byte in the file.
    pub offset: u64,
    pub data: Vec<u8>,
}

/// Receiver-side holding area for data segments that arrived ahead of the
/// delivery cursor.
///
/// Capacity is fixed at construction (one sequence-space cycle's worth of
/// segments); a full buffer rejects new insertions rather than overflowing.
#[derive(Debug)]
pub struct ReassemblyBuffer {
    items: Vec<BufferedSegment>,
    capacity: usize,
}

impl ReassemblyBuffer {
    pub fn new(capacity: usize) -> Self {
        ReassemblyBuffer {
            items: Vec::with_capacity(capacity),
            capacity,
        }
    }

    /// Buffer a segment. Returns `false` without storing anything when the
    /// buffer is full or the offset is already present. The duplicate scan
    /// covers the full active set; no deduplication happens elsewhere.
    pub fn insert(&mut self, offset: u64, data: &[u8]) -> bool {
        if self.items.len() == self.capacity {
            return false;
        }
        if self.items.iter().any(|seg| seg.offset == offset) {
            return false;
        }
        self.items.push(BufferedSegment {
            offset,
            data: data.to_vec(),
        });
        true
    }

    /// Remove and return the segment whose offset equals the delivery
    /// cursor, compacting the collection. `None` when no entry is ready.
    pub fn take_ready(&mut self, cursor: u64) -> Option<BufferedSegment> {
        let index = self.items.iter().position(|seg| seg.offset == cursor)?;
        Some(self.items.remove(index))
    }

    pub fn contains(&self, offset: u64) -> bool {
        self.items.iter().any(|seg| seg.offset == offset)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

// -- Unit tests --

#[cfg(test)]
mod tests {
    use super::*;
    use rand::seq::SliceRandom;

    #[test]
    fn test_insert_and_take() {
        let mut buf = ReassemblyBuffer::new(8);
        assert!(buf.insert(0, b"abcd"));
        assert!(buf.insert(4, b"efgh"));
        assert_eq!(buf.len(), 2);

        let seg = buf.take_ready(0).unwrap();
        assert_eq!(seg.offset, 0);
        assert_eq!(seg.data, b"abcd");
        assert_eq!(buf.len(), 1);
    }

    #[test]
    fn test_duplicate_offset_rejected() {
        let mut buf = ReassemblyBuffer::new(8);
        assert!(buf.insert(512, b"first"));
        assert!(!buf.insert(512, b"second"));
        assert_eq!(buf.len(), 1);

        // The original bytes survive
        assert_eq!(buf.take_ready(512).unwrap().data, b"first");
    }

    #[test]
    fn test_full_buffer_rejects() {
        let mut buf = ReassemblyBuffer::new(2);
        assert!(buf.insert(0, b"a"));
        assert!(buf.insert(1, b"b"));
        assert!(!buf.insert(2, b"c"));
        assert_eq!(buf.len(), 2);
    }

    #[test]
    fn test_take_ready_misses_gap() {
        let mut buf = ReassemblyBuffer::new(8);
        buf.insert(512, b"later");
        assert!(buf.take_ready(0).is_none());
        assert_eq!(buf.len(), 1);
    }

    #[test]
    fn test_remove_compacts() {
        let mut buf = ReassemblyBuffer::new(8);
        buf.insert(0, b"a");
        buf.insert(1, b"b");
        buf.insert(2, b"c");

        buf.take_ready(1).unwrap();
        assert_eq!(buf.len(), 2);
        assert!(buf.contains(0));
        assert!(buf.contains(2));
        assert!(!buf.contains(1));
    }

    #[test]
    fn test_in_order_drain_from_shuffled_insertion() {
        // Any insertion order drains in strictly increasing contiguous
        // offset order.
        let mut rng = rand::thread_rng();
        for _ in 0..32 {
            let mut offsets: Vec<u64> = (0..16).map(|i| i * 4).collect();
            offsets.shuffle(&mut rng);

            let mut buf = ReassemblyBuffer::new(16);
            for &offset in &offsets {
                assert!(buf.insert(offset, &offset.to_be_bytes()[4..]));
            }

            let mut cursor = 0u64;
            while let Some(seg) = buf.take_ready(cursor) {
                assert_eq!(seg.offset, cursor);
                cursor += seg.data.len() as u64;
            }
            assert_eq!(cursor, 64);
            assert!(buf.is_empty());
        }
    }
}
