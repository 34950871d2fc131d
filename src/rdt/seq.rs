use crate::config::SEQ_SPACE;

/// Resolves wrapping 16-bit wire sequence numbers into monotonic logical
/// byte offsets, relative to an initial wire value.
///
/// Wraparound is detected heuristically: a jump of more than `threshold`
/// between consecutive observations is taken to mean the counter crossed
/// zero. The heuristic misfires when reordering or loss spans more than
/// `threshold` of sequence space at once; it is an approximation, not a
/// guarantee.
#[derive(Debug)]
pub struct SeqTracker {
    initial: u16,
    last_wire: u16,
    wraps: u64,
    threshold: u16,
}

impl SeqTracker {
    pub fn new(initial: u16, threshold: u16) -> Self {
        SeqTracker {
            initial,
            last_wire: initial,
            wraps: 0,
            threshold,
        }
    }

    /// Unwrap `wire` into the logical byte offset it stands for.
    pub fn resolve(&mut self, wire: u16) -> u64 {
        let delta = self.last_wire.abs_diff(wire);

        let cycle = if delta > self.threshold {
            if wire < self.last_wire {
                // Dropped past zero: one more trip around the sequence space
                self.wraps += 1;
                self.last_wire = wire;
                self.wraps
            } else {
                // Stale value from before the most recent wrap
                self.wraps.saturating_sub(1)
            }
        } else {
            self.last_wire = wire;
            self.wraps
        };

        (wire as u64 + cycle * SEQ_SPACE as u64).saturating_sub(self.initial as u64)
    }
}

// -- Unit tests --

#[cfg(test)]
mod tests {
    use super::*;
    use rand::Rng;
    use rayon::prelude::*;

    const THRESHOLD: u16 = 24576;

    #[test]
    fn test_first_value_is_zero() {
        let mut t = SeqTracker::new(5000, THRESHOLD);
        assert_eq!(t.resolve(5000), 0);
    }

    #[test]
    fn test_in_window_advance() {
        let mut t = SeqTracker::new(0, THRESHOLD);
        assert_eq!(t.resolve(512), 512);
        assert_eq!(t.resolve(1024), 1024);
    }

    #[test]
    fn test_in_window_reorder() {
        let mut t = SeqTracker::new(0, THRESHOLD);
        assert_eq!(t.resolve(1024), 1024);
        // A late segment from just behind resolves to its old offset
        assert_eq!(t.resolve(512), 512);
    }

    #[test]
    fn test_wrap_adds_exactly_one_sequence_space() {
        let mut t = SeqTracker::new(0, THRESHOLD);
        for wire in [20000, 40000, 60000] {
            t.resolve(wire);
        }
        let before = t.resolve(65000);
        let after = t.resolve(200);
        assert_eq!(after, 200 + SEQ_SPACE as u64);
        assert!(after > before);
    }

    #[test]
    fn test_stale_value_from_before_wrap() {
        let mut t = SeqTracker::new(0, THRESHOLD);
        for wire in [20000, 40000, 60000, 65000] {
            t.resolve(wire);
        }
        t.resolve(200); // wrapped
        // A retransmission from the previous cycle resolves to its old
        // offset and does not count another wrap
        assert_eq!(t.resolve(65500), 65500);
        assert_eq!(t.resolve(300), 300 + SEQ_SPACE as u64);
    }

    #[test]
    fn test_wrap_with_nonzero_initial() {
        let mut t = SeqTracker::new(65000, THRESHOLD);
        assert_eq!(t.resolve(65000), 0);
        assert_eq!(t.resolve(65400), 400);
        // Crossing zero lands at initial + 1000 in logical space
        assert_eq!(t.resolve(464), 1000);
    }

    #[test]
    fn test_multiple_wraps() {
        let mut t = SeqTracker::new(0, THRESHOLD);
        let mut expected = 0u64;
        let mut wire = 0u16;
        for _ in 0..10 {
            for _ in 0..64 {
                wire = wire.wrapping_add(1000);
                expected += 1000;
                assert_eq!(t.resolve(wire), expected);
            }
        }
    }

    #[test]
    fn test_monotonic_random_strides() {
        // In-order arrivals with arbitrary strides below the threshold must
        // always resolve monotonically, regardless of the initial value.
        let n_reps = 4096;
        (0..n_reps).into_par_iter().for_each(|_| {
            let mut rng = rand::thread_rng();
            let initial: u16 = rng.gen();
            let mut t = SeqTracker::new(initial, THRESHOLD);

            let mut wire = initial;
            let mut logical = 0u64;
            for _ in 0..256 {
                let stride = rng.gen_range(1..=1016u16);
                wire = wire.wrapping_add(stride);
                logical += stride as u64;
                assert_eq!(t.resolve(wire), logical);
            }
        });
    }
}
