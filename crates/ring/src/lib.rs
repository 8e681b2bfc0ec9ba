//! Consistent-hashing ring of virtual partitions.
//!
//! The ring maps a 32-bit key fingerprint to one of its elements
//! through a fixed number of virtual partitions: partition `i` is
//! assigned to element `i mod N`, and a fingerprint lands in partition
//! `hash mod P`. With P much larger than N the partitions spread
//! approximately evenly. The assignment is recomputed wholesale on
//! membership change; it is not rebalance-minimizing, which is fine
//! for a membership that is fixed at startup.

// ---------------------------------------------------------------------------
// String hashing
// ---------------------------------------------------------------------------

const FNV_OFFSET_BASIS: u32 = 0x811c_9dc5;
const FNV_PRIME: u32 = 16_777_619;

/// FNV-1a 32-bit hash of a string's UTF-8 bytes. This is the routing
/// fingerprint; every node must compute the same value for the same
/// key.
pub fn fnv32a(s: &str) -> u32 {
    let mut hash = FNV_OFFSET_BASIS;
    for b in s.as_bytes() {
        hash ^= u32::from(*b);
        hash = hash.wrapping_mul(FNV_PRIME);
    }
    hash
}

// ---------------------------------------------------------------------------
// Ring
// ---------------------------------------------------------------------------

/// A ring of elements over `P` virtual partitions.
///
/// Elements keep their insertion order; lookups are resolved through
/// the partition table, never by scanning.
#[derive(Debug, Clone)]
pub struct Ring<T> {
    partitions: usize,
    elements: Vec<T>,

    /// `slots[i]` is the index into `elements` owning partition `i`.
    slots: Vec<usize>,
}

impl<T: PartialEq> Ring<T> {
    /// Create a ring with `partitions` virtual partitions.
    ///
    /// # Panics
    ///
    /// Panics when `partitions` is zero; a partition count is a
    /// construction-time constant, not a runtime input.
    pub fn new(partitions: usize) -> Self {
        assert!(partitions > 0, "ring: partition count must be positive");
        Ring {
            partitions,
            elements: Vec::new(),
            slots: vec![0; partitions],
        }
    }

    /// Number of virtual partitions.
    pub fn partitions(&self) -> usize {
        self.partitions
    }

    /// Number of elements on the ring.
    pub fn len(&self) -> usize {
        self.elements.len()
    }

    /// Whether the ring has no elements.
    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    /// Append an element and reassign all partitions.
    pub fn insert(&mut self, element: T) {
        self.elements.push(element);
        self.rebuild();
    }

    /// Remove the first element equal to `element` and reassign all
    /// partitions. Unknown elements are ignored.
    pub fn remove(&mut self, element: &T) {
        if let Some(pos) = self.elements.iter().position(|e| e == element) {
            self.elements.remove(pos);
            self.rebuild();
        }
    }

    /// The element owning the partition of `hash`, or `None` while the
    /// ring is empty.
    pub fn find(&self, hash: u32) -> Option<&T> {
        if self.elements.is_empty() {
            return None;
        }
        let partition = hash as usize % self.partitions;
        self.elements.get(self.slots[partition])
    }

    fn rebuild(&mut self) {
        let n = self.elements.len();
        for (i, slot) in self.slots.iter_mut().enumerate() {
            *slot = if n == 0 { 0 } else { i % n };
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fnv32a_known_vectors() {
        // Offset basis: hashing nothing leaves the seed untouched.
        assert_eq!(fnv32a(""), 0x811c_9dc5);
        assert_eq!(fnv32a("a"), 0xe40c_292c);
        assert_eq!(fnv32a("foo"), 0xa9f3_7ed7);
    }

    #[test]
    fn test_fnv32a_deterministic() {
        assert_eq!(fnv32a("some-key"), fnv32a("some-key"));
        assert_ne!(fnv32a("key-a"), fnv32a("key-b"));
    }

    #[test]
    #[should_panic(expected = "partition count")]
    fn test_zero_partitions_panics() {
        let _ = Ring::<usize>::new(0);
    }

    #[test]
    fn test_find_on_empty_ring() {
        let ring: Ring<usize> = Ring::new(16);
        assert!(ring.find(fnv32a("anything")).is_none());
    }

    #[test]
    fn test_single_element_owns_everything() {
        let mut ring = Ring::new(16);
        ring.insert(7usize);
        for key in ["", "a", "b", "c"] {
            assert_eq!(ring.find(fnv32a(key)), Some(&7));
        }
    }

    #[test]
    fn test_partition_assignment_is_modular() {
        // Three elements, four partitions: ownership follows
        // elements[i mod 3] for partition i.
        let mut ring = Ring::new(4);
        for e in 0..3usize {
            ring.insert(e);
        }

        for hash in 0..64u32 {
            let partition = hash as usize % 4;
            assert_eq!(ring.find(hash), Some(&(partition % 3)));
        }
    }

    #[test]
    fn test_same_inserts_same_answers() {
        // Two rings built in the same order agree on every key, which
        // is what keeps per-node routing views aligned.
        let mut a = Ring::new(16_384);
        let mut b = Ring::new(16_384);
        for e in 0..5usize {
            a.insert(e);
            b.insert(e);
        }

        for key in ["foo", "bar", "baz", "", "qux-42"] {
            assert_eq!(a.find(fnv32a(key)), b.find(fnv32a(key)));
        }
    }

    #[test]
    fn test_remove_reassigns() {
        let mut ring = Ring::new(8);
        ring.insert(0usize);
        ring.insert(1usize);
        ring.remove(&0);

        for hash in 0..32u32 {
            assert_eq!(ring.find(hash), Some(&1));
        }
        assert_eq!(ring.len(), 1);

        // Removing an unknown element changes nothing.
        ring.remove(&9);
        assert_eq!(ring.len(), 1);
    }

    #[test]
    fn test_distribution_roughly_balanced() {
        let mut ring = Ring::new(16_384);
        for e in 0..4usize {
            ring.insert(e);
        }

        let mut counts = [0usize; 4];
        for i in 0..10_000u32 {
            let owner = ring.find(fnv32a(&format!("key-{}", i))).copied();
            counts[owner.expect("ring is non-empty")] += 1;
        }

        // With P >> N each element should take a meaningful share.
        for (e, count) in counts.iter().enumerate() {
            assert!(
                *count > 1_000,
                "element {} starved: {:?}",
                e,
                counts
            );
        }
    }
}
