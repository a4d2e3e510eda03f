//! Bounded write history.
//!
//! [`CircularHistory`] is a fixed-capacity FIFO of immutable byte entries.
//! Once the buffer is full, appending overwrites the oldest entry and hands
//! its buffer back to the caller. Entries are addressable by their virtual
//! byte offset, the zero-based character index of the concatenation of all
//! retained entries in FIFO order.

use bytes::Bytes;

/// Number of entry slots in the shipped configuration.
pub const HISTORY_SLOTS: usize = 10;

/// Fixed-capacity FIFO of byte entries with overwrite-oldest-on-full
/// semantics.
///
/// Callers are responsible for any locking; the history itself performs no
/// synchronization and no allocation.
#[derive(Debug)]
pub struct CircularHistory<const N: usize = HISTORY_SLOTS> {
    slots: [Option<Bytes>; N],
    /// Next insert position.
    head: usize,
    /// Oldest entry position.
    tail: usize,
    full: bool,
}

impl<const N: usize> CircularHistory<N> {
    /// Creates an empty history.
    pub fn new() -> Self {
        Self {
            slots: std::array::from_fn(|_| None),
            head: 0,
            tail: 0,
            full: false,
        }
    }

    /// Inserts `entry` at the head, evicting the oldest entry if the buffer
    /// is already full.
    ///
    /// Returns the evicted entry's buffer so the caller can release or reuse
    /// it. Entries must be non-empty.
    pub fn append(&mut self, entry: Bytes) -> Option<Bytes> {
        assert!(!entry.is_empty(), "history entries must be non-empty");

        let evicted = if self.full {
            let oldest = self.slots[self.tail].take();
            self.tail = (self.tail + 1) % N;
            oldest
        } else {
            None
        };

        self.slots[self.head] = Some(entry);
        self.head = (self.head + 1) % N;
        self.full = self.head == self.tail;

        evicted
    }

    /// Locates the entry containing the byte at `char_offset`, along with the
    /// offset of that byte within the entry.
    ///
    /// Offsets are accumulated walking entries in FIFO order from the tail.
    /// An offset equal to the running total at an entry boundary selects
    /// position 0 of the next entry. Returns `None` when `char_offset` is
    /// past the end of the retained content, or the history is empty.
    pub fn find_by_offset(&self, char_offset: u64) -> Option<(&Bytes, usize)> {
        let mut running = 0u64;
        for entry in self.iter() {
            let size = entry.len() as u64;
            if running + size > char_offset {
                return Some((entry, (char_offset - running) as usize));
            }
            running += size;
        }
        None
    }

    /// Drops every retained entry and resets to the empty state.
    pub fn clear(&mut self) {
        for slot in &mut self.slots {
            *slot = None;
        }
        self.head = 0;
        self.tail = 0;
        self.full = false;
    }

    /// Number of retained entries, in `[0, N]`.
    pub fn len(&self) -> usize {
        if self.full {
            N
        } else {
            (self.head + N - self.tail) % N
        }
    }

    pub fn is_empty(&self) -> bool {
        !self.full && self.head == self.tail
    }

    pub fn is_full(&self) -> bool {
        self.full
    }

    /// Sum of the sizes of all retained entries.
    pub fn total_bytes(&self) -> u64 {
        self.iter().map(|entry| entry.len() as u64).sum()
    }

    /// Iterates retained entries in FIFO order, oldest first.
    pub fn iter(&self) -> impl Iterator<Item = &Bytes> {
        (0..self.len()).map(move |i| {
            let slot = (self.tail + i) % N;
            self.slots[slot]
                .as_ref()
                .expect("slots between tail and head are always populated")
        })
    }
}

impl<const N: usize> Default for CircularHistory<N> {
    fn default() -> Self {
        Self::new()
    }
}
