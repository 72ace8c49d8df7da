//! Index-tracking binary min-heap over a fixed roster.
//!
//! The roster is stored once, indexed by slot id. The heap itself is a vector
//! of ids, and every slot records its own index in that vector so a slot can be
//! removed from an arbitrary position in `O(log n)`.

use super::{
    errors::HeapError,
    model::{WorkerId, WorkerLoad},
};

/// An element that can live in a [`WorkerHeap`].
pub trait HeapSlot {
    type Key: Ord;

    /// Ordering key, smallest first. Must be a total order for the heap to be
    /// deterministic.
    fn key(&self) -> Self::Key;

    fn position(&self) -> Option<usize>;

    fn set_position(&mut self, position: Option<usize>);
}

/// Workers order by pending count; ties go to the lowest id.
impl HeapSlot for WorkerLoad {
    type Key = (usize, WorkerId);

    #[inline]
    fn key(&self) -> Self::Key {
        (self.pending, self.id)
    }

    #[inline]
    fn position(&self) -> Option<usize> {
        self.position
    }

    #[inline]
    fn set_position(&mut self, position: Option<usize>) {
        self.position = position;
    }
}

pub struct WorkerHeap<T: HeapSlot = WorkerLoad> {
    slots: Vec<T>,
    order: Vec<WorkerId>,
}

impl<T: HeapSlot> WorkerHeap<T> {
    /// Builds a heap holding every slot of `roster`. Slot ids are the indices
    /// into `roster`.
    pub fn new(roster: Vec<T>) -> Result<Self, HeapError> {
        if roster.is_empty() {
            return Err(HeapError::Empty);
        }
        let mut heap = Self {
            order: (0..roster.len()).collect(),
            slots: roster,
        };
        for (i, slot) in heap.slots.iter_mut().enumerate() {
            slot.set_position(Some(i));
        }
        for i in (0..heap.order.len() / 2).rev() {
            heap.sift_down(i);
        }
        Ok(heap)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.order.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Number of slots in the roster, queued or not.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    #[inline]
    pub fn peek(&self) -> Option<WorkerId> {
        self.order.first().copied()
    }

    pub fn slot(&self, id: WorkerId) -> Option<&T> {
        self.slots.get(id)
    }

    /// Mutable access is only handed out while the slot is outside the heap,
    /// so a key can never change underneath the ordering.
    pub fn slot_mut(&mut self, id: WorkerId) -> Result<&mut T, HeapError> {
        let slot = self.slots.get_mut(id).ok_or(HeapError::UnknownSlot(id))?;
        if slot.position().is_some() {
            return Err(HeapError::AlreadyQueued(id));
        }
        Ok(slot)
    }

    /// Current heap index of a queued slot.
    pub fn position_of(&self, id: WorkerId) -> Result<usize, HeapError> {
        let slot = self.slots.get(id).ok_or(HeapError::UnknownSlot(id))?;
        let position = slot.position().ok_or(HeapError::NotQueued(id))?;
        if self.order.get(position) != Some(&id) {
            return Err(HeapError::Corrupt(format!(
                "slot {id} records position {position} held by another slot"
            )));
        }
        Ok(position)
    }

    pub fn slots(&self) -> &[T] {
        &self.slots
    }

    pub fn order(&self) -> &[WorkerId] {
        &self.order
    }

    pub fn pop_min(&mut self) -> Result<WorkerId, HeapError> {
        if self.order.is_empty() {
            return Err(HeapError::Empty);
        }
        let last = self.order.len() - 1;
        self.swap(0, last);
        let id = self.detach_tail();
        if !self.order.is_empty() {
            self.sift_down(0);
        }
        Ok(id)
    }

    pub fn push(&mut self, id: WorkerId) -> Result<(), HeapError> {
        let slot = self.slots.get_mut(id).ok_or(HeapError::UnknownSlot(id))?;
        if slot.position().is_some() {
            return Err(HeapError::AlreadyQueued(id));
        }
        let position = self.order.len();
        slot.set_position(Some(position));
        self.order.push(id);
        self.sift_up(position);
        Ok(())
    }

    pub fn remove_at(&mut self, position: usize) -> Result<WorkerId, HeapError> {
        let len = self.order.len();
        if position >= len {
            return Err(HeapError::OutOfRange { position, len });
        }
        let last = len - 1;
        if position != last {
            self.swap(position, last);
        }
        let id = self.detach_tail();
        if position < self.order.len() && !self.sift_down(position) {
            self.sift_up(position);
        }
        Ok(id)
    }

    /// Verifies heap order and position bookkeeping for the whole roster.
    pub fn check_invariants(&self) -> Result<(), HeapError> {
        for (i, &id) in self.order.iter().enumerate() {
            let slot = self.slots.get(id).ok_or(HeapError::UnknownSlot(id))?;
            if slot.position() != Some(i) {
                return Err(HeapError::Corrupt(format!(
                    "slot {id} sits at {i} but records {:?}",
                    slot.position()
                )));
            }
            if i > 0 && self.less(i, (i - 1) / 2) {
                return Err(HeapError::Corrupt(format!(
                    "slot {id} at {i} is smaller than its parent"
                )));
            }
        }
        let queued = self.slots.iter().filter(|s| s.position().is_some()).count();
        if queued != self.order.len() {
            return Err(HeapError::Corrupt(format!(
                "{queued} slots claim a position but the heap holds {}",
                self.order.len()
            )));
        }
        Ok(())
    }

    fn detach_tail(&mut self) -> WorkerId {
        // callers guarantee the heap is non-empty
        let id = self.order.pop().unwrap_or_default();
        self.slots[id].set_position(None);
        id
    }

    #[inline]
    fn less(&self, i: usize, j: usize) -> bool {
        self.slots[self.order[i]].key() < self.slots[self.order[j]].key()
    }

    #[inline]
    fn swap(&mut self, i: usize, j: usize) {
        self.order.swap(i, j);
        self.slots[self.order[i]].set_position(Some(i));
        self.slots[self.order[j]].set_position(Some(j));
    }

    fn sift_up(&mut self, mut i: usize) {
        while i > 0 {
            let parent = (i - 1) / 2;
            if !self.less(i, parent) {
                break;
            }
            self.swap(i, parent);
            i = parent;
        }
    }

    /// Returns true if the element moved.
    fn sift_down(&mut self, start: usize) -> bool {
        let len = self.order.len();
        let mut i = start;
        loop {
            let left = 2 * i + 1;
            if left >= len {
                break;
            }
            let mut smallest = left;
            let right = left + 1;
            if right < len && self.less(right, left) {
                smallest = right;
            }
            if !self.less(smallest, i) {
                break;
            }
            self.swap(i, smallest);
            i = smallest;
        }
        i > start
    }
}
