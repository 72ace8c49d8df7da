//! Dispatch bookkeeping for the pool.
//!
//! `Balancer` is the only place where pending counts change. It is a plain
//! synchronous state machine; the async control loop in
//! [`dispatcher`](crate::dispatcher) owns one and feeds it events.

use super::{
    errors::{DispatchError, DispatchResult, HeapError},
    heap::WorkerHeap,
    model::{PoolSnapshot, WorkerId, WorkerLoad},
};
use tracing::trace;

pub struct Balancer {
    heap: WorkerHeap<WorkerLoad>,
    dispatched: u64,
    completed: u64,
}

impl Balancer {
    pub fn new(pool_size: usize) -> DispatchResult<Self> {
        if pool_size == 0 {
            return Err(DispatchError::InvalidConfig(
                "pool size must be at least 1".into(),
            ));
        }
        let roster = (0..pool_size).map(WorkerLoad::new).collect();
        Ok(Self {
            heap: WorkerHeap::new(roster)?,
            dispatched: 0,
            completed: 0,
        })
    }

    /// Picks the least loaded worker and charges it with one more task.
    /// The caller is responsible for handing the task to the returned worker.
    pub fn dispatch(&mut self) -> DispatchResult<WorkerId> {
        let id = self.heap.pop_min().map_err(|err| match err {
            HeapError::Empty => DispatchError::PoolExhausted,
            other => other.into(),
        })?;
        self.heap.slot_mut(id)?.pending += 1;
        self.heap.push(id)?;
        self.dispatched += 1;
        trace!(worker = id, dispatched = self.dispatched, "dispatched");
        self.debug_check()?;
        Ok(id)
    }

    /// Releases one task from `worker` and moves it back into heap order.
    pub fn complete(&mut self, worker: WorkerId) -> DispatchResult<()> {
        let stale = |reason: String| DispatchError::StaleCompletion { worker, reason };

        let position = self
            .heap
            .position_of(worker)
            .map_err(|err| stale(err.to_string()))?;
        if self.pending_of(worker) == Some(0) {
            return Err(stale("worker has no pending tasks".into()));
        }

        self.heap.remove_at(position)?;
        self.heap.slot_mut(worker)?.pending -= 1;
        self.heap.push(worker)?;
        self.completed += 1;
        trace!(worker, completed = self.completed, "completed");
        self.debug_check()?;
        Ok(())
    }

    pub fn pool_size(&self) -> usize {
        self.heap.capacity()
    }

    pub fn dispatched(&self) -> u64 {
        self.dispatched
    }

    pub fn completed(&self) -> u64 {
        self.completed
    }

    pub fn pending_of(&self, worker: WorkerId) -> Option<usize> {
        self.heap.slot(worker).map(|w| w.pending)
    }

    /// Worker that the next dispatch would pick.
    pub fn least_loaded(&self) -> Option<WorkerId> {
        self.heap.peek()
    }

    pub fn snapshot(&self) -> PoolSnapshot {
        PoolSnapshot {
            loads: self.heap.slots().to_vec(),
            heap_order: self.heap.order().to_vec(),
            dispatched: self.dispatched,
            completed: self.completed,
        }
    }

    pub fn check_invariants(&self) -> DispatchResult<()> {
        self.heap.check_invariants()?;
        if self.heap.len() != self.heap.capacity() {
            return Err(HeapError::Corrupt(format!(
                "{} of {} workers are in the heap",
                self.heap.len(),
                self.heap.capacity()
            ))
            .into());
        }
        let pending: u64 = self.heap.slots().iter().map(|w| w.pending as u64).sum();
        if pending != self.dispatched - self.completed {
            return Err(HeapError::Corrupt(format!(
                "pending sum {pending} != dispatched {} - completed {}",
                self.dispatched, self.completed
            ))
            .into());
        }
        Ok(())
    }

    #[inline]
    fn debug_check(&self) -> DispatchResult<()> {
        if cfg!(debug_assertions) {
            self.check_invariants()?;
        }
        Ok(())
    }
}
