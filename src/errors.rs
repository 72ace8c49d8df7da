use thiserror::Error;

use crate::model::WorkerId;

/// Structural failures of the worker heap.
#[derive(Debug, Error, PartialEq, Eq, Clone)]
pub enum HeapError {
    #[error("heap is empty")]
    Empty,

    #[error("slot {0} is not part of the roster")]
    UnknownSlot(WorkerId),

    #[error("slot {0} is already in the heap")]
    AlreadyQueued(WorkerId),

    #[error("slot {0} is not in the heap")]
    NotQueued(WorkerId),

    #[error("position {position} out of range (len {len})")]
    OutOfRange { position: usize, len: usize },

    #[error("heap invariant violated: {0}")]
    Corrupt(String),
}

/// Pool level errors. Everything except `InvalidConfig` and `Closed` means the
/// pool bookkeeping can no longer be trusted and the dispatcher halts.
#[derive(Debug, Error, PartialEq, Eq, Clone)]
pub enum DispatchError {
    #[error("no worker available to take the task")]
    PoolExhausted,

    #[error("stale completion from worker {worker}: {reason}")]
    StaleCompletion { worker: WorkerId, reason: String },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("dispatcher is closed")]
    Closed,

    #[error("dispatcher halted: {0}")]
    Halted(String),

    #[error(transparent)]
    Heap(#[from] HeapError),
}

/// Task local failures, delivered to the submitter through its reply channel.
#[derive(Debug, Error, PartialEq, Eq, PartialOrd, Ord, Clone)]
pub enum TaskError {
    #[error("computation panicked: {0}")]
    Panicked(String),

    #[error("task was cancelled before execution")]
    Cancelled,

    #[error("task timed out")]
    Timeout,

    #[error("reply channel dropped before a result was delivered")]
    Dropped,
}

pub type DispatchResult<T> = std::result::Result<T, DispatchError>;

pub type TaskResult<T> = std::result::Result<T, TaskError>;
