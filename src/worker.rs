use super::{
    errors::TaskError,
    handle::Task,
    model::{Completion, WorkerId},
};
use std::{
    any::Any,
    panic::{catch_unwind, AssertUnwindSafe},
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
};
use crossbeam::queue::SegQueue;
use tokio::sync::{mpsc::UnboundedSender, Notify};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

/// The per-task computation shared by every worker.
pub type Compute<P, R> = Arc<dyn Fn(P) -> R + Send + Sync + 'static>;

/// Unbounded FIFO feeding a single worker. Only the dispatcher pushes and only
/// the owning worker pops.
pub struct Inbox<P, R> {
    queue: SegQueue<Task<P, R>>,
    notify: Notify,
    queued: AtomicUsize,
}

impl<P, R> Inbox<P, R> {
    pub fn new() -> Self {
        Self {
            queue: SegQueue::new(),
            notify: Notify::new(),
            queued: AtomicUsize::new(0),
        }
    }

    #[inline]
    pub fn push(&self, task: Task<P, R>) {
        self.queued.fetch_add(1, Ordering::Relaxed);
        self.queue.push(task);
        // stores a permit if the worker is not parked yet
        self.notify.notify_one();
    }

    #[inline]
    fn pop(&self) -> Option<Task<P, R>> {
        self.queue.pop().inspect(|_| {
            self.queued.fetch_sub(1, Ordering::Relaxed);
        })
    }

    /// Tasks waiting in the queue, not counting one being executed.
    #[inline]
    pub fn len(&self) -> usize {
        self.queued.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<P, R> Default for Inbox<P, R> {
    fn default() -> Self {
        Self::new()
    }
}

pub struct Worker<P, R> {
    id: WorkerId,
    inbox: Arc<Inbox<P, R>>,
    done: UnboundedSender<Completion>,
    compute: Compute<P, R>,
    shutdown: CancellationToken,
}

impl<P, R> Worker<P, R>
where
    P: Send + 'static,
    R: Send + 'static,
{
    pub fn new(
        id: WorkerId,
        inbox: Arc<Inbox<P, R>>,
        done: UnboundedSender<Completion>,
        compute: Compute<P, R>,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            id,
            inbox,
            done,
            compute,
            shutdown,
        }
    }

    /// Runs tasks from the inbox in arrival order. For every task the result is
    /// delivered first and the completion reported second.
    ///
    /// Exits once shutdown is requested and the inbox is drained, or when the
    /// control loop stops listening for completions.
    pub async fn run(self) {
        debug!(worker = self.id, "worker started");
        loop {
            if let Some(task) = self.inbox.pop() {
                self.execute(task).await;
                if self.done.send(Completion { worker: self.id }).is_err() {
                    debug!(worker = self.id, "completion channel closed");
                    break;
                }
                tokio::task::yield_now().await;
                continue;
            }

            if self.shutdown.is_cancelled() {
                break;
            }

            tokio::select! {
                _ = self.inbox.notify.notified() => {}
                _ = self.shutdown.cancelled() => {}
            }
        }
        debug!(worker = self.id, "worker stopped");
    }

    /// Runs one task on the blocking pool so a long computation never holds a
    /// runtime thread. Timers and the control loop keep running meanwhile.
    async fn execute(&self, task: Task<P, R>) {
        if task.is_cancelled() {
            let (_, reply) = task.into_parts();
            trace!(worker = self.id, "skipping cancelled task");
            reply.send(Err(TaskError::Cancelled));
            return;
        }

        let (payload, reply) = task.into_parts();
        let compute = self.compute.clone();
        let result = match tokio::task::spawn_blocking(move || {
            catch_unwind(AssertUnwindSafe(|| compute(payload)))
        })
        .await
        {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(panic)) => Err(TaskError::Panicked(panic_message(panic))),
            Err(join_err) => Err(TaskError::Panicked(join_err.to_string())),
        };

        if let Err(err) = &result {
            warn!(worker = self.id, error = %err, "task failed");
        }
        if !reply.send(result) {
            trace!(worker = self.id, "submitter dropped its handle");
        }
    }
}

fn panic_message(panic: Box<dyn Any + Send>) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
