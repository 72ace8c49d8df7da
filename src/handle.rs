use super::errors::{TaskError, TaskResult};
use std::{
    future::Future,
    pin::Pin,
    task::{Context, Poll},
};
use tokio::{
    sync::oneshot,
    time::{Duration, Instant, Sleep},
};
use tokio_util::sync::CancellationToken;

/// A unit of work travelling from the submitter to exactly one worker.
pub struct Task<P, R> {
    payload: P,
    reply: oneshot::Sender<TaskResult<R>>,
    cancel_token: CancellationToken,
}

impl<P, R> Task<P, R> {
    /// Creates a task together with the handle its submitter waits on.
    pub fn new(payload: P, timeout: Option<Duration>) -> (Self, TaskHandle<R>) {
        let (tx, rx) = oneshot::channel();
        let cancel_token = CancellationToken::new();
        let task = Self {
            payload,
            reply: tx,
            cancel_token: cancel_token.clone(),
        };
        (task, TaskHandle::new(cancel_token, rx, timeout))
    }

    #[inline]
    pub fn is_cancelled(&self) -> bool {
        self.cancel_token.is_cancelled()
    }

    /// Splits the task into its payload and the one-shot reply side.
    pub(crate) fn into_parts(self) -> (P, Reply<R>) {
        (
            self.payload,
            Reply {
                sender: self.reply,
            },
        )
    }
}

pub(crate) struct Reply<R> {
    sender: oneshot::Sender<TaskResult<R>>,
}

impl<R> Reply<R> {
    /// Returns false when the submitter has already gone away.
    #[inline]
    pub(crate) fn send(self, result: TaskResult<R>) -> bool {
        self.sender.send(result).is_ok()
    }
}

/// Handle to a submitted task with cancellation and an optional deadline.
///
/// Awaiting the handle yields the task result. If a deadline was configured
/// and passes first, the task is cancelled and `TaskError::Timeout` returned.
pub struct TaskHandle<R> {
    cancel_token: CancellationToken,
    receiver: oneshot::Receiver<TaskResult<R>>,
    deadline: Option<Instant>,
    sleep: Option<Pin<Box<Sleep>>>,
}

impl<R> TaskHandle<R> {
    pub fn new(
        cancel_token: CancellationToken,
        receiver: oneshot::Receiver<TaskResult<R>>,
        timeout: Option<Duration>,
    ) -> Self {
        Self {
            cancel_token,
            receiver,
            deadline: timeout.map(|t| Instant::now() + t),
            sleep: None,
        }
    }

    /// Asks the worker to skip this task. A task already running is not
    /// interrupted and still delivers its result.
    #[inline]
    pub fn cancel(&self) {
        self.cancel_token.cancel();
    }

    #[inline]
    pub fn is_cancelled(&self) -> bool {
        self.cancel_token.is_cancelled()
    }

    pub async fn await_timeout(self, timeout: Duration) -> TaskResult<R> {
        let token = self.cancel_token.clone();
        match tokio::time::timeout(timeout, self).await {
            Ok(result) => result,
            Err(_) => {
                token.cancel();
                Err(TaskError::Timeout)
            }
        }
    }
}

impl<R> Future for TaskHandle<R> {
    type Output = TaskResult<R>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        if let Poll::Ready(res) = Pin::new(&mut this.receiver).poll(cx) {
            return Poll::Ready(res.unwrap_or(Err(TaskError::Dropped)));
        }
        if let Some(deadline) = this.deadline {
            let sleep = this
                .sleep
                .get_or_insert_with(|| Box::pin(tokio::time::sleep_until(deadline)));
            if sleep.as_mut().poll(cx).is_ready() {
                this.cancel_token.cancel();
                return Poll::Ready(Err(TaskError::Timeout));
            }
        }
        Poll::Pending
    }
}
