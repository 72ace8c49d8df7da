//! The pool: one control loop owning the [`Balancer`], a fixed set of
//! workers, and the submit/observe surface used by producers.
//!
//! Producers and workers never touch pending counts. They talk to the control
//! loop through two unbounded channels (new tasks, completions) and read pool
//! state through a `watch` snapshot published after every transition.

use super::{
    balancer::Balancer,
    config::Config,
    errors::{DispatchError, DispatchResult, TaskResult},
    handle::{Task, TaskHandle},
    model::{Completion, PoolSnapshot},
    worker::{Compute, Inbox, Worker},
};
use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc, OnceLock,
};
use futures::future::join_all;
use tokio::{
    sync::{mpsc, watch, Mutex},
    task::JoinHandle,
    time::Duration,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

pub type Pool<P, R> = Arc<LoadBalancer<P, R>>;

pub struct LoadBalancer<P, R> {
    submit_tx: mpsc::UnboundedSender<Task<P, R>>,
    snapshot_rx: watch::Receiver<PoolSnapshot>,
    inboxes: Vec<Arc<Inbox<P, R>>>,
    shutdown: CancellationToken,
    fault: Arc<OnceLock<DispatchError>>,
    control: Mutex<Option<JoinHandle<DispatchResult<()>>>>,
    submitted: AtomicU64,
    config: Config,
}

impl<P, R> LoadBalancer<P, R>
where
    P: Send + 'static,
    R: Send + 'static,
{
    /// Spawns the workers and the control loop on the current tokio runtime.
    pub fn start<F>(config: Config, compute: F) -> DispatchResult<Pool<P, R>>
    where
        F: Fn(P) -> R + Send + Sync + 'static,
    {
        Self::launch(config, Arc::new(compute)).map(|(pool, _)| pool)
    }

    /// Also returns a completion sender; the control loop keeps listening on
    /// it for as long as it is held.
    fn launch(
        config: Config,
        compute: Compute<P, R>,
    ) -> DispatchResult<(Pool<P, R>, mpsc::UnboundedSender<Completion>)> {
        config.validate()?;
        let balancer = Balancer::new(config.pool_size)?;

        let shutdown = CancellationToken::new();
        let fault = Arc::new(OnceLock::new());
        let (submit_tx, submit_rx) = mpsc::unbounded_channel();
        let (done_tx, done_rx) = mpsc::unbounded_channel();
        let (snapshot_tx, snapshot_rx) = watch::channel(balancer.snapshot());

        let inboxes: Vec<Arc<Inbox<P, R>>> = (0..config.pool_size)
            .map(|_| Arc::new(Inbox::new()))
            .collect();

        for (id, inbox) in inboxes.iter().enumerate() {
            let worker = Worker::new(
                id,
                inbox.clone(),
                done_tx.clone(),
                compute.clone(),
                shutdown.clone(),
            );
            tokio::spawn(worker.run());
        }

        let control = ControlLoop {
            balancer,
            inboxes: inboxes.clone(),
            submit_rx,
            done_rx,
            snapshot_tx,
            shutdown: shutdown.clone(),
            fault: fault.clone(),
        };
        let control = tokio::spawn(control.run());

        info!(pool_size = config.pool_size, "load balancer started");

        let pool = Arc::new(Self {
            submit_tx,
            snapshot_rx,
            inboxes,
            shutdown,
            fault,
            control: Mutex::new(Some(control)),
            submitted: AtomicU64::new(0),
            config,
        });
        Ok((pool, done_tx))
    }

    /// Hands a task to the control loop. The returned handle resolves once the
    /// assigned worker has produced a result.
    pub fn submit(&self, payload: P) -> DispatchResult<TaskHandle<R>> {
        self.ensure_open()?;
        let (task, handle) = Task::new(payload, self.config.task_timeout);
        // `submitted` must never lag behind `completed`
        self.submitted.fetch_add(1, Ordering::SeqCst);
        if self.submit_tx.send(task).is_err() {
            self.submitted.fetch_sub(1, Ordering::SeqCst);
            return Err(self.closed_error());
        }
        Ok(handle)
    }

    /// Submits every payload and waits for all results, in input order.
    pub async fn submit_all<I>(&self, payloads: I) -> DispatchResult<Vec<TaskResult<R>>>
    where
        I: IntoIterator<Item = P>,
    {
        let handles = payloads
            .into_iter()
            .map(|p| self.submit(p))
            .collect::<DispatchResult<Vec<_>>>()?;
        Ok(join_all(handles).await)
    }

    /// Latest published pool state. Never mutates anything.
    pub fn observe(&self) -> PoolSnapshot {
        self.snapshot_rx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<PoolSnapshot> {
        self.snapshot_rx.clone()
    }

    /// Tasks sitting in each worker's inbox, by worker id.
    pub fn queue_lengths(&self) -> Vec<usize> {
        self.inboxes.iter().map(|inbox| inbox.len()).collect()
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn pool_size(&self) -> usize {
        self.config.pool_size
    }

    pub fn submitted(&self) -> u64 {
        self.submitted.load(Ordering::SeqCst)
    }

    pub fn is_closed(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    /// The error that halted the control loop, if any.
    pub fn fault(&self) -> Option<DispatchError> {
        self.fault.get().cloned()
    }

    /// Waits until every submitted task has been completed, or until the
    /// control loop stops publishing.
    pub async fn join_all(&self) {
        let mut rx = self.subscribe();
        loop {
            if rx.borrow_and_update().completed >= self.submitted() {
                return;
            }
            if rx.changed().await.is_err() {
                return;
            }
        }
    }

    pub async fn join_all_timeout(&self, timeout: Duration) -> bool {
        tokio::time::timeout(timeout, self.join_all()).await.is_ok()
    }

    /// Drains all submitted work, then stops workers and the control loop.
    /// Returns the outcome of the control loop.
    pub async fn shutdown(&self) -> DispatchResult<()> {
        self.join_all().await;
        self.stop().await
    }

    /// Like [`shutdown`](Self::shutdown) but gives up draining after
    /// `timeout`. `Ok(false)` means work was still in flight.
    pub async fn shutdown_timeout(&self, timeout: Duration) -> DispatchResult<bool> {
        let drained = self.join_all_timeout(timeout).await;
        self.stop().await?;
        Ok(drained)
    }

    /// Calls `callback` with a fresh snapshot whenever the pool state changes.
    /// Bursts of transitions may be coalesced into one call.
    /// Cancel the returned token to stop monitoring.
    pub fn start_monitoring<F>(&self, callback: F) -> CancellationToken
    where
        F: Fn(PoolSnapshot) + Send + 'static,
    {
        let mut rx = self.subscribe();
        let token = CancellationToken::new();
        let token_clone = token.clone();

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    changed = rx.changed() => {
                        if changed.is_err() {
                            break;
                        }
                        let snapshot = rx.borrow_and_update().clone();
                        callback(snapshot);
                    }
                    _ = token_clone.cancelled() => break,
                }
            }
        });

        token
    }

    pub fn stop_monitoring(&self, token: CancellationToken) {
        token.cancel();
    }

    async fn stop(&self) -> DispatchResult<()> {
        self.shutdown.cancel();
        let Some(control) = self.control.lock().await.take() else {
            // already joined; a recorded fault stays visible to every caller
            return self.fault().map_or(Ok(()), Err);
        };
        let outcome = control
            .await
            .map_err(|err| DispatchError::Halted(err.to_string()))?;
        let snapshot = self.observe();
        info!(
            dispatched = snapshot.dispatched,
            completed = snapshot.completed,
            "load balancer stopped"
        );
        outcome
    }

    fn ensure_open(&self) -> DispatchResult<()> {
        if self.shutdown.is_cancelled() {
            return Err(self.closed_error());
        }
        Ok(())
    }

    fn closed_error(&self) -> DispatchError {
        match self.fault.get() {
            Some(fault) => DispatchError::Halted(fault.to_string()),
            None => DispatchError::Closed,
        }
    }
}

impl<P, R> Drop for LoadBalancer<P, R> {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

/// Sole owner of the balancer. Every event is one transition followed by one
/// snapshot publication.
struct ControlLoop<P, R> {
    balancer: Balancer,
    inboxes: Vec<Arc<Inbox<P, R>>>,
    submit_rx: mpsc::UnboundedReceiver<Task<P, R>>,
    done_rx: mpsc::UnboundedReceiver<Completion>,
    snapshot_tx: watch::Sender<PoolSnapshot>,
    shutdown: CancellationToken,
    fault: Arc<OnceLock<DispatchError>>,
}

impl<P, R> ControlLoop<P, R>
where
    P: Send + 'static,
    R: Send + 'static,
{
    async fn run(mut self) -> DispatchResult<()> {
        loop {
            let outcome = tokio::select! {
                _ = self.shutdown.cancelled() => break,
                Some(task) = self.submit_rx.recv() => self.on_task(task),
                Some(completion) = self.done_rx.recv() => self.on_completion(completion),
            };

            if let Err(err) = outcome {
                error!(error = %err, "pool invariant violated, halting dispatcher");
                let _ = self.fault.set(err.clone());
                self.shutdown.cancel();
                return Err(err);
            }
            self.snapshot_tx.send_replace(self.balancer.snapshot());
        }
        debug!("control loop stopped");
        Ok(())
    }

    fn on_task(&mut self, task: Task<P, R>) -> DispatchResult<()> {
        let worker = self.balancer.dispatch()?;
        let inbox = self
            .inboxes
            .get(worker)
            .ok_or(DispatchError::PoolExhausted)?;
        inbox.push(task);
        debug!(worker, pending = self.balancer.pending_of(worker), "task dispatched");
        Ok(())
    }

    fn on_completion(&mut self, completion: Completion) -> DispatchResult<()> {
        self.balancer.complete(completion.worker)?;
        debug!(
            worker = completion.worker,
            pending = self.balancer.pending_of(completion.worker),
            "task completed"
        );
        Ok(())
    }
}
