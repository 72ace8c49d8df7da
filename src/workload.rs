//! Synthetic producers for exercising a pool.
//!
//! Each producer sleeps for a random interval, submits a random payload, waits
//! for the answer and repeats, until its request budget is used up or it is
//! told to stop.

use super::{
    dispatcher::Pool,
    errors::TaskError,
};
use std::ops::Range;
use futures::future::join_all;
use rand::{rngs::StdRng, Rng, SeedableRng};
use tokio::{task::JoinHandle, time::Duration};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// The per-task computation the demo pool runs.
pub fn sine(x: i64) -> f64 {
    (x as f64).sin()
}

#[derive(Debug, Clone)]
pub struct Workload {
    pub producers: usize,
    /// `None` keeps producing until stopped.
    pub requests_per_producer: Option<usize>,
    /// Upper bound of the random pause before each request.
    pub max_interval: Duration,
    pub payload_range: Range<i64>,
    /// Producer `i` seeds its generator with `seed + i` when set.
    pub seed: Option<u64>,
}

impl Default for Workload {
    fn default() -> Self {
        Self {
            producers: 100,
            requests_per_producer: None,
            max_interval: Duration::from_millis(1),
            payload_range: 0..90,
            seed: None,
        }
    }
}

impl Workload {
    pub fn new(producers: usize) -> Self {
        Self {
            producers,
            ..Default::default()
        }
    }

    pub fn with_requests_per_producer(mut self, requests: usize) -> Self {
        self.requests_per_producer = Some(requests);
        self
    }

    pub fn with_max_interval(mut self, interval: Duration) -> Self {
        self.max_interval = interval;
        self
    }

    pub fn with_payload_range(mut self, range: Range<i64>) -> Self {
        self.payload_range = range;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Starts all producers against `pool`.
    pub fn spawn<R>(&self, pool: &Pool<i64, R>) -> WorkloadHandle
    where
        R: Send + 'static,
    {
        let stop = CancellationToken::new();
        let handles = (0..self.producers)
            .map(|i| {
                let rng = match self.seed {
                    Some(seed) => StdRng::seed_from_u64(seed.wrapping_add(i as u64)),
                    None => StdRng::from_entropy(),
                };
                let producer = Producer {
                    id: i,
                    pool: pool.clone(),
                    rng,
                    workload: self.clone(),
                    stop: stop.clone(),
                };
                tokio::spawn(producer.run())
            })
            .collect();
        WorkloadHandle { handles, stop }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProducerReport {
    pub sent: usize,
    pub succeeded: usize,
    pub failed: usize,
}

impl ProducerReport {
    fn merge(mut self, other: ProducerReport) -> Self {
        self.sent += other.sent;
        self.succeeded += other.succeeded;
        self.failed += other.failed;
        self
    }
}

pub struct WorkloadHandle {
    handles: Vec<JoinHandle<ProducerReport>>,
    stop: CancellationToken,
}

impl WorkloadHandle {
    /// Asks producers to stop after their current request.
    pub fn stop(&self) {
        self.stop.cancel();
    }

    /// Waits for every producer and sums up what they did.
    pub async fn join(self) -> ProducerReport {
        join_all(self.handles)
            .await
            .into_iter()
            .filter_map(|joined| joined.ok())
            .fold(ProducerReport::default(), ProducerReport::merge)
    }
}

struct Producer<R> {
    id: usize,
    pool: Pool<i64, R>,
    rng: StdRng,
    workload: Workload,
    stop: CancellationToken,
}

impl<R: Send + 'static> Producer<R> {
    async fn run(mut self) -> ProducerReport {
        let mut report = ProducerReport::default();
        loop {
            if let Some(limit) = self.workload.requests_per_producer {
                if report.sent >= limit {
                    break;
                }
            }

            let pause = self.pause();
            tokio::select! {
                _ = tokio::time::sleep(pause) => {}
                _ = self.stop.cancelled() => break,
            }

            let payload = self.payload();
            let handle = match self.pool.submit(payload) {
                Ok(handle) => handle,
                Err(err) => {
                    debug!(producer = self.id, error = %err, "pool rejected request");
                    break;
                }
            };
            report.sent += 1;

            match handle.await {
                Ok(_) => report.succeeded += 1,
                Err(TaskError::Dropped) => {
                    report.failed += 1;
                    break;
                }
                Err(err) => {
                    warn!(producer = self.id, error = %err, "request failed");
                    report.failed += 1;
                }
            }
        }
        report
    }

    fn pause(&mut self) -> Duration {
        let max = self.workload.max_interval.as_nanos() as u64;
        if max == 0 {
            return Duration::ZERO;
        }
        Duration::from_nanos(self.rng.gen_range(0..max))
    }

    fn payload(&mut self) -> i64 {
        let range = self.workload.payload_range.clone();
        if range.is_empty() {
            return range.start;
        }
        self.rng.gen_range(range)
    }
}
