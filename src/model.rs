pub type WorkerId = usize;

/// Load record of a single worker as tracked by the balancer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerLoad {
    pub id: WorkerId,
    pub pending: usize,
    /// Index in the heap order, `None` while the worker is being repositioned.
    pub position: Option<usize>,
}

impl WorkerLoad {
    pub fn new(id: WorkerId) -> Self {
        Self {
            id,
            pending: 0,
            position: None,
        }
    }
}

/// Sent by a worker after it delivered the result of one task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Completion {
    pub worker: WorkerId,
}

/// Read-only view of the pool, published after every transition.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PoolSnapshot {
    /// Indexed by worker id.
    pub loads: Vec<WorkerLoad>,
    /// Heap backing order, root first.
    pub heap_order: Vec<WorkerId>,
    pub dispatched: u64,
    pub completed: u64,
}

impl PoolSnapshot {
    pub fn pool_size(&self) -> usize {
        self.loads.len()
    }

    pub fn total_pending(&self) -> usize {
        self.loads.iter().map(|w| w.pending).sum()
    }

    pub fn in_flight(&self) -> u64 {
        self.dispatched - self.completed
    }

    pub fn pending_of(&self, id: WorkerId) -> Option<usize> {
        self.loads.get(id).map(|w| w.pending)
    }

    /// Pending counts in heap order, the shape the console reporter prints.
    pub fn pending_in_heap_order(&self) -> Vec<usize> {
        self.heap_order
            .iter()
            .filter_map(|&id| self.pending_of(id))
            .collect()
    }

    pub fn least_loaded(&self) -> Option<WorkerId> {
        self.heap_order.first().copied()
    }

    pub fn mean(&self) -> f64 {
        if self.loads.is_empty() {
            return 0.0;
        }
        self.total_pending() as f64 / self.loads.len() as f64
    }

    pub fn variance(&self) -> f64 {
        if self.loads.is_empty() {
            return 0.0;
        }
        let n = self.loads.len() as f64;
        let sum_sq: f64 = self
            .loads
            .iter()
            .map(|w| (w.pending * w.pending) as f64)
            .sum();
        let mean = self.mean();
        sum_sq / n - mean * mean
    }

    /// True when the heap order is a min-heap by `(pending, id)` and every
    /// recorded position points back at its worker.
    pub fn is_valid_heap(&self) -> bool {
        let key = |id: WorkerId| self.loads.get(id).map(|w| (w.pending, w.id));
        for (i, &id) in self.heap_order.iter().enumerate() {
            match self.loads.get(id) {
                Some(w) if w.position == Some(i) => {}
                _ => return false,
            }
            if i > 0 && key(self.heap_order[(i - 1) / 2]) > key(id) {
                return false;
            }
        }
        self.heap_order.len() == self.loads.len()
    }

    /// One line in the format of the console reporter: loads, mean, variance.
    pub fn report_line(&self) -> String {
        let mut line = String::new();
        for pending in self.pending_in_heap_order() {
            line.push_str(&pending.to_string());
            line.push(' ');
        }
        line.push_str(&format!(" {:.2} {:.2}", self.mean(), self.variance()));
        line
    }
}
