#[cfg(test)]
mod tests {
    use least_loaded::{
        config::Config,
        dispatcher::{LoadBalancer, Pool},
        errors::{DispatchError, TaskError},
        model::PoolSnapshot,
        workload::sine,
    };
    use std::{
        sync::{Arc, Condvar, Mutex},
        time::{Duration, Instant},
    };

    /// Blocks computations until opened.
    #[derive(Clone, Default)]
    struct Gate(Arc<(Mutex<bool>, Condvar)>);

    impl Gate {
        fn wait(&self) {
            let (lock, cvar) = &*self.0;
            let mut open = lock.lock().unwrap();
            while !*open {
                open = cvar.wait(open).unwrap();
            }
        }

        fn open(&self) {
            let (lock, cvar) = &*self.0;
            *lock.lock().unwrap() = true;
            cvar.notify_all();
        }
    }

    async fn wait_for<P, R, F>(pool: &Pool<P, R>, pred: F) -> PoolSnapshot
    where
        P: Send + 'static,
        R: Send + 'static,
        F: Fn(&PoolSnapshot) -> bool,
    {
        let mut rx = pool.subscribe();
        tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                let snapshot = rx.borrow_and_update().clone();
                if pred(&snapshot) {
                    return snapshot;
                }
                rx.changed().await.expect("control loop stopped");
            }
        })
        .await
        .expect("pool never reached the expected state")
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 8)]
    async fn test_one_task_per_worker_before_any_gets_two() {
        println!("\n=== TEST: N tasks on N idle workers ===");
        let gate = Gate::default();
        let g = gate.clone();
        let pool = LoadBalancer::start(Config::new(4), move |x: u32| {
            g.wait();
            x
        })
        .unwrap();

        let handles: Vec<_> = (0..4).map(|i| pool.submit(i).unwrap()).collect();
        let snapshot = wait_for(&pool, |s| s.dispatched == 4).await;

        let mut loads: Vec<_> = snapshot.loads.iter().map(|w| w.pending).collect();
        loads.sort_unstable();
        assert_eq!(loads, vec![1, 1, 1, 1]);
        assert!(snapshot.is_valid_heap());
        println!("  ✓ loads after dispatch: {}", snapshot.report_line());

        gate.open();
        for (i, h) in handles.into_iter().enumerate() {
            assert_eq!(h.await, Ok(i as u32));
        }
        pool.shutdown().await.unwrap();
        assert_eq!(pool.observe().total_pending(), 0);
    }

    #[tokio::test]
    async fn test_submit_all_returns_results_in_order() {
        println!("\n=== TEST: submit_all ===");
        let pool = LoadBalancer::start(Config::new(3), sine).unwrap();

        let results = pool.submit_all(0..100).await.unwrap();
        assert_eq!(results.len(), 100);
        for (i, r) in results.into_iter().enumerate() {
            assert_eq!(r, Ok(sine(i as i64)));
        }

        pool.join_all().await;
        let snapshot = pool.observe();
        assert_eq!(snapshot.dispatched, 100);
        assert_eq!(snapshot.completed, 100);
        assert_eq!(snapshot.total_pending(), 0);
        pool.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_panics_are_contained() {
        println!("\n=== TEST: panicking computation ===");
        let pool = LoadBalancer::start(Config::new(4), |x: u32| {
            if x % 10 == 0 {
                panic!("bad input {x}");
            }
            x
        })
        .unwrap();

        let results = pool.submit_all(0..50).await.unwrap();
        let panicked = results
            .iter()
            .filter(|r| matches!(r, Err(TaskError::Panicked(_))))
            .count();
        assert_eq!(panicked, 5);
        assert_eq!(results[10], Err(TaskError::Panicked("bad input 10".into())));
        assert_eq!(results[11], Ok(11));

        pool.join_all().await;
        let snapshot = pool.observe();
        assert_eq!(snapshot.completed, 50);
        assert_eq!(snapshot.total_pending(), 0);
        assert!(pool.fault().is_none());
        pool.shutdown().await.unwrap();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_cancellation() {
        println!("\n=== TEST: cancellation ===");
        let gate = Gate::default();
        let g = gate.clone();
        let pool = LoadBalancer::start(Config::new(1), move |x: u32| {
            g.wait();
            x
        })
        .unwrap();

        let first = pool.submit(1).unwrap();
        let second = pool.submit(2).unwrap();
        assert!(!second.is_cancelled());
        second.cancel();
        assert!(second.is_cancelled());

        gate.open();
        assert_eq!(first.await, Ok(1));
        assert_eq!(second.await, Err(TaskError::Cancelled));

        pool.join_all().await;
        let snapshot = pool.observe();
        assert_eq!(snapshot.completed, 2);
        assert_eq!(snapshot.pending_of(0), Some(0));
        pool.shutdown().await.unwrap();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_timeout() {
        println!("\n=== TEST: task timeout ===");
        let gate = Gate::default();
        let g = gate.clone();
        let config = Config::new(1).with_task_timeout(Duration::from_millis(50));
        let pool = LoadBalancer::start(config, move |x: u32| {
            g.wait();
            x
        })
        .unwrap();

        let handle = pool.submit(7).unwrap();
        assert_eq!(handle.await, Err(TaskError::Timeout));

        // the worker still owes the task until it finishes
        assert_eq!(pool.observe().pending_of(0), Some(1));
        gate.open();
        pool.join_all().await;
        assert_eq!(pool.observe().pending_of(0), Some(0));
        pool.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_timeout_on_current_thread_runtime() {
        println!("\n=== TEST: task timeout, single-threaded runtime ===");
        let config = Config::new(1).with_task_timeout(Duration::from_millis(50));
        let pool = LoadBalancer::start(config, |x: u32| {
            std::thread::sleep(Duration::from_millis(400));
            x
        })
        .unwrap();

        let start = Instant::now();
        let result = pool.submit(1).unwrap().await;
        let elapsed = start.elapsed();
        println!("  result={:?} elapsed={:?}", result, elapsed);

        assert_eq!(result, Err(TaskError::Timeout));
        assert!(elapsed < Duration::from_millis(300));

        pool.join_all().await;
        assert_eq!(pool.observe().pending_of(0), Some(0));
        pool.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_explicit_await_timeout() {
        let pool = LoadBalancer::start(Config::new(2), |x: u64| x + 1).unwrap();
        let handle = pool.submit(1).unwrap();
        assert_eq!(handle.await_timeout(Duration::from_secs(5)).await, Ok(2));
        pool.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_dropped_handle_still_completes() {
        let pool = LoadBalancer::start(Config::new(2), |x: u64| x).unwrap();
        drop(pool.submit(1).unwrap());
        pool.join_all().await;
        assert_eq!(pool.observe().completed, 1);
        pool.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_single_worker_is_fifo() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let log = seen.clone();
        let pool = LoadBalancer::start(Config::new(1), move |x: u32| {
            log.lock().unwrap().push(x);
            x
        })
        .unwrap();

        pool.submit_all(0..50).await.unwrap();
        assert_eq!(*seen.lock().unwrap(), (0..50).collect::<Vec<_>>());
        pool.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_observe_is_idempotent() {
        let pool = LoadBalancer::start(Config::new(3), sine).unwrap();
        pool.submit_all(0..10).await.unwrap();
        pool.join_all().await;
        assert_eq!(pool.observe(), pool.observe());
        pool.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_submit_after_shutdown_is_rejected() {
        let pool = LoadBalancer::start(Config::new(2), sine).unwrap();
        pool.submit_all(0..5).await.unwrap();
        pool.shutdown().await.unwrap();

        assert!(pool.is_closed());
        assert!(matches!(pool.submit(1), Err(DispatchError::Closed)));
        // a second shutdown is a no-op
        pool.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_shutdown_timeout_reports_undrained_work() {
        let pool = LoadBalancer::start(Config::new(1), |x: u32| {
            std::thread::sleep(Duration::from_millis(20));
            x
        })
        .unwrap();
        let _handles: Vec<_> = (0..20).map(|i| pool.submit(i).unwrap()).collect();
        let drained = pool.shutdown_timeout(Duration::from_millis(1)).await.unwrap();
        assert!(!drained);
    }

    #[tokio::test]
    async fn test_zero_workers_is_rejected() {
        let result = LoadBalancer::start(Config::new(0), sine);
        assert!(matches!(result, Err(DispatchError::InvalidConfig(_))));
    }

    #[tokio::test]
    async fn test_monitoring_sees_valid_heaps() {
        println!("\n=== TEST: monitoring ===");
        let pool = LoadBalancer::start(Config::new(5), sine).unwrap();
        let seen = Arc::new(Mutex::new(Vec::<PoolSnapshot>::new()));
        let sink = seen.clone();
        let token = pool.start_monitoring(move |snapshot| {
            sink.lock().unwrap().push(snapshot);
        });

        let producers: Vec<_> = (0..8)
            .map(|p| {
                let pool = pool.clone();
                tokio::spawn(async move {
                    for i in 0..25 {
                        pool.submit(p * 100 + i).unwrap().await.unwrap();
                    }
                })
            })
            .collect();
        for p in producers {
            p.await.unwrap();
        }
        pool.join_all().await;
        tokio::task::yield_now().await;
        pool.stop_monitoring(token);

        let seen = seen.lock().unwrap();
        assert!(!seen.is_empty());
        for snapshot in seen.iter() {
            assert!(snapshot.is_valid_heap());
            assert_eq!(snapshot.total_pending() as u64, snapshot.in_flight());
        }
        println!("  ✓ {} snapshots observed", seen.len());
        drop(seen);
        pool.shutdown().await.unwrap();
    }
}
