//! Fixed-size device worker pool
//!
//! One OS thread per device, built once and never resized. Tasks are
//! dispatched with `rayon`'s broadcast so that index `i` always runs on its
//! own worker; every task can therefore block on a shared rendezvous without
//! starving its peers.

use rayon::{ThreadPool, ThreadPoolBuilder};
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use tessera_types::{Result, TesseraError};
use tracing::{debug, error};

/// Worker pool sized exactly to the device count
pub struct DeviceWorkerPool {
    pool: ThreadPool,
    size: usize,
}

impl DeviceWorkerPool {
    /// Build a pool with `size` workers named `device-worker-<i>`
    pub fn new(size: usize) -> Result<Self> {
        if size == 0 {
            return Err(TesseraError::config("worker pool size must be at least 1"));
        }

        let pool = ThreadPoolBuilder::new()
            .num_threads(size)
            .thread_name(|i| format!("device-worker-{}", i))
            .build()
            .map_err(|e| {
                TesseraError::orchestration(format!("failed to build worker pool: {}", e))
            })?;

        debug!(workers = size, "device worker pool ready");
        Ok(Self { pool, size })
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Run `task(i)` for every worker index concurrently.
    ///
    /// Results come back ordered by index. A panicking task is reported as an
    /// `Internal` error for its index.
    pub fn parallel_execute<T, F>(&self, task: F) -> Vec<Result<T>>
    where
        T: Send,
        F: Fn(usize) -> Result<T> + Sync,
    {
        self.parallel_execute_with(task, |_, _| {})
    }

    /// Like [`parallel_execute`](Self::parallel_execute), calling `on_panic`
    /// on the panicking worker before it reports.
    ///
    /// `on_panic` runs while peers may still be blocked on shared state, so it
    /// is the place to release them.
    pub fn parallel_execute_with<T, F, P>(&self, task: F, on_panic: P) -> Vec<Result<T>>
    where
        T: Send,
        F: Fn(usize) -> Result<T> + Sync,
        P: Fn(usize, &str) + Sync,
    {
        self.pool.broadcast(|ctx| {
            let index = ctx.index();
            match panic::catch_unwind(AssertUnwindSafe(|| task(index))) {
                Ok(result) => result,
                Err(payload) => {
                    let message = panic_message(payload.as_ref());
                    error!(worker = index, "device task panicked: {}", message);
                    on_panic(index, &message);
                    Err(TesseraError::internal(format!(
                        "device task {} panicked: {}",
                        index, message
                    )))
                }
            }
        })
    }

    /// Run `task` on every worker and succeed only if all tasks succeed.
    ///
    /// On failure the error of the lowest failing index is returned.
    pub fn execute_all<T, F>(&self, task: F) -> Result<Vec<T>>
    where
        T: Send,
        F: Fn(usize) -> Result<T> + Sync,
    {
        self.parallel_execute(task).into_iter().collect()
    }
}

impl std::fmt::Debug for DeviceWorkerPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceWorkerPool")
            .field("size", &self.size)
            .finish()
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::barrier::RendezvousBarrier;
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_zero_workers_rejected() {
        assert!(DeviceWorkerPool::new(0).unwrap_err().is_config_error());
    }

    #[test]
    fn test_results_ordered_by_index() {
        let pool = DeviceWorkerPool::new(4).unwrap();
        let results = pool.execute_all(|i| Ok(i * 10)).unwrap();
        assert_eq!(results, vec![0, 10, 20, 30]);
    }

    #[test]
    fn test_each_index_runs_on_its_own_thread() {
        let pool = DeviceWorkerPool::new(3).unwrap();
        let names = pool
            .execute_all(|_| Ok(std::thread::current().name().map(str::to_string)))
            .unwrap();
        let unique: HashSet<_> = names.into_iter().flatten().collect();
        assert_eq!(unique.len(), 3);
        assert!(unique.iter().all(|n| n.starts_with("device-worker-")));
    }

    #[test]
    fn test_tasks_can_rendezvous() {
        let pool = DeviceWorkerPool::new(4).unwrap();
        let barrier = RendezvousBarrier::new(4);
        let passed = AtomicUsize::new(0);
        pool.execute_all(|_| {
            barrier.wait()?;
            passed.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
        .unwrap();
        assert_eq!(passed.load(Ordering::SeqCst), 4);
    }

    #[test]
    fn test_execute_all_reports_lowest_failing_index() {
        let pool = DeviceWorkerPool::new(4).unwrap();
        let err = pool
            .execute_all(|i| {
                if i >= 2 {
                    Err(TesseraError::device(format!("device {} failed", i)))
                } else {
                    Ok(i)
                }
            })
            .unwrap_err();
        assert!(err.to_string().contains("device 2 failed"));
    }

    #[test]
    fn test_panic_becomes_internal_error_and_runs_hook() {
        let pool = DeviceWorkerPool::new(2).unwrap();
        let barrier = RendezvousBarrier::new(2);

        let results = pool.parallel_execute_with(
            |i| {
                if i == 1 {
                    panic!("injected");
                }
                barrier.wait()
            },
            |i, msg| barrier.poison(format!("worker {} panicked: {}", i, msg)),
        );

        assert!(results[0].as_ref().unwrap_err().is_cancellation());
        let err = results[1].as_ref().unwrap_err();
        assert!(matches!(err, TesseraError::Internal { .. }));
        assert!(err.to_string().contains("injected"));
    }
}
