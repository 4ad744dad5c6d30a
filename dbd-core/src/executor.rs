//! Bounded fan-out helper for plugin bodies.
//!
//! The pipeline itself is strictly sequential; this pool is the one
//! sanctioned parallelism boundary, used to run identical work across many
//! remote servers inside a single plugin invocation.

use std::collections::BTreeMap;
use std::sync::Arc;

use rayon::prelude::*;
use rayon::{ThreadPool, ThreadPoolBuilder};

use crate::error::{DbdError, Result};
use crate::remote::Server;

/// Worker cap for per-invocation fan-out.
pub const DEFAULT_WORKERS: usize = 32;

#[derive(Clone)]
pub struct ConcurrentExecutor {
    pool: Arc<ThreadPool>,
    workers: usize,
}

impl ConcurrentExecutor {
    pub fn new(workers: usize) -> Result<Self> {
        let pool = ThreadPoolBuilder::new()
            .num_threads(workers)
            .thread_name(|i| format!("dbd-worker-{}", i))
            .build()
            .map_err(|e| DbdError::Internal(format!("worker pool: {}", e)))?;
        Ok(ConcurrentExecutor {
            pool: Arc::new(pool),
            workers,
        })
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Runs `f` once per server, blocking until all complete. One server's
    /// failure never cancels its siblings; every server gets exactly one
    /// attributable slot in the result map.
    pub fn run_on<T, R, F>(&self, tasks: Vec<(Server, T)>, f: F) -> BTreeMap<Server, Result<R>>
    where
        T: Send,
        R: Send,
        F: Fn(&Server, T) -> Result<R> + Send + Sync,
    {
        self.pool.install(|| {
            tasks
                .into_par_iter()
                .map(|(server, task)| {
                    let outcome = f(&server, task);
                    (server, outcome)
                })
                .collect()
        })
    }

    /// True when every fanned-out task succeeded.
    pub fn all_ok<R>(results: &BTreeMap<Server, Result<R>>) -> bool {
        results.values().all(|r| r.is_ok())
    }
}

impl Default for ConcurrentExecutor {
    fn default() -> Self {
        // Pool construction only fails on resource exhaustion at process
        // start; there is no meaningful recovery from that here.
        Self::new(DEFAULT_WORKERS).unwrap_or_else(|e| panic!("{}", e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn servers(n: usize) -> Vec<(Server, usize)> {
        (0..n)
            .map(|i| (Server::new(format!("node-{:02}", i)), i))
            .collect()
    }

    #[test]
    fn test_results_attributable_per_server() {
        let executor = ConcurrentExecutor::new(4).unwrap();
        let results = executor.run_on(servers(16), |_, i| Ok(i * 2));

        assert_eq!(results.len(), 16);
        for (server, result) in &results {
            let i: usize = server.as_str()[5..].parse().unwrap();
            assert_eq!(*result.as_ref().unwrap(), i * 2);
        }
    }

    #[test]
    fn test_failure_does_not_cancel_siblings() {
        let executor = ConcurrentExecutor::new(4).unwrap();
        let results = executor.run_on(servers(8), |_, i| {
            if i == 3 {
                Err(DbdError::Command("exit 1".to_string()))
            } else {
                Ok(i)
            }
        });

        assert_eq!(results.len(), 8);
        assert!(!ConcurrentExecutor::all_ok(&results));
        let failed: Vec<_> = results
            .iter()
            .filter(|(_, r)| r.is_err())
            .map(|(s, _)| s.as_str())
            .collect();
        assert_eq!(failed, vec!["node-03"]);
    }

    #[test]
    fn test_all_ok_on_empty_fanout() {
        let executor = ConcurrentExecutor::new(2).unwrap();
        let results = executor.run_on(Vec::<(Server, ())>::new(), |_, _| Ok(()));
        assert!(results.is_empty());
        assert!(ConcurrentExecutor::all_ok(&results));
    }
}
