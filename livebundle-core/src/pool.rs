//! Bounded worker pool draining a shared cursor, plus the retry-once wrapper
//! used around every remote call.
//!
//! A pool of width `K` runs `K` cooperating workers on the current task. Each
//! worker claims the next index with an atomic increment, processes it and
//! loops until the cursor passes the end. Slow units therefore never hold up
//! idle workers. Once a unit fails no worker claims further work; units
//! already claimed run to their own completion before the error is returned.

use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use futures::future::join_all;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::error::ResourceError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkerPool {
    width: usize,
}

impl WorkerPool {
    pub fn new(width: usize) -> Self {
        Self {
            width: width.max(1),
        }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    /// Run `work` for every index in `0..len`, at most `width` at a time.
    ///
    /// Results are returned in completion order. The earliest failure in time
    /// is returned after all in-flight units have settled.
    pub async fn drain<R, E, F, Fut>(&self, len: usize, work: F) -> Result<Vec<R>, E>
    where
        F: Fn(usize) -> Fut,
        Fut: Future<Output = Result<R, E>>,
    {
        if len == 0 {
            return Ok(Vec::new());
        }

        let cursor = AtomicUsize::new(0);
        let halted = AtomicBool::new(false);
        let completed = Mutex::new(Vec::with_capacity(len));
        let first_failure: Mutex<Option<E>> = Mutex::new(None);
        let workers = self.width.min(len);

        let runs = (0..workers).map(|worker| {
            let (cursor, halted, completed, first_failure, work) =
                (&cursor, &halted, &completed, &first_failure, &work);
            async move {
                loop {
                    if halted.load(Ordering::SeqCst) {
                        debug!(worker, "Worker stopping after sibling failure");
                        return;
                    }
                    let index = cursor.fetch_add(1, Ordering::SeqCst);
                    if index >= len {
                        return;
                    }
                    match work(index).await {
                        Ok(result) => completed.lock().await.push(result),
                        Err(e) => {
                            halted.store(true, Ordering::SeqCst);
                            first_failure.lock().await.get_or_insert(e);
                            return;
                        }
                    }
                }
            }
        });

        join_all(runs).await;
        match first_failure.into_inner() {
            Some(e) => Err(e),
            None => Ok(completed.into_inner()),
        }
    }
}

/// Run `op` until it succeeds or `attempts` tries have been spent.
///
/// Every attempt is issued with the same inputs; `op` is expected to rebuild
/// its request from captured state each time.
pub async fn with_retry<T, F, Fut>(attempts: u32, operation: &str, op: F) -> Result<T, ResourceError>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T, ResourceError>>,
{
    let mut remaining = attempts.max(1);
    loop {
        remaining -= 1;
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if remaining > 0 => {
                warn!(operation, error = %e, remaining, "[UPLOAD] Remote call failed, retrying");
            }
            Err(e) => return Err(e),
        }
    }
}
