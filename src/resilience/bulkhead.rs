//! Concurrency limit per upstream.
//!
//! A bulkhead hands out at most `max_concurrent` permits. When all are taken
//! it lets up to `max_waiting` callers queue for at most `max_wait` each and
//! rejects everyone else with [`LlmError::BulkheadFull`]. Permits release on
//! drop, whether the guarded call succeeded, failed, panicked or was
//! cancelled.

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use super::config::BulkheadConfig;
use crate::error::LlmError;

#[derive(Debug)]
pub struct Bulkhead {
    upstream: String,
    config: BulkheadConfig,
    semaphore: Arc<Semaphore>,
    waiting: Arc<AtomicUsize>,
}

impl Bulkhead {
    pub fn new(upstream: impl Into<String>, config: BulkheadConfig) -> Self {
        Self {
            upstream: upstream.into(),
            semaphore: Arc::new(Semaphore::new(config.max_concurrent)),
            waiting: Arc::new(AtomicUsize::new(0)),
            config,
        }
    }

    pub fn upstream(&self) -> &str {
        &self.upstream
    }

    pub fn config(&self) -> &BulkheadConfig {
        &self.config
    }

    /// Calls currently holding a permit
    pub fn in_flight(&self) -> usize {
        self.config
            .max_concurrent
            .saturating_sub(self.semaphore.available_permits())
    }

    /// Callers currently queued for a permit
    pub fn waiting(&self) -> usize {
        self.waiting.load(Ordering::Acquire)
    }

    pub async fn acquire(&self) -> Result<BulkheadPermit, LlmError> {
        if let Ok(permit) = Arc::clone(&self.semaphore).try_acquire_owned() {
            return Ok(BulkheadPermit { _permit: permit });
        }

        let Some(_waiter) = self.reserve_waiter() else {
            tracing::debug!(upstream = %self.upstream, "bulkhead full, rejecting");
            return Err(self.rejection());
        };

        match tokio::time::timeout(
            self.config.max_wait,
            Arc::clone(&self.semaphore).acquire_owned(),
        )
        .await
        {
            Ok(Ok(permit)) => Ok(BulkheadPermit { _permit: permit }),
            Ok(Err(_closed)) => Err(self.rejection()),
            Err(_elapsed) => {
                tracing::debug!(
                    upstream = %self.upstream,
                    max_wait_ms = self.config.max_wait.as_millis() as u64,
                    "bulkhead wait timed out"
                );
                Err(self.rejection())
            }
        }
    }

    /// Run `f` while holding a permit.
    pub async fn execute<F, Fut, T>(&self, f: F) -> Result<T, LlmError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, LlmError>>,
    {
        let _permit = self.acquire().await?;
        f().await
    }

    fn reserve_waiter(&self) -> Option<WaiterGuard> {
        let max = self.config.max_waiting;
        if max == 0 {
            return None;
        }
        self.waiting
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| {
                (n < max).then_some(n + 1)
            })
            .ok()
            .map(|_| WaiterGuard {
                waiting: Arc::clone(&self.waiting),
            })
    }

    fn rejection(&self) -> LlmError {
        LlmError::BulkheadFull {
            upstream: self.upstream.clone(),
        }
    }
}

/// One admitted call. The slot is released on drop.
#[derive(Debug)]
pub struct BulkheadPermit {
    _permit: OwnedSemaphorePermit,
}

struct WaiterGuard {
    waiting: Arc<AtomicUsize>,
}

impl Drop for WaiterGuard {
    fn drop(&mut self) {
        self.waiting.fetch_sub(1, Ordering::AcqRel);
    }
}
