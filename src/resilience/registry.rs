//! Per-upstream resilience state.
//!
//! The registry is the only shared state in the crate. Breakers and bulkheads
//! are created lazily the first time an upstream key is used and live as long
//! as the registry. Keys are sharded through `DashMap`, so unrelated upstreams
//! never contend.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;

use super::bulkhead::{Bulkhead, BulkheadPermit};
use super::circuit_breaker::{BreakerPermit, CallOutcome, CircuitBreaker};
use super::config::ResilienceConfig;
use crate::error::LlmError;
use crate::retry::counts_against_breaker;

#[derive(Debug, Default)]
pub struct ResilienceRegistry {
    defaults: ResilienceConfig,
    overrides: DashMap<String, ResilienceConfig>,
    breakers: DashMap<String, Arc<CircuitBreaker>>,
    bulkheads: DashMap<String, Arc<Bulkhead>>,
}

impl ResilienceRegistry {
    pub fn new(defaults: ResilienceConfig) -> Self {
        Self {
            defaults,
            ..Default::default()
        }
    }

    /// Set thresholds for one upstream. Only breakers and bulkheads created
    /// after this call pick the new values up.
    pub fn configure(&self, key: impl Into<String>, config: ResilienceConfig) {
        self.overrides.insert(key.into(), config);
    }

    /// Thresholds that apply to `key`
    pub fn config_for(&self, key: &str) -> ResilienceConfig {
        self.overrides
            .get(key)
            .map(|entry| entry.value().clone())
            .unwrap_or_else(|| self.defaults.clone())
    }

    pub fn breaker(&self, key: &str) -> Arc<CircuitBreaker> {
        if let Some(existing) = self.breakers.get(key) {
            return Arc::clone(existing.value());
        }
        let config = self.config_for(key).circuit_breaker;
        self.breaker_with(key, config)
    }

    /// Breaker for `key`, created with `config` if it does not exist yet.
    pub fn breaker_with(
        &self,
        key: &str,
        config: super::CircuitBreakerConfig,
    ) -> Arc<CircuitBreaker> {
        Arc::clone(
            self.breakers
                .entry(key.to_string())
                .or_insert_with(|| Arc::new(CircuitBreaker::new(key, config)))
                .value(),
        )
    }

    pub fn bulkhead(&self, key: &str) -> Arc<Bulkhead> {
        if let Some(existing) = self.bulkheads.get(key) {
            return Arc::clone(existing.value());
        }
        let config = self.config_for(key).bulkhead;
        self.bulkhead_with(key, config)
    }

    /// Bulkhead for `key`, created with `config` if it does not exist yet.
    pub fn bulkhead_with(&self, key: &str, config: super::BulkheadConfig) -> Arc<Bulkhead> {
        Arc::clone(
            self.bulkheads
                .entry(key.to_string())
                .or_insert_with(|| Arc::new(Bulkhead::new(key, config)))
                .value(),
        )
    }

    /// Upstream keys seen so far
    pub fn upstreams(&self) -> Vec<String> {
        self.breakers.iter().map(|e| e.key().clone()).collect()
    }

    /// Guard exactly one invocation of `f` with the breaker for `key`.
    ///
    /// When the circuit is open `f` is not called and
    /// [`LlmError::CircuitOpen`] is returned.
    pub async fn with_circuit_breaker<F, Fut, T>(&self, key: &str, f: F) -> Result<T, LlmError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, LlmError>>,
    {
        let permit = self.breaker(key).try_acquire()?;
        let result = f().await;
        permit.record(outcome_of(&result));
        result
    }

    /// Breaker, then bulkhead, then deadline around one invocation of `f`.
    ///
    /// A failure at any stage short-circuits the rest. An expired deadline
    /// yields [`LlmError::TimeoutError`] and counts as a breaker failure.
    pub async fn execute<F, Fut, T>(
        &self,
        key: &str,
        deadline: Option<Duration>,
        f: F,
    ) -> Result<T, LlmError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, LlmError>>,
    {
        let (breaker, _bulkhead) = self.admit(key).await?;
        let result = match deadline {
            Some(limit) => match tokio::time::timeout(limit, f()).await {
                Ok(result) => result,
                Err(_) => Err(LlmError::TimeoutError(format!(
                    "upstream '{key}' did not answer within {}ms",
                    limit.as_millis()
                ))),
            },
            None => f().await,
        };
        breaker.record(outcome_of(&result));
        result
    }

    /// Take a breaker permit and a bulkhead slot for `key` without running
    /// anything. Used when the call outlives a single future, as streams do;
    /// the caller records the breaker outcome and holds the bulkhead permit
    /// for as long as the call runs.
    pub async fn admit(&self, key: &str) -> Result<(BreakerPermit, BulkheadPermit), LlmError> {
        let breaker = self.breaker(key).try_acquire()?;
        let bulkhead = self.bulkhead(key).acquire().await?;
        Ok((breaker, bulkhead))
    }
}

/// Breaker outcome for a finished call.
pub fn outcome_of<T>(result: &Result<T, LlmError>) -> CallOutcome {
    match result {
        Ok(_) => CallOutcome::Success,
        Err(err) if counts_against_breaker(err) => CallOutcome::Failure,
        Err(_) => CallOutcome::Ignored,
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;
    use crate::resilience::{BulkheadConfig, CircuitBreakerConfig, CircuitState};

    fn registry(threshold: u32) -> ResilienceRegistry {
        ResilienceRegistry::new(
            ResilienceConfig::default().with_circuit_breaker(
                CircuitBreakerConfig::new()
                    .with_failure_threshold(threshold)
                    .with_cooldown(Duration::from_secs(60)),
            ),
        )
    }

    #[tokio::test]
    async fn open_breaker_skips_the_call() {
        let reg = registry(2);
        let calls = AtomicU32::new(0);

        for _ in 0..2 {
            let _ = reg
                .with_circuit_breaker("up", || async {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Err::<(), _>(LlmError::api_error(503, "unavailable"))
                })
                .await;
        }
        assert_eq!(reg.breaker("up").state(), CircuitState::Open);

        for _ in 0..5 {
            let err = reg
                .with_circuit_breaker("up", || async {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                })
                .await
                .unwrap_err();
            assert!(matches!(err, LlmError::CircuitOpen { .. }));
        }
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn client_errors_do_not_trip_the_breaker() {
        let reg = registry(1);
        for _ in 0..3 {
            let _ = reg
                .with_circuit_breaker("up", || async {
                    Err::<(), _>(LlmError::api_error(400, "bad request"))
                })
                .await;
        }
        assert_eq!(reg.breaker("up").state(), CircuitState::Closed);
    }

    #[tokio::test]
    async fn upstreams_are_isolated() {
        let reg = registry(1);
        let _ = reg
            .with_circuit_breaker("a", || async {
                Err::<(), _>(LlmError::ConnectionError("refused".into()))
            })
            .await;
        assert_eq!(reg.breaker("a").state(), CircuitState::Open);
        assert_eq!(reg.breaker("b").state(), CircuitState::Closed);
        assert!(reg.with_circuit_breaker("b", || async { Ok(()) }).await.is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn deadline_maps_to_timeout_and_releases_slot() {
        let reg = registry(1);
        reg.configure(
            "slow",
            ResilienceConfig::default()
                .with_bulkhead(BulkheadConfig::new().with_max_concurrent(1).with_max_waiting(0)),
        );

        let err = reg
            .execute("slow", Some(Duration::from_millis(50)), || async {
                tokio::time::sleep(Duration::from_secs(10)).await;
                Ok(())
            })
            .await
            .unwrap_err();
        assert!(matches!(err, LlmError::TimeoutError(_)));
        assert_eq!(reg.bulkhead("slow").in_flight(), 0);
        assert_eq!(reg.breaker("slow").state(), CircuitState::Open);
    }

    #[test]
    fn overrides_apply_per_key() {
        let reg = registry(5);
        reg.configure(
            "tight",
            ResilienceConfig::default()
                .with_circuit_breaker(CircuitBreakerConfig::new().with_failure_threshold(1)),
        );
        assert_eq!(reg.breaker("tight").config().failure_threshold, 1);
        assert_eq!(reg.breaker("loose").config().failure_threshold, 5);
    }
}
