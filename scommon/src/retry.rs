//! Bounded retry policy, hook contracts, and the shared retry combinator.

use std::fmt::Display;
use std::future::Future;
use std::time::{Duration, Instant};

use crate::BoxFuture;

/// Errors that a retry loop can classify.
pub trait RetryableError: Display + Send + Sync {
    fn is_retryable(&self) -> bool;

    fn kind_label(&self) -> &'static str;
}

#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    pub backoff_multiplier: f64,
    /// Fraction of each delay that may be shaved off at random, in `0.0..=1.0`.
    pub jitter_ratio: f64,
    /// Upper bound on wall-clock time for one operation, counting time spent inside
    /// attempts as well as scheduled delays. Checked before each retry is scheduled.
    pub soft_budget: Option<Duration>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(200),
            max_backoff: Duration::from_secs(5),
            backoff_multiplier: 2.0,
            jitter_ratio: 0.2,
            soft_budget: None,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            ..Self::default()
        }
    }

    pub fn with_backoff(mut self, initial_backoff: Duration, max_backoff: Duration) -> Self {
        self.initial_backoff = initial_backoff;
        self.max_backoff = max_backoff.max(initial_backoff);
        self
    }

    pub fn with_jitter_ratio(mut self, jitter_ratio: f64) -> Self {
        self.jitter_ratio = if jitter_ratio.is_finite() {
            jitter_ratio.clamp(0.0, 1.0)
        } else {
            0.0
        };
        self
    }

    pub fn with_soft_budget(mut self, soft_budget: Duration) -> Self {
        self.soft_budget = Some(soft_budget);
        self
    }

    pub fn should_retry(&self, attempt: u32, error: &dyn RetryableError) -> bool {
        error.is_retryable() && attempt < self.max_attempts
    }

    pub fn within_budget(&self, spent: Duration, next_delay: Duration) -> bool {
        match self.soft_budget {
            Some(budget) => spent.saturating_add(next_delay) <= budget,
            None => true,
        }
    }

    pub fn backoff_for_attempt(&self, attempt: u32) -> Duration {
        let exponent = (attempt.saturating_sub(1)) as i32;
        let unbounded = self.initial_backoff.as_secs_f64() * self.backoff_multiplier.powi(exponent);
        Duration::from_secs_f64(unbounded.min(self.max_backoff.as_secs_f64()))
    }

    /// Backoff reduced by `jitter_ratio * unit`, where `unit` is drawn from `0.0..1.0`.
    pub fn jittered_backoff(&self, attempt: u32, unit: f64) -> Duration {
        let base = self.backoff_for_attempt(attempt);
        let unit = if unit.is_finite() {
            unit.clamp(0.0, 1.0)
        } else {
            0.0
        };
        base.mul_f64(1.0 - self.jitter_ratio.clamp(0.0, 1.0) * unit)
    }
}

pub trait RetryHooks: Send + Sync {
    fn on_attempt_start(&self, _operation: &str, _attempt: u32) {}

    fn on_retry_scheduled(
        &self,
        _operation: &str,
        _attempt: u32,
        _delay: Duration,
        _error: &dyn RetryableError,
    ) {
    }

    fn on_success(&self, _operation: &str, _attempts: u32) {}

    fn on_failure(&self, _operation: &str, _attempts: u32, _error: &dyn RetryableError) {}
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NoopRetryHooks;

impl RetryHooks for NoopRetryHooks {}

/// Suspends a retry loop between attempts.
pub trait Sleeper: Send + Sync {
    fn sleep(&self, delay: Duration) -> BoxFuture<'static, ()>;
}

/// Runtime-agnostic timer sleeper.
#[derive(Debug, Default, Clone, Copy)]
pub struct TimerSleeper;

impl Sleeper for TimerSleeper {
    fn sleep(&self, delay: Duration) -> BoxFuture<'static, ()> {
        Box::pin(futures_timer::Delay::new(delay))
    }
}

/// Returns immediately; for tests and latency-insensitive callers.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopSleeper;

impl Sleeper for NoopSleeper {
    fn sleep(&self, _delay: Duration) -> BoxFuture<'static, ()> {
        Box::pin(async {})
    }
}

pub async fn execute_with_retry<T, E, Op, OpFuture, Sleep, SleepFuture>(
    operation: &str,
    policy: &RetryPolicy,
    hooks: &dyn RetryHooks,
    mut execute: Op,
    mut sleep: Sleep,
) -> Result<T, E>
where
    E: RetryableError,
    Op: FnMut(u32) -> OpFuture,
    OpFuture: Future<Output = Result<T, E>>,
    Sleep: FnMut(Duration) -> SleepFuture,
    SleepFuture: Future<Output = ()>,
{
    let mut attempt = 1;
    let started = Instant::now();
    let mut scheduled = Duration::ZERO;

    loop {
        hooks.on_attempt_start(operation, attempt);

        match execute(attempt).await {
            Ok(value) => {
                hooks.on_success(operation, attempt);
                return Ok(value);
            }
            Err(error) => {
                if policy.should_retry(attempt, &error) {
                    let delay = policy.jittered_backoff(attempt, rand::random::<f64>());
                    let spent = started.elapsed().max(scheduled);
                    if policy.within_budget(spent, delay) {
                        hooks.on_retry_scheduled(operation, attempt, delay, &error);
                        sleep(delay).await;
                        scheduled += delay;
                        attempt += 1;
                        continue;
                    }
                }

                hooks.on_failure(operation, attempt, &error);
                return Err(error);
            }
        }
    }
}
