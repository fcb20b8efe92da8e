// ABOUTME: Health probing with a bounded, fixed-interval retry loop.
// ABOUTME: A probe succeeds on the first healthy attempt and fails after max_attempts.

mod cancel;
mod check;
mod target;

pub use cancel::{CancelHandle, CancelSignal, cancel_pair};
pub use check::{Check, Observation, SystemCheck, http_get};
pub use target::{ProbeKind, ProbeTarget};

use async_trait::async_trait;
use std::time::{Duration, Instant};

use crate::config::HealthConfig;

#[derive(Debug, thiserror::Error)]
pub enum HealthError {
    #[error("health check failed after {attempts} attempts: {last}")]
    Exhausted { attempts: u32, last: String },

    #[error("health check cancelled after {attempts} attempts")]
    Cancelled { attempts: u32 },

    #[error("invalid health target: {0}")]
    InvalidTarget(String),
}

/// Attempt budget for one probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    /// Wait between attempts. There is no wait after the final attempt.
    pub interval: Duration,
    /// Upper bound on a single attempt.
    pub attempt_timeout: Duration,
}

impl RetryPolicy {
    pub fn from_config(config: &HealthConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            interval: config.interval,
            attempt_timeout: config.timeout,
        }
    }
}

/// A successful probe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeReport {
    pub attempts: u32,
    pub detail: String,
}

/// Confirms a target is healthy. The orchestrator only sees this seam.
#[async_trait]
pub trait HealthProbe: Send + Sync {
    async fn probe(
        &self,
        target: &ProbeTarget,
        cancel: &CancelSignal,
    ) -> Result<ProbeReport, HealthError>;
}

pub struct HealthProber<C> {
    check: C,
    policy: RetryPolicy,
}

impl<C: Check> HealthProber<C> {
    pub fn new(check: C, policy: RetryPolicy) -> Self {
        Self { check, policy }
    }

    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    async fn attempt(&self, target: &ProbeTarget) -> Observation {
        tokio::time::timeout(self.policy.attempt_timeout, self.check.check(target))
            .await
            .unwrap_or_else(|_| {
                Observation::unhealthy(format!(
                    "no answer within {:?}",
                    self.policy.attempt_timeout
                ))
            })
    }
}

#[async_trait]
impl<C: Check> HealthProbe for HealthProber<C> {
    async fn probe(
        &self,
        target: &ProbeTarget,
        cancel: &CancelSignal,
    ) -> Result<ProbeReport, HealthError> {
        let max_attempts = self.policy.max_attempts.max(1);
        let started = Instant::now();
        let mut last = String::new();

        for attempt in 1..=max_attempts {
            if cancel.is_cancelled() {
                return Err(HealthError::Cancelled {
                    attempts: attempt - 1,
                });
            }

            let observation = self.attempt(target).await;
            if observation.healthy {
                tracing::info!(
                    probe = %target,
                    attempt,
                    elapsed = ?started.elapsed(),
                    "healthy: {}",
                    observation.detail
                );
                return Ok(ProbeReport {
                    attempts: attempt,
                    detail: observation.detail,
                });
            }

            tracing::debug!(
                probe = %target,
                attempt,
                max_attempts,
                "not healthy yet: {}",
                observation.detail
            );
            last = observation.detail;

            if attempt < max_attempts {
                tokio::select! {
                    _ = tokio::time::sleep(self.policy.interval) => {}
                    _ = cancel.cancelled() => {
                        return Err(HealthError::Cancelled { attempts: attempt });
                    }
                }
            }
        }

        tracing::warn!(probe = %target, attempts = max_attempts, "health check exhausted: {}", last);
        Err(HealthError::Exhausted {
            attempts: max_attempts,
            last,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Healthy from the `healthy_from`-th attempt on.
    struct Scripted {
        calls: AtomicU32,
        healthy_from: u32,
    }

    #[async_trait]
    impl Check for Scripted {
        async fn check(&self, _target: &ProbeTarget) -> Observation {
            let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if n >= self.healthy_from {
                Observation::healthy("ok")
            } else {
                Observation::unhealthy(format!("attempt {n} refused"))
            }
        }
    }

    fn policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            interval: Duration::from_millis(10),
            attempt_timeout: Duration::from_secs(1),
        }
    }

    fn target() -> ProbeTarget {
        ProbeTarget::Tcp {
            address: "127.0.0.1:1".to_string(),
        }
    }

    #[tokio::test]
    async fn succeeds_on_first_healthy_attempt() {
        let prober = HealthProber::new(
            Scripted {
                calls: AtomicU32::new(0),
                healthy_from: 3,
            },
            policy(5),
        );

        let report = prober.probe(&target(), &CancelSignal::never()).await.unwrap();
        assert_eq!(report.attempts, 3);
        assert_eq!(prober.check.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn exhausts_after_max_attempts() {
        let prober = HealthProber::new(
            Scripted {
                calls: AtomicU32::new(0),
                healthy_from: u32::MAX,
            },
            policy(4),
        );

        let err = prober.probe(&target(), &CancelSignal::never()).await.unwrap_err();
        match err {
            HealthError::Exhausted { attempts, last } => {
                assert_eq!(attempts, 4);
                assert_eq!(last, "attempt 4 refused");
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(prober.check.calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn slow_attempt_counts_as_unhealthy() {
        struct Hangs;

        #[async_trait]
        impl Check for Hangs {
            async fn check(&self, _target: &ProbeTarget) -> Observation {
                std::future::pending().await
            }
        }

        let prober = HealthProber::new(
            Hangs,
            RetryPolicy {
                max_attempts: 2,
                interval: Duration::from_millis(1),
                attempt_timeout: Duration::from_millis(20),
            },
        );
        let err = prober.probe(&target(), &CancelSignal::never()).await.unwrap_err();
        assert!(matches!(err, HealthError::Exhausted { attempts: 2, .. }));
    }

    #[tokio::test]
    async fn cancellation_stops_waiting() {
        let prober = HealthProber::new(
            Scripted {
                calls: AtomicU32::new(0),
                healthy_from: u32::MAX,
            },
            RetryPolicy {
                max_attempts: 100,
                interval: Duration::from_secs(30),
                attempt_timeout: Duration::from_secs(1),
            },
        );
        let (handle, signal) = cancel_pair();

        let target = target();
        let probe = prober.probe(&target, &signal);
        let cancel = async {
            tokio::time::sleep(Duration::from_millis(20)).await;
            handle.cancel();
        };
        let (result, ()) = tokio::join!(probe, cancel);

        assert!(matches!(result, Err(HealthError::Cancelled { attempts: 1 })));
    }
}
