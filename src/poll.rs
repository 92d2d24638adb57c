//! Generic poll-until-condition primitive.
//!
//! Every "wait for X to become Y" in the pipeline has the same shape: sample
//! the resource with a probe, test the sample with a pure predicate, and retry
//! at a fixed interval until a time budget runs out. [`poll_until`] owns that
//! loop so the timeout, cancellation, and error semantics live in one place.

use std::future::Future;
use std::time::Duration;

use thiserror::Error;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Budget substituted when a caller supplies a zero or negative timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// Delay between probes when the caller does not pick one.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Verdict of a predicate over one probe sample.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Readiness {
    /// The awaited condition holds.
    Ready,
    /// The condition does not hold yet; keep polling.
    NotReady,
    /// The condition can never hold; stop polling.
    Fatal(String),
}

impl From<bool> for Readiness {
    fn from(value: bool) -> Self {
        if value { Self::Ready } else { Self::NotReady }
    }
}

/// Timeout budget and poll interval for a single wait.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct PollSpec {
    timeout: Duration,
    interval: Duration,
}

impl PollSpec {
    /// Builds a spec, substituting defaults for a zero timeout or interval.
    #[must_use]
    pub const fn new(timeout: Duration, interval: Duration) -> Self {
        Self {
            timeout: if timeout.is_zero() {
                DEFAULT_TIMEOUT
            } else {
                timeout
            },
            interval: if interval.is_zero() {
                DEFAULT_POLL_INTERVAL
            } else {
                interval
            },
        }
    }

    /// Builds a spec from whole seconds. Zero or negative timeouts become
    /// [`DEFAULT_TIMEOUT`].
    #[must_use]
    pub const fn from_secs(timeout_secs: i64, interval_secs: u64) -> Self {
        let timeout = if timeout_secs <= 0 {
            Duration::ZERO
        } else {
            Duration::from_secs(timeout_secs.unsigned_abs())
        };
        Self::new(timeout, Duration::from_secs(interval_secs))
    }

    /// Total time budget.
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Delay between probes.
    #[must_use]
    pub const fn interval(&self) -> Duration {
        self.interval
    }

    /// Number of probes issued before a never-satisfied wait times out.
    #[must_use]
    pub fn max_attempts(&self) -> u32 {
        let timeout = self.timeout.as_millis();
        let interval = self.interval.as_millis().max(1);
        u32::try_from(timeout.div_ceil(interval)).unwrap_or(u32::MAX)
    }
}

impl Default for PollSpec {
    fn default() -> Self {
        Self::new(DEFAULT_TIMEOUT, DEFAULT_POLL_INTERVAL)
    }
}

/// Failure modes of [`poll_until`].
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum PollError<E>
where
    E: std::error::Error + 'static,
{
    /// The condition never held within the budget.
    #[error("timed out after {}s waiting for {what} ({attempts} probes)", .waited.as_secs())]
    Timeout {
        /// Description of the awaited condition.
        what: String,
        /// Budget that was exhausted.
        waited: Duration,
        /// Number of probes issued.
        attempts: u32,
    },
    /// The probe itself failed; probe failures are never retried.
    #[error("probe failed while waiting for {what}: {source}")]
    Probe {
        /// Description of the awaited condition.
        what: String,
        /// Error returned by the probe.
        #[source]
        source: E,
    },
    /// The predicate reported that the condition can never hold.
    #[error("{what} can never be satisfied: {reason}")]
    Unsatisfiable {
        /// Description of the awaited condition.
        what: String,
        /// Reason reported by the predicate.
        reason: String,
    },
    /// The wait was cancelled.
    #[error("cancelled while waiting for {what}")]
    Cancelled {
        /// Description of the awaited condition.
        what: String,
    },
}

/// Repeatedly probes until `is_satisfied` reports [`Readiness::Ready`].
///
/// A probe returning `Ok(None)` means "no data yet" and is retried. A probe
/// error is propagated immediately. After each unsatisfied probe the budget is
/// reduced by one interval; once it reaches zero the call fails with
/// [`PollError::Timeout`], so a never-satisfied wait issues
/// [`PollSpec::max_attempts`] probes. Cancellation is observed before every
/// probe and while sleeping.
///
/// # Errors
///
/// Returns [`PollError`] on timeout, probe failure, a fatal predicate verdict,
/// or cancellation.
pub async fn poll_until<T, E, P, Fut, S>(
    what: &str,
    spec: PollSpec,
    cancel: &CancellationToken,
    mut probe: P,
    mut is_satisfied: S,
) -> Result<T, PollError<E>>
where
    E: std::error::Error + 'static,
    P: FnMut() -> Fut,
    Fut: Future<Output = Result<Option<T>, E>>,
    S: FnMut(&T) -> Readiness,
{
    let mut remaining = spec.timeout;
    let mut attempts: u32 = 0;

    loop {
        if cancel.is_cancelled() {
            return Err(PollError::Cancelled {
                what: what.to_owned(),
            });
        }

        attempts = attempts.saturating_add(1);
        let sample = probe().await.map_err(|source| PollError::Probe {
            what: what.to_owned(),
            source,
        })?;

        if let Some(value) = sample {
            match is_satisfied(&value) {
                Readiness::Ready => {
                    debug!(what, attempts, "condition satisfied");
                    return Ok(value);
                }
                Readiness::NotReady => {}
                Readiness::Fatal(reason) => {
                    return Err(PollError::Unsatisfiable {
                        what: what.to_owned(),
                        reason,
                    });
                }
            }
        }

        remaining = remaining.saturating_sub(spec.interval);
        if remaining.is_zero() {
            return Err(PollError::Timeout {
                what: what.to_owned(),
                waited: spec.timeout,
                attempts,
            });
        }

        debug!(what, attempts, "condition not yet satisfied");
        tokio::select! {
            () = cancel.cancelled() => {
                return Err(PollError::Cancelled { what: what.to_owned() });
            }
            () = sleep(spec.interval) => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;
    use std::collections::VecDeque;

    use super::*;
    use crate::client::CloudError;
    use rstest::rstest;

    fn never_cancelled() -> CancellationToken {
        CancellationToken::new()
    }

    #[rstest]
    #[case(0)]
    #[case(-1)]
    #[case(-300)]
    fn non_positive_timeouts_normalise_to_default(#[case] timeout_secs: i64) {
        assert_eq!(
            PollSpec::from_secs(timeout_secs, 5),
            PollSpec::from_secs(60, 5)
        );
    }

    #[rstest]
    #[case(60, 5, 12)]
    #[case(7, 5, 2)]
    #[case(5, 5, 1)]
    #[case(1, 5, 1)]
    fn max_attempts_is_ceiling_of_budget_over_interval(
        #[case] timeout_secs: i64,
        #[case] interval_secs: u64,
        #[case] expected: u32,
    ) {
        assert_eq!(
            PollSpec::from_secs(timeout_secs, interval_secs).max_attempts(),
            expected
        );
    }

    #[tokio::test(start_paused = true)]
    async fn returns_probe_value_once_satisfied() {
        let mut samples = VecDeque::from([Some(1_u32), None, Some(3)]);
        let calls = Cell::new(0_u32);
        let value = poll_until(
            "counter",
            PollSpec::default(),
            &never_cancelled(),
            || {
                calls.set(calls.get() + 1);
                let next = samples.pop_front().flatten();
                async move { Ok::<_, CloudError>(next) }
            },
            |value| Readiness::from(*value >= 3),
        )
        .await
        .unwrap_or_else(|err| panic!("poll should succeed: {err}"));

        assert_eq!(value, 3);
        assert_eq!(calls.get(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn probe_errors_propagate_without_retry() {
        let calls = Cell::new(0_u32);
        let result = poll_until(
            "instance",
            PollSpec::default(),
            &never_cancelled(),
            || {
                calls.set(calls.get() + 1);
                async { Err::<Option<u32>, _>(CloudError::permanent("Forbidden", "denied")) }
            },
            |_| Readiness::Ready,
        )
        .await;

        assert!(matches!(result, Err(PollError::Probe { .. })));
        assert_eq!(calls.get(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn fatal_predicate_stops_immediately() {
        let result = poll_until(
            "image",
            PollSpec::default(),
            &never_cancelled(),
            || async { Ok::<_, CloudError>(Some("CreateFailed")) },
            |status| Readiness::Fatal(format!("image entered {status}")),
        )
        .await;

        assert_eq!(
            result,
            Err(PollError::Unsatisfiable {
                what: String::from("image"),
                reason: String::from("image entered CreateFailed"),
            })
        );
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_after_ceiling_attempts() {
        let calls = Cell::new(0_u32);
        let spec = PollSpec::from_secs(60, 5);
        let result = poll_until(
            "stopped",
            spec,
            &never_cancelled(),
            || {
                calls.set(calls.get() + 1);
                async { Ok::<_, CloudError>(Some(false)) }
            },
            |ready| Readiness::from(*ready),
        )
        .await;

        assert!(
            matches!(result, Err(PollError::Timeout { attempts: 12, .. })),
            "unexpected result: {result:?}"
        );
        assert_eq!(calls.get(), spec.max_attempts());
    }

    #[tokio::test(start_paused = true)]
    async fn zero_timeout_behaves_like_sixty_seconds() {
        let zero = Cell::new(0_u32);
        let sixty = Cell::new(0_u32);
        for (timeout_secs, counter) in [(0, &zero), (60, &sixty)] {
            let result = poll_until(
                "never",
                PollSpec::from_secs(timeout_secs, 5),
                &never_cancelled(),
                || {
                    counter.set(counter.get() + 1);
                    async { Ok::<_, CloudError>(None::<()>) }
                },
                |()| Readiness::Ready,
            )
            .await;
            assert!(matches!(result, Err(PollError::Timeout { .. })));
        }
        assert_eq!(zero.get(), sixty.get());
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_is_observed_before_probing() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let calls = Cell::new(0_u32);
        let result = poll_until(
            "anything",
            PollSpec::default(),
            &cancel,
            || {
                calls.set(calls.get() + 1);
                async { Ok::<_, CloudError>(Some(())) }
            },
            |()| Readiness::Ready,
        )
        .await;

        assert!(matches!(result, Err(PollError::Cancelled { .. })));
        assert_eq!(calls.get(), 0);
    }
}
