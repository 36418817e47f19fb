//! Polling until a remote resource reaches a target state.
//!
//! [`StateChangeConf`] drives a caller-supplied refresh closure until the
//! observed state lands in the target set, fails on an unexpected state or
//! refresh error, or runs out of time. It backs both the ARM asynchronous
//! operation wait in [`crate::client`] and the property convergence waits in
//! the resource modules.

use std::future::Future;
use std::time::Duration;

use tokio::time::{sleep_until, Instant};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::ProviderError;

/// Pseudo-state reported when the refresh closure finds no resource.
pub const NOT_FOUND_STATE: &str = "ResponseNotFound";

/// What a single refresh observed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Refresh {
    /// The resource exists and reports this state.
    State(String),
    /// The resource could not be found (yet, or any more).
    NotFound,
}

impl Refresh {
    /// Shorthand for [`Refresh::State`].
    pub fn state(state: impl Into<String>) -> Self {
        Self::State(state.into())
    }
}

/// Configuration for a wait on a state transition.
///
/// # Example
///
/// ```
/// use std::time::Duration;
/// use azurerm_postgresql::poller::{Refresh, StateChangeConf};
///
/// # tokio_test::block_on(async {
/// let conf = StateChangeConf::new(&["Inaccessible"], &["Ready"])
///     .with_min_interval(Duration::from_millis(1))
///     .with_timeout(Duration::from_secs(5));
/// let state = conf
///     .wait_for_state(|| async { Ok(Refresh::state("Ready")) })
///     .await
///     .unwrap();
/// assert_eq!(state, "Ready");
/// # });
/// ```
#[derive(Debug, Clone)]
pub struct StateChangeConf {
    pending: Vec<String>,
    target: Vec<String>,
    delay: Duration,
    min_interval: Duration,
    timeout: Duration,
    continuous_target_occurrence: u32,
    not_found_checks: u32,
    cancel: Option<CancellationToken>,
}

impl StateChangeConf {
    /// Create a wait from the pending and target state sets.
    pub fn new(pending: &[&str], target: &[&str]) -> Self {
        Self {
            pending: pending.iter().map(|s| s.to_string()).collect(),
            target: target.iter().map(|s| s.to_string()).collect(),
            delay: Duration::ZERO,
            min_interval: Duration::from_secs(10),
            timeout: Duration::from_secs(20 * 60),
            continuous_target_occurrence: 1,
            not_found_checks: 20,
            cancel: None,
        }
    }

    /// Wait this long before the first refresh.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Refresh no more often than this.
    pub fn with_min_interval(mut self, interval: Duration) -> Self {
        self.min_interval = interval;
        self
    }

    /// Give up once this much time has passed.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Require the target state this many times in a row.
    pub fn with_continuous_target_occurrence(mut self, count: u32) -> Self {
        self.continuous_target_occurrence = count.max(1);
        self
    }

    /// Tolerate this many consecutive not-found refreshes.
    pub fn with_not_found_checks(mut self, count: u32) -> Self {
        self.not_found_checks = count;
        self
    }

    /// Abort the wait when `token` is cancelled.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    /// The configured timeout.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Poll `refresh` until a target state is reached.
    ///
    /// Returns the final state string. A refresh error is returned as-is.
    pub async fn wait_for_state<F, Fut>(&self, mut refresh: F) -> Result<String, ProviderError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<Refresh, ProviderError>>,
    {
        let start = Instant::now();
        let deadline = start + self.timeout;
        let mut last_state = String::from("<none>");
        let mut target_seen = 0u32;
        let mut not_found_seen = 0u32;

        if !self.delay.is_zero() {
            self.pause_until((start + self.delay).min(deadline)).await?;
        }

        loop {
            let state = match refresh().await? {
                Refresh::State(state) => state,
                Refresh::NotFound => NOT_FOUND_STATE.to_string(),
            };
            debug!(state = %state, target = ?self.target, "refreshed state");

            if self.target.contains(&state) {
                target_seen += 1;
                if target_seen >= self.continuous_target_occurrence {
                    return Ok(state);
                }
            } else {
                target_seen = 0;
                if state == NOT_FOUND_STATE {
                    not_found_seen += 1;
                    if not_found_seen > self.not_found_checks {
                        return Err(ProviderError::NotFound(format!(
                            "resource was not found after {} checks while waiting for state to \
                             become {:?}",
                            not_found_seen, self.target
                        )));
                    }
                } else if self.pending.contains(&state) {
                    not_found_seen = 0;
                } else {
                    return Err(ProviderError::FailedPrecondition(format!(
                        "unexpected state {:?}, wanted target {:?}",
                        state, self.target
                    )));
                }
            }
            last_state = state;

            let now = Instant::now();
            if now >= deadline {
                return Err(ProviderError::DeadlineExceeded(format!(
                    "timeout while waiting for state to become {:?} (last state: {:?}, timeout: {:?})",
                    self.target, last_state, self.timeout
                )));
            }

            self.pause_until((now + self.min_interval).min(deadline))
                .await?;
        }
    }

    async fn pause_until(&self, wake: Instant) -> Result<(), ProviderError> {
        match &self.cancel {
            Some(token) => tokio::select! {
                _ = sleep_until(wake) => Ok(()),
                _ = token.cancelled() => Err(ProviderError::DeadlineExceeded(format!(
                    "cancelled while waiting for state to become {:?}",
                    self.target
                ))),
            },
            None => {
                sleep_until(wake).await;
                Ok(())
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn conf() -> StateChangeConf {
        StateChangeConf::new(&["Inaccessible"], &["Ready"])
            .with_min_interval(Duration::from_secs(15))
            .with_timeout(Duration::from_secs(600))
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_after_pending_states() {
        let calls = AtomicUsize::new(0);
        let start = Instant::now();

        let state = conf()
            .wait_for_state(|| {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n < 4 {
                        Ok(Refresh::state("Inaccessible"))
                    } else {
                        Ok(Refresh::state("Ready"))
                    }
                }
            })
            .await
            .unwrap();

        assert_eq!(state, "Ready");
        assert_eq!(calls.load(Ordering::SeqCst), 5);
        assert!(start.elapsed() >= Duration::from_secs(4 * 15));
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_not_before_deadline() {
        let calls = AtomicUsize::new(0);
        let start = Instant::now();
        let conf = conf().with_timeout(Duration::from_secs(100));

        let err = conf
            .wait_for_state(|| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Ok(Refresh::state("Inaccessible")) }
            })
            .await
            .unwrap_err();

        assert!(matches!(err, ProviderError::DeadlineExceeded(_)));
        assert!(err.message().contains("Inaccessible"));
        assert!(err.message().contains("Ready"));
        assert!(start.elapsed() >= Duration::from_secs(100));
        // 0, 15, ..., 90 and the final refresh at the deadline
        assert_eq!(calls.load(Ordering::SeqCst), 8);
    }

    #[tokio::test(start_paused = true)]
    async fn test_not_found_is_pending() {
        let calls = AtomicUsize::new(0);

        let state = conf()
            .wait_for_state(|| {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n < 3 {
                        Ok(Refresh::NotFound)
                    } else {
                        Ok(Refresh::state("Ready"))
                    }
                }
            })
            .await
            .unwrap();

        assert_eq!(state, "Ready");
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_not_found_checks_exhausted() {
        let err = conf()
            .with_not_found_checks(2)
            .wait_for_state(|| async { Ok(Refresh::NotFound) })
            .await
            .unwrap_err();

        assert!(err.is_not_found());
    }

    #[tokio::test(start_paused = true)]
    async fn test_not_found_as_target() {
        let calls = AtomicUsize::new(0);

        let state = StateChangeConf::new(&["Deleting"], &[NOT_FOUND_STATE])
            .with_min_interval(Duration::from_secs(5))
            .wait_for_state(|| {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n == 0 {
                        Ok(Refresh::state("Deleting"))
                    } else {
                        Ok(Refresh::NotFound)
                    }
                }
            })
            .await
            .unwrap();

        assert_eq!(state, NOT_FOUND_STATE);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unexpected_state_fails_fast() {
        let calls = AtomicUsize::new(0);

        let err = conf()
            .wait_for_state(|| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Ok(Refresh::state("Dropping")) }
            })
            .await
            .unwrap_err();

        assert!(matches!(err, ProviderError::FailedPrecondition(_)));
        assert!(err.message().contains("Dropping"));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_refresh_error_fails_fast() {
        let err = conf()
            .wait_for_state(|| async {
                Err(ProviderError::PermissionDenied("no access".to_string()))
            })
            .await
            .unwrap_err();

        assert!(matches!(err, ProviderError::PermissionDenied(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_continuous_target_occurrence() {
        let states = ["Ready", "InProgress", "Ready", "Ready", "Ready"];
        let calls = AtomicUsize::new(0);
        let start = Instant::now();

        let state = StateChangeConf::new(&["InProgress"], &["Ready"])
            .with_min_interval(Duration::from_secs(60))
            .with_continuous_target_occurrence(3)
            .wait_for_state(|| {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                let state = states[n.min(states.len() - 1)];
                async move { Ok(Refresh::state(state)) }
            })
            .await
            .unwrap();

        assert_eq!(state, "Ready");
        assert_eq!(calls.load(Ordering::SeqCst), 5);
        assert!(start.elapsed() >= Duration::from_secs(4 * 60));
    }

    #[tokio::test(start_paused = true)]
    async fn test_delay_before_first_refresh() {
        let start = Instant::now();

        conf()
            .with_delay(Duration::from_secs(30))
            .wait_for_state(|| async { Ok(Refresh::state("Ready")) })
            .await
            .unwrap();

        assert!(start.elapsed() >= Duration::from_secs(30));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancellation() {
        let token = CancellationToken::new();
        token.cancel();

        let err = conf()
            .with_cancellation(token)
            .wait_for_state(|| async { Ok(Refresh::state("Inaccessible")) })
            .await
            .unwrap_err();

        assert!(matches!(err, ProviderError::DeadlineExceeded(_)));
        assert!(err.message().contains("cancelled"));
    }
}
