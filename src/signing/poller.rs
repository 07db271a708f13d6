use std::future::Future;
use std::time::Duration;

use crate::config::PollConfig;
use crate::error::{Error, Result};

use super::session::SessionState;

/// A poll result that may or may not be final.
pub trait Settled {
    fn is_settled(&self) -> bool;
}

impl Settled for SessionState {
    fn is_settled(&self) -> bool {
        SessionState::is_settled(self)
    }
}

/// Re-polls a provider session on a bounded exponential backoff.
///
/// A single status call never loops; this is the caller-side schedule
/// around it, for callers without a job scheduler of their own.
#[derive(Debug, Clone, Default)]
pub struct SessionPoller {
    config: PollConfig,
}

impl SessionPoller {
    pub fn new(config: PollConfig) -> Self {
        Self { config }
    }

    /// Delays between consecutive attempts: doubling from the initial
    /// backoff, capped at the maximum, one fewer than the attempt limit.
    pub fn delays(&self) -> impl Iterator<Item = Duration> {
        let max = self.config.max_backoff();
        let attempts = self.config.max_attempts();
        std::iter::successors(Some(self.config.initial_backoff().min(max)), move |delay| {
            Some((*delay * 2).min(max))
        })
        .take(attempts.saturating_sub(1) as usize)
    }

    /// Call `poll` until it returns a settled value, sleeping between calls.
    ///
    /// Retryable errors count as an unsettled attempt; any other error is
    /// returned at once. Running out of attempts is `SessionNotComplete`.
    pub async fn poll_until_settled<T, F, Fut>(&self, mut poll: F) -> Result<T>
    where
        T: Settled,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut delays = self.delays();
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            match poll().await {
                Ok(value) if value.is_settled() => return Ok(value),
                Ok(_) => trace!("Poll attempt {attempt} still pending"),
                Err(err) if err.is_retryable() => {
                    warn!("Poll attempt {attempt} failed, will retry: {err}")
                }
                Err(err) => return Err(err),
            }

            match delays.next() {
                Some(delay) => tokio::time::sleep(delay).await,
                None => {
                    return Err(Error::SessionNotComplete(format!(
                        "still pending after {attempt} attempts"
                    )))
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use assert_matches::assert_matches;
    use tokio::time::Instant;

    use super::*;

    fn poller(attempts: u32) -> SessionPoller {
        SessionPoller::new(PollConfig::new(
            attempts,
            Duration::from_millis(100),
            Duration::from_millis(300),
        ))
    }

    #[test]
    fn delays_double_and_cap() {
        let delays: Vec<_> = poller(5).delays().map(|d| d.as_millis()).collect();
        assert_eq!(delays, [100, 200, 300, 300]);
        assert_eq!(poller(1).delays().count(), 0);
        assert_eq!(poller(0).delays().count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn returns_first_settled_state() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let start = Instant::now();
        let state = poller(5)
            .poll_until_settled(move || async move {
                if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                    Ok(SessionState::Polling)
                } else {
                    Ok(SessionState::Expired {
                        code: "TIMEOUT".to_string(),
                    })
                }
            })
            .await
            .unwrap();

        assert_matches!(state, SessionState::Expired { .. });
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        // 100ms then 200ms of backoff, give or take timer rounding.
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_millis(300), "{elapsed:?}");
        assert!(elapsed < Duration::from_millis(310), "{elapsed:?}");
    }

    #[tokio::test(start_paused = true)]
    async fn gives_up_after_max_attempts() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let result = poller(3)
            .poll_until_settled(move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(SessionState::Polling)
            })
            .await;
        assert_matches!(result, Err(Error::SessionNotComplete(_)));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn retryable_errors_are_retried() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let state = poller(3)
            .poll_until_settled(move || async move {
                if calls.fetch_add(1, Ordering::SeqCst) == 0 {
                    Err(Error::provider(503, None, "busy"))
                } else {
                    Ok(SessionState::Failed {
                        code: "USER_CANCELLED".to_string(),
                        message: "cancelled".to_string(),
                    })
                }
            })
            .await
            .unwrap();
        assert_matches!(state, SessionState::Failed { .. });
    }

    #[tokio::test(start_paused = true)]
    async fn other_errors_stop_polling() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let result: Result<SessionState> = poller(5)
            .poll_until_settled(move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(Error::provider(400, None, "X"))
            })
            .await;
        assert_matches!(result, Err(Error::Provider { status: 400, .. }));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
