//! Deadline wrapper for blocking collaborator calls.
//!
//! The closure runs on a blocking worker; if the deadline elapses first
//! the caller gets `default` immediately and the worker is abandoned —
//! not killed. The abandoned call may still complete later, but its
//! result lands in a dropped join handle and cannot touch program state.

use std::time::Duration;
use tracing::warn;

/// Run `f` on a blocking worker, bounded by `timeout`.
///
/// A deadline elapse yields `default`; a result produced in time —
/// including an error value — is returned as-is. A panicking worker is
/// treated like a timed-out one.
pub async fn run_with_deadline<T, F>(timeout: Duration, default: T, f: F) -> T
where
    T: Send + 'static,
    F: FnOnce() -> T + Send + 'static,
{
    let worker = tokio::task::spawn_blocking(f);
    match tokio::time::timeout(timeout, worker).await {
        Ok(Ok(value)) => value,
        Ok(Err(join_err)) => {
            warn!("timeboxed call panicked: {join_err}");
            default
        }
        Err(_) => {
            warn!("timeboxed call exceeded {}s deadline", timeout.as_secs());
            default
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;
    use std::time::Instant;

    #[tokio::test]
    async fn completes_within_deadline() {
        let result = run_with_deadline(Duration::from_secs(5), 0, || 42).await;
        assert_eq!(result, 42);
    }

    #[tokio::test]
    async fn deadline_returns_default_promptly() {
        let started = Instant::now();
        let result = run_with_deadline(Duration::from_millis(200), "default", || {
            std::thread::sleep(Duration::from_secs(3));
            "too late"
        })
        .await;
        assert_eq!(result, "default");
        assert!(started.elapsed() < Duration::from_secs(2));
    }

    #[tokio::test]
    async fn error_within_deadline_is_returned() {
        let result: Result<u32, String> =
            run_with_deadline(Duration::from_secs(5), Ok(0), || Err("collaborator failed".to_owned()))
                .await;
        assert_eq!(result, Err("collaborator failed".to_owned()));
    }

    #[tokio::test]
    async fn panic_yields_default() {
        let result = run_with_deadline(Duration::from_secs(5), 7, || panic!("worker bug")).await;
        assert_eq!(result, 7);
    }
}
