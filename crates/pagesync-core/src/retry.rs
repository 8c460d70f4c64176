//! Fixed-budget retry wrapper around document API calls.
//!
//! No backoff between attempts and no discrimination between error kinds;
//! every failure consumes one attempt. Exhausting the budget logs the final
//! error and yields `None`, which callers treat as "could not fetch this
//! branch" rather than a run-fatal error.

use crate::Result;
use std::future::Future;
use tracing::{debug, error};

/// Invoke `op`, retrying on failure until the remaining-attempts budget is
/// spent. A budget of `n` allows `n` retries after the initial attempt.
pub async fn retry<T, F, Fut>(budget: u32, mut op: F) -> Option<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut remaining = budget;
    loop {
        match op().await {
            Ok(value) => return Some(value),
            Err(err) if remaining == 0 => {
                error!(
                    category = err.category(),
                    recoverable = err.is_recoverable(),
                    "retry budget exhausted: {err}"
                );
                return None;
            },
            Err(err) => {
                remaining -= 1;
                debug!(remaining, "retrying after error: {err}");
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn transient() -> Error {
        Error::Api {
            status: 503,
            message: "unavailable".to_string(),
        }
    }

    #[tokio::test]
    async fn succeeds_after_two_failures() {
        let calls = AtomicU32::new(0);
        let result = retry(3, || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err(transient())
                } else {
                    Ok(n)
                }
            }
        })
        .await;
        assert_eq!(result, Some(2));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn exhausted_budget_returns_none() {
        let calls = AtomicU32::new(0);
        let result: Option<u32> = retry(3, || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(transient()) }
        })
        .await;
        assert_eq!(result, None);
        // Budget of 3 means the initial attempt plus three retries.
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn zero_budget_attempts_once() {
        let calls = AtomicU32::new(0);
        let result: Option<u32> = retry(0, || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(transient()) }
        })
        .await;
        assert_eq!(result, None);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
