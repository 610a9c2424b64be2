//! Guards for slow external calls: per-call timeout and cooperative cancellation.

use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::error::{BabelError, Result};

/// Limits shared by every external call of one job.
#[derive(Debug, Clone)]
pub struct CallGuard {
    limit: Duration,
    cancel: CancellationToken,
}

impl CallGuard {
    pub fn new(limit: Duration, cancel: CancellationToken) -> Self {
        Self { limit, cancel }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Run `call`, failing with `Timeout` after the limit or `Cancelled` when
    /// the job is cancelled. The call future is dropped in both cases.
    pub async fn run<T, F>(&self, operation: &str, call: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        if self.cancel.is_cancelled() {
            return Err(BabelError::Cancelled(operation.to_string()));
        }

        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => {
                warn!("{} abandoned: job cancelled", operation);
                Err(BabelError::Cancelled(operation.to_string()))
            }
            outcome = tokio::time::timeout(self.limit, call) => match outcome {
                Ok(result) => result,
                Err(_) => {
                    warn!("{} exceeded {}s", operation, self.limit.as_secs());
                    Err(BabelError::Timeout {
                        operation: operation.to_string(),
                        limit: self.limit,
                    })
                }
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_passes_through_result() {
        let guard = CallGuard::new(Duration::from_secs(5), CancellationToken::new());
        let value = tokio_test::assert_ok!(guard.run("noop", async { Ok(7) }).await);
        assert_eq!(value, 7);

        let err = tokio_test::assert_err!(
            guard
                .run::<(), _>("failing", async { Err(BabelError::Render("x".to_string())) })
                .await
        );
        assert!(matches!(err, BabelError::Render(_)));
    }

    #[tokio::test]
    async fn test_timeout_is_distinct_from_service_failure() {
        let guard = CallGuard::new(Duration::from_millis(50), CancellationToken::new());
        let err = guard
            .run("slow call", async {
                tokio::time::sleep(Duration::from_secs(10)).await;
                Ok(())
            })
            .await
            .unwrap_err();
        assert!(matches!(err, BabelError::Timeout { ref operation, .. } if operation == "slow call"));
    }

    #[tokio::test]
    async fn test_cancelled_before_start() {
        let token = CancellationToken::new();
        token.cancel();
        let guard = CallGuard::new(Duration::from_secs(5), token);
        let err = guard.run("transcription", async { Ok(()) }).await.unwrap_err();
        assert!(matches!(err, BabelError::Cancelled(_)));
        assert!(guard.is_cancelled());
    }

    #[tokio::test]
    async fn test_cancel_while_running() {
        let token = CancellationToken::new();
        let guard = CallGuard::new(Duration::from_secs(60), token.clone());
        let canceller = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            token.cancel();
        });
        let err = guard
            .run("render", async {
                tokio::time::sleep(Duration::from_secs(30)).await;
                Ok(())
            })
            .await
            .unwrap_err();
        canceller.await.unwrap();
        assert!(matches!(err, BabelError::Cancelled(_)));
    }
}
