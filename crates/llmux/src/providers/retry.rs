//! Retry policy wrapped around every backend call.
//!
//! Transient failures (rate limits, server errors, dropped connections) are retried with
//! exponential backoff and jitter. A backend supplied `Retry-After` hint takes precedence
//! over the computed delay.
use futures::future::Future;
use futures::StreamExt;
use rand::Rng;
use std::time::Duration;

use super::base::ChunkStream;
use crate::errors::{ProviderError, ProviderResult};

#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total number of attempts, including the first one
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub backoff_factor: f64,
    /// Fraction of the delay added or removed at random, between 0.0 and 1.0
    pub jitter: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(10),
            backoff_factor: 2.0,
            jitter: 0.1,
        }
    }
}

impl RetryPolicy {
    /// A policy that makes exactly one attempt
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            ..Default::default()
        }
    }

    /// How long to wait after the given (zero based) failed attempt
    pub fn delay_for(&self, attempt: u32, error: &ProviderError) -> Duration {
        if let Some(retry_after) = error.retry_after() {
            return retry_after;
        }

        let base = self.initial_delay.as_secs_f64() * self.backoff_factor.powi(attempt as i32);
        let capped = base.min(self.max_delay.as_secs_f64());
        let delay = if self.jitter > 0.0 {
            let range = capped * self.jitter;
            (capped + rand::thread_rng().gen_range(-range..=range)).max(0.0)
        } else {
            capped
        };
        Duration::from_secs_f64(delay)
    }

    fn should_retry(&self, error: &ProviderError, attempt: u32) -> bool {
        attempt + 1 < self.max_attempts && error.is_transient()
    }

    /// Run a request until it succeeds, fails permanently or runs out of attempts
    pub async fn run<F, Fut, T>(&self, mut operation: F) -> ProviderResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = ProviderResult<T>>,
    {
        let mut attempt = 0;
        loop {
            match operation().await {
                Ok(value) => return Ok(value),
                Err(err) if self.should_retry(&err, attempt) => {
                    let delay = self.delay_for(attempt, &err);
                    tracing::warn!(
                        attempt = attempt + 1,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "request failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }

    /// Streaming form of [`RetryPolicy::run`].
    ///
    /// `open` starts a fresh attempt. An attempt may only be replaced while nothing has
    /// been handed to the consumer yet. A failure after the first delivered chunk is
    /// yielded once as `StreamTerminated` and ends the stream.
    pub fn run_stream<F>(self, open: F) -> ChunkStream
    where
        F: Fn() -> ChunkStream + Send + 'static,
    {
        Box::pin(async_stream::stream! {
            let mut attempt = 0;
            let mut delivered = false;

            'attempts: loop {
                let mut chunks = open();
                while let Some(item) = chunks.next().await {
                    match item {
                        Ok(chunk) => {
                            delivered = true;
                            yield Ok(chunk);
                        }
                        Err(err) if delivered => {
                            yield Err(ProviderError::StreamTerminated(Box::new(err)));
                            return;
                        }
                        Err(err) if self.should_retry(&err, attempt) => {
                            let delay = self.delay_for(attempt, &err);
                            tracing::warn!(
                                attempt = attempt + 1,
                                delay_ms = delay.as_millis() as u64,
                                error = %err,
                                "stream failed before any output, retrying"
                            );
                            tokio::time::sleep(delay).await;
                            attempt += 1;
                            continue 'attempts;
                        }
                        Err(err) => {
                            yield Err(err);
                            return;
                        }
                    }
                }
                return;
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::stream::{StopReason, StreamChunk};
    use futures::stream;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn fast() -> RetryPolicy {
        RetryPolicy {
            initial_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(5),
            jitter: 0.0,
            ..Default::default()
        }
    }

    fn server_error() -> ProviderError {
        ProviderError::Server {
            status: 503,
            message: "unavailable".to_string(),
            retry_after: None,
        }
    }

    #[test]
    fn test_delay_backoff_and_retry_after() {
        let policy = RetryPolicy {
            jitter: 0.0,
            ..Default::default()
        };
        assert_eq!(policy.delay_for(0, &server_error()), Duration::from_secs(1));
        assert_eq!(policy.delay_for(2, &server_error()), Duration::from_secs(4));
        assert_eq!(policy.delay_for(10, &server_error()), Duration::from_secs(10));

        let limited = ProviderError::RateLimited {
            message: "slow down".to_string(),
            retry_after: Some(Duration::from_secs(30)),
        };
        assert_eq!(policy.delay_for(0, &limited), Duration::from_secs(30));
    }

    #[test]
    fn test_jitter_stays_in_range() {
        let policy = RetryPolicy {
            jitter: 0.5,
            ..Default::default()
        };
        for _ in 0..20 {
            let delay = policy.delay_for(0, &server_error());
            assert!(delay >= Duration::from_millis(500) && delay <= Duration::from_millis(1500));
        }
    }

    #[tokio::test]
    async fn test_run_retries_transient_errors() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let result = fast()
            .run(move || async move {
                if calls.fetch_add(1, Ordering::SeqCst) == 0 {
                    Err(server_error())
                } else {
                    Ok("done")
                }
            })
            .await;

        assert_eq!(result.unwrap(), "done");
        assert_eq!(counter.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_run_gives_up_after_max_attempts() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let result: ProviderResult<()> = fast()
            .run(move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(server_error())
            })
            .await;

        assert!(matches!(result, Err(ProviderError::Server { .. })));
        assert_eq!(counter.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_run_does_not_retry_permanent_errors() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let result: ProviderResult<()> = fast()
            .run(move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(ProviderError::Authentication("bad key".to_string()))
            })
            .await;

        assert!(matches!(result, Err(ProviderError::Authentication(_))));
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_run_stream_retries_before_first_chunk() {
        let opened = Arc::new(AtomicU32::new(0));
        let counter = opened.clone();
        let chunks: Vec<_> = fast()
            .run_stream(move || {
                let items = if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                    vec![Err(server_error())]
                } else {
                    vec![
                        Ok(StreamChunk::text("hi")),
                        Ok(StreamChunk::Done {
                            stop_reason: StopReason::EndTurn,
                        }),
                    ]
                };
                stream::iter(items).boxed()
            })
            .collect()
            .await;

        assert_eq!(opened.load(Ordering::SeqCst), 2);
        assert_eq!(chunks.len(), 2);
        assert!(chunks.iter().all(|c| c.is_ok()));
    }

    #[tokio::test]
    async fn test_run_stream_terminates_after_partial_output() {
        let opened = Arc::new(AtomicU32::new(0));
        let counter = opened.clone();
        let chunks: Vec<_> = fast()
            .run_stream(move || {
                counter.fetch_add(1, Ordering::SeqCst);
                stream::iter(vec![Ok(StreamChunk::text("partial")), Err(server_error())]).boxed()
            })
            .collect()
            .await;

        assert_eq!(opened.load(Ordering::SeqCst), 1);
        assert_eq!(chunks.len(), 2);
        assert!(matches!(
            chunks[1],
            Err(ProviderError::StreamTerminated(ref source)) if source.is_transient()
        ));
    }
}
