//! Continuous event stream over repeated long polls.

use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

use futures_util::Stream;
use tracing::{debug, error, warn};

use skyconn_core::{RawEvent, Result};

use crate::connection::Connection;

/// Delay before the first retry after a failed poll.
const INITIAL_BACKOFF: Duration = Duration::from_millis(500);

/// Upper bound on the retry delay.
const MAX_BACKOFF: Duration = Duration::from_secs(30);

/// Events from back-to-back long polls on one connection.
///
/// Network hiccups are retried with capped exponential backoff and never
/// reach the consumer. Other failures are yielded as `Err` items and polling
/// carries on, except for authentication failures, after which the stream
/// ends.
pub struct EventStream {
    inner: Pin<Box<dyn Stream<Item = Result<RawEvent>> + Send>>,
}

impl EventStream {
    pub(crate) fn new(connection: Connection) -> Self {
        let stream = async_stream::stream! {
            let mut failures: u32 = 0;
            loop {
                match connection.get_events().await {
                    Ok(batch) => {
                        failures = 0;
                        debug!(count = batch.events.len(), "Batch received");
                        for event in batch.events {
                            yield Ok(event);
                        }
                    }
                    Err(err) if err.is_transient() => {
                        failures = failures.saturating_add(1);
                        let delay = backoff(failures);
                        warn!(error = %err, attempt = failures, ?delay, "Poll failed, retrying");
                        tokio::time::sleep(delay).await;
                    }
                    Err(err) => {
                        let fatal = err.is_auth_failure();
                        error!(error = %err, fatal, "Poll failed");
                        yield Err(err);
                        if fatal {
                            break;
                        }
                        failures = failures.saturating_add(1);
                        tokio::time::sleep(backoff(failures)).await;
                    }
                }
            }
        };

        Self {
            inner: Box::pin(stream),
        }
    }
}

impl Stream for EventStream {
    type Item = Result<RawEvent>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.inner.as_mut().poll_next(cx)
    }
}

impl std::fmt::Debug for EventStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventStream").finish_non_exhaustive()
    }
}

/// Delay before retry number `attempt` (1-based).
fn backoff(attempt: u32) -> Duration {
    let factor = 2u32.saturating_pow(attempt.saturating_sub(1).min(16));
    INITIAL_BACKOFF.saturating_mul(factor).min(MAX_BACKOFF)
}
