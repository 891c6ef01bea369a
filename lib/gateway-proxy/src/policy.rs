//! Timeout and dial retry policies

use std::future::Future;
use std::io;
use std::time::Duration;
use tracing::debug;

/// Timeout policy for proxied requests
#[derive(Clone, Debug)]
pub struct TimeoutPolicy {
    /// Time allowed between dispatch and upstream response headers
    pub request_timeout: Duration,
}

impl Default for TimeoutPolicy {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(30),
        }
    }
}

/// Fixed retry policy for named pipe dials.
///
/// Pipes reject connections while the runtime is busy serving another client,
/// so a dial is attempted a fixed number of times with a constant pause. This
/// is not a backoff scheme: the pause never grows.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PipeRetryPolicy {
    /// Total number of attempts, including the first one
    pub attempts: u32,
    /// Pause between two attempts
    pub pause: Duration,
}

impl Default for PipeRetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            pause: Duration::from_millis(10),
        }
    }
}

impl PipeRetryPolicy {
    /// Run `dial` until it succeeds or the attempts are exhausted.
    ///
    /// `dial` receives the 1-based attempt number. The pause is an async sleep,
    /// so dropping the returned future cancels the remaining attempts.
    pub async fn run<T, F, Fut>(&self, mut dial: F) -> io::Result<T>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = io::Result<T>>,
    {
        let attempts = self.attempts.max(1);
        let mut attempt = 1;
        loop {
            match dial(attempt).await {
                Ok(value) => return Ok(value),
                Err(e) if attempt < attempts => {
                    debug!("Dial attempt {}/{} failed: {}", attempt, attempts, e);
                    tokio::time::sleep(self.pause).await;
                    attempt += 1;
                }
                Err(e) => {
                    debug!("Dial failed after {} attempts: {}", attempts, e);
                    return Err(e);
                }
            }
        }
    }
}
