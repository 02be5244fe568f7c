//! Token-bucket rate limiter

use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::trace;

use crate::error::{Error, Result};

/// Token bucket bounding how fast work is admitted
///
/// `acquire` never fails; it only delays. Waiters are not served in FIFO
/// order: whoever takes the lock first after waking wins.
#[derive(Debug)]
pub struct RateLimiter {
    rate: f64,
    burst: f64,
    bucket: Mutex<Bucket>,
}

#[derive(Debug)]
struct Bucket {
    tokens: f64,
    last_refill: Instant,
}

impl RateLimiter {
    /// Create a limiter admitting `rate` operations per second.
    ///
    /// `burst` defaults to `rate` rounded down (at least 1). The bucket starts full.
    pub fn new(rate: f64, burst: Option<u32>) -> Result<Self> {
        if !rate.is_finite() || rate <= 0.0 {
            return Err(Error::Config(format!(
                "rate limit must be a positive number, got {}",
                rate
            )));
        }
        let burst = match burst {
            Some(0) => {
                return Err(Error::Config("burst size must be at least 1".to_string()));
            }
            Some(b) => f64::from(b),
            None => rate.floor().max(1.0),
        };

        Ok(Self {
            rate,
            burst,
            bucket: Mutex::new(Bucket {
                tokens: burst,
                last_refill: Instant::now(),
            }),
        })
    }

    pub fn rate(&self) -> f64 {
        self.rate
    }

    pub fn burst(&self) -> f64 {
        self.burst
    }

    /// Wait until a token is available, then take it
    pub async fn acquire(&self) {
        loop {
            let wait = {
                let mut bucket = self.bucket.lock().await;
                self.refill(&mut bucket);
                if bucket.tokens >= 1.0 {
                    bucket.tokens -= 1.0;
                    return;
                }
                Duration::from_secs_f64((1.0 - bucket.tokens) / self.rate)
            };
            trace!("Rate limiter waiting {:?} for a token", wait);
            // Other acquirers may drain the refill while we sleep, so re-check
            tokio::time::sleep(wait).await;
        }
    }

    /// Take a token if one is available right now
    pub async fn try_acquire(&self) -> bool {
        let mut bucket = self.bucket.lock().await;
        self.refill(&mut bucket);
        if bucket.tokens >= 1.0 {
            bucket.tokens -= 1.0;
            true
        } else {
            false
        }
    }

    /// Current token count after refilling
    pub async fn available_tokens(&self) -> f64 {
        let mut bucket = self.bucket.lock().await;
        self.refill(&mut bucket);
        bucket.tokens
    }

    fn refill(&self, bucket: &mut Bucket) {
        let now = Instant::now();
        let elapsed = now.duration_since(bucket.last_refill).as_secs_f64();
        bucket.tokens = (bucket.tokens + elapsed * self.rate).min(self.burst);
        bucket.last_refill = now;
    }
}
