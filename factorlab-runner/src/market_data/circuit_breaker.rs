//! Circuit breaker for Yahoo chart-API bans and rate limits.
//!
//! Every HTTP status the chart endpoint answers with is classified here.
//! A 403 is an IP ban and opens the breaker at once. 429 and 5xx count toward
//! `failure_threshold`. A 404 is a per-symbol miss and leaves the count alone.
//! While open, requests are refused with the status that opened the breaker.

use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use reqwest::StatusCode;

use super::MarketDataError;

/// How the breaker treats one chart-API response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Healthy,
    Banned,
    Throttled,
    SymbolMiss,
}

impl Verdict {
    pub fn classify(status: StatusCode) -> Self {
        if status.is_success() {
            Verdict::Healthy
        } else if status == StatusCode::FORBIDDEN {
            Verdict::Banned
        } else if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
            Verdict::Throttled
        } else {
            Verdict::SymbolMiss
        }
    }
}

#[derive(Debug)]
struct BreakerState {
    opened: Option<(Instant, StatusCode)>,
    consecutive_failures: u32,
}

#[derive(Debug)]
pub struct CircuitBreaker {
    state: Mutex<BreakerState>,
    cooldown: Duration,
    failure_threshold: u32,
}

impl CircuitBreaker {
    pub fn new(cooldown: Duration, failure_threshold: u32) -> Self {
        Self {
            state: Mutex::new(BreakerState {
                opened: None,
                consecutive_failures: 0,
            }),
            cooldown,
            failure_threshold: failure_threshold.max(1),
        }
    }

    /// 30-minute cooldown, opens after 3 throttled responses in a row.
    pub fn for_provider() -> Self {
        Self::new(Duration::from_secs(30 * 60), 3)
    }

    fn state(&self) -> MutexGuard<'_, BreakerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// `Err` with the refusal while open. An expired cooldown closes the breaker.
    pub fn check(&self) -> Result<(), MarketDataError> {
        let mut state = self.state();
        match state.opened {
            None => Ok(()),
            Some((since, _)) if since.elapsed() >= self.cooldown => {
                state.opened = None;
                state.consecutive_failures = 0;
                Ok(())
            }
            Some((since, status)) => Err(MarketDataError::CircuitBreakerTripped {
                status: status.as_u16(),
                remaining_secs: self.cooldown.saturating_sub(since.elapsed()).as_secs(),
            }),
        }
    }

    /// Feed one response status; returns how it was classified.
    pub fn observe(&self, status: StatusCode) -> Verdict {
        let verdict = Verdict::classify(status);
        let mut state = self.state();
        match verdict {
            Verdict::Healthy => state.consecutive_failures = 0,
            Verdict::Banned => state.opened = Some((Instant::now(), status)),
            Verdict::Throttled => {
                state.consecutive_failures += 1;
                if state.consecutive_failures >= self.failure_threshold {
                    state.opened = Some((Instant::now(), status));
                }
            }
            Verdict::SymbolMiss => {}
        }
        verdict
    }
}
