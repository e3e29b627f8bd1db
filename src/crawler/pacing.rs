//! Per-origin request pacing
//!
//! Requests to one origin are spaced by that origin's effective crawl delay
//! (the robots.txt value when declared, otherwise the configured default).
//! Requests to different origins never wait on each other.

use crate::state::OriginState;
use std::collections::HashMap;
use std::time::{Duration, Instant};

/// Tracks the last request per origin and sleeps when needed
#[derive(Debug)]
pub struct Pacer {
    default_delay: Duration,
    origins: HashMap<String, OriginState>,
}

impl Pacer {
    pub fn new(default_delay: Duration) -> Self {
        Self {
            default_delay,
            origins: HashMap::new(),
        }
    }

    /// Returns how long a request to `origin` would have to wait at `now`
    ///
    /// `crawl_delay` replaces the default when it is longer.
    pub fn delay_for(
        &mut self,
        origin: &str,
        crawl_delay: Option<Duration>,
        now: Instant,
    ) -> Option<Duration> {
        let state = self.state_mut(origin, crawl_delay);
        state.time_until_next_request(now)
    }

    /// Waits until a request to `origin` is allowed, then records it
    pub async fn wait_turn(&mut self, origin: &str, crawl_delay: Option<Duration>) {
        if let Some(wait) = self.delay_for(origin, crawl_delay, Instant::now()) {
            tracing::debug!("Waiting {:?} before next request to {}", wait, origin);
            tokio::time::sleep(wait).await;
        }

        let state = self.state_mut(origin, crawl_delay);
        state.record_request(Instant::now());
    }

    /// Number of requests recorded for `origin`
    pub fn request_count(&self, origin: &str) -> u32 {
        self.origins.get(origin).map_or(0, |s| s.request_count)
    }

    fn state_mut(&mut self, origin: &str, crawl_delay: Option<Duration>) -> &mut OriginState {
        let default_delay = self.default_delay;
        let state = self
            .origins
            .entry(origin.to_string())
            .or_insert_with(|| OriginState::new(default_delay));
        if let Some(delay) = crawl_delay {
            state.raise_crawl_delay(delay);
        }
        state
    }
}
