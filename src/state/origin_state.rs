use std::time::{Duration, Instant};

/// Tracks request timing for one origin
///
/// The crawl delay is the effective delay reported by the compliance checker
/// for this origin (or the configured default when robots.txt declares none).
#[derive(Debug, Clone)]
pub struct OriginState {
    /// Number of requests made to this origin in the current run
    pub request_count: u32,

    /// Timestamp of the last request to this origin
    pub last_request_time: Option<Instant>,

    /// Minimum spacing between two requests to this origin
    pub crawl_delay: Duration,
}

impl OriginState {
    pub fn new(crawl_delay: Duration) -> Self {
        Self {
            request_count: 0,
            last_request_time: None,
            crawl_delay,
        }
    }

    /// Records that a request was made to this origin
    pub fn record_request(&mut self, now: Instant) {
        self.request_count += 1;
        self.last_request_time = Some(now);
    }

    /// Replaces the crawl delay, keeping the larger of the old and new value
    pub fn raise_crawl_delay(&mut self, delay: Duration) {
        if delay > self.crawl_delay {
            self.crawl_delay = delay;
        }
    }

    /// Calculates the time until the next request can be made
    ///
    /// Returns None if a request can be made now, or the duration to wait otherwise.
    pub fn time_until_next_request(&self, now: Instant) -> Option<Duration> {
        let last = self.last_request_time?;
        let elapsed = now.saturating_duration_since(last);
        if elapsed < self.crawl_delay {
            Some(self.crawl_delay - elapsed)
        } else {
            None
        }
    }
}

impl Default for OriginState {
    fn default() -> Self {
        Self::new(Duration::from_secs(1))
    }
}
