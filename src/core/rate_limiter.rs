use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

const RESPONSE_WINDOW: usize = 50;

/// Request pacing state for one registered domain.
#[derive(Debug)]
pub struct DomainState {
    pub last_request_time: Option<Instant>,
    pub request_count: u64,
    pub error_count: u64,
    pub consecutive_errors: u32,
    pub avg_response_time: f64,
    pub current_delay: f64,
    response_times: Vec<f64>,
}

impl DomainState {
    fn new(base_delay: f64) -> Self {
        Self {
            last_request_time: None,
            request_count: 0,
            error_count: 0,
            consecutive_errors: 0,
            avg_response_time: 0.0,
            current_delay: base_delay,
            response_times: Vec::new(),
        }
    }

    fn record_request(&mut self, response_time: f64, success: bool) {
        self.last_request_time = Some(Instant::now());
        self.request_count += 1;

        if success {
            self.consecutive_errors = 0;
            self.response_times.push(response_time);
            if self.response_times.len() > RESPONSE_WINDOW {
                let excess = self.response_times.len() - RESPONSE_WINDOW;
                self.response_times.drain(..excess);
            }
            self.avg_response_time =
                self.response_times.iter().sum::<f64>() / self.response_times.len() as f64;
        } else {
            self.error_count += 1;
            self.consecutive_errors += 1;
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct DomainStats {
    pub domain: String,
    pub request_count: u64,
    pub error_count: u64,
    pub current_delay: f64,
    pub avg_response_time: f64,
}

/// Per-domain rate limiter that adapts to server behavior: slows down on
/// 429s, 5xx and error streaks, creeps back up on sustained success.
///
/// Each domain has its own lock so acquires for different domains proceed
/// in parallel while acquires for the same domain serialize.
pub struct AdaptiveRateLimiter {
    base_delay: f64,
    min_delay: f64,
    max_delay: f64,
    adaptive: bool,
    jitter: f64,
    domains: std::sync::Mutex<HashMap<String, Arc<Mutex<DomainState>>>>,
}

impl AdaptiveRateLimiter {
    pub fn new(requests_per_second: f64, min_delay: f64, max_delay: f64, adaptive: bool) -> Self {
        Self {
            base_delay: 1.0 / requests_per_second.max(f64::EPSILON),
            min_delay,
            max_delay,
            adaptive,
            jitter: 0.3,
            domains: std::sync::Mutex::new(HashMap::new()),
        }
    }

    pub fn with_jitter(mut self, jitter: f64) -> Self {
        self.jitter = jitter.clamp(0.0, 1.0);
        self
    }

    fn domain_state(&self, domain: &str) -> Arc<Mutex<DomainState>> {
        let mut domains = self.domains.lock().expect("rate limiter map poisoned");
        domains
            .entry(domain.to_string())
            .or_insert_with(|| {
                Arc::new(Mutex::new(DomainState::new(
                    self.base_delay.clamp(self.min_delay, self.max_delay),
                )))
            })
            .clone()
    }

    /// Wait until a request to `domain` is allowed. At most one caller per
    /// domain computes its slot at a time.
    pub async fn acquire(&self, domain: &str) {
        let state = self.domain_state(domain);
        let mut state = state.lock().await;

        let delay = if self.adaptive {
            state.current_delay
        } else {
            self.base_delay
        };

        if let Some(last) = state.last_request_time {
            let elapsed = last.elapsed().as_secs_f64();
            let remaining = delay - elapsed;
            if remaining > 0.0 {
                let actual = apply_jitter(remaining, self.jitter);
                debug!(domain, delay_s = format!("{actual:.2}"), "rate limit wait");
                tokio::time::sleep(Duration::from_secs_f64(actual)).await;
            }
        }

        // Reserve the slot before releasing the domain lock so the next
        // acquirer paces itself off this request's start.
        state.last_request_time = Some(Instant::now());
    }

    /// Record a completed request so the delay can adapt.
    pub async fn record(&self, domain: &str, response_time: f64, success: bool, status: u16) {
        let state = self.domain_state(domain);
        let mut state = state.lock().await;
        state.record_request(response_time, success);

        if self.adaptive {
            self.adjust_delay(domain, &mut state, status);
        }
    }

    fn adjust_delay(&self, domain: &str, state: &mut DomainState, status: u16) {
        if status == 429 {
            state.current_delay = (state.current_delay * 3.0).min(self.max_delay);
            warn!(
                domain,
                new_delay = format!("{:.2}s", state.current_delay),
                "429 received, backing off"
            );
        } else if status >= 500 {
            state.current_delay = (state.current_delay * 2.0).min(self.max_delay);
        } else if state.consecutive_errors >= 3 {
            state.current_delay = (state.current_delay * 2.0).min(self.max_delay);
        } else if state.consecutive_errors == 0 && status < 400 {
            state.current_delay = (state.current_delay * 0.95).max(self.min_delay);
        }
    }

    /// Apply a robots.txt `Crawl-delay` directive, never going below the
    /// configured floor.
    pub async fn set_crawl_delay(&self, domain: &str, delay: f64) {
        let state = self.domain_state(domain);
        let mut state = state.lock().await;
        state.current_delay = delay.max(self.min_delay);
        info!(
            domain,
            delay = format!("{:.2}s", state.current_delay),
            "crawl-delay applied"
        );
    }

    pub async fn current_delay(&self, domain: &str) -> f64 {
        self.domain_state(domain).lock().await.current_delay
    }

    pub async fn stats(&self, domain: &str) -> DomainStats {
        let state = self.domain_state(domain);
        let state = state.lock().await;
        DomainStats {
            domain: domain.to_string(),
            request_count: state.request_count,
            error_count: state.error_count,
            current_delay: state.current_delay,
            avg_response_time: state.avg_response_time,
        }
    }
}

/// Perturb `remaining` by a uniform ±`jitter` fraction, clamped at zero.
fn apply_jitter(remaining: f64, jitter: f64) -> f64 {
    if jitter <= 0.0 {
        return remaining;
    }
    use rand::RngExt;
    let amount = remaining * jitter;
    let offset = rand::rng().random_range(-amount..=amount);
    (remaining + offset).max(0.0)
}
