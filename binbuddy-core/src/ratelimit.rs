//! In-memory sliding-window rate limiter.

use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

use log::debug;

use crate::config::RateLimitSettings;
use crate::model::ClientId;
use crate::ports::{RateDecision, RateLimitPort};

/// Allows `max_requests` per client within any `window`.
pub struct SlidingWindowLimiter {
    window: Duration,
    max_requests: usize,
    hits: Mutex<HashMap<ClientId, VecDeque<Instant>>>,
}

impl SlidingWindowLimiter {
    /// Create a limiter from configuration.
    #[must_use]
    pub fn new(settings: RateLimitSettings) -> Self {
        Self {
            window: settings.window(),
            max_requests: settings.max_requests,
            hits: Mutex::new(HashMap::new()),
        }
    }

    fn check_at(&self, client: &ClientId, now: Instant) -> RateDecision {
        let mut hits = self.hits.lock().unwrap_or_else(PoisonError::into_inner);
        for history in hits.values_mut() {
            while history
                .front()
                .is_some_and(|oldest| now.saturating_duration_since(*oldest) >= self.window)
            {
                history.pop_front();
            }
        }
        // idle clients
        hits.retain(|_, history| !history.is_empty());

        let history = hits.entry(client.clone()).or_default();

        if history.len() >= self.max_requests {
            let retry_after = history.front().map_or(self.window, |oldest| {
                self.window
                    .saturating_sub(now.saturating_duration_since(*oldest))
            });
            debug!("client {} rate limited for {retry_after:?}", client.0);
            return RateDecision::Limited { retry_after };
        }

        history.push_back(now);
        RateDecision::Allowed
    }
}

impl RateLimitPort for SlidingWindowLimiter {
    fn check(&self, client: &ClientId) -> RateDecision {
        self.check_at(client, Instant::now())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limiter(max_requests: usize) -> SlidingWindowLimiter {
        SlidingWindowLimiter::new(RateLimitSettings {
            window_secs: 60,
            max_requests,
        })
    }

    #[test]
    fn limits_after_threshold() {
        let limiter = limiter(2);
        let client = ClientId("10.0.0.1".to_owned());
        let start = Instant::now();

        assert_eq!(limiter.check_at(&client, start), RateDecision::Allowed);
        assert_eq!(
            limiter.check_at(&client, start + Duration::from_secs(1)),
            RateDecision::Allowed
        );
        assert_eq!(
            limiter.check_at(&client, start + Duration::from_secs(10)),
            RateDecision::Limited {
                retry_after: Duration::from_secs(50)
            }
        );
    }

    #[test]
    fn window_slides() {
        let limiter = limiter(1);
        let client = ClientId("10.0.0.1".to_owned());
        let start = Instant::now();

        assert_eq!(limiter.check_at(&client, start), RateDecision::Allowed);
        assert!(
            matches!(
                limiter.check_at(&client, start + Duration::from_secs(30)),
                RateDecision::Limited { .. }
            ),
            "second request inside the window"
        );
        assert_eq!(
            limiter.check_at(&client, start + Duration::from_secs(60)),
            RateDecision::Allowed
        );
    }

    #[test]
    fn idle_clients_are_forgotten() {
        let limiter = limiter(5);
        let start = Instant::now();

        for name in ["a", "b", "c"] {
            assert_eq!(
                limiter.check_at(&ClientId(name.to_owned()), start),
                RateDecision::Allowed
            );
        }
        assert_eq!(limiter.hits.lock().expect("hits lock").len(), 3);

        assert_eq!(
            limiter.check_at(&ClientId("d".to_owned()), start + Duration::from_secs(61)),
            RateDecision::Allowed
        );

        let hits = limiter.hits.lock().expect("hits lock");
        assert_eq!(hits.len(), 1, "only the active client is kept");
        assert!(hits.contains_key(&ClientId("d".to_owned())), "active client");
    }

    #[test]
    fn clients_are_independent() {
        let limiter = limiter(1);
        let start = Instant::now();

        assert_eq!(
            limiter.check_at(&ClientId("a".to_owned()), start),
            RateDecision::Allowed
        );
        assert_eq!(
            limiter.check_at(&ClientId("b".to_owned()), start),
            RateDecision::Allowed
        );
    }
}
