//! Rate-limit tracker (§4.5): observes response headers, gates subsequent
//! calls via a "pause-until" timestamp.

use std::sync::Mutex;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use reqwest::header::HeaderMap;

#[derive(Debug, Default, Clone, Copy)]
struct State {
    remaining: Option<u64>,
    limit: Option<u64>,
    reset_at: Option<Instant>,
    pause_until: Option<Instant>,
}

/// Per-engine rate-limit record. Cheap to clone the handle (it's an `Arc` in
/// practice via the engine), but the state itself lives behind a mutex —
/// updates are atomic per response and readers always see the most recent
/// committed update.
#[derive(Default)]
pub struct RateLimitTracker {
    state: Mutex<State>,
}

impl RateLimitTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// The instant before which the engine should not dispatch a new
    /// request, if any.
    pub fn pause_until(&self) -> Option<Instant> {
        self.state.lock().unwrap_or_else(|e| e.into_inner()).pause_until
    }

    /// Updates state from a response's headers and status, per the policy in
    /// §4.5. Called after every response regardless of status.
    pub fn observe(
        &self,
        headers: &HeaderMap,
        status: u16,
        enabled: bool,
        buffer: f64,
        default_retry_after: Duration,
    ) {
        let limit = parse_header_u64(headers, "x-ratelimit-limit");
        let remaining = parse_header_u64(headers, "x-ratelimit-remaining");
        let reset_at = parse_reset_header(headers, "x-ratelimit-reset");

        let mut pause_from_429 = None;
        if status == 429 {
            pause_from_429 = Some(parse_retry_after(headers).unwrap_or(default_retry_after));
        }

        let mut guard = self.state.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(limit) = limit {
            guard.limit = Some(limit);
        }
        if let Some(remaining) = remaining {
            guard.remaining = Some(remaining);
        }
        if let Some(reset_at) = reset_at {
            guard.reset_at = Some(reset_at);
        }

        let mut pause_until = pause_from_429.map(|d| Instant::now() + d);

        if enabled {
            if let (Some(remaining), Some(limit)) = (guard.remaining, guard.limit) {
                if limit > 0 && (remaining as f64) <= (limit as f64) * buffer {
                    let proactive = guard.reset_at.unwrap_or_else(|| Instant::now());
                    pause_until = Some(match pause_until {
                        Some(existing) => existing.min(proactive),
                        None => proactive,
                    });
                }
            }
        }

        if let Some(pause_until) = pause_until {
            guard.pause_until = Some(match guard.pause_until {
                Some(existing) if existing > pause_until => existing,
                _ => pause_until,
            });
        }
    }

    /// Waits until `pause_until` has passed, if it is in the future.
    /// Cancellation-safe: this is just a `tokio::time::sleep`.
    pub async fn wait_if_paused(&self) {
        let target = self.pause_until();
        if let Some(target) = target {
            let now = Instant::now();
            if target > now {
                tokio::time::sleep(target - now).await;
            }
        }
    }
}

fn parse_header_u64(headers: &HeaderMap, name: &str) -> Option<u64> {
    headers.get(name)?.to_str().ok()?.trim().parse().ok()
}

/// `X-RateLimit-Reset` is an absolute epoch-seconds timestamp; convert to a
/// monotonic `Instant` relative to now.
fn parse_reset_header(headers: &HeaderMap, name: &str) -> Option<Instant> {
    let epoch_secs: u64 = parse_header_u64(headers, name)?;
    let now_epoch = SystemTime::now().duration_since(UNIX_EPOCH).ok()?.as_secs();
    let delta = epoch_secs.saturating_sub(now_epoch);
    Some(Instant::now() + Duration::from_secs(delta))
}

/// `Retry-After` is either a number of seconds or an HTTP-date.
fn parse_retry_after(headers: &HeaderMap) -> Option<Duration> {
    let raw = headers.get("retry-after")?.to_str().ok()?.trim();

    if let Ok(secs) = raw.parse::<u64>() {
        return Some(Duration::from_secs(secs));
    }

    let target = chrono::DateTime::parse_from_rfc2822(raw).ok()?;
    let now = chrono::Utc::now();
    let delta = target.with_timezone(&chrono::Utc) - now;
    delta.to_std().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::HeaderValue;

    fn headers(pairs: &[(&str, &str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (k, v) in pairs {
            map.insert(*k, HeaderValue::from_str(v).unwrap());
        }
        map
    }

    #[tokio::test]
    async fn test_429_with_numeric_retry_after_pauses() {
        let tracker = RateLimitTracker::new();
        let h = headers(&[("retry-after", "2")]);
        tracker.observe(&h, 429, true, 0.1, Duration::from_secs(30));

        let pause = tracker.pause_until().unwrap();
        assert!(pause > Instant::now());
        assert!(pause <= Instant::now() + Duration::from_secs(3));
    }

    #[tokio::test]
    async fn test_429_without_retry_after_uses_default() {
        let tracker = RateLimitTracker::new();
        let h = headers(&[]);
        tracker.observe(&h, 429, true, 0.1, Duration::from_secs(30));

        let pause = tracker.pause_until().unwrap();
        assert!(pause > Instant::now() + Duration::from_secs(25));
    }

    #[tokio::test]
    async fn test_low_remaining_triggers_proactive_pause() {
        let tracker = RateLimitTracker::new();
        let epoch_now = SystemTime::now().duration_since(UNIX_EPOCH).unwrap().as_secs();
        let h = headers(&[
            ("x-ratelimit-limit", "100"),
            ("x-ratelimit-remaining", "5"),
            ("x-ratelimit-reset", &(epoch_now + 10).to_string()),
        ]);
        tracker.observe(&h, 200, true, 0.1, Duration::from_secs(30));
        assert!(tracker.pause_until().is_some());
    }

    #[tokio::test]
    async fn test_disabled_rate_limiting_never_pauses_on_low_remaining() {
        let tracker = RateLimitTracker::new();
        let h = headers(&[("x-ratelimit-limit", "100"), ("x-ratelimit-remaining", "1")]);
        tracker.observe(&h, 200, false, 0.1, Duration::from_secs(30));
        assert!(tracker.pause_until().is_none());
    }

    #[tokio::test]
    async fn test_healthy_remaining_does_not_pause() {
        let tracker = RateLimitTracker::new();
        let h = headers(&[("x-ratelimit-limit", "100"), ("x-ratelimit-remaining", "90")]);
        tracker.observe(&h, 200, true, 0.1, Duration::from_secs(30));
        assert!(tracker.pause_until().is_none());
    }
}
