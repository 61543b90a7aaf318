/// Outbound notification pacing.
///
/// Notification channels rate-limit bursts, and a single run can produce a
/// dozen transitions at once. The throttle enforces a minimum interval
/// between consecutive sends by pausing the (single) run thread.
///
/// # Clock injection
/// `delay_at` takes `now` as a parameter rather than reading the clock, so
/// the pacing arithmetic is deterministic in tests. `pace` is the thin
/// wrapper that reads `Instant::now()` and sleeps.
use std::time::{Duration, Instant};

#[derive(Debug, Clone)]
pub struct NotificationThrottle {
    min_interval: Duration,
    last_sent: Option<Instant>,
}

impl NotificationThrottle {
    pub fn new(min_interval: Duration) -> Self {
        NotificationThrottle {
            min_interval,
            last_sent: None,
        }
    }

    /// How long to wait at `now` before the next send is allowed.
    ///
    /// Zero before the first send, and zero once `min_interval` has fully
    /// elapsed since the last one.
    pub fn delay_at(&self, now: Instant) -> Duration {
        match self.last_sent {
            None => Duration::ZERO,
            Some(last) => {
                let elapsed = now.saturating_duration_since(last);
                self.min_interval.saturating_sub(elapsed)
            }
        }
    }

    /// Marks a send as having happened at `at`.
    pub fn mark_sent_at(&mut self, at: Instant) {
        self.last_sent = Some(at);
    }

    /// Blocks until the next send is allowed. Returns the time slept.
    pub fn pace(&self) -> Duration {
        let delay = self.delay_at(Instant::now());
        if !delay.is_zero() {
            std::thread::sleep(delay);
        }
        delay
    }

    /// Marks a send as having just happened.
    pub fn mark_sent(&mut self) {
        self.mark_sent_at(Instant::now());
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
