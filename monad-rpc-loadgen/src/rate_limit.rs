// Copyright (C) 2025 Category Labs, Inc.
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program.  If not, see <http://www.gnu.org/licenses/>.

use tokio::time::{sleep_until, Duration, Instant};

// tokio timers fire on millisecond ticks
const TIMER_SLACK: Duration = Duration::from_millis(1);

/// Token bucket with a steady refill rate and a burst capacity. Starts full.
///
/// Tracked as a theoretical arrival time: each token pushes `tat` one
/// interval further, and a token is available while `tat` is no more than
/// `burst - 1` intervals ahead of now. Waiting sleeps until the next slot and
/// charges that slot rather than the wake-up time, so oversleep is credited
/// back to the following requests.
#[derive(Debug)]
pub struct TokenBucket {
    interval: Duration,
    tolerance: Duration,
    tat: Instant,
}

impl TokenBucket {
    /// Returns `None` unless `rate_per_sec` is positive and finite and
    /// `burst` is at least one.
    pub fn new(rate_per_sec: f64, burst: u32) -> Option<Self> {
        if !(rate_per_sec.is_finite() && rate_per_sec > 0.0) || burst == 0 {
            return None;
        }
        let interval = Duration::try_from_secs_f64(rate_per_sec.recip()).ok()?;
        let tolerance = interval.checked_mul(burst - 1)?;
        Some(Self {
            interval,
            tolerance,
            tat: Instant::now(),
        })
    }

    /// Earliest instant at which the next token may be taken.
    fn next_slot(&self) -> Option<Instant> {
        self.tat.checked_sub(self.tolerance)
    }

    fn take(&mut self, now: Instant) {
        // idle credit is capped at the burst plus one timer tick
        let floor = now.checked_sub(TIMER_SLACK).unwrap_or(now);
        self.tat = self.tat.max(floor) + self.interval;
    }

    pub fn try_acquire(&mut self) -> bool {
        let now = Instant::now();
        match self.next_slot() {
            Some(slot) if slot > now => false,
            _ => {
                self.take(now);
                true
            }
        }
    }

    /// Waits until a token is available and takes it.
    pub async fn acquire(&mut self) {
        if let Some(slot) = self.next_slot() {
            if slot > Instant::now() {
                sleep_until(slot).await;
            }
        }
        self.take(Instant::now());
    }
}

#[cfg(test)]
mod test {
    use tokio::time::{advance, Duration, Instant};

    use super::TokenBucket;

    #[test]
    fn rejects_invalid_parameters() {
        assert!(TokenBucket::new(0.0, 10).is_none());
        assert!(TokenBucket::new(-1.0, 10).is_none());
        assert!(TokenBucket::new(f64::NAN, 10).is_none());
        assert!(TokenBucket::new(5.0, 0).is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn burst_then_steady_rate() {
        let mut bucket = TokenBucket::new(10.0, 3).unwrap();
        for _ in 0..3 {
            assert!(bucket.try_acquire());
        }
        assert!(!bucket.try_acquire());

        advance(Duration::from_millis(100)).await;
        assert!(bucket.try_acquire());
        assert!(!bucket.try_acquire());
    }

    #[tokio::test(start_paused = true)]
    async fn acquire_waits_for_refill() {
        let mut bucket = TokenBucket::new(4.0, 1).unwrap();
        let start = Instant::now();
        bucket.acquire().await;
        bucket.acquire().await;
        bucket.acquire().await;
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_millis(500), "{elapsed:?}");
        assert!(elapsed < Duration::from_millis(600), "{elapsed:?}");
    }

    #[tokio::test(start_paused = true)]
    async fn idle_time_does_not_exceed_burst() {
        let mut bucket = TokenBucket::new(100.0, 2).unwrap();
        advance(Duration::from_secs(10)).await;
        assert!(bucket.try_acquire());
        assert!(bucket.try_acquire());
        assert!(!bucket.try_acquire());
    }

    #[tokio::test(start_paused = true)]
    async fn sustains_rates_above_timer_resolution() {
        // 10us per token, far below the 1ms timer tick
        let mut bucket = TokenBucket::new(100_000.0, 10).unwrap();
        let start = Instant::now();
        for _ in 0..1_010 {
            bucket.acquire().await;
        }
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_millis(10), "{elapsed:?}");
        assert!(elapsed < Duration::from_millis(12), "{elapsed:?}");
    }
}
