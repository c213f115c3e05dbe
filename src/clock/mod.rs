//! Clock - time source and periodic ticks
//!
//! Everything that asks "what time is it" goes through [`Clock`], so session
//! expiry can be driven by a [`ManualClock`] in tests. [`Ticker`] is the
//! re-render pulse: a tokio task that bumps a counter on a `watch` channel
//! until a deadline passes, shutdown fires, or the ticker is dropped.
//!
//! ```text
//! Ticker::spawn(config, clock, shutdown)
//!     │
//!     └── loop select!
//!           ├── shutdown.recv()  -> stop
//!           └── sleep(interval)  -> tick += 1, stop if now >= until
//! ```

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;

/// Milliseconds since the Unix epoch.
pub trait Clock: Send + Sync {
    fn now_ms(&self) -> i64;

    fn now(&self) -> DateTime<Utc> {
        DateTime::from_timestamp_millis(self.now_ms()).unwrap_or_default()
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> i64 {
        Utc::now().timestamp_millis()
    }
}

/// Clock that only moves when told to. Clones share the same instant.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    now: Arc<AtomicI64>,
}

impl ManualClock {
    pub fn new(start_ms: i64) -> Self {
        Self { now: Arc::new(AtomicI64::new(start_ms)) }
    }

    pub fn advance(&self, by: Duration) {
        self.now.fetch_add(by.as_millis() as i64, Ordering::SeqCst);
    }

    pub fn advance_ms(&self, ms: i64) {
        self.now.fetch_add(ms, Ordering::SeqCst);
    }

    pub fn set_ms(&self, ms: i64) {
        self.now.store(ms, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> i64 {
        self.now.load(Ordering::SeqCst)
    }
}

/// Ticker configuration
#[derive(Debug, Clone)]
pub struct TickerConfig {
    pub interval_ms: u64,
    /// Stop ticking once the clock reaches this instant (epoch ms).
    pub until: Option<i64>,
}

impl Default for TickerConfig {
    fn default() -> Self {
        Self { interval_ms: 1000, until: None }
    }
}

impl TickerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_interval_ms(mut self, ms: u64) -> Self {
        self.interval_ms = ms.max(1);
        self
    }

    pub fn with_until(mut self, until: Option<i64>) -> Self {
        self.until = until;
        self
    }

    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

/// Running ticker. Aborted on drop.
pub struct Ticker {
    ticks: watch::Receiver<u64>,
    handle: JoinHandle<()>,
}

impl Ticker {
    pub fn spawn(
        config: TickerConfig,
        clock: Arc<dyn Clock>,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Self {
        let (tx, ticks) = watch::channel(0u64);
        let interval = config.interval();
        let until = config.until;

        let handle = tokio::spawn(async move {
            let mut tick = 0u64;
            loop {
                if let Some(deadline) = until {
                    if clock.now_ms() >= deadline {
                        tracing::debug!(tick, "ticker reached deadline");
                        break;
                    }
                }
                tokio::select! {
                    _ = shutdown.recv() => break,
                    _ = tokio::time::sleep(interval) => {
                        tick += 1;
                        if tx.send(tick).is_err() {
                            break;
                        }
                    }
                }
            }
        });

        Self { ticks, handle }
    }

    /// Receiver for the tick counter. `changed()` errors once the ticker stops.
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.ticks.clone()
    }

    pub fn current_tick(&self) -> u64 {
        *self.ticks.borrow()
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    pub fn stop(&self) {
        self.handle.abort();
    }
}

impl Drop for Ticker {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

/// Human "time ago" text, e.g. "a few seconds ago", "3 hours ago", "in a day".
pub fn relative_time(then: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let delta_ms = now.signed_duration_since(then).num_milliseconds();
    let phrase = relative_phrase(delta_ms.unsigned_abs() as f64 / 1000.0);
    if delta_ms < 0 {
        format!("in {phrase}")
    } else {
        format!("{phrase} ago")
    }
}

fn relative_phrase(secs: f64) -> String {
    const MINUTE: f64 = 60.0;
    const HOUR: f64 = 60.0 * MINUTE;
    const DAY: f64 = 24.0 * HOUR;
    const MONTH: f64 = 30.436875 * DAY;
    const YEAR: f64 = 365.2425 * DAY;

    let plural = |n: f64, unit: &str| format!("{} {unit}s", n.round().max(2.0) as u64);

    if secs < 45.0 {
        "a few seconds".into()
    } else if secs < 90.0 {
        "a minute".into()
    } else if secs < 45.0 * MINUTE {
        plural(secs / MINUTE, "minute")
    } else if secs < 90.0 * MINUTE {
        "an hour".into()
    } else if secs < 22.0 * HOUR {
        plural(secs / HOUR, "hour")
    } else if secs < 36.0 * HOUR {
        "a day".into()
    } else if secs < 26.0 * DAY {
        plural(secs / DAY, "day")
    } else if secs < 45.0 * DAY {
        "a month".into()
    } else if secs < 10.5 * MONTH {
        plural(secs / MONTH, "month")
    } else if secs < 17.5 * MONTH {
        "a year".into()
    } else {
        plural(secs / YEAR, "year")
    }
}
