//! Time source, the market-open time gate, and the poll-with-timeout
//! combinator used for fill confirmation.
//!
//! Everything that waits goes through [`Clock`], so tests drive virtual
//! time with [`ManualClock`] instead of sleeping.

use async_trait::async_trait;
use chrono::{FixedOffset, NaiveDateTime, NaiveTime, Utc};
use std::future::Future;
use std::sync::Mutex;
use std::time::Duration;
use tracing::{debug, info};

/// Session-local wall clock plus an async sleep.
#[async_trait]
pub trait Clock: Send + Sync {
    /// Current session-local time.
    fn now(&self) -> NaiveDateTime;

    async fn sleep(&self, duration: Duration);
}

/// Real time in the exchange's UTC offset.
#[derive(Debug, Clone)]
pub struct SystemClock {
    offset: FixedOffset,
}

impl SystemClock {
    pub fn new(offset: FixedOffset) -> Self {
        Self { offset }
    }
}

#[async_trait]
impl Clock for SystemClock {
    fn now(&self) -> NaiveDateTime {
        Utc::now().with_timezone(&self.offset).naive_local()
    }

    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Virtual clock: `sleep` advances time instantly.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<NaiveDateTime>,
}

impl ManualClock {
    pub fn new(start: NaiveDateTime) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    pub fn advance(&self, duration: Duration) {
        if let Ok(mut now) = self.now.lock() {
            *now += step(duration);
        }
    }

    /// Move forward to `deadline`; never moves backwards.
    fn advance_to(&self, deadline: NaiveDateTime) {
        if let Ok(mut now) = self.now.lock() {
            if *now < deadline {
                *now = deadline;
            }
        }
    }
}

fn step(duration: Duration) -> chrono::Duration {
    chrono::Duration::from_std(duration).unwrap_or(chrono::Duration::zero())
}

#[async_trait]
impl Clock for ManualClock {
    fn now(&self) -> NaiveDateTime {
        match self.now.lock() {
            Ok(now) => *now,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }

    async fn sleep(&self, duration: Duration) {
        // Concurrent sleepers overlap: each wakes at its own deadline
        // rather than adding its duration on top of the others.
        let deadline = self.now() + step(duration);
        tokio::task::yield_now().await;
        self.advance_to(deadline);
    }
}

/// Block until the session-local time reaches `gate`, checking every `every`.
pub async fn wait_until(clock: &dyn Clock, gate: NaiveTime, every: Duration) {
    if clock.now().time() < gate {
        info!(gate = %gate, now = %clock.now().time(), "Waiting for time gate");
    }
    while clock.now().time() < gate {
        clock.sleep(every).await;
    }
    debug!(now = %clock.now(), "Time gate passed");
}

/// Call `check` every `interval` until it yields `Some`, or until `timeout`
/// has elapsed since the first call. `None` means the deadline lapsed.
pub async fn poll_until<T, F, Fut>(
    clock: &dyn Clock,
    interval: Duration,
    timeout: Duration,
    mut check: F,
) -> Option<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Option<T>>,
{
    let start = clock.now();
    loop {
        let elapsed = (clock.now() - start).to_std().unwrap_or_default();
        if elapsed >= timeout {
            return None;
        }
        if let Some(value) = check().await {
            return Some(value);
        }
        clock.sleep(interval).await;
    }
}
