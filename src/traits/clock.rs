use async_trait::async_trait;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::Instant;

/// External throttling clock capability.
///
/// `frame`-flagged nodes wait on this between ticks instead of a fixed timer.
/// The host supplies an implementation (a display refresh signal, a simulation
/// step, ...). A graph configured without a clock runs `frame` nodes
/// immediately — fail-open, never fail-closed, so headless runs cannot
/// deadlock waiting for a tick that will never come.
#[async_trait]
pub trait TickClock: Send + Sync {
    /// Resolves when the next tick of the host clock fires.
    async fn next_tick(&self);
}

/// Clock stepped explicitly by calling [`ManualClock::tick`].
///
/// Every waiter parked in `next_tick` at the moment of a tick is released;
/// later waiters wait for the next tick. Ticks are not buffered.
#[derive(Debug, Default)]
pub struct ManualClock {
    notify: Notify,
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            notify: Notify::new(),
        }
    }

    /// Fire one tick, releasing every currently-parked waiter.
    pub fn tick(&self) {
        self.notify.notify_waiters();
    }
}

#[async_trait]
impl TickClock for ManualClock {
    async fn next_tick(&self) {
        self.notify.notified().await;
    }
}

/// Fixed-period clock with ticks aligned to a shared phase.
///
/// All waiters within the same period are released together at the period
/// boundary, which is what distinguishes a frame clock from a plain
/// per-waiter `sleep(period)`.
#[derive(Debug)]
pub struct IntervalClock {
    start: Instant,
    period: Duration,
}

impl IntervalClock {
    pub fn new(period: Duration) -> Self {
        Self {
            start: Instant::now(),
            period: period.max(Duration::from_millis(1)),
        }
    }
}

#[async_trait]
impl TickClock for IntervalClock {
    async fn next_tick(&self) {
        let period = self.period.as_nanos();
        let elapsed = self.start.elapsed().as_nanos();
        let until_boundary = period - (elapsed % period);
        tokio::time::sleep(Duration::from_nanos(until_boundary as u64)).await;
    }
}
