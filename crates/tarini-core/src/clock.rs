//! Wall-clock source and the periodic-tick primitive.
//!
//! Nothing else in the core reads the system clock directly; everything goes
//! through [`Clock`], so tests can pin the calendar day. Ticks are delivered
//! by a [`Ticker`] implementation and stopped through the returned
//! [`TickHandle`].

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Local, NaiveDate, Utc};

/// Time source for the core.
pub trait Clock: Send + Sync {
    /// Current instant, used for event timestamps.
    fn now(&self) -> DateTime<Utc>;

    /// Local calendar day used for quota bookkeeping. Compared for equality
    /// only -- never for elapsed-time arithmetic.
    fn today(&self) -> NaiveDate;
}

/// Production clock backed by the system time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    fn today(&self) -> NaiveDate {
        Local::now().date_naive()
    }
}

/// Cancellation handle for a tick subscription.
///
/// `cancel` is safe to call repeatedly and after the subscription already
/// ended; later calls are no-ops.
#[derive(Debug, Clone)]
pub struct TickHandle {
    cancelled: Arc<AtomicBool>,
}

impl TickHandle {
    pub fn new() -> Self {
        Self {
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Stop future tick delivery.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

impl Default for TickHandle {
    fn default() -> Self {
        Self::new()
    }
}

/// Cancellable periodic-tick primitive.
pub trait Ticker: Send + Sync {
    /// Deliver `tick` once per `interval` until the returned handle is
    /// cancelled.
    fn schedule(&self, interval: Duration, tick: Box<dyn FnMut() + Send>) -> TickHandle;
}

/// Ticker backed by an interval task on the tokio runtime.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioTicker;

impl Ticker for TokioTicker {
    fn schedule(&self, interval: Duration, mut tick: Box<dyn FnMut() + Send>) -> TickHandle {
        let handle = TickHandle::new();
        let guard = handle.clone();
        tokio::spawn(async move {
            let mut timer = tokio::time::interval(interval);
            timer.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // The first interval tick resolves immediately; skip it so the
            // first callback lands one full period after scheduling.
            timer.tick().await;
            loop {
                timer.tick().await;
                if guard.is_cancelled() {
                    break;
                }
                tick();
            }
        });
        handle
    }
}
