//! Breathing session state machine.
//!
//! The controller owns one session at a time and is reusable across
//! sessions. User intents (`start`/`stop`) and ticker callbacks serialize
//! against a single mutex; `tick` re-validates the status first, so a
//! callback that was already scheduled when the session ended is discarded.
//!
//! ## State transitions
//!
//! ```text
//! Idle -> Running -> Completed -> Idle
//!           \------------------> Idle   (stop; session outcome Aborted)
//! ```

use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::clock::{Clock, TickHandle, Ticker};
use crate::error::CoreError;
use crate::events::Event;
use crate::exercise::ExerciseCatalog;
use crate::quota::{DailyQuota, QuotaStore};

/// Fixed session length of the built-in exercises, in seconds.
pub const DEFAULT_SESSION_SECS: u32 = 180;

const TICK_INTERVAL: Duration = Duration::from_secs(1);
const EVENT_CAPACITY: usize = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Idle,
    Running,
    Completed,
    Aborted,
}

/// One timed exercise attempt. Owned exclusively by the controller.
#[derive(Debug, Clone)]
struct Session {
    exercise_id: String,
    remaining: u32,
}

/// Read model handed to the presentation layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionView {
    pub status: SessionStatus,
    pub remaining_formatted: String,
    pub exercise_id: Option<String>,
    pub completed_count: u32,
    pub goal: u32,
}

struct Inner {
    status: SessionStatus,
    session: Option<Session>,
    quota: QuotaStore,
    /// Last quota observed from storage; what `current_view` reports.
    last_quota: DailyQuota,
    ticker_sub: Option<TickHandle>,
}

/// Orchestrates an exercise session: owns the state machine, consumes ticks,
/// consults and updates the quota, and exposes state to the UI layer.
pub struct SessionController {
    catalog: ExerciseCatalog,
    clock: Arc<dyn Clock>,
    ticker: Box<dyn Ticker>,
    duration_secs: u32,
    inner: Mutex<Inner>,
    events: broadcast::Sender<Event>,
    weak_self: Weak<SessionController>,
}

impl SessionController {
    /// Build a controller and read the persisted quota.
    ///
    /// # Errors
    /// Fails when the quota record cannot be read; with an unknown quota
    /// every `start` would have to be refused anyway.
    pub fn new(
        catalog: ExerciseCatalog,
        quota: QuotaStore,
        clock: Arc<dyn Clock>,
        ticker: Box<dyn Ticker>,
        duration_secs: u32,
    ) -> Result<Arc<Self>, CoreError> {
        let last_quota = quota.load()?;
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Ok(Arc::new_cyclic(|weak| Self {
            catalog,
            clock,
            ticker,
            duration_secs,
            inner: Mutex::new(Inner {
                status: SessionStatus::Idle,
                session: None,
                quota,
                last_quota,
                ticker_sub: None,
            }),
            events,
            weak_self: weak.clone(),
        }))
    }

    // ── Queries ──────────────────────────────────────────────────────

    pub fn status(&self) -> SessionStatus {
        self.inner.lock().unwrap().status
    }

    pub fn remaining_secs(&self) -> u32 {
        let inner = self.inner.lock().unwrap();
        inner
            .session
            .as_ref()
            .map(|s| s.remaining)
            .unwrap_or(self.duration_secs)
    }

    /// Pure read model for the UI; performs no storage I/O.
    pub fn current_view(&self) -> SessionView {
        let inner = self.inner.lock().unwrap();
        let remaining = inner
            .session
            .as_ref()
            .map(|s| s.remaining)
            .unwrap_or(self.duration_secs);
        SessionView {
            status: inner.status,
            remaining_formatted: format_remaining(remaining),
            exercise_id: inner.session.as_ref().map(|s| s.exercise_id.clone()),
            completed_count: inner.last_quota.completed,
            goal: inner.last_quota.goal,
        }
    }

    /// Build a full state snapshot event.
    pub fn snapshot(&self) -> Event {
        let inner = self.inner.lock().unwrap();
        let remaining = inner
            .session
            .as_ref()
            .map(|s| s.remaining)
            .unwrap_or(self.duration_secs);
        Event::StateSnapshot {
            status: inner.status,
            remaining_secs: remaining,
            remaining_formatted: format_remaining(remaining),
            exercise_id: inner.session.as_ref().map(|s| s.exercise_id.clone()),
            completed_count: inner.last_quota.completed,
            goal: inner.last_quota.goal,
            at: self.clock.now(),
        }
    }

    /// Subscribe to controller events.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.events.subscribe()
    }

    // ── Commands ─────────────────────────────────────────────────────

    /// Begin a session for `exercise_id`.
    ///
    /// # Errors
    /// - [`CoreError::SessionInProgress`] unless the controller is idle
    /// - [`CoreError::UnknownExercise`] for an id missing from the catalog
    /// - [`CoreError::QuotaExceeded`] when today's goal is already met
    /// - [`CoreError::Storage`] when the quota cannot be read (no session is
    ///   admitted while the quota is unknown)
    pub fn start(&self, exercise_id: &str) -> Result<Event, CoreError> {
        let mut inner = self.inner.lock().unwrap();
        if inner.status != SessionStatus::Idle {
            return Err(CoreError::SessionInProgress);
        }
        let exercise = self
            .catalog
            .get(exercise_id)
            .ok_or_else(|| CoreError::UnknownExercise(exercise_id.to_string()))?;

        // Always decide on a fresh read; a cached count may predate another
        // completion or a day rollover.
        let quota = inner.quota.load()?;
        inner.last_quota = quota.clone();
        if quota.is_exhausted() {
            self.emit(&Event::QuotaExhausted {
                completed_count: quota.completed,
                goal: quota.goal,
                at: self.clock.now(),
            });
            return Err(CoreError::QuotaExceeded {
                completed: quota.completed,
                goal: quota.goal,
            });
        }

        inner.session = Some(Session {
            exercise_id: exercise.id.clone(),
            remaining: self.duration_secs,
        });
        inner.status = SessionStatus::Running;

        debug_assert!(
            inner.ticker_sub.is_none(),
            "ticker subscription outlived its session"
        );
        let weak = self.weak_self.clone();
        inner.ticker_sub = Some(self.ticker.schedule(
            TICK_INTERVAL,
            Box::new(move || {
                if let Some(controller) = weak.upgrade() {
                    if let Err(err) = controller.tick() {
                        tracing::warn!(error = %err, "tick could not persist quota");
                    }
                }
            }),
        ));

        tracing::debug!(exercise = exercise_id, "session started");
        let event = Event::SessionStarted {
            exercise_id: exercise.id.clone(),
            duration_secs: self.duration_secs,
            at: self.clock.now(),
        };
        self.emit(&event);
        Ok(event)
    }

    /// Advance the running session by one second.
    ///
    /// Delivered by the ticker once per second; also callable directly by a
    /// driving loop. Ticks outside `Running` are discarded, closing the
    /// window where an already-scheduled callback fires after `stop` or
    /// after completion.
    ///
    /// # Errors
    /// [`CoreError::Storage`] when the completion could not be counted. The
    /// session still ends `Completed`; today's persisted count may lag by
    /// one until the store recovers.
    pub fn tick(&self) -> Result<Option<Event>, CoreError> {
        let mut inner = self.inner.lock().unwrap();
        if inner.status != SessionStatus::Running {
            return Ok(None);
        }
        let Some(session) = inner.session.as_mut() else {
            return Ok(None);
        };
        session.remaining = session.remaining.saturating_sub(1);
        if session.remaining > 0 {
            return Ok(None);
        }
        let exercise_id = session.exercise_id.clone();

        inner.status = SessionStatus::Completed;
        if let Some(sub) = inner.ticker_sub.take() {
            sub.cancel();
        }
        tracing::debug!(exercise = %exercise_id, "session completed");

        match inner.quota.increment() {
            Ok(quota) => {
                inner.last_quota = quota.clone();
                let event = Event::SessionCompleted {
                    exercise_id,
                    completed_count: quota.completed,
                    goal: quota.goal,
                    at: self.clock.now(),
                };
                self.emit(&event);
                if quota.is_exhausted() {
                    self.emit(&Event::QuotaExhausted {
                        completed_count: quota.completed,
                        goal: quota.goal,
                        at: self.clock.now(),
                    });
                }
                Ok(Some(event))
            }
            Err(err) => {
                // The session outcome stands; the completion event carries
                // the last observed count and the error reaches the caller.
                let stale = inner.last_quota.clone();
                self.emit(&Event::SessionCompleted {
                    exercise_id,
                    completed_count: stale.completed,
                    goal: stale.goal,
                    at: self.clock.now(),
                });
                Err(err.into())
            }
        }
    }

    /// Cancel any pending tick and return to `Idle`.
    ///
    /// A session stopped while `Running` ends `Aborted` and never counts
    /// toward the quota; stopping a `Completed` session acknowledges it.
    /// No-op when idle.
    pub fn stop(&self) -> Option<Event> {
        let mut inner = self.inner.lock().unwrap();
        if inner.status == SessionStatus::Idle {
            return None;
        }
        if let Some(sub) = inner.ticker_sub.take() {
            sub.cancel();
        }
        let outcome = match inner.status {
            SessionStatus::Running => SessionStatus::Aborted,
            other => other,
        };
        inner.status = SessionStatus::Idle;
        let session = inner.session.take();
        tracing::debug!(?outcome, "session stopped");
        let event = Event::SessionStopped {
            exercise_id: session.map(|s| s.exercise_id).unwrap_or_default(),
            outcome,
            at: self.clock.now(),
        };
        self.emit(&event);
        Some(event)
    }

    // ── Internal ─────────────────────────────────────────────────────

    fn emit(&self, event: &Event) {
        // Send only fails when nobody is subscribed, which is fine.
        let _ = self.events.send(event.clone());
    }
}

/// Render remaining seconds as `m:ss`.
pub fn format_remaining(secs: u32) -> String {
    format!("{}:{:02}", secs / 60, secs % 60)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StorageError;
    use crate::storage::StateStore;
    use chrono::{DateTime, NaiveDate, Utc};
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicBool, Ordering};

    #[derive(Clone, Default)]
    struct MemStore {
        data: Arc<Mutex<HashMap<String, String>>>,
        fail_reads: Arc<AtomicBool>,
        fail_writes: Arc<AtomicBool>,
    }

    impl StateStore for MemStore {
        fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
            if self.fail_reads.load(Ordering::SeqCst) {
                return Err(StorageError::ReadFailed("injected".into()));
            }
            Ok(self.data.lock().unwrap().get(key).cloned())
        }

        fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
            if self.fail_writes.load(Ordering::SeqCst) {
                return Err(StorageError::WriteFailed("injected".into()));
            }
            self.data.lock().unwrap().insert(key.into(), value.into());
            Ok(())
        }
    }

    #[derive(Clone, Copy)]
    struct FixedClock(NaiveDate);

    impl Clock for FixedClock {
        fn now(&self) -> DateTime<Utc> {
            Utc::now()
        }

        fn today(&self) -> NaiveDate {
            self.0
        }
    }

    /// Records subscriptions without ever firing; tests drive `tick`.
    #[derive(Clone, Default)]
    struct ManualTicker {
        handles: Arc<Mutex<Vec<TickHandle>>>,
    }

    impl Ticker for ManualTicker {
        fn schedule(&self, _interval: Duration, _tick: Box<dyn FnMut() + Send>) -> TickHandle {
            let handle = TickHandle::new();
            self.handles.lock().unwrap().push(handle.clone());
            handle
        }
    }

    fn test_day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 6, 1).unwrap()
    }

    fn controller_with(store: MemStore) -> (Arc<SessionController>, ManualTicker) {
        let ticker = ManualTicker::default();
        let quota = QuotaStore::new(Box::new(store), Arc::new(FixedClock(test_day())), 5);
        let controller = SessionController::new(
            ExerciseCatalog::builtin(),
            quota,
            Arc::new(FixedClock(test_day())),
            Box::new(ticker.clone()),
            DEFAULT_SESSION_SECS,
        )
        .unwrap();
        (controller, ticker)
    }

    fn drive(controller: &SessionController, ticks: u32) {
        for _ in 0..ticks {
            controller.tick().unwrap();
        }
    }

    #[test]
    fn formats_remaining_time() {
        assert_eq!(format_remaining(0), "0:00");
        assert_eq!(format_remaining(65), "1:05");
        assert_eq!(format_remaining(180), "3:00");
    }

    #[test]
    fn start_runs_with_full_duration() {
        let (controller, _) = controller_with(MemStore::default());
        controller.start("flower").unwrap();
        let view = controller.current_view();
        assert_eq!(view.status, SessionStatus::Running);
        assert_eq!(view.remaining_formatted, "3:00");
        assert_eq!(view.exercise_id.as_deref(), Some("flower"));
    }

    #[test]
    fn start_rejects_unknown_exercise() {
        let (controller, _) = controller_with(MemStore::default());
        assert!(matches!(
            controller.start("whale"),
            Err(CoreError::UnknownExercise(_))
        ));
        assert_eq!(controller.status(), SessionStatus::Idle);
    }

    #[test]
    fn second_start_fails_and_leaves_remaining_untouched() {
        let (controller, _) = controller_with(MemStore::default());
        controller.start("flower").unwrap();
        drive(&controller, 2);
        assert!(matches!(
            controller.start("candle"),
            Err(CoreError::SessionInProgress)
        ));
        assert_eq!(controller.remaining_secs(), 178);
        assert_eq!(
            controller.current_view().exercise_id.as_deref(),
            Some("flower")
        );
    }

    #[test]
    fn runs_to_completion_exactly_once() {
        let (controller, _) = controller_with(MemStore::default());
        let mut events = controller.subscribe();
        controller.start("flower").unwrap();
        drive(&controller, 179);
        assert_eq!(controller.status(), SessionStatus::Running);
        assert_eq!(controller.remaining_secs(), 1);

        let completed = controller.tick().unwrap();
        assert!(matches!(completed, Some(Event::SessionCompleted { .. })));
        assert_eq!(controller.status(), SessionStatus::Completed);
        assert_eq!(controller.current_view().completed_count, 1);

        // Late ticks are discarded; no second completion.
        drive(&controller, 5);
        assert_eq!(controller.status(), SessionStatus::Completed);
        assert_eq!(controller.current_view().completed_count, 1);

        let mut completions = 0;
        while let Ok(event) = events.try_recv() {
            if matches!(event, Event::SessionCompleted { .. }) {
                completions += 1;
            }
        }
        assert_eq!(completions, 1);
    }

    #[test]
    fn completion_cancels_the_ticker_subscription() {
        let (controller, ticker) = controller_with(MemStore::default());
        controller.start("bee").unwrap();
        drive(&controller, 180);
        let handles = ticker.handles.lock().unwrap();
        assert_eq!(handles.len(), 1);
        assert!(handles[0].is_cancelled());
    }

    #[test]
    fn stop_while_running_aborts_without_counting() {
        let store = MemStore::default();
        let (controller, ticker) = controller_with(store.clone());
        controller.start("candle").unwrap();
        drive(&controller, 30);

        let stopped = controller.stop().unwrap();
        assert!(matches!(
            stopped,
            Event::SessionStopped {
                outcome: SessionStatus::Aborted,
                ..
            }
        ));
        let view = controller.current_view();
        assert_eq!(view.status, SessionStatus::Idle);
        assert_eq!(view.remaining_formatted, "3:00");
        assert_eq!(view.completed_count, 0);
        assert_eq!(
            store.data.lock().unwrap().get("quota_count").unwrap(),
            "0"
        );
        assert!(ticker.handles.lock().unwrap()[0].is_cancelled());

        // Stale tick from the cancelled subscription.
        assert!(controller.tick().unwrap().is_none());
        assert_eq!(controller.status(), SessionStatus::Idle);
    }

    #[test]
    fn stop_acknowledges_a_completed_session() {
        let (controller, _) = controller_with(MemStore::default());
        controller.start("flower").unwrap();
        drive(&controller, 180);
        let stopped = controller.stop().unwrap();
        assert!(matches!(
            stopped,
            Event::SessionStopped {
                outcome: SessionStatus::Completed,
                ..
            }
        ));
        assert_eq!(controller.status(), SessionStatus::Idle);
        assert_eq!(controller.current_view().completed_count, 1);
    }

    #[test]
    fn start_refused_once_goal_is_reached() {
        let store = MemStore::default();
        let (controller, _) = controller_with(store.clone());
        for expected in 1..=5 {
            controller.start("flower").unwrap();
            drive(&controller, 180);
            assert_eq!(controller.current_view().completed_count, expected);
            controller.stop();
        }
        match controller.start("flower") {
            Err(CoreError::QuotaExceeded { completed, goal }) => {
                assert_eq!(completed, 5);
                assert_eq!(goal, 5);
            }
            other => panic!("expected QuotaExceeded, got {other:?}"),
        }
        assert_eq!(controller.status(), SessionStatus::Idle);
    }

    #[test]
    fn start_fails_closed_when_the_store_is_down() {
        let store = MemStore::default();
        let (controller, _) = controller_with(store.clone());
        store.fail_reads.store(true, Ordering::SeqCst);
        assert!(matches!(
            controller.start("flower"),
            Err(CoreError::Storage(_))
        ));
        assert_eq!(controller.status(), SessionStatus::Idle);
    }

    #[test]
    fn increment_failure_keeps_the_session_completed() {
        let store = MemStore::default();
        let (controller, _) = controller_with(store.clone());
        controller.start("flower").unwrap();
        store.fail_writes.store(true, Ordering::SeqCst);
        drive(&controller, 179);
        assert!(matches!(controller.tick(), Err(CoreError::Storage(_))));
        assert_eq!(controller.status(), SessionStatus::Completed);
        // The count was never written.
        assert_eq!(
            store.data.lock().unwrap().get("quota_count").unwrap(),
            "0"
        );
    }

    #[test]
    fn constructor_fails_closed_when_the_quota_is_unreadable() {
        let store = MemStore::default();
        store.fail_reads.store(true, Ordering::SeqCst);
        let quota = QuotaStore::new(Box::new(store), Arc::new(FixedClock(test_day())), 5);
        let result = SessionController::new(
            ExerciseCatalog::builtin(),
            quota,
            Arc::new(FixedClock(test_day())),
            Box::new(ManualTicker::default()),
            DEFAULT_SESSION_SECS,
        );
        assert!(matches!(result, Err(CoreError::Storage(_))));
    }
}
