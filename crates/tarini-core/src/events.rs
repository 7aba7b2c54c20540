use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::session::SessionStatus;

/// Every state change the controller makes produces an Event.
/// The presentation layer subscribes via `SessionController::subscribe`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Event {
    SessionStarted {
        exercise_id: String,
        duration_secs: u32,
        at: DateTime<Utc>,
    },
    /// A session ran down to zero. Carries the new daily count.
    SessionCompleted {
        exercise_id: String,
        completed_count: u32,
        goal: u32,
        at: DateTime<Utc>,
    },
    /// The controller returned to idle. `outcome` is the final status of the
    /// session that just ended: `Aborted` when stopped mid-run, `Completed`
    /// when the stop acknowledged a finished session.
    SessionStopped {
        exercise_id: String,
        outcome: SessionStatus,
        at: DateTime<Utc>,
    },
    /// Today's completed-session count has reached the daily goal.
    QuotaExhausted {
        completed_count: u32,
        goal: u32,
        at: DateTime<Utc>,
    },
    StateSnapshot {
        status: SessionStatus,
        remaining_secs: u32,
        remaining_formatted: String,
        exercise_id: Option<String>,
        completed_count: u32,
        goal: u32,
        at: DateTime<Utc>,
    },
}
