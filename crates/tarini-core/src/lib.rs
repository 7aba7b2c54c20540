//! # Tarini Core Library
//!
//! Core business logic for Tarini, a guided-breathing wellness app. All
//! operations are available through this library; presentation layers (the
//! CLI binary, a future GUI) are thin renderers over it that forward user
//! intents to the [`SessionController`].
//!
//! ## Architecture
//!
//! - **Session engine**: a state machine over {idle, running, completed,
//!   aborted} driven by one-second ticks from a cancellable [`Ticker`]
//! - **Daily quota**: a persisted per-day completion counter with lazy
//!   calendar-day rollover, backed by the [`StateStore`] key-value contract
//! - **Storage**: SQLite session history and TOML-based configuration
//!
//! ## Key Components
//!
//! - [`SessionController`]: breathing-session state machine
//! - [`QuotaStore`]: daily quota tracker
//! - [`Database`]: history and key-value persistence
//! - [`Config`]: application configuration management

pub mod clock;
pub mod error;
pub mod events;
pub mod exercise;
pub mod quota;
pub mod session;
pub mod storage;

pub use clock::{Clock, SystemClock, TickHandle, Ticker, TokioTicker};
pub use error::{ConfigError, CoreError, Result, StorageError};
pub use events::Event;
pub use exercise::{BreathPattern, Exercise, ExerciseCatalog};
pub use quota::{DailyQuota, QuotaStore, DEFAULT_DAILY_GOAL};
pub use session::{
    format_remaining, SessionController, SessionStatus, SessionView, DEFAULT_SESSION_SECS,
};
pub use storage::{data_dir, Config, Database, SessionOutcome, SessionRecord, StateStore, Stats};
