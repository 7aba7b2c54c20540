use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use clap::Subcommand;
use tarini_core::clock::{SystemClock, TokioTicker};
use tarini_core::events::Event;
use tarini_core::quota::QuotaStore;
use tarini_core::session::SessionController;
use tarini_core::storage::{Config, Database, SessionOutcome};
use tokio::sync::broadcast::error::RecvError;

#[derive(Subcommand)]
pub enum SessionAction {
    /// Run a breathing session to completion (Ctrl-C stops it early)
    Run {
        /// Exercise id (see `exercise list`)
        exercise: String,
    },
    /// Print the controller state as JSON
    Status,
}

fn build_controller(
    config: &Config,
) -> Result<Arc<SessionController>, Box<dyn std::error::Error>> {
    let clock = Arc::new(SystemClock);
    let store = QuotaStore::new(
        Box::new(Database::open()?),
        clock.clone(),
        config.quota.daily_goal,
    );
    Ok(SessionController::new(
        config.catalog(),
        store,
        clock,
        Box::new(TokioTicker),
        config.session.duration_secs,
    )?)
}

pub async fn run(action: SessionAction) -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::load()?;

    match action {
        SessionAction::Status => {
            let controller = build_controller(&config)?;
            println!("{}", serde_json::to_string_pretty(&controller.snapshot())?);
        }
        SessionAction::Run { exercise } => {
            let controller = build_controller(&config)?;
            // Second connection for history rows; the quota store owns the first.
            let history = Database::open()?;
            let mut events = controller.subscribe();

            let started_at = chrono::Utc::now();
            controller.start(&exercise)?;
            let view = controller.current_view();
            println!(
                "breathing session started: {exercise} ({} remaining, {}/{} today)",
                view.remaining_formatted, view.completed_count, view.goal
            );

            let mut refresh = tokio::time::interval(Duration::from_secs(1));
            let ctrl_c = tokio::signal::ctrl_c();
            tokio::pin!(ctrl_c);

            loop {
                tokio::select! {
                    event = events.recv() => match event {
                        Ok(Event::SessionCompleted { completed_count, goal, .. }) => {
                            println!();
                            println!("session complete: {completed_count} of {goal} today");
                            history.record_session(
                                &exercise,
                                SessionOutcome::Completed,
                                config.session.duration_secs,
                                started_at,
                                chrono::Utc::now(),
                            )?;
                            if let Ok(Event::QuotaExhausted { goal, .. }) = events.try_recv() {
                                println!("daily goal of {goal} sessions reached -- see you tomorrow");
                            }
                            break;
                        }
                        Ok(_) => {}
                        Err(RecvError::Lagged(_)) => continue,
                        Err(RecvError::Closed) => break,
                    },
                    _ = refresh.tick() => {
                        let view = controller.current_view();
                        print!("\r  {} remaining ", view.remaining_formatted);
                        std::io::stdout().flush()?;
                    }
                    _ = &mut ctrl_c => {
                        controller.stop();
                        println!();
                        println!("session stopped");
                        let ended_at = chrono::Utc::now();
                        let elapsed = (ended_at - started_at).num_seconds().max(0) as u32;
                        history.record_session(
                            &exercise,
                            SessionOutcome::Aborted,
                            elapsed,
                            started_at,
                            ended_at,
                        )?;
                        break;
                    }
                }
            }
        }
    }
    Ok(())
}
