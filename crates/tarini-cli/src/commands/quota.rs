use std::sync::Arc;

use clap::Subcommand;
use tarini_core::clock::SystemClock;
use tarini_core::quota::QuotaStore;
use tarini_core::storage::{Config, Database};

#[derive(Subcommand)]
pub enum QuotaAction {
    /// Today's completed-session count and goal
    Show,
}

pub fn run(action: QuotaAction) -> Result<(), Box<dyn std::error::Error>> {
    match action {
        QuotaAction::Show => {
            let config = Config::load()?;
            let db = Database::open()?;
            let store = QuotaStore::new(Box::new(db), Arc::new(SystemClock), config.quota.daily_goal);
            let quota = store.load()?;
            println!("{}", serde_json::to_string_pretty(&quota)?);
        }
    }
    Ok(())
}
