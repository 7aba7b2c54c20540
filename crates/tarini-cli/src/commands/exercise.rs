use clap::Subcommand;
use tarini_core::storage::Config;

#[derive(Subcommand)]
pub enum ExerciseAction {
    /// List available breathing exercises as JSON
    List,
}

pub fn run(action: ExerciseAction) -> Result<(), Box<dyn std::error::Error>> {
    match action {
        ExerciseAction::List => {
            let config = Config::load()?;
            let catalog = config.catalog();
            println!("{}", serde_json::to_string_pretty(catalog.all())?);
        }
    }
    Ok(())
}
