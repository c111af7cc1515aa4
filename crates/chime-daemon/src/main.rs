use clap::Parser;
use tracing::warn;

mod app;
mod cli;

use cli::{Cli, Command};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "chime_daemon=info,chime_scheduler=info,chime_store=info".into()
            }),
        )
        .init();

    let cli = Cli::parse();

    // load config: --config > CHIME_CONFIG env > ~/.chime/chime.toml
    let config_path = cli
        .config
        .clone()
        .or_else(|| std::env::var("CHIME_CONFIG").ok());
    let config = chime_core::ChimeConfig::load(config_path.as_deref()).unwrap_or_else(|e| {
        warn!("Config load failed ({}), using defaults", e);
        chime_core::ChimeConfig::default()
    });

    let store = app::open_store(&config.database.path)?;

    match cli.command.unwrap_or(Command::Run) {
        Command::Run => app::run(config, store).await,
        Command::List(args) => cli::list(store.as_ref(), &args),
        Command::Add(args) => cli::add(store.as_ref(), args),
        Command::Remove { id } => cli::remove(store.as_ref(), &id),
        Command::Enable { id } => cli::set_enabled(store.as_ref(), &id, true),
        Command::Disable { id } => cli::set_enabled(store.as_ref(), &id, false),
        Command::Import { path } => cli::import(store.as_ref(), &path),
    }
}
