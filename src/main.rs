mod domain;
mod infrastructure;
mod preprocessing;
mod training;

use anyhow::Context;
use std::path::PathBuf;
use training::config::Config;
use training::trainer::Trainer;
use tracing_subscriber::EnvFilter;

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config_path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("config.toml"));
    let config = Config::load(&config_path)
        .with_context(|| format!("loading {}", config_path.display()))?;

    let mut trainer = Trainer::new(config).context("building the trainer")?;
    trainer.run().context("training run failed")?;
    Ok(())
}
