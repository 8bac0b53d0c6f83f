use std::time::Duration;

use clap::Parser;
use timeline_core::{variant::load_timeline, TimelineConfig};
use timeline_scheduler::{ProgressStore, Updater, UpdaterSettings};
use timeline_targets::build_targets;
use tracing::info;

/// Walks a Minecraft server through a timeline of modpacks and versions.
#[derive(Debug, Parser)]
#[command(name = "timeline-switcher", version, about)]
struct Cli {
    /// Path to config.toml (falls back to TIMELINE_CONFIG, then config/config.toml)
    #[arg(short, long)]
    config: Option<String>,

    /// Seconds between timer polls
    #[arg(long, default_value_t = 10)]
    poll_secs: u64,

    /// Validate the config, print the resolved timeline and exit
    #[arg(long)]
    check: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // explicit path > TIMELINE_CONFIG env > config/config.toml
    let config_path = cli.config.or_else(|| std::env::var("TIMELINE_CONFIG").ok());
    let config = TimelineConfig::load(config_path.as_deref())?;

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.log_filter().into()),
        )
        .init();
    info!(dir = %config.config_dir.display(), "config loaded");

    let variants = load_timeline(&config)?;
    let targets = build_targets(&config)?;
    info!(
        variants = variants.len(),
        targets = targets.len(),
        "timeline resolved"
    );

    let progress = ProgressStore::from_config(&config)?;
    let settings = UpdaterSettings::from_config(&config)?;
    let mut updater = Updater::new(variants, targets, progress, settings)?;

    if cli.check {
        print_timeline(&updater);
        return Ok(());
    }

    updater.run(Duration::from_secs(cli.poll_secs.max(1))).await?;
    info!("Timeline finished, exiting");
    Ok(())
}

fn print_timeline(updater: &Updater) {
    let next = updater.next_index();
    for variant in updater.variants() {
        let marker = if variant.index == next { ">" } else { " " };
        println!("{marker} {variant}");
    }
    if updater.is_finished() {
        println!("timeline already finished");
    }
    let warnings = updater.order_warnings().len();
    if warnings > 0 {
        println!("{warnings} version order warning(s), see log above");
    }
}
