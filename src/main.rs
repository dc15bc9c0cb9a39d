use std::fs::OpenOptions;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use flaxfeed::app::AppContext;
use flaxfeed::cli::{commands, Cli, Commands, GroupAction};
use flaxfeed::config::Config;

fn init_tracing(ctx: &AppContext, tui: bool) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    // The TUI owns the terminal, so its logs go to a file.
    match ctx.log_path().filter(|_| tui) {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(&path)
                .with_context(|| format!("Failed to open log file {}", path.display()))?;
            tracing_subscriber::registry()
                .with(fmt::layer().with_writer(file).with_ansi(false))
                .with(filter)
                .init();
        }
        None => {
            tracing_subscriber::registry()
                .with(fmt::layer().with_writer(std::io::stderr))
                .with(filter)
                .init();
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = Config::load().context("Failed to load configuration")?;

    let ctx = AppContext::new(
        cli.data_dir,
        cli.workers,
        Duration::from_secs(config.network.request_timeout_secs),
    )?;
    init_tracing(&ctx, matches!(cli.command, Commands::Tui))?;

    match cli.command {
        Commands::Add { url, group } => {
            commands::add_feed(&ctx, &url, group.as_deref()).await?;
        }
        Commands::Remove { url } => {
            commands::remove_feed(&ctx, &url).await?;
        }
        Commands::Import { path } => {
            commands::import_opml(&ctx, &path).await?;
        }
        Commands::Update => {
            commands::update_feeds(&ctx).await?;
        }
        Commands::List { entries } => {
            if entries {
                commands::list_entries(&ctx)?;
            } else {
                commands::list_feeds(&ctx)?;
            }
        }
        Commands::Group { action } => match action {
            GroupAction::Add { title } => commands::add_group(&ctx, &title)?,
            GroupAction::List => commands::list_groups(&ctx)?,
            GroupAction::Remove { title } => commands::remove_group(&ctx, &title)?,
            GroupAction::Assign { url, group } => {
                commands::assign_group(&ctx, &url, group.as_deref())?
            }
        },
        Commands::FullText { url, off } => {
            commands::set_full_text(&ctx, &url, !off)?;
        }
        Commands::Tui => {
            flaxfeed::tui::run(Arc::new(ctx), Arc::new(config), cli.workers).await?;
        }
    }

    Ok(())
}
