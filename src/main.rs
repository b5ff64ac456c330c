//! Podtekst CLI entry point.

use anyhow::Result;
use clap::Parser;
use podtekst::cli::{commands, Cli, Commands};
use podtekst::config::Settings;
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config_path = cli.config.as_ref().map(PathBuf::from);
    let settings = Settings::load_from(config_path.as_ref())?;

    // -v flags override the configured level
    let log_level = match cli.verbose {
        0 => settings.general.log_level.as_str(),
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::registry()
        .with(EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| format!("podtekst={}", log_level)),
        ))
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    std::fs::create_dir_all(settings.data_dir())?;
    if let Some(parent) = settings.sqlite_path().parent() {
        std::fs::create_dir_all(parent)?;
    }

    match &cli.command {
        Commands::Add {
            url,
            title,
            description,
            backend,
            min_speakers,
            no_process,
        } => {
            commands::run_add(
                url,
                title,
                description.clone(),
                backend.as_deref(),
                *min_speakers,
                *no_process,
                settings,
            )
            .await?;
        }

        Commands::Process {
            id,
            backend,
            min_speakers,
        } => {
            commands::run_process(id, backend.as_deref(), *min_speakers, settings).await?;
        }

        Commands::Reprocess { id } => {
            commands::run_reprocess(id, settings).await?;
        }

        Commands::Clone { id, no_process } => {
            commands::run_clone(id, *no_process, settings).await?;
        }

        Commands::List => {
            commands::run_list(settings).await?;
        }

        Commands::Show { id } => {
            commands::run_show(id, settings).await?;
        }

        Commands::Export { id, output, format } => {
            commands::run_export(id, output.clone(), format, settings).await?;
        }

        Commands::Serve { host, port } => {
            commands::run_serve(host, *port, settings).await?;
        }

        Commands::Config { action } => {
            commands::run_config(action, config_path, settings)?;
        }

        Commands::Doctor => {
            commands::run_doctor(&settings)?;
        }
    }

    Ok(())
}
