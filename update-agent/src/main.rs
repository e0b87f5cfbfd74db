//! Update Agent - Main entry point

use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use update_agent::collaborators::{
    AutoConfirm, CommandRestarter, Confirmation, LoggingProgress, NoopRestarter, PromptConfirm,
    Restarter,
};
use update_agent::fs::digest::HashAlgorithm;
use update_agent::manifest::publish::{build_manifest, PublishOptions};
use update_agent::transfer::progress::format_bytes;
use update_agent::{shutdown, utils, Collaborators, Config, SessionState, UpdateOrchestrator};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Fetch the manifest and list the files that would be downloaded
    Check,

    /// Run a full update session
    Update {
        /// Install without asking for confirmation
        #[arg(short, long)]
        yes: bool,
    },

    /// Restore the files targeted by the last session from their backups
    Rollback,

    /// Complete replacements that were deferred because the file was locked
    Finalize,

    /// Print a manifest generated from a release directory
    Manifest {
        dir: PathBuf,

        /// Absolute URL prefix for file downloads
        #[arg(long)]
        base_url: Option<String>,

        #[arg(long, default_value = "sha256")]
        algorithm: HashAlgorithm,

        #[arg(long)]
        application: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    if let Command::Manifest {
        dir,
        base_url,
        algorithm,
        application,
    } = &args.command
    {
        utils::logger::init(args.log_level.as_deref().unwrap_or("warn"))?;
        let options = PublishOptions {
            application: application.clone(),
            algorithm: *algorithm,
            base_url: base_url.clone(),
            ..PublishOptions::default()
        };
        let index = build_manifest(dir, &options)?;
        println!("{}", index.to_json_pretty()?);
        return Ok(());
    }

    let config = Config::load(args.config.as_deref())?;
    let log_level = args.log_level.as_deref().unwrap_or(&config.log.level);
    utils::logger::init(log_level)?;

    tracing::info!(
        "Starting update-agent v{} for {}",
        env!("CARGO_PKG_VERSION"),
        config.updater.app_name
    );

    let yes = matches!(args.command, Command::Update { yes: true });
    let orchestrator = UpdateOrchestrator::new(config.clone(), collaborators(&config, yes))?;

    match args.command {
        Command::Check => {
            let (index, tasks) = orchestrator.plan().await?;
            if tasks.is_empty() {
                println!("{} is up to date ({} files)", config.updater.app_name, index.len());
            } else {
                println!("{} file(s) need updating:", tasks.len());
                for task in &tasks {
                    println!("  {} ({})", task.relative_path, format_bytes(task.size_bytes));
                }
            }
        }
        Command::Update { .. } => {
            let watcher = shutdown::cancel_on_signal(orchestrator.cancel_token());
            let report = orchestrator.run().await?;
            watcher.abort();

            print!("{}", report.summary());
            if !matches!(report.final_state, SessionState::Completed | SessionState::Idle)
                && !report.was_cancelled()
            {
                bail!("update session ended in state '{}'", report.final_state);
            }
        }
        Command::Rollback => {
            let report = orchestrator.rollback_last().await?;
            println!(
                "Restored {} file(s), skipped {}, discarded {} pending replacement(s)",
                report.restored.len(),
                report.skipped.len(),
                report.discarded.len()
            );
            for error in &report.errors {
                eprintln!("  {error}");
            }
            if !report.errors.is_empty() {
                bail!("{} file(s) could not be restored", report.errors.len());
            }
        }
        Command::Finalize => {
            let outcome = orchestrator.finalize_last().await?;
            println!("Finalized {} deferred replacement(s)", outcome.completed.len());
            for (path, error) in &outcome.failed {
                eprintln!("  {}: {}", path.display(), error);
            }
            if !outcome.failed.is_empty() {
                bail!("{} replacement(s) could not be finalized", outcome.failed.len());
            }
        }
        Command::Manifest { .. } => {}
    }

    Ok(())
}

fn collaborators(config: &Config, yes: bool) -> Collaborators {
    let confirmation: Arc<dyn Confirmation> = if yes {
        Arc::new(AutoConfirm)
    } else {
        Arc::new(PromptConfirm {
            app_name: config.updater.app_name.clone(),
        })
    };

    let restarter: Arc<dyn Restarter> = match &config.restart.command {
        Some(command) => Arc::new(CommandRestarter {
            command: command.clone(),
            args: config.restart.args.clone(),
        }),
        None => Arc::new(NoopRestarter),
    };

    Collaborators {
        confirmation,
        progress: Arc::new(LoggingProgress::new()),
        restarter,
    }
}
