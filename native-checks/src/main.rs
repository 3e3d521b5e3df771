use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use native_checks::{CheckRequest, NativeChecks, PoolConfig};
use std::io::BufRead;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, Level};
use tracing_subscriber::EnvFilter;

/// Run monitoring checks through Lua handlers
#[derive(Parser)]
#[command(name = "native-checks", author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run checks through a worker pool and print their results
    Run {
        /// YAML pool configuration
        #[arg(short = 'c', long = "config")]
        config: Option<PathBuf>,

        /// Additional handler directory (repeatable)
        #[arg(short = 'p', long = "plugin-dir", value_name = "DIR")]
        plugin_dirs: Vec<PathBuf>,

        /// Check command lines; read from stdin, one per line, when omitted
        #[arg(value_name = "COMMAND")]
        commands: Vec<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            config,
            plugin_dirs,
            commands,
        } => {
            let worst = run(config, plugin_dirs, commands).await?;
            std::process::exit(worst);
        }
    }
}

async fn run(
    config_path: Option<PathBuf>,
    plugin_dirs: Vec<PathBuf>,
    commands: Vec<String>,
) -> Result<i32> {
    let mut config = load_config(config_path.as_deref())?;
    config.plugin_dirs.extend(plugin_dirs);

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::from_default_env().add_directive(config.logging_level.into()),
        )
        .init();

    let commands = if commands.is_empty() {
        read_commands(std::io::stdin().lock())?
    } else {
        commands
    };
    if commands.is_empty() {
        return Ok(0);
    }

    let checks = NativeChecks::new(config);
    let (submit, inbound) = crossbeam_channel::unbounded::<CheckRequest>();
    let (outbound, mut results) = tokio::sync::mpsc::unbounded_channel::<CheckRequest>();
    checks.start(Arc::new(inbound), Arc::new(outbound))?;

    for (id, command) in commands.iter().enumerate() {
        submit
            .send(CheckRequest::new(id as u64, command.as_str()))
            .context("Worker pool stopped accepting checks")?;
    }
    info!("Submitted {} checks", commands.len());

    let mut done = Vec::with_capacity(commands.len());
    while done.len() < commands.len() {
        match results.recv().await {
            Some(check) => done.push(check),
            None => break,
        }
    }

    tokio::task::block_in_place(|| checks.stop());

    done.sort_by_key(|check| check.id);
    let mut worst = 0;
    for check in &done {
        println!("{} {}", check.exit_status, check.status_line());
        if severity(check.exit_status) > severity(worst) {
            worst = check.exit_status;
        }
    }
    Ok(worst)
}

/// Config load happens before logging is set up, so route its warnings
/// through a temporary stderr subscriber.
fn load_config(path: Option<&std::path::Path>) -> Result<PoolConfig> {
    let Some(path) = path else {
        return Ok(PoolConfig::default());
    };

    let bootstrap = tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(EnvFilter::from_default_env().add_directive(Level::WARN.into()))
        .finish();

    tracing::subscriber::with_default(bootstrap, || PoolConfig::load(path))
        .with_context(|| format!("Failed to load config {}", path.display()))
}

/// Non-empty lines that are not `#` comments
fn read_commands(input: impl BufRead) -> Result<Vec<String>> {
    let mut commands = Vec::new();
    for line in input.lines() {
        let line = line.context("Failed to read commands from stdin")?;
        let line = line.trim();
        if !line.is_empty() && !line.starts_with('#') {
            commands.push(line.to_string());
        }
    }
    Ok(commands)
}

/// Rank exit statuses so CRITICAL beats WARNING beats UNKNOWN beats OK.
fn severity(exit_status: i32) -> u8 {
    match exit_status {
        0 => 0,
        1 => 2,
        2 => 3,
        _ => 1,
    }
}
