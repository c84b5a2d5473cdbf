//! PyRunner CLI
//!
//! Single binary for:
//! - Serving the script manager (web API and websocket)
//! - Launching the autoboot script at system start
//! - Offline validation, listing and configuration

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use pyrunner::commands;
use pyrunner::output::print_error;

#[derive(Parser)]
#[command(name = "pyrunner")]
#[command(author, version, about = "Python script manager for Raspberry Pi")]
#[command(propagate_version = true)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve the web interface and websocket
    Serve {
        /// Bind address (overrides config)
        #[arg(short, long)]
        bind: Option<String>,
    },

    /// Check a script against the security policy
    Validate {
        /// Python file to check
        file: PathBuf,
    },

    /// List managed scripts and running script processes
    List {
        /// Show validation details
        #[arg(short, long)]
        long: bool,
    },

    /// Run the autoboot script in the foreground and exit with its code
    Boot,

    /// Manage the script that runs at boot
    Autoboot {
        #[command(subcommand)]
        action: AutobootAction,
    },

    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum AutobootAction {
    /// Show the autoboot script
    Show,
    /// Run a script at boot
    Set {
        /// Script file name, e.g. blink.py
        name: String,
    },
    /// Stop running any script at boot
    Clear,
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Show current configuration
    Show,
    /// Show config file path
    Path,
    /// Write a default configuration file
    Init {
        /// Overwrite an existing file
        #[arg(short, long)]
        force: bool,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Long-running commands log at info by default
    let base_level = match cli.command {
        Commands::Serve { .. } | Commands::Boot => 1,
        _ => 0,
    };
    let log_level = match (cli.quiet, cli.verbose.saturating_add(base_level)) {
        (true, _) => "error",
        (false, 0) => "warn",
        (false, 1) => "info",
        (false, 2) => "debug",
        (false, _) => "trace",
    };

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| log_level.into()),
        ))
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .init();

    match run(cli).await {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            print_error(&format!("{:#}", e));
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<u8> {
    let config_path = commands::config_path(cli.config.as_ref());

    match cli.command {
        Commands::Serve { bind } => {
            let config = commands::load_runner_config(&config_path)?;
            commands::serve_command(config, bind).await?;
        }

        Commands::Validate { file } => {
            let config = commands::load_runner_config(&config_path)?;
            if !commands::validate_command(&config, &file)? {
                return Ok(1);
            }
        }

        Commands::List { long } => {
            let config = commands::load_runner_config(&config_path)?;
            commands::list_command(&config, long)?;
        }

        Commands::Boot => {
            let config = commands::load_runner_config(&config_path)?;
            let code = commands::boot_command(config).await?;
            return Ok(code.clamp(0, 255) as u8);
        }

        Commands::Autoboot { action } => {
            let config = commands::load_runner_config(&config_path)?;
            match action {
                AutobootAction::Show => commands::autoboot_show(&config)?,
                AutobootAction::Set { name } => commands::autoboot_set(&config, &name)?,
                AutobootAction::Clear => commands::autoboot_clear(&config)?,
            }
        }

        Commands::Config { action } => match action {
            ConfigAction::Show => commands::config_show(&config_path)?,
            ConfigAction::Path => println!("{}", config_path.display()),
            ConfigAction::Init { force } => commands::config_init(&config_path, force)?,
        },
    }

    Ok(0)
}
