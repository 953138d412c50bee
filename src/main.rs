//! ModScout CLI entry point.
//!
//! This binary provides the command-line interface for ModScout.

use clap::Parser;
use modscout::cli::{Cli, Commands, ScanArgs};
use modscout::{AuditError, Auditor, Config, Platform};
use std::error::Error;
use std::path::Path;
use std::process::ExitCode;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Configuration files looked up in the working directory.
const DEFAULT_CONFIG_PATHS: &[&str] = &["modscout.yaml", "modscout.yml", ".modscout.yaml"];

#[tokio::main]
async fn main() -> ExitCode {
    // Parse CLI arguments
    let cli = Cli::parse();

    // Initialize logging
    init_logging(cli.verbose, cli.quiet);

    // Run the appropriate command
    match run(cli).await {
        Ok(exit_code) => exit_code,
        Err(e) => {
            tracing::error!(error = %e, "Fatal error");

            eprintln!("Error: {e}");

            // Print error chain (cause chain)
            let mut source = e.source();
            if source.is_some() {
                eprintln!("\nCaused by:");
                let mut i = 0;
                while let Some(cause) = source {
                    eprintln!("  {i}: {cause}");
                    source = cause.source();
                    i += 1;
                }
            }

            let code = e
                .downcast_ref::<AuditError>()
                .map_or(1, AuditError::exit_code);
            ExitCode::from(u8::try_from(code).unwrap_or(1))
        }
    }
}

fn init_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else {
        // RUST_LOG wins over the verbose flag
        EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            let base_level = match verbose {
                0 => "warn",
                1 => "info",
                2 => "debug",
                _ => "trace",
            };
            // modscout at the requested level, everything else at warn
            EnvFilter::new(format!("warn,modscout={base_level}"))
        })
    };

    // Logs go to stderr so stdout stays valid JSON
    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(true)
                .with_thread_ids(false),
        )
        .with(filter)
        .init();
}

async fn run(cli: Cli) -> anyhow::Result<ExitCode> {
    match cli.command {
        Commands::Scan(ref args) => {
            tracing::debug!("Loading configuration");
            let mut config = load_config(cli.config.as_deref())?;
            config.merge_cli_args(args);
            config.validate()?;
            scan(config, args).await
        }

        Commands::Init => {
            let config_path = Path::new(DEFAULT_CONFIG_PATHS[0]);
            if config_path.exists() {
                anyhow::bail!("Configuration file already exists: {}", config_path.display());
            }

            std::fs::write(config_path, Config::example_yaml())?;
            println!("Created example configuration: {}", config_path.display());
            Ok(ExitCode::SUCCESS)
        }

        Commands::Validate(args) => {
            let content = std::fs::read_to_string(&args.config)
                .map_err(|e| AuditError::io(&args.config, e, file!(), line!()))?;
            match Config::from_yaml(&content).and_then(|config| config.validate()) {
                Ok(()) => {
                    println!("Configuration is valid: {}", args.config.display());
                    Ok(ExitCode::SUCCESS)
                }
                Err(e) => {
                    eprintln!("Configuration error: {e}");
                    Ok(ExitCode::from(1))
                }
            }
        }
    }
}

async fn scan(config: Config, args: &ScanArgs) -> anyhow::Result<ExitCode> {
    let (platform, owner) = args.target();
    tracing::debug!(platform = %platform, owner = %owner, "Executing scan command");

    let auditor = Auditor::new(config);
    let report = match platform {
        Platform::GitHub => auditor.audit_github(&owner).await?,
        Platform::GitLab => auditor.audit_gitlab(&owner).await?,
        Platform::Local => auditor.audit_path(&owner).await?,
    };

    let json = if args.compact {
        serde_json::to_string(&report)?
    } else {
        serde_json::to_string_pretty(&report)?
    };

    if let Some(output_path) = &args.output {
        std::fs::write(output_path, &json)
            .map_err(|e| AuditError::io(output_path, e, file!(), line!()))?;
        tracing::info!(path = %output_path.display(), "Report written");
    } else {
        println!("{json}");
    }

    if report.stats.repositories_failed > 0 {
        tracing::warn!(
            failed = report.stats.repositories_failed,
            "Some repositories could not be scanned"
        );
        if args.strict {
            return Ok(ExitCode::from(2));
        }
    }
    Ok(ExitCode::SUCCESS)
}

fn load_config(explicit: Option<&Path>) -> anyhow::Result<Config> {
    // Check for explicit config file
    if let Some(config_path) = explicit {
        tracing::debug!(path = %config_path.display(), "Loading configuration from explicit path");
        let content = std::fs::read_to_string(config_path)
            .map_err(|e| AuditError::io(config_path, e, file!(), line!()))?;
        let mut config = Config::from_yaml(&content)?;
        config.load_tokens_from_env();
        return Ok(config);
    }

    // Look for default config files
    tracing::debug!("Searching for default configuration files");
    for path in DEFAULT_CONFIG_PATHS {
        if Path::new(path).exists() {
            tracing::debug!(path = %path, "Found configuration file");
            let content = std::fs::read_to_string(path)?;
            let mut config = Config::from_yaml(&content)?;
            config.load_tokens_from_env();
            return Ok(config);
        }
    }

    tracing::debug!("No configuration file found, using default configuration");
    let mut config = Config::default();
    config.load_tokens_from_env();
    Ok(config)
}
