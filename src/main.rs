//! Command-line entry point for the backup engine

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;

/// Incremental, versioned file backup engine
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the TOML configuration file
    #[arg(long, value_name = "PATH")]
    config: PathBuf,

    /// Scan and plan only; skip the execute phase
    #[arg(long)]
    dry_run: bool,
}

fn main() -> ExitCode {
    let args = Args::parse();

    let mut config = match frontguard::Config::load(&args.config) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("failed to load configuration from '{}': {e}", args.config.display());
            return ExitCode::FAILURE;
        }
    };

    if args.dry_run {
        config.apply_actions = false;
    }

    if let Err(e) = frontguard::logging::init_bootstrap_logging(config.log_level.into()) {
        eprintln!("failed to initialize logging: {e}");
        return ExitCode::FAILURE;
    }

    match frontguard::job::run(&config) {
        Ok(stats) => {
            if stats.backup_errors > 0 && config.max_backup_errors >= 0 && stats.backup_errors as i64 > config.max_backup_errors {
                ExitCode::FAILURE
            } else {
                ExitCode::SUCCESS
            }
        }
        Err(e) => {
            eprintln!("backup job failed: {e}");
            ExitCode::FAILURE
        }
    }
}
