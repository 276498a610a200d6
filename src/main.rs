use anyhow::Result;
use chapalign::aligner::{ForcedAligner, MfaAligner};
use chapalign::app::{effective_config, mfa_config, resolve_resources, run_cache, run_process};
use chapalign::cli::{Cli, Commands};
use chapalign::config::Config;
use chapalign::defaults::{EXIT_FATAL, EXIT_SUCCESS};
use chapalign::diagnostics::check_dependencies;
use chapalign::telemetry;
use clap::Parser;
use clap::error::ErrorKind;
use owo_colors::OwoColorize;

fn main() {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) if matches!(e.kind(), ErrorKind::DisplayHelp | ErrorKind::DisplayVersion) => e.exit(),
        Err(e) => {
            // Usage errors share the fatal exit code; 2 means low coverage
            eprint!("{e}");
            std::process::exit(EXIT_FATAL);
        }
    };

    let code = match run(cli) {
        Ok(code) => code,
        Err(e) => {
            tracing::error!(error = %format!("{e:#}"), "run failed");
            eprintln!("{} {e:#}", "error:".red().bold());
            EXIT_FATAL
        }
    };
    std::process::exit(code);
}

fn run(cli: Cli) -> Result<i32> {
    let config = load_config(cli.config.as_deref())?;
    config.validate()?;
    telemetry::init(
        cli.verbose,
        &config.logging.level,
        config.logging.format,
        config.paths.logs_dir.as_deref(),
    )?;

    match &cli.command {
        Commands::Process(args) => {
            let config = effective_config(&config, args)?;
            let aligner = MfaAligner::new(mfa_config(&config));
            if !args.dry_run {
                aligner.resolve_executable()?;
                resolve_resources(&config, args).verify()?;
            }
            run_process(&config, args, &aligner, cli.quiet)
        }
        Commands::Cache { action } => {
            let aligner = MfaAligner::new(mfa_config(&config));
            run_cache(&config, action, aligner.name(), cli.quiet)
        }
        Commands::Check => {
            let aligner = MfaAligner::new(mfa_config(&config));
            if check_dependencies(&config, &aligner) {
                Ok(EXIT_SUCCESS)
            } else {
                Ok(EXIT_FATAL)
            }
        }
    }
}

/// Load configuration from file or use defaults.
///
/// Priority order:
/// 1. Custom config path from CLI (--config)
/// 2. Default config path (~/.config/chapalign/config.toml)
/// 3. Built-in defaults
///
/// Environment variable overrides are applied on top in every case.
fn load_config(custom_path: Option<&std::path::Path>) -> Result<Config> {
    let config = if let Some(path) = custom_path {
        Config::load(path)?
    } else {
        Config::load_or_default(&Config::default_path())?
    };

    Ok(config.with_env_overrides())
}
