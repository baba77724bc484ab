use clap::Parser;
use sqlgate::cli::Cli;
use sqlgate::errors::Result;
use std::process::ExitCode;
use tracing::error;

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    if cli.install || cli.uninstall || cli.start || cli.stop || cli.restart || cli.status {
        let outcome = if cli.install {
            sqlgate::cli::install(&cli)
        } else if cli.uninstall {
            sqlgate::cli::uninstall(&cli)
        } else if cli.start {
            sqlgate::cli::start_service(&cli)
        } else if cli.stop {
            sqlgate::cli::stop_service(&cli)
        } else if cli.restart {
            sqlgate::cli::restart_service(&cli)
        } else {
            sqlgate::cli::status(&cli)
        };
        if let Err(e) = outcome {
            eprintln!("{e}");
            return ExitCode::from(2);
        }
        return ExitCode::SUCCESS;
    }

    if cli.validate {
        return match validate(&cli.config) {
            Ok(()) => {
                println!("config OK: {}", cli.config);
                ExitCode::SUCCESS
            }
            Err(e) => {
                eprintln!("config error: {e}");
                ExitCode::from(1)
            }
        };
    }

    match run(&cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "sqlgate exited with error");
            ExitCode::from(1)
        }
    }
}

async fn run(cli: &Cli) -> Result<()> {
    let config = sqlgate::config::load(&cli.config)?;
    let (log_handle, _guard) = sqlgate::log::init_from_config(&config.logging);
    sqlgate::server::run(&cli.config, config, log_handle).await
}

/// Load and compile the config (including every workflow) without binding
/// a listener or starting the cron scheduler. Backs the `--validate` flag.
fn validate(path: &str) -> Result<()> {
    let config = sqlgate::config::load(path)?;
    let db_names: std::collections::HashSet<String> = config.databases.iter().map(|d| d.name.clone()).collect();
    let db_readonly: indexmap::IndexMap<String, bool> =
        config.databases.iter().map(|d| (d.name.clone(), d.readonly)).collect();
    let rate_limit_pools: indexmap::IndexMap<String, sqlgate::ratelimit::PoolConfig> = config
        .rate_limits
        .iter()
        .map(|p| (p.name.clone(), sqlgate::ratelimit::PoolConfig { requests_per_second: p.requests_per_second, burst: p.burst }))
        .collect();
    let env = sqlgate::template::build_environment();
    let ctx = sqlgate::workflow::compiler::CompileContext {
        db_names: &db_names,
        db_readonly: &db_readonly,
        rate_limit_pools: &rate_limit_pools,
        env: &env,
    };
    sqlgate::workflow::compiler::compile_all(config.workflows, &ctx)?;
    Ok(())
}
