//! spinup CLI - start a model server (or any command), watch its log for a
//! readiness marker, and retry failed startups.
//!
//! Exits 0 once startup is confirmed (the service keeps running), 1 when
//! every attempt has been used up.

mod cli;

use clap::Parser;
use cli::{Cli, Commands, CommonArgs, parse_env_pairs};
use spinup::{
    LaunchError, Launched, LogWatcher, ModelServer, PlatformHandle, ServiceConfig, ServiceLauncher,
    derive_log_path,
};
use std::process::ExitCode;
use tracing::{error, info};

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    match run(cli).await {
        Ok(launched) => {
            info!(
                pid = launched.pid().map(|p| p.0),
                attempts = launched.attempts(),
                log = %launched.log_path().display(),
                "service is up, leaving it running"
            );
            ExitCode::SUCCESS
        }
        Err(err) => {
            error!(error = %err, "service failed to start");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<Launched<PlatformHandle>, LaunchError> {
    let (mut config, common, port) = build_config(cli)?;

    let log_path = derive_log_path(&common.log_dir, &config.name, port);
    config.log_path = Some(log_path.clone());

    let result = ServiceLauncher::new(config, common.policy()).launch().await;
    if result.is_err() {
        dump_log_tail(&log_path).await;
    }
    result
}

fn build_config(cli: Cli) -> Result<(ServiceConfig, CommonArgs, Option<u16>), LaunchError> {
    match cli.command {
        Commands::Serve {
            model,
            port,
            max_model_len,
            marker,
            common,
        } => {
            let config = ModelServer::new(model, port, max_model_len).into_config(marker);
            Ok((config, common, Some(port)))
        }
        Commands::Exec {
            marker,
            name,
            env,
            command,
            common,
        } => {
            let env_pairs =
                parse_env_pairs(&env).map_err(|e| LaunchError::InvalidConfig(e.to_string()))?;

            let program = command[0].clone();
            let service_name = name.unwrap_or_else(|| {
                std::path::Path::new(&program)
                    .file_stem()
                    .map(|s| s.to_string_lossy().into_owned())
                    .unwrap_or_else(|| program.clone())
            });

            let config = ServiceConfig::builder()
                .name(service_name)
                .command(program)
                .args(command[1..].iter())
                .env_multi(env_pairs)
                .success_marker(marker)
                .build()
                .map_err(|e| LaunchError::InvalidConfig(e.to_string()))?;
            Ok((config, common, None))
        }
    }
}

/// Show the tail of the service log so the failure reason is visible
/// without hunting for the file.
async fn dump_log_tail(log_path: &std::path::Path) {
    match LogWatcher::new(log_path).tail(20).await {
        Ok(lines) if !lines.is_empty() => {
            eprintln!("--- last lines of {} ---", log_path.display());
            for line in lines {
                eprintln!("{line}");
            }
        }
        Ok(_) => {}
        Err(e) => {
            error!(error = %e, "could not read service log");
        }
    }
}
