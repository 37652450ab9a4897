use std::process::ExitCode;

use clap::Parser;
use runcast_backends::BackendError;
use runcast_core::{CoreError, RuncastConfig};
use runcast_schedule::ScheduleError;

mod cli;
mod container;
mod cron;
mod task;

use cli::{Cli, Command};

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "runcast=info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match dispatch(cli).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("error [{}]: {e:#}", error_code(&e));
            ExitCode::FAILURE
        }
    }
}

async fn dispatch(cli: Cli) -> anyhow::Result<ExitCode> {
    match cli.command {
        Command::Cron(command) => cron::run(command),
        Command::Container(command) => container::run(command),
        Command::Task(command) => {
            // config: --config > RUNCAST_CONFIG > ~/.runcast/runcast.toml
            let path = cli.config.or_else(|| std::env::var("RUNCAST_CONFIG").ok());
            let config = RuncastConfig::load(path.as_deref())?;
            let ctx = task::Context::new(config);
            task::run(&ctx, command).await
        }
    }
}

/// Stable code of the first library error in the chain.
fn error_code(e: &anyhow::Error) -> &'static str {
    for cause in e.chain() {
        if let Some(err) = cause.downcast_ref::<BackendError>() {
            return err.code();
        }
        if let Some(err) = cause.downcast_ref::<ScheduleError>() {
            return err.code();
        }
        if let Some(err) = cause.downcast_ref::<CoreError>() {
            return err.code();
        }
    }
    "ERROR"
}
