//! CLI entry point for eprints2archives.

use std::io::{self, IsTerminal};
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use eprints2archives_core::{
    ExitStatus, InterruptToken, Pipeline, PipelineError, RunConfig, services,
};
use tracing::{debug, info};

mod auth;
mod cli;
mod display;

use cli::Args;

#[tokio::main]
async fn main() {
    std::process::exit(run().await);
}

async fn run() -> i32 {
    // Parse CLI arguments first (before tracing, so --help works without logs)
    let args = Args::parse();

    if args.services {
        for name in services::service_names() {
            println!("{name}");
        }
        return ExitStatus::Success.code();
    }

    if let Err(error) = init_tracing(&args) {
        eprintln!("eprints2archives: {error:#}");
        return ExitStatus::FileError.code();
    }
    debug!(?args, "CLI arguments parsed");
    info!("eprints2archives starting");

    // The interrupt token is set by Ctrl-C and observed by every loop and
    // sleep in the pipeline.
    let interrupt = InterruptToken::new();
    {
        let token = interrupt.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                token.set();
            }
        });
    }

    let progress = display::make_progress(args.quiet, args.no_color || !io::stdout().is_terminal());
    let credentials = Box::new(auth::CliCredentials {
        user: args.user.clone(),
        password: args.password.clone(),
        use_keyring: !args.no_keyring,
    });
    let config = RunConfig {
        api_url: args.api_url.clone(),
        dest: args.dest.clone(),
        force: args.force,
        id_list: args.id_list.clone(),
        lastmod: args.lastmod.clone(),
        status: args.status.clone(),
        threads: args.threads.max(1),
        report_file: args.report.clone(),
        error_out: args.error_out,
        delay: Duration::from_millis(args.delay),
        network_precheck: true,
    };

    let pipeline = Pipeline::new(config, credentials, progress, interrupt);
    match pipeline.run().await {
        Ok(()) => {
            info!("finished normally");
            ExitStatus::Success.code()
        }
        Err(error) => {
            report_failure(&error, args.quiet);
            error.exit_status().code()
        }
    }
}

/// Configures the tracing subscriber per --quiet and --debug.
fn init_tracing(args: &Args) -> Result<()> {
    // Priority: RUST_LOG env var > debug flag > quiet flag > default (warn)
    let default_level = if args.debug.is_some() {
        "trace"
    } else if args.quiet {
        "error"
    } else {
        "warn"
    };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));

    match args.debug.as_deref() {
        None | Some("-") => {
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(io::stderr)
                .init();
        }
        Some(path) => {
            let file = std::fs::File::create(path)
                .with_context(|| format!("unable to open debug trace file \"{path}\""))?;
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(std::sync::Arc::new(file))
                .with_ansi(false)
                .init();
        }
    }
    Ok(())
}

/// Prints a final failure message matching the exit status.
fn report_failure(error: &PipelineError, quiet: bool) {
    match error.exit_status() {
        ExitStatus::Interrupted => {
            if !quiet {
                eprintln!("Interrupted.");
            }
        }
        _ => eprintln!("eprints2archives: {error}"),
    }
}
