mod args;
mod error;
mod report;

use std::process::ExitCode;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use crate::args::Args;
use crate::report::Report;

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Logs go to stderr, stdout carries the report
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "warn".into()))
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let report = run(&args).await;

    match serde_json::to_string(&report) {
        Ok(json) => println!("{json}"),
        Err(e) => {
            tracing::error!(error = %e, "failed to render report");
            return ExitCode::FAILURE;
        }
    }

    if report.failed {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}

async fn run(args: &Args) -> Report {
    let params = match args.params() {
        Ok(params) => params,
        Err(e) => return Report::invalid(e),
    };

    let req = match params.validate() {
        Ok(req) => req,
        Err(e) => return Report::invalid(error::CliError::from(e)),
    };

    let reconciler = qc_infra::connect(params.host(), params.port());
    tracing::info!(
        instance = %req.name,
        desired = %req.state,
        host = params.host(),
        port = params.port(),
        check = args.check,
        "reconciling"
    );

    let result = if args.check {
        reconciler.check(&req).await
    } else {
        reconciler.reconcile(&req).await
    };

    match result {
        Ok(outcome) => Report::success(outcome),
        Err(failure) => {
            tracing::error!(instance = %req.name, error = %failure.error, "reconciliation failed");
            Report::failure(failure)
        }
    }
}
