//! CLI entry point for the bulkfetch tool.

use std::fs;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use bulkfetch_core::fetch::GetApiCallFactory;
use bulkfetch_core::source::{day_intervals, id_range, render_interval, url_sequence};
use bulkfetch_core::{Auth, HttpClient, ListStore, Pipeline, Store, WorkItem};
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

mod app_config;
mod cli;

use app_config::{RunSettings, load_file_config};
use cli::Args;

type WorkItems = Box<dyn Iterator<Item = WorkItem> + Send>;

#[tokio::main]
async fn main() -> Result<ExitCode> {
    // Parse CLI arguments first (before tracing, so --help works without logs)
    let args = Args::parse();

    // Priority: RUST_LOG env var > quiet flag > verbose flag > default (info)
    let default_level = if args.quiet {
        "error"
    } else {
        match args.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    };

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));

    // Payloads may go to stdout, so logs go to stderr.
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    debug!(?args, "CLI arguments parsed");

    let file_config = load_file_config(args.config.as_deref())?;
    let settings = RunSettings::resolve(&args, file_config.as_ref());
    debug!(?settings, loaded_config = file_config.is_some(), "settings resolved");

    let mut client = HttpClient::new_with_timeouts(settings.connect_timeout_secs, settings.read_timeout_secs)
        .with_base_url(&args.base_url)
        .with_context(|| format!("Invalid base URL '{}'", args.base_url))?;
    if let Some(auth) = auth_from_args(&args) {
        client = client.with_auth(auth).context("Invalid credential")?;
    }

    let cancel = CancellationToken::new();
    spawn_ctrl_c_handler(cancel.clone());

    let store = Arc::new(ListStore::new());
    let mut pipeline = Pipeline::new(
        Arc::clone(&store) as Arc<dyn Store>,
        GetApiCallFactory::new(client),
        work_items(&args),
        settings.pipeline,
    )
    .with_cancellation(cancel);
    if let Some(throttle) = settings.throttle {
        info!(
            max_items = throttle.max_items_per_window().get(),
            window_ms = throttle.window().as_millis(),
            "throttling enabled"
        );
        pipeline = pipeline.with_throttle(throttle);
    }

    info!("bulkfetch starting");
    let report = pipeline.run().await?;

    for failure in &report.failures {
        warn!(
            item = %failure.item,
            attempts = failure.attempts,
            error = %failure.error,
            "item not fetched"
        );
    }

    let payloads = store.take();
    let rendered = serde_json::to_string_pretty(&payloads).context("Failed to encode payloads")?;
    match &args.output {
        Some(path) => {
            fs::write(path, rendered + "\n")
                .with_context(|| format!("Failed to write output file '{}'", path.display()))?;
            info!(path = %path.display(), payloads = payloads.len(), "payloads written");
        }
        None => println!("{rendered}"),
    }

    info!(
        submitted = report.submitted,
        completed = report.completed,
        failed = report.failed,
        retried = report.retried,
        cancelled = report.cancelled,
        "fetch complete"
    );

    if args.strict && !report.is_success() {
        return Ok(ExitCode::FAILURE);
    }
    Ok(ExitCode::SUCCESS)
}

fn auth_from_args(args: &Args) -> Option<Auth> {
    if let Some(credential) = &args.header_auth {
        return Some(Auth::Header {
            name: credential.name.clone(),
            token: credential.token.clone(),
        });
    }
    args.query_auth.as_ref().map(|credential| Auth::QueryParam {
        name: credential.name.clone(),
        token: credential.token.clone(),
    })
}

fn work_items(args: &Args) -> WorkItems {
    if let (Some(from), Some(to)) = (args.from, args.to) {
        let template = args.template.clone();
        let windows = day_intervals(from, to, args.days)
            .map(move |window| render_interval(&template, window));
        return Box::new(url_sequence(&args.base_url, windows));
    }

    let range = args.ids.unwrap_or(cli::IdRange { start: 0, end: 0 });
    let step = usize::try_from(args.step).unwrap_or(usize::MAX);
    Box::new(url_sequence(&args.base_url, id_range(range.start, range.end, step)))
}

fn spawn_ctrl_c_handler(cancel: CancellationToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, stopping after in-flight requests are aborted");
            cancel.cancel();
        }
    });
}
