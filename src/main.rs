//! CLI entry point: run a process graph from a JSON definition file.
//!
//! Exit code 0 on clean completion; non-zero on a fatal build/start error
//! or when no node completed successfully.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use miette::Result;
use tracing_error::ErrorLayer;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use linemux::definition::GraphDefinition;
use linemux::event_bus::{EventBus, StdOutSink};
use linemux::graph::Graph;
use linemux::telemetry::{FormatterMode, PlainFormatter};

#[derive(Parser, Debug)]
#[command(
    name = "linemux",
    about = "Run a graph of line-oriented child processes wired stdin-to-stdout",
    version
)]
struct Args {
    /// Path to the graph definition file (JSON)
    definition: PathBuf,

    /// Suppress the stdout observer (echoed node output)
    #[arg(long)]
    quiet: bool,
}

fn init_tracing() {
    let fmt_layer = fmt::layer()
        .with_target(false)
        .with_file(false)
        .with_line_number(false)
        .with_span_events(FmtSpan::NONE);

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("error,linemux=info"))
        .expect("static default filter is valid");

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .with(ErrorLayer::default())
        .init();
}

fn formatter_mode() -> FormatterMode {
    if std::env::var_os("LINEMUX_PLAIN").is_some() {
        FormatterMode::Plain
    } else {
        FormatterMode::Auto
    }
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    dotenvy::dotenv().ok();
    init_tracing();
    miette::set_panic_hook();

    let args = Args::parse();
    let definition = GraphDefinition::load(&args.definition)?;

    let bus = if args.quiet {
        EventBus::with_sinks(Vec::new())
    } else {
        EventBus::with_sink(StdOutSink::with_formatter(PlainFormatter::with_mode(
            formatter_mode(),
        )))
    };

    let graph = Graph::build_with_bus(definition, bus)?;

    let cancel = graph.cancel_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("interrupt received; flushing shutdown sentinels");
            cancel.cancel();
        }
    });

    let summary = graph.run().await?;
    for exit in summary.faulted() {
        tracing::warn!(node = %exit.node, outcome = ?exit.outcome, "node did not complete cleanly");
    }

    if summary.any_clean() {
        Ok(ExitCode::SUCCESS)
    } else {
        Ok(ExitCode::FAILURE)
    }
}
