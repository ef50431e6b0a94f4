//! Recon Pipeline Demo
//!
//! Builds a small reconnaissance-shaped pipeline programmatically instead of
//! from a JSON file: a seeded target list fans out to two "scanners" whose
//! merged output lands in a deduplicating report node.
//!
//! The scanners here are plain shell one-liners so the demo runs anywhere
//! with a POSIX shell; swap the commands for real tools (subfinder, httpx,
//! nuclei, ...) to turn it into an actual recon run.
//!
//! Running This Demo:
//! ```bash
//! cargo run --example recon_pipeline
//! ```

use linemux::definition::{GraphDefinition, NodeDefinition};
use linemux::event_bus::{EventBus, MemorySink};
use linemux::graph::Graph;
use miette::Result;
use tracing::info;
use tracing_error::ErrorLayer;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

fn init_tracing() {
    let fmt_layer = fmt::layer()
        .with_target(false)
        .with_file(false)
        .with_line_number(false);

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("error,linemux=info"))
        .unwrap();

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .with(ErrorLayer::default())
        .init();
}

fn init_miette() {
    // Pretty panic reports
    miette::set_panic_hook();
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    init_miette();
    demo().await
}

async fn demo() -> Result<()> {
    info!("── Recon Pipeline Demo ──");

    // Step 1: declare the pipeline. `targets` seeds the run; the two
    // scanners transform each target line; `report` merges and dedupes.
    let definition = GraphDefinition::new()
        .with_node(
            "targets",
            NodeDefinition::new("cat").with_initial_inputs([
                "example.com",
                "example.org",
                "example.com",
            ]),
        )
        .with_node(
            "dns_scan",
            NodeDefinition::new(r#"while read host; do echo "dns:$host"; done"#)
                .with_input_from(["targets"]),
        )
        .with_node(
            "port_scan",
            NodeDefinition::new(r#"while read host; do echo "port:$host:443"; done"#)
                .with_input_from(["targets"]),
        )
        .with_node(
            "report",
            NodeDefinition::new("sort -u")
                .with_input_from(["dns_scan", "port_scan"])
                .with_echo_to_observer(true),
        );

    info!("pipeline declared: targets ⇒ {{dns_scan, port_scan}} ⇒ report");

    // Step 2: run it, capturing the report's echoed lines in memory so we
    // can print a tidy summary afterwards.
    let sink = MemorySink::new();
    let graph = Graph::build_with_bus(definition, EventBus::with_sink(sink.clone()))?;
    let summary = graph.run().await?;

    // Step 3: report.
    info!("run finished; {} of {} nodes clean", summary.clean().count(), summary.exits.len());
    for exit in summary.faulted() {
        info!(node = %exit.node, "node faulted: {:?}", exit.outcome);
    }

    println!("── merged findings ──");
    for event in sink.snapshot() {
        println!("{event}");
    }

    Ok(())
}
