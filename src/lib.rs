//! # Linemux: Process-Graph Orchestrator for Line-Oriented Pipelines
//!
//! Linemux spawns a set of named external programs and wires their
//! newline-delimited stdin/stdout streams into a directed graph with fan-in
//! (multiple producers feeding one consumer) and fan-out (one producer
//! broadcasting to multiple consumers).
//!
//! ## Core Concepts
//!
//! - **Node**: one externally executed program (`sh -c <command>`) with a
//!   feeder worker (queue → child stdin) and a broadcaster worker
//!   (child stdout → subscriber queues)
//! - **Edge / subscription**: a declared `input_from` relationship by which
//!   one node's output lines are delivered to another node's input queue
//! - **Sentinel**: a reserved queue value, distinct from any real line, that
//!   tells a feeder to drain and stop; the only way a feeder terminates
//! - **Quiescence**: the state in which every node's workers have exited and
//!   no further lines will be produced
//!
//! ## Quick Start
//!
//! Definitions are JSON objects mapping node names to commands:
//!
//! ```
//! use linemux::definition::GraphDefinition;
//!
//! let definition: GraphDefinition = r#"{
//!     "seed":   {"command": "cat", "initial_inputs": ["hello"]},
//!     "report": {"command": "cat", "input_from": ["seed"], "echo_to_observer": true}
//! }"#
//! .parse()
//! .unwrap();
//!
//! assert_eq!(definition.len(), 2);
//! ```
//!
//! Building a [`Graph`](graph::Graph) validates the definition, constructs
//! the nodes, wires subscriptions, and seeds initial inputs without spawning
//! anything; [`Graph::run`](graph::Graph::run) spawns every child, starts the
//! workers, and resolves once the graph reaches quiescence:
//!
//! ```no_run
//! use linemux::definition::GraphDefinition;
//! use linemux::graph::Graph;
//!
//! # async fn example() -> miette::Result<()> {
//! let definition = GraphDefinition::load("pipeline.json")?;
//! let summary = Graph::build(definition)?.run().await?;
//! assert!(summary.any_clean());
//! # Ok(())
//! # }
//! ```
//!
//! ## Delivery Guarantees
//!
//! - Lines from one producer reach each subscriber in production order
//!   (FIFO per producer→consumer path); interleaving across producers at a
//!   fan-in consumer is not specified
//! - Fan-out delivers an independent copy of every line to each subscriber
//! - `initial_inputs` are always the first lines a node's feeder sees
//!
//! ## Module Guide
//!
//! - [`definition`] - Graph definition parsing and validation
//! - [`node`] - Child process lifecycle, feeder/broadcaster workers
//! - [`graph`] - Graph construction, execution, and cancellation
//! - [`event_bus`] - Observer sink fan-out for echoed output and faults
//! - [`telemetry`] - Formatting for observer output

pub mod definition;
pub mod event_bus;
pub mod graph;
pub mod node;
pub mod telemetry;
