//! End-to-end graph executions against real child processes.
//!
//! These tests use standard Unix line tools (`cat`, `head`, `false`) as
//! stand-ins for the external pipeline programs; nodes whose output we
//! want to observe set `echo_to_observer` and are captured via a
//! [`MemorySink`].

use std::time::Duration;

use linemux::definition::{ConfigError, GraphDefinition, NodeDefinition};
use linemux::event_bus::{Event, EventBus, MemorySink};
use linemux::graph::{Graph, GraphError, RunSummary};
use linemux::node::{NodeFault, NodeOutcome};
use tokio::time::timeout;

const RUN_DEADLINE: Duration = Duration::from_secs(10);

fn bus_with_memory() -> (EventBus, MemorySink) {
    let sink = MemorySink::new();
    let bus = EventBus::with_sink(sink.clone());
    (bus, sink)
}

fn echoed_lines(sink: &MemorySink, node: &str) -> Vec<String> {
    sink.snapshot()
        .into_iter()
        .filter_map(|event| match event {
            Event::NodeLine(e) if e.node == node => Some(e.line),
            _ => None,
        })
        .collect()
}

async fn run_to_quiescence(graph: Graph) -> RunSummary {
    timeout(RUN_DEADLINE, graph.run())
        .await
        .expect("graph reached quiescence before the deadline")
        .expect("run completed without fatal error")
}

#[tokio::test]
async fn single_chain_delivers_the_seeded_line() {
    let definition = GraphDefinition::new()
        .with_node("a", NodeDefinition::new("cat").with_initial_inputs(["hello"]))
        .with_node(
            "b",
            NodeDefinition::new("cat")
                .with_input_from(["a"])
                .with_echo_to_observer(true),
        );

    let (bus, sink) = bus_with_memory();
    let graph = Graph::build_with_bus(definition, bus).expect("build");
    let summary = run_to_quiescence(graph).await;

    assert_eq!(summary.exits.len(), 2);
    assert!(summary.faulted().next().is_none());
    assert_eq!(echoed_lines(&sink, "b"), vec!["hello"]);
}

#[tokio::test]
async fn fan_in_delivers_each_producer_line_exactly_once() {
    let definition = GraphDefinition::new()
        .with_node("a", NodeDefinition::new("cat").with_initial_inputs(["x"]))
        .with_node("b", NodeDefinition::new("cat").with_initial_inputs(["y"]))
        .with_node(
            "c",
            NodeDefinition::new("cat")
                .with_input_from(["a", "b"])
                .with_echo_to_observer(true),
        );

    let (bus, sink) = bus_with_memory();
    let graph = Graph::build_with_bus(definition, bus).expect("build");
    let summary = run_to_quiescence(graph).await;

    assert!(summary.faulted().next().is_none());
    // Cross-producer interleaving is unspecified; content is not.
    let mut lines = echoed_lines(&sink, "c");
    lines.sort();
    assert_eq!(lines, vec!["x", "y"]);
}

#[tokio::test]
async fn fan_out_broadcasts_an_independent_copy_to_each_subscriber() {
    let definition = GraphDefinition::new()
        .with_node("p", NodeDefinition::new("cat").with_initial_inputs(["ping"]))
        .with_node(
            "a",
            NodeDefinition::new("cat")
                .with_input_from(["p"])
                .with_echo_to_observer(true),
        )
        .with_node(
            "b",
            NodeDefinition::new("cat")
                .with_input_from(["p"])
                .with_echo_to_observer(true),
        );

    let (bus, sink) = bus_with_memory();
    let graph = Graph::build_with_bus(definition, bus).expect("build");
    run_to_quiescence(graph).await;

    assert_eq!(echoed_lines(&sink, "a"), vec!["ping"]);
    assert_eq!(echoed_lines(&sink, "b"), vec!["ping"]);
}

#[tokio::test]
async fn lines_from_one_producer_keep_their_relative_order() {
    let seeds: Vec<String> = (1..=20).map(|i| format!("line-{i}")).collect();
    let definition = GraphDefinition::new()
        .with_node(
            "a",
            NodeDefinition::new("cat").with_initial_inputs(seeds.clone()),
        )
        .with_node(
            "b",
            NodeDefinition::new("cat")
                .with_input_from(["a"])
                .with_echo_to_observer(true),
        );

    let (bus, sink) = bus_with_memory();
    let graph = Graph::build_with_bus(definition, bus).expect("build");
    run_to_quiescence(graph).await;

    assert_eq!(echoed_lines(&sink, "b"), seeds);
}

#[tokio::test]
async fn seeded_inputs_precede_any_producer_line() {
    let definition = GraphDefinition::new()
        .with_node("a", NodeDefinition::new("cat").with_initial_inputs(["second"]))
        .with_node(
            "b",
            NodeDefinition::new("cat")
                .with_input_from(["a"])
                .with_initial_inputs(["first"])
                .with_echo_to_observer(true),
        );

    let (bus, sink) = bus_with_memory();
    let graph = Graph::build_with_bus(definition, bus).expect("build");
    run_to_quiescence(graph).await;

    assert_eq!(echoed_lines(&sink, "b"), vec!["first", "second"]);
}

#[tokio::test]
async fn dangling_reference_fails_before_any_spawn() {
    let definition = GraphDefinition::new().with_node(
        "b",
        NodeDefinition::new("cat").with_input_from(["undeclared"]),
    );

    let err = Graph::build(definition).unwrap_err();
    assert!(matches!(
        err,
        GraphError::Config(ConfigError::UnknownProducer { ref producer, .. })
            if producer == "undeclared"
    ));
}

#[tokio::test]
async fn crashed_node_is_isolated_from_its_subscribers() {
    let definition = GraphDefinition::new()
        .with_node("broken", NodeDefinition::new("false"))
        .with_node(
            "downstream",
            NodeDefinition::new("cat")
                .with_input_from(["broken"])
                .with_echo_to_observer(true),
        );

    let (bus, sink) = bus_with_memory();
    let graph = Graph::build_with_bus(definition, bus).expect("build");
    let summary = run_to_quiescence(graph).await;

    let broken = summary.exit("broken").expect("broken reported");
    assert_eq!(
        broken.outcome,
        NodeOutcome::Faulted(NodeFault::Crashed { status: Some(1) })
    );

    // The subscriber got its sentinel from the dead producer and finished
    // cleanly with nothing to show.
    let downstream = summary.exit("downstream").expect("downstream reported");
    assert!(downstream.is_clean());
    assert!(echoed_lines(&sink, "downstream").is_empty());

    // One node completed, so the run as a whole still counts as useful.
    assert!(summary.any_clean());

    // The fault was surfaced to the observer.
    let faults: Vec<Event> = sink
        .snapshot()
        .into_iter()
        .filter(|event| matches!(event, Event::NodeFault(e) if e.node == "broken"))
        .collect();
    assert_eq!(faults.len(), 1);
}

#[tokio::test]
async fn write_failure_is_isolated_to_the_affected_node() {
    // `head -n 1` closes its stdin after one line; pushing well past the
    // pipe buffer guarantees the feeder observes the broken pipe.
    let payload: Vec<String> = (0..2000).map(|i| format!("{i:0>100}")).collect();
    let definition = GraphDefinition::new()
        .with_node("firehose", NodeDefinition::new("cat").with_initial_inputs(payload))
        .with_node(
            "one_line",
            NodeDefinition::new("head -n 1")
                .with_input_from(["firehose"])
                .with_echo_to_observer(true),
        );

    let (bus, sink) = bus_with_memory();
    let graph = Graph::build_with_bus(definition, bus).expect("build");
    let summary = run_to_quiescence(graph).await;

    let firehose = summary.exit("firehose").expect("firehose reported");
    assert!(firehose.is_clean());

    let one_line = summary.exit("one_line").expect("one_line reported");
    assert!(matches!(
        one_line.outcome,
        NodeOutcome::Faulted(NodeFault::Write { .. })
    ));

    // The line it did accept was still broadcast before the fault.
    assert_eq!(echoed_lines(&sink, "one_line").len(), 1);
    assert!(summary.any_clean());
}

#[tokio::test]
async fn cancellation_unblocks_a_cyclic_graph() {
    // A and B feed each other; with no seeds nothing ever flows, so only
    // the operator stop can quiesce this graph.
    let definition = GraphDefinition::new()
        .with_node("a", NodeDefinition::new("cat").with_input_from(["b"]))
        .with_node("b", NodeDefinition::new("cat").with_input_from(["a"]));

    let (bus, _sink) = bus_with_memory();
    let graph = Graph::build_with_bus(definition, bus).expect("build");
    let cancel = graph.cancel_handle();

    let run = tokio::spawn(graph.run());
    tokio::time::sleep(Duration::from_millis(200)).await;
    cancel.cancel();

    let summary = timeout(RUN_DEADLINE, run)
        .await
        .expect("cancellation quiesced the cycle")
        .expect("run task joined")
        .expect("run completed without fatal error");

    assert_eq!(summary.exits.len(), 2);
    assert!(summary.faulted().next().is_none());
}

#[tokio::test]
async fn empty_definition_completes_immediately() {
    let (bus, _sink) = bus_with_memory();
    let graph = Graph::build_with_bus(GraphDefinition::new(), bus).expect("build");
    let summary = run_to_quiescence(graph).await;

    assert!(summary.exits.is_empty());
    assert!(summary.any_clean());
}
