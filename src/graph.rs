//! Graph construction, execution, and cancellation.
//!
//! [`Graph::build`] turns a validated [`GraphDefinition`] into a set of
//! wired, seeded [`ProcessNode`]s without performing any I/O.
//! [`Graph::run`] spawns every child, starts the workers, and resolves
//! once the whole graph is quiescent.

use std::sync::Arc;

use futures_util::future::join_all;
use miette::Diagnostic;
use rustc_hash::FxHashMap;
use thiserror::Error;
use tracing::{debug, info, instrument};

use crate::definition::{ConfigError, GraphDefinition};
use crate::event_bus::EventBus;
use crate::node::{Feed, NodeExit, ProcessNode, SpawnError};

/// A built, not-yet-running process graph.
///
/// Node lifetime is owned here exclusively; subscriber lists hold plain
/// delivery handles, never ownership. A `Graph` spans exactly one
/// execution: [`run`](Self::run) consumes it.
pub struct Graph {
    nodes: Vec<ProcessNode>,
    cancel: CancelHandle,
    event_bus: EventBus,
}

impl std::fmt::Debug for Graph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Graph")
            .field("nodes", &self.nodes.len())
            .finish_non_exhaustive()
    }
}

impl Graph {
    /// Build with a default event bus (stdout observer).
    pub fn build(definition: GraphDefinition) -> Result<Self, GraphError> {
        Self::build_with_bus(definition, EventBus::default())
    }

    /// Validate the definition, construct one node per entry, wire every
    /// `(consumer, producer)` subscription, and seed `initial_inputs` in
    /// declaration order, all before any process exists.
    #[instrument(skip_all, fields(nodes = definition.len()), err)]
    pub fn build_with_bus(
        definition: GraphDefinition,
        event_bus: EventBus,
    ) -> Result<Self, GraphError> {
        definition.validate()?;
        event_bus.listen();
        let events = event_bus.sender();

        let mut nodes: FxHashMap<String, ProcessNode> = FxHashMap::default();
        for (name, node_definition) in definition.iter() {
            nodes.insert(
                name.clone(),
                ProcessNode::new(name, node_definition, events.clone()),
            );
        }

        // Producer -> consumer wiring: the producer's broadcaster gets a
        // delivery handle into each consumer's queue.
        let mut wiring: Vec<(String, flume::Sender<Feed>)> = Vec::new();
        for (consumer, node_definition) in definition.iter() {
            let feed = nodes[consumer.as_str()].feed_handle();
            for producer in &node_definition.input_from {
                wiring.push((producer.clone(), feed.clone()));
            }
        }
        for (producer, feed) in wiring {
            nodes
                .get_mut(&producer)
                .expect("producer declared; definition validated above")
                .subscribe(feed);
        }

        // Seeds go in now so they are the first lines each feeder sees.
        for (name, node_definition) in definition.iter() {
            let node = &nodes[name.as_str()];
            for line in &node_definition.initial_inputs {
                node.enqueue(line.clone());
            }
        }

        let cancel = CancelHandle {
            targets: Arc::new(
                nodes
                    .values()
                    .map(|node| CancelTarget {
                        node: node.name().to_string(),
                        feed: node.feed_handle(),
                        quota: node.shutdown_quota(),
                    })
                    .collect(),
            ),
        };

        debug!(nodes = nodes.len(), "graph built and seeded");
        Ok(Self {
            nodes: nodes.into_values().collect(),
            cancel,
            event_bus,
        })
    }

    /// Handle for an operator-initiated stop of the whole graph.
    #[must_use]
    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    /// Spawn every child, start all workers, and wait for quiescence.
    ///
    /// The first [`SpawnError`] aborts the entire run before any worker
    /// starts; children spawned up to that point are killed, not leaked.
    /// Faults observed after a successful start are isolated to their
    /// node and reported in the [`RunSummary`]; a dead producer's
    /// sentinels still reach its subscribers, so the run never hangs on a
    /// node that cannot finish.
    #[instrument(skip_all, err)]
    pub async fn run(self) -> Result<RunSummary, GraphError> {
        info!(nodes = self.nodes.len(), "graph run started");

        // Spawn phase: all children launch before any worker starts, so a
        // launch failure leaves no half-driven graph behind. Dropping the
        // already-spawned children kills them (kill_on_drop).
        let mut spawned = Vec::with_capacity(self.nodes.len());
        for node in &self.nodes {
            spawned.push(node.spawn()?);
        }

        // Start phase: workers come up in arbitrary order; queues buffer
        // anything produced before a consumer starts reading.
        let mut handles = Vec::with_capacity(self.nodes.len());
        let mut source_feeds = Vec::new();
        for (node, child) in self.nodes.into_iter().zip(spawned) {
            if node.is_source() {
                source_feeds.push(node.feed_handle());
            }
            handles.push(node.start(child));
        }

        // Source nodes have no producer to sentinel them; release theirs
        // now, after their seeds (FIFO keeps the order).
        for feed in source_feeds {
            let _ = feed.send(Feed::Shutdown);
        }

        let exits = join_all(handles.into_iter().map(|handle| handle.join())).await;
        let summary = RunSummary { exits };
        info!(
            clean = summary.clean().count(),
            faulted = summary.faulted().count(),
            "graph run reached quiescence"
        );

        self.event_bus.stop_listener().await;
        Ok(summary)
    }
}

/// Flushes a full quota of shutdown sentinels into every node's queue,
/// closing every child's input without waiting for children to exit on
/// their own. Cloneable; safe to trigger from a signal handler task.
#[derive(Clone)]
pub struct CancelHandle {
    targets: Arc<Vec<CancelTarget>>,
}

struct CancelTarget {
    node: String,
    feed: flume::Sender<Feed>,
    quota: usize,
}

impl CancelHandle {
    /// Stop the graph: every feeder drains its remaining real lines and
    /// exits. Extra sentinels beyond a feeder's quota are inert.
    pub fn cancel(&self) {
        for target in self.targets.iter() {
            for _ in 0..target.quota {
                let _ = target.feed.send(Feed::Shutdown);
            }
            debug!(node = %target.node, quota = target.quota, "shutdown sentinels flushed");
        }
    }
}

/// Per-node terminal reports for one graph execution.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RunSummary {
    pub exits: Vec<NodeExit>,
}

impl RunSummary {
    /// Nodes that terminated cleanly.
    pub fn clean(&self) -> impl Iterator<Item = &NodeExit> {
        self.exits.iter().filter(|exit| exit.is_clean())
    }

    /// Nodes that faulted (crash, write failure, worker failure).
    pub fn faulted(&self) -> impl Iterator<Item = &NodeExit> {
        self.exits.iter().filter(|exit| !exit.is_clean())
    }

    /// True when at least one node completed successfully, or the graph
    /// was empty. Drives the CLI exit code: isolated faults only fail the
    /// process when nothing at all succeeded.
    #[must_use]
    pub fn any_clean(&self) -> bool {
        self.exits.is_empty() || self.exits.iter().any(NodeExit::is_clean)
    }

    /// Look up one node's exit by name.
    #[must_use]
    pub fn exit(&self, node: &str) -> Option<&NodeExit> {
        self.exits.iter().find(|exit| exit.node == node)
    }
}

/// Fatal errors: these abort the run before or at start, unlike the
/// isolated per-node faults carried in [`RunSummary`].
#[derive(Debug, Error, Diagnostic)]
pub enum GraphError {
    #[error(transparent)]
    #[diagnostic(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Spawn(#[from] SpawnError),
}
