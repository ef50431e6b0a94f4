//! Child process lifecycle and the per-node worker pair.
//!
//! Each [`ProcessNode`] owns one child process plus two workers: a *feeder*
//! that drains the inbound queue into the child's stdin, and a
//! *broadcaster* that fans the child's stdout lines out to every
//! subscriber queue.
//!
//! # Shutdown protocol
//!
//! Feeders terminate only through the [`Feed::Shutdown`] sentinel, never
//! by watching the child die. A feeder expects `max(producer_count, 1)`
//! sentinels: one from each producer's broadcaster as that producer
//! finishes, or a single one released by the graph for source nodes.
//! Because the inbound queue is FIFO, every real line from a producer is
//! drained before its sentinel is seen. When the quota is met the feeder
//! exits and drops the child's stdin, which closes the child's input and
//! lets it reach EOF on its own.

use std::process::Stdio;

use miette::Diagnostic;
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::task::JoinHandle;
use tracing::{debug, instrument, warn};

use crate::definition::NodeDefinition;
use crate::event_bus::Event;

/// Inbound queue item: one text line, or the shutdown sentinel.
///
/// The sentinel is distinct from any legitimate line by construction and
/// is never written to the child.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Feed {
    Line(String),
    Shutdown,
}

/// One node of the process graph, before it is started.
///
/// Created by [`Graph::build`](crate::graph::Graph::build), which wires
/// subscriber handles and seeds initial inputs while no process exists
/// yet. [`spawn`](Self::spawn) launches the child; [`start`](Self::start)
/// hands the pipes to the worker tasks.
pub struct ProcessNode {
    name: String,
    command: String,
    echo_to_observer: bool,
    shutdown_quota: usize,
    producer_count: usize,
    input_tx: flume::Sender<Feed>,
    input_rx: flume::Receiver<Feed>,
    subscribers: Vec<flume::Sender<Feed>>,
    events: flume::Sender<Event>,
}

impl ProcessNode {
    pub(crate) fn new(
        name: impl Into<String>,
        definition: &NodeDefinition,
        events: flume::Sender<Event>,
    ) -> Self {
        let (input_tx, input_rx) = flume::unbounded();
        let producer_count = definition.input_from.len();
        Self {
            name: name.into(),
            command: definition.command.clone(),
            echo_to_observer: definition.echo_to_observer,
            shutdown_quota: producer_count.max(1),
            producer_count,
            input_tx,
            input_rx,
            subscribers: Vec::new(),
            events,
        }
    }

    /// Node name as declared in the definition.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether no producer feeds this node. Source nodes get their single
    /// shutdown sentinel from the graph instead of a producer.
    #[must_use]
    pub fn is_source(&self) -> bool {
        self.producer_count == 0
    }

    /// Number of sentinels the feeder consumes before exiting.
    #[must_use]
    pub fn shutdown_quota(&self) -> usize {
        self.shutdown_quota
    }

    /// Non-owning handle for delivering [`Feed`] items into this node's
    /// queue. Producers hold one per subscription; the graph keeps one for
    /// seeding and cancellation.
    pub(crate) fn feed_handle(&self) -> flume::Sender<Feed> {
        self.input_tx.clone()
    }

    /// Register a subscriber queue. Fixed before start; never changes
    /// during a run.
    pub(crate) fn subscribe(&mut self, subscriber: flume::Sender<Feed>) {
        self.subscribers.push(subscriber);
    }

    /// Thread-safe, non-blocking append of one line to the inbound queue.
    pub fn enqueue(&self, line: impl Into<String>) {
        if self.input_tx.send(Feed::Line(line.into())).is_err() {
            debug!(node = %self.name, "enqueue after feeder exit; line dropped");
        }
    }

    /// Launch the child with piped stdin/stdout.
    ///
    /// The command line runs under `sh -c`, so a missing executable inside
    /// the command surfaces as a crash (exit 127) rather than a launch
    /// failure; [`SpawnError`] covers the launch itself.
    pub(crate) fn spawn(&self) -> Result<SpawnedChild, SpawnError> {
        let mut child = Command::new("sh")
            .arg("-c")
            .arg(&self.command)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| SpawnError::Launch {
                node: self.name.clone(),
                command: self.command.clone(),
                source,
            })?;

        let stdin = child.stdin.take().ok_or_else(|| SpawnError::MissingPipes {
            node: self.name.clone(),
        })?;
        let stdout = child.stdout.take().ok_or_else(|| SpawnError::MissingPipes {
            node: self.name.clone(),
        })?;

        debug!(node = %self.name, command = %self.command, "child spawned");
        Ok(SpawnedChild {
            child,
            stdin,
            stdout,
        })
    }

    /// Start the feeder and broadcaster workers plus a supervisor that
    /// observes this node's termination independently of the rest of the
    /// graph.
    pub(crate) fn start(self, spawned: SpawnedChild) -> NodeHandle {
        let SpawnedChild {
            child,
            stdin,
            stdout,
        } = spawned;

        let feeder = tokio::spawn(feed_child(self.shutdown_quota, self.input_rx, stdin));
        let broadcaster = tokio::spawn(broadcast_output(
            self.name.clone(),
            stdout,
            self.subscribers,
            self.echo_to_observer,
            self.events.clone(),
        ));

        let name = self.name;
        let task = tokio::spawn(supervise(name.clone(), feeder, broadcaster, child, self.events));
        NodeHandle { name, task }
    }
}

/// A freshly spawned child with both pipes captured.
pub(crate) struct SpawnedChild {
    child: Child,
    stdin: ChildStdin,
    stdout: ChildStdout,
}

/// Handle to one running node; resolves to its [`NodeExit`].
pub struct NodeHandle {
    name: String,
    task: JoinHandle<NodeExit>,
}

impl NodeHandle {
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Wait for this node's workers and child to terminate.
    pub async fn join(self) -> NodeExit {
        match self.task.await {
            Ok(exit) => exit,
            Err(error) => NodeExit {
                node: self.name,
                outcome: NodeOutcome::Faulted(NodeFault::Worker {
                    error: error.to_string(),
                }),
            },
        }
    }
}

/// Terminal report for one node.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NodeExit {
    pub node: String,
    pub outcome: NodeOutcome,
}

impl NodeExit {
    #[must_use]
    pub fn is_clean(&self) -> bool {
        matches!(self.outcome, NodeOutcome::Clean { .. })
    }
}

/// How a node's run ended.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum NodeOutcome {
    /// Child exited successfully after its output was fully broadcast.
    Clean { lines: u64 },
    /// An isolated failure; the rest of the graph keeps running.
    Faulted(NodeFault),
}

/// Isolated runtime failures, scoped to one node.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum NodeFault {
    /// Child exited with a failure status (or was killed by a signal)
    /// after a successful launch.
    #[error("child crashed (exit status {status:?})")]
    Crashed { status: Option<i32> },

    /// Writing to the child's stdin failed; its input was already closed.
    #[error("write to child stdin failed: {error}")]
    Write { error: String },

    /// Reading the child's stdout failed mid-stream.
    #[error("read from child stdout failed: {error}")]
    Read { error: String },

    /// A worker task failed to run to completion.
    #[error("worker task failed: {error}")]
    Worker { error: String },
}

/// Failure to launch a child process. Fatal to the whole graph, unlike
/// any [`NodeFault`] observed after a successful launch.
#[derive(Debug, Error, Diagnostic)]
pub enum SpawnError {
    #[error("failed to launch node {node:?} ({command})")]
    #[diagnostic(
        code(linemux::node::launch),
        help("Check that `sh` is available and the command line is well-formed.")
    )]
    Launch {
        node: String,
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("node {node:?} spawned without piped stdio")]
    #[diagnostic(code(linemux::node::pipes))]
    MissingPipes { node: String },
}

/// Feeder worker: inbound queue → child stdin.
///
/// Writes are flushed per line so delivery is prompt rather than batched.
/// Exits once `quota` sentinels have been consumed, when every feed handle
/// is gone, or on a write failure; returning drops `stdin`, closing the
/// child's input.
async fn feed_child(
    quota: usize,
    queue: flume::Receiver<Feed>,
    mut stdin: ChildStdin,
) -> std::io::Result<()> {
    let mut remaining = quota;
    while remaining > 0 {
        let feed = match queue.recv_async().await {
            Ok(feed) => feed,
            // All handles dropped; nothing more can arrive.
            Err(_) => break,
        };
        match feed {
            Feed::Line(line) => {
                stdin.write_all(line.as_bytes()).await?;
                if !line.ends_with('\n') {
                    stdin.write_all(b"\n").await?;
                }
                stdin.flush().await?;
            }
            Feed::Shutdown => remaining -= 1,
        }
    }
    Ok(())
}

/// Broadcaster worker: child stdout → subscriber queues (+ observer echo).
///
/// Runs to end-of-stream, then releases one shutdown sentinel per
/// subscriber so downstream feeders can meet their quotas; a crashed
/// producer still unblocks its consumers this way.
async fn broadcast_output(
    node: String,
    stdout: ChildStdout,
    subscribers: Vec<flume::Sender<Feed>>,
    echo_to_observer: bool,
    events: flume::Sender<Event>,
) -> std::io::Result<u64> {
    let mut lines = BufReader::new(stdout).lines();
    let mut broadcast = 0u64;
    let result = loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                broadcast += 1;
                for subscriber in &subscribers {
                    // A subscriber whose feeder already exited is not an error.
                    let _ = subscriber.send(Feed::Line(line.clone()));
                }
                if echo_to_observer {
                    let _ = events.send(Event::node_line(&node, &line));
                }
            }
            Ok(None) => break Ok(broadcast),
            Err(error) => break Err(error),
        }
    };

    for subscriber in &subscribers {
        let _ = subscriber.send(Feed::Shutdown);
    }
    debug!(node = %node, lines = broadcast, "broadcaster finished");
    result
}

/// Await both workers and the child, then classify the outcome.
#[instrument(skip_all, fields(node = %node))]
async fn supervise(
    node: String,
    feeder: JoinHandle<std::io::Result<()>>,
    broadcaster: JoinHandle<std::io::Result<u64>>,
    mut child: Child,
    events: flume::Sender<Event>,
) -> NodeExit {
    let fed = feeder.await;
    let cast = broadcaster.await;
    let status = child.wait().await;

    let outcome = classify(fed, cast, status);
    match &outcome {
        NodeOutcome::Clean { lines } => {
            debug!(node = %node, lines, "node terminated cleanly");
        }
        NodeOutcome::Faulted(fault) => {
            warn!(node = %node, %fault, "node faulted; rest of the graph continues");
            let _ = events.send(Event::node_fault(&node, fault.to_string()));
        }
    }
    NodeExit { node, outcome }
}

fn classify(
    fed: Result<std::io::Result<()>, tokio::task::JoinError>,
    cast: Result<std::io::Result<u64>, tokio::task::JoinError>,
    status: std::io::Result<std::process::ExitStatus>,
) -> NodeOutcome {
    let lines = match cast {
        Ok(Ok(lines)) => lines,
        Ok(Err(error)) => {
            return NodeOutcome::Faulted(NodeFault::Read {
                error: error.to_string(),
            });
        }
        Err(error) => {
            return NodeOutcome::Faulted(NodeFault::Worker {
                error: error.to_string(),
            });
        }
    };

    match fed {
        Ok(Ok(())) => {}
        Ok(Err(error)) => {
            return NodeOutcome::Faulted(NodeFault::Write {
                error: error.to_string(),
            });
        }
        Err(error) => {
            return NodeOutcome::Faulted(NodeFault::Worker {
                error: error.to_string(),
            });
        }
    }

    match status {
        Ok(status) if status.success() => NodeOutcome::Clean { lines },
        Ok(status) => NodeOutcome::Faulted(NodeFault::Crashed {
            status: status.code(),
        }),
        Err(error) => NodeOutcome::Faulted(NodeFault::Worker {
            error: error.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sentinel_is_distinct_from_any_line() {
        assert_ne!(Feed::Shutdown, Feed::Line(String::new()));
        assert_ne!(Feed::Shutdown, Feed::Line("Shutdown".into()));
    }

    #[test]
    fn source_nodes_expect_one_sentinel() {
        let (events, _rx) = flume::unbounded();
        let node = ProcessNode::new("seed", &NodeDefinition::new("cat"), events);
        assert!(node.is_source());
        assert_eq!(node.shutdown_quota(), 1);
    }

    #[test]
    fn fan_in_quota_matches_producer_count() {
        let (events, _rx) = flume::unbounded();
        let definition = NodeDefinition::new("cat").with_input_from(["a", "b", "c"]);
        let node = ProcessNode::new("merge", &definition, events);
        assert!(!node.is_source());
        assert_eq!(node.shutdown_quota(), 3);
    }
}
