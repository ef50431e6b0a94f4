use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// An observation surfaced by the orchestrator.
///
/// `NodeLine` carries one output line from a node whose definition sets
/// `echo_to_observer`; `NodeFault` reports an isolated runtime failure;
/// `Diagnostic` is free-form orchestrator chatter.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub enum Event {
    NodeLine(NodeLineEvent),
    NodeFault(NodeFaultEvent),
    Diagnostic(DiagnosticEvent),
}

impl Event {
    /// An echoed output line from `node`.
    pub fn node_line(node: impl Into<String>, line: impl Into<String>) -> Self {
        Event::NodeLine(NodeLineEvent {
            node: node.into(),
            line: line.into(),
            when: Utc::now(),
        })
    }

    /// An isolated fault observed on `node`.
    pub fn node_fault(node: impl Into<String>, message: impl Into<String>) -> Self {
        Event::NodeFault(NodeFaultEvent {
            node: node.into(),
            message: message.into(),
            when: Utc::now(),
        })
    }

    /// Free-form diagnostic from the orchestrator itself.
    pub fn diagnostic(scope: impl Into<String>, message: impl Into<String>) -> Self {
        Event::Diagnostic(DiagnosticEvent {
            scope: scope.into(),
            message: message.into(),
        })
    }

    /// The node this event concerns, if any.
    #[must_use]
    pub fn node(&self) -> Option<&str> {
        match self {
            Event::NodeLine(e) => Some(&e.node),
            Event::NodeFault(e) => Some(&e.node),
            Event::Diagnostic(_) => None,
        }
    }

    /// The event payload: the echoed line, the fault message, or the
    /// diagnostic text.
    #[must_use]
    pub fn message(&self) -> &str {
        match self {
            Event::NodeLine(e) => &e.line,
            Event::NodeFault(e) => &e.message,
            Event::Diagnostic(e) => &e.message,
        }
    }

    /// Compact JSON rendering, for sinks that write structured logs.
    pub fn to_json_string(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            // The observer contract for echoed output: `name|line`.
            Event::NodeLine(e) => write!(f, "{}|{}", e.node, e.line),
            Event::NodeFault(e) => write!(f, "[{}] {}", e.node, e.message),
            Event::Diagnostic(e) => write!(f, "{}: {}", e.scope, e.message),
        }
    }
}

/// One echoed output line, tagged with its source node.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct NodeLineEvent {
    pub node: String,
    pub line: String,
    pub when: DateTime<Utc>,
}

/// An isolated runtime failure scoped to one node.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct NodeFaultEvent {
    pub node: String,
    pub message: String,
    pub when: DateTime<Utc>,
}

/// Orchestrator-level diagnostic message.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct DiagnosticEvent {
    pub scope: String,
    pub message: String,
}
