//! Graph definition parsing and validation.
//!
//! A definition is a JSON object mapping node names to [`NodeDefinition`]
//! entries. Name uniqueness is structural (map semantics); the only
//! referential invariant is that every `input_from` entry resolves to a
//! declared node, checked by [`GraphDefinition::validate`] before any
//! process is spawned.

use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::str::FromStr;

use miette::Diagnostic;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Declarative description of one node: the shell command to run, which
/// producers feed it, the lines seeded into its queue before start, and
/// whether its output is echoed to the observer sink.
///
/// The serde field names are the wire format of the definition file.
/// `output_to_stdout` is accepted as an alias for `echo_to_observer` for
/// definitions written against the legacy format.
///
/// # Examples
///
/// ```
/// use linemux::definition::NodeDefinition;
///
/// let seed = NodeDefinition::new("cat")
///     .with_initial_inputs(["hello"])
///     .with_echo_to_observer(true);
/// assert_eq!(seed.initial_inputs, vec!["hello"]);
/// assert!(seed.input_from.is_empty());
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NodeDefinition {
    /// Shell command line executed via `sh -c`.
    pub command: String,
    /// Names of producer nodes whose output feeds this node.
    #[serde(default)]
    pub input_from: Vec<String>,
    /// Lines enqueued before any process starts, in declaration order.
    #[serde(default)]
    pub initial_inputs: Vec<String>,
    /// Echo this node's output lines to the observer sink as `name|line`.
    #[serde(default, alias = "output_to_stdout")]
    pub echo_to_observer: bool,
}

impl NodeDefinition {
    /// Create a definition for `command` with no producers, no seeds, and
    /// no observer echo.
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            input_from: Vec::new(),
            initial_inputs: Vec::new(),
            echo_to_observer: false,
        }
    }

    /// Set the producer nodes feeding this node.
    #[must_use]
    pub fn with_input_from<I, S>(mut self, producers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.input_from = producers.into_iter().map(Into::into).collect();
        self
    }

    /// Set the lines seeded into this node's queue before start.
    #[must_use]
    pub fn with_initial_inputs<I, S>(mut self, lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.initial_inputs = lines.into_iter().map(Into::into).collect();
        self
    }

    /// Toggle echoing of this node's output to the observer sink.
    #[must_use]
    pub fn with_echo_to_observer(mut self, echo: bool) -> Self {
        self.echo_to_observer = echo;
        self
    }
}

/// Parsed mapping from node name to [`NodeDefinition`].
///
/// Obtained from a file via [`load`](Self::load), from any reader via
/// [`from_reader`](Self::from_reader), or from a string via [`FromStr`].
/// All three validate before returning; no partial definition is ever
/// handed out.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GraphDefinition {
    nodes: FxHashMap<String, NodeDefinition>,
}

impl GraphDefinition {
    /// Create an empty definition for programmatic construction.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a node, builder style.
    #[must_use]
    pub fn with_node(mut self, name: impl Into<String>, definition: NodeDefinition) -> Self {
        self.nodes.insert(name.into(), definition);
        self
    }

    /// Read and validate a definition from a JSON file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_reader(BufReader::new(file))
    }

    /// Parse and validate a definition from any reader.
    pub fn from_reader(reader: impl std::io::Read) -> Result<Self, ConfigError> {
        let definition: Self = serde_json::from_reader(reader)?;
        definition.validate()?;
        Ok(definition)
    }

    /// Check that every `input_from` entry names a declared node.
    ///
    /// Fails with [`ConfigError::UnknownProducer`] naming the first dangling
    /// reference found. Definitions built through [`load`](Self::load),
    /// [`from_reader`](Self::from_reader), or [`FromStr`] are already
    /// validated; this is for definitions assembled programmatically.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (consumer, definition) in &self.nodes {
            for producer in &definition.input_from {
                if !self.nodes.contains_key(producer) {
                    return Err(ConfigError::UnknownProducer {
                        consumer: consumer.clone(),
                        producer: producer.clone(),
                    });
                }
            }
        }
        Ok(())
    }

    /// Iterate over `(name, definition)` entries.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &NodeDefinition)> {
        self.nodes.iter()
    }

    /// Look up one node's definition.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&NodeDefinition> {
        self.nodes.get(name)
    }

    /// Number of declared nodes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether the definition declares no nodes at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

impl FromStr for GraphDefinition {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let definition: Self = serde_json::from_str(s)?;
        definition.validate()?;
        Ok(definition)
    }
}

/// Errors raised while loading or validating a graph definition.
///
/// All variants are fatal: they abort before any child process is spawned.
#[derive(Debug, Error, Diagnostic)]
pub enum ConfigError {
    /// The definition file could not be read.
    #[error("failed to read graph definition at {path}")]
    #[diagnostic(code(linemux::definition::io))]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// The definition is not valid JSON for the expected shape.
    #[error("malformed graph definition: {0}")]
    #[diagnostic(
        code(linemux::definition::parse),
        help("The definition is a JSON object mapping node names to objects with `command`, `input_from`, `initial_inputs`, and `echo_to_observer`.")
    )]
    Parse(#[from] serde_json::Error),

    /// An `input_from` entry references a node that is not declared.
    #[error("node {consumer:?} takes input from {producer:?}, which is not a declared node")]
    #[diagnostic(
        code(linemux::definition::unknown_producer),
        help("Every input_from entry must name another node in the same definition.")
    )]
    UnknownProducer { consumer: String, producer: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_apply_to_optional_fields() {
        let definition: GraphDefinition = r#"{"a": {"command": "cat"}}"#.parse().unwrap();
        let node = definition.get("a").unwrap();
        assert_eq!(node.command, "cat");
        assert!(node.input_from.is_empty());
        assert!(node.initial_inputs.is_empty());
        assert!(!node.echo_to_observer);
    }

    #[test]
    fn legacy_output_to_stdout_alias() {
        let definition: GraphDefinition =
            r#"{"a": {"command": "cat", "output_to_stdout": true}}"#.parse().unwrap();
        assert!(definition.get("a").unwrap().echo_to_observer);
    }

    #[test]
    fn unknown_producer_is_rejected() {
        let err = r#"{"b": {"command": "cat", "input_from": ["ghost"]}}"#
            .parse::<GraphDefinition>()
            .unwrap_err();
        match err {
            ConfigError::UnknownProducer { consumer, producer } => {
                assert_eq!(consumer, "b");
                assert_eq!(producer, "ghost");
            }
            other => panic!("expected UnknownProducer, got {other:?}"),
        }
    }

    #[test]
    fn builder_definitions_validate() {
        let definition = GraphDefinition::new()
            .with_node("a", NodeDefinition::new("cat").with_initial_inputs(["x"]))
            .with_node("b", NodeDefinition::new("cat").with_input_from(["a"]));
        assert!(definition.validate().is_ok());
        assert_eq!(definition.len(), 2);
    }

    #[test]
    fn missing_command_is_a_parse_error() {
        let err = r#"{"a": {}}"#.parse::<GraphDefinition>().unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }
}
