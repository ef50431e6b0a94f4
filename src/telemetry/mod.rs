//! Formatting for observer output.
//!
//! Sinks delegate rendering to a [`TelemetryFormatter`]; the stock
//! [`PlainFormatter`] writes one line per event, optionally colorized when
//! stderr is a terminal.

use std::io::IsTerminal;

use crate::event_bus::Event;

pub const NODE_COLOR: &str = "\x1b[32m"; // green
pub const FAULT_COLOR: &str = "\x1b[35m"; // magenta
pub const RESET_COLOR: &str = "\x1b[0m";

/// Color mode for formatted observer output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FormatterMode {
    /// Auto-detect TTY capability (checks `stderr.is_terminal()`).
    #[default]
    Auto,
    /// Always include ANSI color codes.
    Colored,
    /// Never include ANSI color codes.
    Plain,
}

impl FormatterMode {
    /// Resolve `Auto` against stderr TTY capability.
    pub fn is_colored(&self) -> bool {
        match self {
            FormatterMode::Auto => std::io::stderr().is_terminal(),
            FormatterMode::Colored => true,
            FormatterMode::Plain => false,
        }
    }
}

/// Renders events into the byte stream a sink writes out.
pub trait TelemetryFormatter: Send + Sync {
    fn render_event(&self, event: &Event) -> String;
}

/// Line-per-event formatter with optional ANSI color.
///
/// Echoed node output keeps the bare `name|line` shape so downstream
/// pipeline consumers can parse it; only the node name is colorized.
#[derive(Default)]
pub struct PlainFormatter {
    mode: FormatterMode,
}

impl PlainFormatter {
    /// Formatter with auto-detected color mode.
    pub fn new() -> Self {
        Self::default()
    }

    /// Formatter with an explicit color mode.
    pub fn with_mode(mode: FormatterMode) -> Self {
        Self { mode }
    }
}

impl TelemetryFormatter for PlainFormatter {
    fn render_event(&self, event: &Event) -> String {
        match event {
            Event::NodeLine(e) => {
                if self.mode.is_colored() {
                    format!("{NODE_COLOR}{}{RESET_COLOR}|{}\n", e.node, e.line)
                } else {
                    format!("{}|{}\n", e.node, e.line)
                }
            }
            Event::NodeFault(e) => {
                if self.mode.is_colored() {
                    format!("{FAULT_COLOR}[{}] {}{RESET_COLOR}\n", e.node, e.message)
                } else {
                    format!("[{}] {}\n", e.node, e.message)
                }
            }
            Event::Diagnostic(e) => format!("{}: {}\n", e.scope, e.message),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_mode_matches_observer_contract() {
        let formatter = PlainFormatter::with_mode(FormatterMode::Plain);
        let rendered = formatter.render_event(&Event::node_line("probe", "https://x.test/a"));
        assert_eq!(rendered, "probe|https://x.test/a\n");
    }

    #[test]
    fn colored_mode_wraps_node_name_only() {
        let formatter = PlainFormatter::with_mode(FormatterMode::Colored);
        let rendered = formatter.render_event(&Event::node_line("probe", "hit"));
        assert!(rendered.contains(NODE_COLOR));
        assert!(rendered.ends_with("|hit\n"));
    }
}
