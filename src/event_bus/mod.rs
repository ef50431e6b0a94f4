//! Observer sink fan-out for echoed node output and runtime faults.
//!
//! Nodes publish [`Event`]s through a cloneable flume sender; the
//! [`EventBus`] listener task broadcasts each event to every configured
//! [`EventSink`].

pub mod bus;
pub mod event;
pub mod sink;

pub use bus::EventBus;
pub use event::{DiagnosticEvent, Event, NodeFaultEvent, NodeLineEvent};
pub use sink::{ChannelSink, EventSink, MemorySink, StdOutSink};
