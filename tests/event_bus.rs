//! Event bus behavior in isolation from child processes.

use linemux::event_bus::{ChannelSink, Event, EventBus, MemorySink};
use tokio::sync::mpsc;

#[tokio::test]
async fn memory_sink_records_events_in_publish_order() {
    let sink = MemorySink::new();
    let bus = EventBus::with_sink(sink.clone());
    bus.listen();

    let sender = bus.sender();
    sender.send(Event::node_line("scan", "10.0.0.1")).unwrap();
    sender.send(Event::node_fault("probe", "exited: 2")).unwrap();
    sender
        .send(Event::diagnostic("graph", "run finished"))
        .unwrap();

    bus.stop_listener().await;

    let events = sink.snapshot();
    assert_eq!(events.len(), 3);
    assert_eq!(events[0].node(), Some("scan"));
    assert_eq!(events[0].message(), "10.0.0.1");
    assert_eq!(events[1].node(), Some("probe"));
    assert_eq!(events[2].node(), None);
}

#[tokio::test]
async fn stop_listener_flushes_events_sent_before_the_stop() {
    let sink = MemorySink::new();
    let bus = EventBus::with_sink(sink.clone());
    bus.listen();

    // Queue a burst and stop immediately; nothing may be dropped.
    let sender = bus.sender();
    for i in 0..100 {
        sender.send(Event::node_line("burst", i.to_string())).unwrap();
    }
    bus.stop_listener().await;

    assert_eq!(sink.snapshot().len(), 100);
}

#[tokio::test]
async fn channel_sink_forwards_to_a_tokio_receiver() {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let bus = EventBus::with_sink(ChannelSink::new(tx));
    bus.listen();

    bus.sender().send(Event::node_line("dns", "example.com")).unwrap();
    bus.stop_listener().await;

    let event = rx.recv().await.expect("event forwarded");
    assert_eq!(event.node(), Some("dns"));
    assert_eq!(event.message(), "example.com");
}

#[tokio::test]
async fn late_sinks_only_see_subsequent_events() {
    let early = MemorySink::new();
    let bus = EventBus::with_sink(early.clone());
    bus.listen();

    bus.sender().send(Event::node_line("a", "one")).unwrap();
    bus.stop_listener().await;

    let late = MemorySink::new();
    bus.add_sink(late.clone());
    bus.listen();
    bus.sender().send(Event::node_line("a", "two")).unwrap();
    bus.stop_listener().await;

    assert_eq!(early.snapshot().len(), 2);
    assert_eq!(late.snapshot().len(), 1);
}

#[test]
fn node_line_display_uses_the_pipe_separated_wire_format() {
    let event = Event::node_line("subfinder", "api.example.com");
    assert_eq!(event.to_string(), "subfinder|api.example.com");
}

#[test]
fn events_serialize_to_json() {
    let event = Event::diagnostic("graph", "spawned 4 nodes");
    let json = event.to_json_string().expect("serializable");
    assert!(json.contains("\"scope\":\"graph\""));
    assert!(json.contains("spawned 4 nodes"));
}
