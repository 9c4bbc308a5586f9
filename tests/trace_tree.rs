//! End-to-end tests over the public API: building a span tree in one
//! process, fanning out children across threads, and rebuilding the tree on
//! the far side of a text-map carrier.
use std::collections::HashMap;
use std::thread;

use tracetree::propagation::{TextMapPropagator, TraceContextPropagator};
use tracetree::trace::{
    ChannelRecorder, IncrementIdGenerator, InMemoryRecorder, TraceContextExt, Tracer,
};
use tracetree::Context;

fn recording_tracer() -> (Tracer, InMemoryRecorder) {
    let recorder = InMemoryRecorder::new();
    let tracer = Tracer::builder()
        .with_recorder(recorder.clone())
        .with_id_generator(IncrementIdGenerator::new())
        .build();
    (tracer, recorder)
}

#[test]
fn span_tree_is_reconstructible_from_flat_records() {
    let (tracer, recorder) = recording_tracer();

    let mut root = tracer.start_trace("request");
    let mut db = root.start_child("db-query").unwrap();
    let mut encode = root.start_child("encode-response").unwrap();

    db.finish().unwrap();
    encode.finish().unwrap();
    root.finish().unwrap();

    let finished = recorder.finished_spans().unwrap();
    assert_eq!(finished.len(), 3);

    // every record shares the root's trace id
    let trace_id = finished[2].context.trace_id();
    assert!(finished.iter().all(|s| s.context.trace_id() == trace_id));

    // parent/span ids define the tree edges
    let root_record = finished
        .iter()
        .find(|s| s.operation_name == "request")
        .unwrap();
    assert!(root_record.context.parent_span_id().is_none());
    for child in ["db-query", "encode-response"] {
        let record = finished.iter().find(|s| s.operation_name == child).unwrap();
        assert_eq!(
            record.context.parent_span_id(),
            Some(root_record.context.span_id())
        );
    }
}

#[test]
fn sampling_flag_is_inherited_by_children() {
    let (tracer, _) = recording_tracer();

    let root = tracer.span_builder("request").with_sampled(true).start(&tracer);
    let child = root.start_child("db-query").unwrap();

    assert_eq!(
        child.trace_context().trace_id(),
        root.trace_context().trace_id()
    );
    assert!(child.trace_context().is_sampled());
}

#[test]
fn concurrent_fan_out_children_are_independent() {
    let (tracer, _) = recording_tracer();
    let parent = tracer.start_trace("fan-out");

    let (left, right) = thread::scope(|s| {
        let left = s.spawn(|| parent.start_child("left").unwrap());
        let right = s.spawn(|| parent.start_child("right").unwrap());
        (left.join().unwrap(), right.join().unwrap())
    });

    let (left, right) = (left.trace_context(), right.trace_context());
    assert_ne!(left.span_id(), right.span_id());
    assert_eq!(left.trace_id(), parent.trace_context().trace_id());
    assert_eq!(right.trace_id(), parent.trace_context().trace_id());
    assert_eq!(left.parent_span_id(), Some(parent.trace_context().span_id()));
    assert_eq!(right.parent_span_id(), Some(parent.trace_context().span_id()));
}

#[test]
fn trace_continues_across_simulated_process_boundary() {
    let (client_tracer, client_recorder) = recording_tracer();
    let propagator = TraceContextPropagator::new();

    // client process: start a trace, annotate it, inject into headers
    let mut client_span = client_tracer.start_trace("client-call");
    let annotated = client_span
        .trace_context()
        .with_baggage_item("tenant", "acme")
        .unwrap();
    let mut headers: HashMap<String, String> = HashMap::new();
    propagator.inject(&annotated, &mut headers);
    client_span.finish().unwrap();

    // server process: own tracer and recorder
    let (server_tracer, server_recorder) = recording_tracer();
    let decoded = propagator.extract(&headers).unwrap();
    assert_eq!(decoded, annotated);

    let mut server_span = server_tracer
        .start_child_from_context(&decoded, "server-handle")
        .unwrap();
    server_span.finish().unwrap();

    let client_record = client_recorder.finished_spans().unwrap().remove(0);
    let server_record = server_recorder.finished_spans().unwrap().remove(0);

    assert_eq!(
        server_record.context.trace_id(),
        client_record.context.trace_id()
    );
    assert_eq!(
        server_record.context.parent_span_id(),
        Some(client_record.context.span_id())
    );
    assert_eq!(server_record.context.baggage().get("tenant"), Some("acme"));
    assert_eq!(
        server_record.context.is_sampled(),
        client_record.context.is_sampled()
    );
}

#[test]
fn ambient_context_carries_span_through_call_chain() {
    let (tracer, recorder) = recording_tracer();

    fn handler(cx: &Context) {
        // a nested call that knows nothing about the span's owner
        let span = cx.span().expect("span should be attached");
        span.set_tag("handled", true).unwrap();
        let mut child = span.start_child("nested").unwrap();
        child.finish().unwrap();
    }

    let cx = Context::new().with_span(tracer.start_trace("request"));
    handler(&cx);
    cx.span().unwrap().finish().unwrap();

    let finished = recorder.finished_spans().unwrap();
    assert_eq!(finished.len(), 2);
    let request = finished
        .iter()
        .find(|s| s.operation_name == "request")
        .unwrap();
    let nested = finished
        .iter()
        .find(|s| s.operation_name == "nested")
        .unwrap();
    assert_eq!(request.tags.get("handled"), Some(&"true".to_string()));
    assert_eq!(
        nested.context.parent_span_id(),
        Some(request.context.span_id())
    );
}

#[test]
fn channel_recorder_decouples_finish_from_the_sink() {
    let (recorder, receiver) = ChannelRecorder::new();
    let tracer = Tracer::builder().with_recorder(recorder).build();

    let drain = thread::spawn(move || receiver.iter().map(|s| s.operation_name).collect::<Vec<_>>());

    for name in ["a", "b", "c"] {
        tracer.start_trace(name).finish().unwrap();
    }
    tracer.shutdown();
    drop(tracer);

    let drained = drain.join().unwrap();
    assert_eq!(drained, vec!["a", "b", "c"]);
}
