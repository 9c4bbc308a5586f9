//! # Span
//!
//! `Span`s represent a single operation within a trace. `Span`s can be
//! nested to form a trace tree. Each trace contains a root span, which
//! typically describes the end-to-end latency and, optionally, one or more
//! sub-spans for its sub-operations.
//!
//! A span is mutable until [`Span::finish`] is called: tags can be set and
//! log entries appended, always by the single logical owner of the span.
//! Finishing stamps the end timestamp, freezes the span into a
//! [`FinishedSpan`] record, and hands that record to the owning tracer's
//! [`Recorder`](crate::trace::Recorder). Every mutation attempted after
//! that fails with [`TraceError::InvalidState`]; only the span's
//! [`TraceContext`] stays readable.
use crate::common::{Tag, TagValue};
use crate::trace::log::{LogEntry, LogLevel, PayloadValue};
use crate::trace::{TraceContext, TraceError, TraceResult, Tracer};
use std::collections::HashMap;
use std::time::SystemTime;

/// Single operation within a trace.
#[derive(Debug)]
pub struct Span {
    context: TraceContext,
    data: Option<SpanData>,
    tracer: Tracer,
}

/// The mutable state of an active span; taken on finish.
#[derive(Clone, Debug)]
struct SpanData {
    operation_name: String,
    start_time: SystemTime,
    tags: HashMap<String, String>,
    logs: Vec<LogEntry>,
}

impl Span {
    pub(crate) fn new(
        context: TraceContext,
        operation_name: String,
        tracer: Tracer,
        initial_tags: Vec<Tag>,
    ) -> Self {
        let mut tags = HashMap::with_capacity(initial_tags.len());
        for tag in initial_tags {
            tags.insert(tag.key, tag.value.to_string());
        }

        Span {
            context,
            data: Some(SpanData {
                operation_name,
                start_time: SystemTime::now(),
                tags,
                logs: Vec::new(),
            }),
            tracer,
        }
    }

    /// Operate on the mutable span data, or fail if the span has finished.
    fn with_data<T, F>(&mut self, operation: &'static str, f: F) -> TraceResult<T>
    where
        F: FnOnce(&mut SpanData) -> T,
    {
        self.data
            .as_mut()
            .map(f)
            .ok_or(TraceError::invalid_state(operation))
    }

    /// Creates and starts a child span.
    ///
    /// The child's context is derived from this span's context: same trace
    /// id, a fresh span id from the tracer's id generator, and this span's
    /// id as parent. Sampling flag and baggage are inherited unchanged. No
    /// parent state is mutated, so concurrent children of the same parent
    /// are fully independent.
    ///
    /// Fails with [`TraceError::InvalidState`] if this span has finished.
    pub fn start_child<N>(&self, operation_name: N) -> TraceResult<Span>
    where
        N: Into<String>,
    {
        self.start_child_with_tags(operation_name, Vec::new())
    }

    /// Like [`Span::start_child`], with initial tags.
    ///
    /// Tag values are coerced to their string representation here, the same
    /// rule as [`Span::set_tag`].
    pub fn start_child_with_tags<N, T>(&self, operation_name: N, tags: T) -> TraceResult<Span>
    where
        N: Into<String>,
        T: IntoIterator<Item = Tag>,
    {
        if self.data.is_none() {
            return Err(TraceError::invalid_state("start a child span"));
        }

        Ok(Span::new(
            self.context.derive_child(self.tracer.new_span_id()),
            operation_name.into(),
            self.tracer.clone(),
            tags.into_iter().collect(),
        ))
    }

    /// Adds a tag to the span, overwriting any existing value for the key.
    ///
    /// The value is coerced into its string representation at the moment of
    /// the call, so later mutation of whatever the value was derived from
    /// has no effect on the stored tag. Returns the span itself to allow
    /// chained calls:
    ///
    /// ```
    /// # use tracetree::trace::Tracer;
    /// # let tracer = Tracer::builder().build();
    /// let mut span = tracer.start_trace("checkout");
    /// span.set_tag("retries", 3)?.set_tag("peer.service", "billing")?;
    /// # Ok::<(), tracetree::trace::TraceError>(())
    /// ```
    ///
    /// Fails with [`TraceError::InvalidState`] if the span has finished.
    pub fn set_tag<K, V>(&mut self, key: K, value: V) -> TraceResult<&mut Self>
    where
        K: Into<String>,
        V: Into<TagValue>,
    {
        let rendered = value.into().to_string();
        self.with_data("set a tag", |data| {
            data.tags.insert(key.into(), rendered);
        })?;
        Ok(self)
    }

    /// Appends an info-level log entry.
    ///
    /// `message` is a template that can refer to fields in the payload by
    /// path, like so:
    ///
    /// ```text
    /// "first transaction is worth ${transactions[0].amount} ${transactions[0].currency}"
    /// ```
    ///
    /// Placeholders are resolved against `payload` at the moment of the
    /// call; a path that does not resolve is replaced with an explicit
    /// missing marker and the call still succeeds.
    ///
    /// Fails with [`TraceError::InvalidState`] if the span has finished.
    pub fn info<M, P>(&mut self, message: M, payload: P) -> TraceResult<()>
    where
        M: Into<String>,
        P: Into<PayloadValue>,
    {
        self.log(LogLevel::Info, message.into(), payload.into())
    }

    /// Like [`Span::info`], but for errors.
    pub fn error<M, P>(&mut self, message: M, payload: P) -> TraceResult<()>
    where
        M: Into<String>,
        P: Into<PayloadValue>,
    {
        self.log(LogLevel::Error, message.into(), payload.into())
    }

    fn log(&mut self, level: LogLevel, template: String, payload: PayloadValue) -> TraceResult<()> {
        self.with_data("append a log entry", |data| {
            data.logs.push(LogEntry::new(level, template, payload));
        })
    }

    /// Sets the end timestamp and hands the frozen span to the tracer's
    /// recorder.
    ///
    /// The hand-off only enqueues with the recorder and does not wait for
    /// durability. After this call every mutation fails with
    /// [`TraceError::InvalidState`], as does a second `finish` call; only
    /// [`Span::trace_context`] remains valid.
    pub fn finish(&mut self) -> TraceResult<()> {
        let data = self
            .data
            .take()
            .ok_or(TraceError::invalid_state("finish"))?;

        self.tracer.record(FinishedSpan {
            context: self.context.clone(),
            operation_name: data.operation_name,
            tags: data.tags,
            logs: data.logs,
            start_time: data.start_time,
            end_time: SystemTime::now(),
        });
        Ok(())
    }

    /// Returns the span's [`TraceContext`], suitable for serializing over
    /// the wire. Always valid, even after the span has finished.
    pub fn trace_context(&self) -> &TraceContext {
        &self.context
    }

    /// Returns `true` until the span has finished.
    pub fn is_active(&self) -> bool {
        self.data.is_some()
    }
}

/// A finished span's frozen record, as delivered to a
/// [`Recorder`](crate::trace::Recorder).
#[derive(Clone, Debug)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct FinishedSpan {
    /// The span's trace context.
    pub context: TraceContext,
    /// The operation name set at creation.
    pub operation_name: String,
    /// Span tags, values coerced to strings at set time.
    pub tags: HashMap<String, String>,
    /// Span log entries, in append order.
    pub logs: Vec<LogEntry>,
    /// The instant the span was started.
    pub start_time: SystemTime,
    /// The instant the span was finished.
    pub end_time: SystemTime,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trace::{InMemoryRecorder, LogLevel, Tracer};

    fn test_tracer() -> (Tracer, InMemoryRecorder) {
        let recorder = InMemoryRecorder::new();
        let tracer = Tracer::builder().with_recorder(recorder.clone()).build();
        (tracer, recorder)
    }

    #[test]
    fn set_tag_coerces_and_overwrites() {
        let (tracer, recorder) = test_tracer();
        let mut span = tracer.start_trace("op");

        span.set_tag("retries", 3).unwrap();
        span.set_tag("flaky", true).unwrap().set_tag("retries", 4).unwrap();
        span.finish().unwrap();

        let finished = recorder.finished_spans().unwrap().remove(0);
        assert_eq!(finished.tags.get("retries"), Some(&"4".to_string()));
        assert_eq!(finished.tags.get("flaky"), Some(&"true".to_string()));
    }

    #[test]
    fn initial_tags_follow_set_tag_coercion() {
        let (tracer, recorder) = test_tracer();
        let span = tracer.start_trace("parent");
        let mut child = span
            .start_child_with_tags("child", vec![Tag::new("attempt", 1), Tag::new("db", "users")])
            .unwrap();
        child.finish().unwrap();

        let finished = recorder.finished_spans().unwrap().remove(0);
        assert_eq!(finished.tags.get("attempt"), Some(&"1".to_string()));
        assert_eq!(finished.tags.get("db"), Some(&"users".to_string()));
    }

    #[test]
    fn log_entries_are_appended_in_order() {
        let (tracer, recorder) = test_tracer();
        let mut span = tracer.start_trace("op");

        let mut payload = HashMap::new();
        payload.insert("count", 42i64);
        span.info("fetched ${count} rows", payload).unwrap();
        span.error("boom", ()).unwrap();
        span.finish().unwrap();

        let finished = recorder.finished_spans().unwrap().remove(0);
        assert_eq!(finished.logs.len(), 2);
        assert_eq!(finished.logs[0].message, "fetched 42 rows");
        assert_eq!(finished.logs[0].level, LogLevel::Info);
        assert_eq!(finished.logs[1].message, "boom");
        assert_eq!(finished.logs[1].level, LogLevel::Error);
    }

    #[test]
    fn mutation_after_finish_is_rejected() {
        let (tracer, _recorder) = test_tracer();
        let mut span = tracer.start_trace("op");
        span.finish().unwrap();

        assert!(matches!(
            span.set_tag("k", "v"),
            Err(TraceError::InvalidState { .. })
        ));
        assert!(matches!(
            span.info("msg", ()),
            Err(TraceError::InvalidState { .. })
        ));
        assert!(matches!(
            span.error("msg", ()),
            Err(TraceError::InvalidState { .. })
        ));
        assert!(matches!(
            span.start_child("child"),
            Err(TraceError::InvalidState { .. })
        ));
    }

    #[test]
    fn second_finish_is_rejected_and_records_once() {
        let (tracer, recorder) = test_tracer();
        let mut span = tracer.start_trace("op");

        span.finish().unwrap();
        assert!(matches!(
            span.finish(),
            Err(TraceError::InvalidState { .. })
        ));
        assert_eq!(recorder.finished_spans().unwrap().len(), 1);
    }

    #[test]
    fn trace_context_readable_after_finish() {
        let (tracer, _recorder) = test_tracer();
        let mut span = tracer.start_trace("op");
        let context = span.trace_context().clone();
        span.finish().unwrap();

        assert_eq!(span.trace_context(), &context);
        assert!(!span.is_active());
    }

    #[test]
    fn finish_stamps_end_after_start() {
        let (tracer, recorder) = test_tracer();
        let mut span = tracer.start_trace("op");
        std::thread::sleep(std::time::Duration::from_millis(2));
        span.finish().unwrap();

        let finished = recorder.finished_spans().unwrap().remove(0);
        assert!(finished.end_time > finished.start_time);
    }
}
