//! # Tracer
//!
//! The `Tracer` is the factory and root authority of a trace tree: it
//! creates root spans, reconstructs child spans from propagated contexts,
//! and owns the configured [`Recorder`]. One tracer is built at service
//! startup and handed (cheaply cloned) into the call paths that instrument
//! work; nothing about it is mutable after construction, so spans on many
//! threads read it without locking.
use crate::common::Tag;
use crate::trace::id_generator::{IdGenerator, RandomIdGenerator};
use crate::trace::recorder::{NoopRecorder, Recorder};
use crate::trace::sampler::{AlwaysSample, Sampler};
use crate::trace::{FinishedSpan, Span, SpanId, TraceContext, TraceError, TraceResult};
use std::fmt;
use std::sync::Arc;

/// `Tracer` implementation to create and manage spans
#[derive(Clone)]
pub struct Tracer {
    inner: Arc<TracerInner>,
}

#[derive(Debug)]
struct TracerInner {
    recorder: Box<dyn Recorder>,
    sampler: Box<dyn Sampler>,
    id_generator: Box<dyn IdGenerator>,
}

impl fmt::Debug for Tracer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tracer")
            .field("recorder", &self.inner.recorder)
            .field("sampler", &self.inner.sampler)
            .finish()
    }
}

impl Tracer {
    /// Start building a `Tracer`.
    pub fn builder() -> TracerBuilder {
        TracerBuilder::default()
    }

    /// Starts a new trace rooted at `operation_name`.
    ///
    /// Always succeeds. The root context gets fresh trace and span ids, no
    /// parent, empty baggage, and the sampling flag decided by the
    /// configured [`Sampler`] hook.
    pub fn start_trace<N>(&self, operation_name: N) -> Span
    where
        N: Into<String>,
    {
        self.span_builder(operation_name).start(self)
    }

    /// Returns a [`SpanBuilder`] for a root span with initial tags or an
    /// explicit sampling override.
    pub fn span_builder<N>(&self, operation_name: N) -> SpanBuilder
    where
        N: Into<String>,
    {
        SpanBuilder::from_name(operation_name)
    }

    /// Reconstructs a child span from a context propagated by a remote
    /// parent.
    ///
    /// The decoded context must be well-formed (non-zero trace and span
    /// ids); otherwise this fails with [`TraceError::MalformedContext`] and
    /// no span is created. On success the new span's context is derived
    /// from the decoded one exactly as for an in-process child.
    pub fn start_child_from_context<N>(
        &self,
        parent: &TraceContext,
        operation_name: N,
    ) -> TraceResult<Span>
    where
        N: Into<String>,
    {
        self.start_child_from_context_with_tags(parent, operation_name, Vec::new())
    }

    /// Like [`Tracer::start_child_from_context`], with initial tags.
    pub fn start_child_from_context_with_tags<N, T>(
        &self,
        parent: &TraceContext,
        operation_name: N,
        tags: T,
    ) -> TraceResult<Span>
    where
        N: Into<String>,
        T: IntoIterator<Item = Tag>,
    {
        if !parent.is_valid() {
            return Err(TraceError::MalformedContext(format!(
                "trace id and span id must be non-zero, got {}:{}",
                parent.trace_id(),
                parent.span_id()
            )));
        }

        Ok(Span::new(
            parent.derive_child(self.new_span_id()),
            operation_name.into(),
            self.clone(),
            tags.into_iter().collect(),
        ))
    }

    /// Tear down the tracer, delegating any flushing to the recorder.
    pub fn shutdown(&self) {
        self.inner.recorder.shutdown()
    }

    pub(crate) fn new_span_id(&self) -> SpanId {
        self.inner.id_generator.new_span_id()
    }

    /// Hand a frozen span to the recorder. Enqueue-only from the span's
    /// point of view; durability is the recorder's concern.
    pub(crate) fn record(&self, span: FinishedSpan) {
        self.inner.recorder.record_span(span)
    }
}

/// Configuration for a new [`Tracer`].
///
/// The recorder, sampler, and id generator are fixed at [`build`] and
/// immutable for the tracer's lifetime, so spans can never silently migrate
/// between sinks mid-trace.
///
/// [`build`]: TracerBuilder::build
#[derive(Debug, Default)]
pub struct TracerBuilder {
    recorder: Option<Box<dyn Recorder>>,
    sampler: Option<Box<dyn Sampler>>,
    id_generator: Option<Box<dyn IdGenerator>>,
}

impl TracerBuilder {
    /// The recorder that accepts finished spans. Defaults to
    /// [`NoopRecorder`].
    pub fn with_recorder<R: Recorder + 'static>(mut self, recorder: R) -> Self {
        self.recorder = Some(Box::new(recorder));
        self
    }

    /// The sampling policy hook consulted at root creation. Defaults to
    /// [`AlwaysSample`].
    pub fn with_sampler<S: Sampler + 'static>(mut self, sampler: S) -> Self {
        self.sampler = Some(Box::new(sampler));
        self
    }

    /// The id generator for new trace and span ids. Defaults to
    /// [`RandomIdGenerator`].
    pub fn with_id_generator<G: IdGenerator + 'static>(mut self, id_generator: G) -> Self {
        self.id_generator = Some(Box::new(id_generator));
        self
    }

    /// Build the configured `Tracer`.
    pub fn build(self) -> Tracer {
        Tracer {
            inner: Arc::new(TracerInner {
                recorder: self.recorder.unwrap_or_else(|| Box::new(NoopRecorder::new())),
                sampler: self.sampler.unwrap_or_else(|| Box::new(AlwaysSample)),
                id_generator: self
                    .id_generator
                    .unwrap_or_else(|| Box::new(RandomIdGenerator::default())),
            }),
        }
    }
}

/// Entry for creating a root [`Span`] with more than an operation name.
#[derive(Clone, Debug, Default)]
pub struct SpanBuilder {
    /// The root span's operation name.
    pub operation_name: String,
    /// Initial tags, coerced like [`Span::set_tag`] at start.
    pub tags: Vec<Tag>,
    /// Explicit sampling decision, overriding the tracer's sampler hook.
    pub sampled: Option<bool>,
}

impl SpanBuilder {
    /// Create a builder from an operation name.
    pub fn from_name<N: Into<String>>(operation_name: N) -> Self {
        SpanBuilder {
            operation_name: operation_name.into(),
            tags: Vec::new(),
            sampled: None,
        }
    }

    /// Add an initial tag.
    pub fn with_tag<K, V>(mut self, key: K, value: V) -> Self
    where
        K: Into<String>,
        V: Into<crate::common::TagValue>,
    {
        self.tags.push(Tag::new(key, value));
        self
    }

    /// Add initial tags.
    pub fn with_tags<T: IntoIterator<Item = Tag>>(mut self, tags: T) -> Self {
        self.tags.extend(tags);
        self
    }

    /// Fix the sampling decision instead of consulting the tracer's sampler.
    pub fn with_sampled(mut self, sampled: bool) -> Self {
        self.sampled = Some(sampled);
        self
    }

    /// Starts a new root span from this builder.
    pub fn start(self, tracer: &Tracer) -> Span {
        let trace_id = tracer.inner.id_generator.new_trace_id();
        let span_id = tracer.inner.id_generator.new_span_id();
        let sampled = self.sampled.unwrap_or_else(|| {
            tracer
                .inner
                .sampler
                .should_sample(trace_id, &self.operation_name)
        });

        Span::new(
            TraceContext::root(trace_id, span_id, sampled),
            self.operation_name,
            tracer.clone(),
            self.tags,
        )
    }
}
