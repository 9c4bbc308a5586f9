//! Context extensions for tracing
//!
//! The glue between [`Span`]s and the ambient [`Context`] carrier: a span
//! can be stored into a context (copy-on-write, the original context is
//! untouched) and retrieved by nested calls through a [`SpanRef`], which
//! serializes access to the shared span behind a lock.
use crate::common::TagValue;
use crate::trace::log::PayloadValue;
use crate::trace::{Span, TraceContext, TraceResult};
use crate::{Context, ContextGuard};
use std::sync::Mutex;

/// A [`Span`] parked in a [`Context`], locked for shared access.
///
/// The trace context is copied out at attach time so it stays readable
/// without taking the lock.
#[derive(Debug)]
pub(crate) struct ActiveSpan {
    context: TraceContext,
    inner: Mutex<Span>,
}

impl From<Span> for ActiveSpan {
    fn from(span: Span) -> Self {
        ActiveSpan {
            context: span.trace_context().clone(),
            inner: Mutex::new(span),
        }
    }
}

/// A reference to the active span in a [`Context`].
#[derive(Debug)]
pub struct SpanRef<'a>(&'a ActiveSpan);

impl SpanRef<'_> {
    fn with_inner_mut<T, F>(&self, f: F) -> TraceResult<T>
    where
        F: FnOnce(&mut Span) -> TraceResult<T>,
    {
        match self.0.inner.lock() {
            Ok(mut span) => f(&mut span),
            Err(_) => Err("active span lock poisoned".into()),
        }
    }

    /// The span's [`TraceContext`], readable without locking.
    pub fn trace_context(&self) -> &TraceContext {
        &self.0.context
    }

    /// Adds a tag to the underlying span, see [`Span::set_tag`].
    pub fn set_tag<K, V>(&self, key: K, value: V) -> TraceResult<()>
    where
        K: Into<String>,
        V: Into<TagValue>,
    {
        self.with_inner_mut(|span| span.set_tag(key, value).map(|_| ()))
    }

    /// Appends an info-level log entry, see [`Span::info`].
    pub fn info<M, P>(&self, message: M, payload: P) -> TraceResult<()>
    where
        M: Into<String>,
        P: Into<PayloadValue>,
    {
        self.with_inner_mut(|span| span.info(message, payload))
    }

    /// Appends an error-level log entry, see [`Span::error`].
    pub fn error<M, P>(&self, message: M, payload: P) -> TraceResult<()>
    where
        M: Into<String>,
        P: Into<PayloadValue>,
    {
        self.with_inner_mut(|span| span.error(message, payload))
    }

    /// Creates and starts a child of the underlying span, see
    /// [`Span::start_child`].
    pub fn start_child<N>(&self, operation_name: N) -> TraceResult<Span>
    where
        N: Into<String>,
    {
        self.with_inner_mut(|span| span.start_child(operation_name))
    }

    /// Finishes the underlying span, see [`Span::finish`].
    pub fn finish(&self) -> TraceResult<()> {
        self.with_inner_mut(|span| span.finish())
    }
}

/// Methods for storing and retrieving the active span in a [`Context`].
pub trait TraceContextExt {
    /// Returns a clone of the current thread's context with the included
    /// span.
    ///
    /// This is a more efficient form of
    /// `Context::current().with_span(span)` as it avoids the intermediate
    /// context clone.
    fn current_with_span(span: Span) -> Self;

    /// Returns a clone of this context with the included span.
    ///
    /// The original context is not mutated; callers below the attach point
    /// that hold the old context keep seeing the old (or no) span.
    fn with_span(&self, span: Span) -> Self;

    /// Returns a reference to this context's active span, if there is one.
    fn span(&self) -> Option<SpanRef<'_>>;

    /// Returns whether a span has been attached to this context.
    fn has_active_span(&self) -> bool;
}

impl TraceContextExt for Context {
    fn current_with_span(span: Span) -> Self {
        Context::current_with_active_span(span.into())
    }

    fn with_span(&self, span: Span) -> Self {
        self.with_active_span(span.into())
    }

    fn span(&self) -> Option<SpanRef<'_>> {
        self.span.as_deref().map(SpanRef)
    }

    fn has_active_span(&self) -> bool {
        self.span.is_some()
    }
}

/// Mark a given `Span` as active for the duration of the returned guard.
///
/// Nested calls on this thread can then reach the span through
/// [`get_active_span`] without it being threaded through as a parameter.
pub fn mark_span_as_active(span: Span) -> ContextGuard {
    let cx = Context::current_with_span(span);
    cx.attach()
}

/// Executes a closure with a reference to this thread's current span.
///
/// Returns `None` without running the closure if no span is active.
pub fn get_active_span<F, T>(f: F) -> Option<T>
where
    F: FnOnce(SpanRef<'_>) -> T,
{
    Context::map_current(|cx| cx.span().map(f))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trace::{InMemoryRecorder, TraceError, Tracer};

    fn test_tracer() -> (Tracer, InMemoryRecorder) {
        let recorder = InMemoryRecorder::new();
        let tracer = Tracer::builder().with_recorder(recorder.clone()).build();
        (tracer, recorder)
    }

    #[test]
    fn with_span_does_not_mutate_original() {
        let (tracer, _) = test_tracer();
        let cx = Context::new();
        let cx_with_span = cx.with_span(tracer.start_trace("op"));

        assert!(!cx.has_active_span());
        assert!(cx_with_span.has_active_span());
    }

    #[test]
    fn span_is_reachable_through_context() {
        let (tracer, recorder) = test_tracer();
        let span = tracer.start_trace("op");
        let context = span.trace_context().clone();
        let cx = Context::new().with_span(span);

        let span_ref = cx.span().unwrap();
        assert_eq!(span_ref.trace_context(), &context);
        span_ref.set_tag("retries", 3).unwrap();
        span_ref.finish().unwrap();

        let finished = recorder.finished_spans().unwrap().remove(0);
        assert_eq!(finished.tags.get("retries"), Some(&"3".to_string()));
    }

    #[test]
    fn finished_span_in_context_rejects_mutation() {
        let (tracer, _) = test_tracer();
        let cx = Context::new().with_span(tracer.start_trace("op"));

        cx.span().unwrap().finish().unwrap();
        assert!(matches!(
            cx.span().unwrap().set_tag("k", "v"),
            Err(TraceError::InvalidState { .. })
        ));
        // context still exposes the frozen span's trace context
        assert!(cx.span().unwrap().trace_context().is_valid());
    }

    #[test]
    fn active_span_helpers_scope_to_guard() {
        let (tracer, _) = test_tracer();

        assert!(get_active_span(|_| ()).is_none());
        {
            let _guard = mark_span_as_active(tracer.start_trace("op"));
            let trace_id = get_active_span(|span| span.trace_context().trace_id());
            assert!(trace_id.is_some());

            let child = get_active_span(|span| span.start_child("child"))
                .unwrap()
                .unwrap();
            assert_eq!(
                Some(child.trace_context().trace_id()),
                trace_id
            );
        }
        assert!(get_active_span(|_| ()).is_none());
    }
}
