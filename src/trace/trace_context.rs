use crate::baggage::Baggage;
use crate::trace::{SpanId, TraceId, TraceResult};

/// Immutable portion of a [`Span`] which can be serialized and propagated.
///
/// A `TraceContext` identifies a span's position in a distributed trace: the
/// trace it belongs to, its own id, the id of the span it was derived from,
/// the trace's sampling decision, and the [`Baggage`] propagated to the
/// whole subtree below it.
///
/// Contexts are pure values. Derivation reads the parent without locking,
/// and baggage extension is copy-on-write, so contexts can be shared freely
/// across threads and process boundaries.
///
/// [`Span`]: crate::trace::Span
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct TraceContext {
    trace_id: TraceId,
    span_id: SpanId,
    parent_span_id: Option<SpanId>,
    sampled: bool,
    baggage: Baggage,
}

impl TraceContext {
    /// An invalid trace context
    pub const NONE: TraceContext = TraceContext {
        trace_id: TraceId::INVALID,
        span_id: SpanId::INVALID,
        parent_span_id: None,
        sampled: false,
        baggage: Baggage::EMPTY,
    };

    /// Construct a new `TraceContext`
    pub fn new(
        trace_id: TraceId,
        span_id: SpanId,
        parent_span_id: Option<SpanId>,
        sampled: bool,
        baggage: Baggage,
    ) -> Self {
        TraceContext {
            trace_id,
            span_id,
            parent_span_id,
            sampled,
            baggage,
        }
    }

    /// Construct the context of a new root span.
    ///
    /// Root contexts have no parent and start with empty baggage; the
    /// sampling decision is fixed here for the whole trace.
    pub fn root(trace_id: TraceId, span_id: SpanId, sampled: bool) -> Self {
        TraceContext {
            trace_id,
            span_id,
            parent_span_id: None,
            sampled,
            baggage: Baggage::EMPTY,
        }
    }

    /// Derive the context of a child span.
    ///
    /// The child shares this context's trace id, records this context's span
    /// id as its parent, and inherits the sampling decision and baggage
    /// unchanged. Only immutable state is read, so concurrent children of
    /// the same parent need no synchronization.
    pub fn derive_child(&self, child_span_id: SpanId) -> Self {
        TraceContext {
            trace_id: self.trace_id,
            span_id: child_span_id,
            parent_span_id: Some(self.span_id),
            sampled: self.sampled,
            baggage: self.baggage.clone(),
        }
    }

    /// Returns a copy of this context with its baggage extended by the given
    /// key-value pair.
    ///
    /// This context's own baggage mapping is never mutated in place; spans
    /// already derived from it keep the baggage they inherited.
    pub fn with_baggage_item<K, V>(&self, key: K, value: V) -> TraceResult<Self>
    where
        K: Into<String>,
        V: Into<String>,
    {
        let baggage = self.baggage.insert(key, value)?;
        Ok(TraceContext {
            baggage,
            ..self.clone()
        })
    }

    /// The [`TraceId`] shared by every span in this trace.
    pub fn trace_id(&self) -> TraceId {
        self.trace_id
    }

    /// The [`SpanId`] unique to this span within the trace.
    pub fn span_id(&self) -> SpanId {
        self.span_id
    }

    /// The id of the span this context was derived from, absent for roots.
    pub fn parent_span_id(&self) -> Option<SpanId> {
        self.parent_span_id
    }

    /// Returns `true` if the trace's spans are recorded.
    ///
    /// The decision is made at root creation and inherited unchanged by
    /// every descendant.
    pub fn is_sampled(&self) -> bool {
        self.sampled
    }

    /// A reference to the context's [`Baggage`].
    pub fn baggage(&self) -> &Baggage {
        &self.baggage
    }

    /// Returns `true` if the context has a valid (non-zero) `trace_id` and a
    /// valid (non-zero) `span_id`.
    pub fn is_valid(&self) -> bool {
        self.trace_id != TraceId::INVALID && self.span_id != SpanId::INVALID
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parent() -> TraceContext {
        TraceContext::root(TraceId::from(0x4d16), SpanId::from(0x17c2), true)
    }

    #[test]
    fn derive_child_links_causally() {
        let parent = parent();
        let child = parent.derive_child(SpanId::from(0x99));

        assert_eq!(child.trace_id(), parent.trace_id());
        assert_eq!(child.parent_span_id(), Some(parent.span_id()));
        assert_ne!(child.span_id(), parent.span_id());
        assert_eq!(child.is_sampled(), parent.is_sampled());
        assert_eq!(child.baggage(), parent.baggage());
    }

    #[test]
    fn baggage_merge_is_copy_on_write() {
        let parent = parent();
        let extended = parent.with_baggage_item("tenant", "acme").unwrap();

        assert!(parent.baggage().is_empty());
        assert_eq!(extended.baggage().get("tenant"), Some("acme"));
        assert_eq!(extended.span_id(), parent.span_id());

        let child = extended.derive_child(SpanId::from(0x99));
        assert_eq!(child.baggage().get("tenant"), Some("acme"));
    }

    #[test]
    fn validity_requires_both_ids() {
        assert!(!TraceContext::NONE.is_valid());
        assert!(!TraceContext::root(TraceId::INVALID, SpanId::from(1), false).is_valid());
        assert!(!TraceContext::root(TraceId::from(1), SpanId::INVALID, false).is_valid());
        assert!(parent().is_valid());
    }
}
