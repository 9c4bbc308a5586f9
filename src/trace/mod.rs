//! The `trace` module includes types for tracking the progression of a single
//! request while it is handled by services that make up an application. A
//! trace is a tree of [`Span`]s which represent the work being done by
//! individual services or components involved in a request as it flows
//! through a system.
//!
//! ## Getting Started
//!
//! ```
//! use tracetree::trace::{InMemoryRecorder, Tracer};
//!
//! let recorder = InMemoryRecorder::default();
//! let tracer = Tracer::builder().with_recorder(recorder.clone()).build();
//!
//! let mut span = tracer.start_trace("handle-request");
//! span.set_tag("peer.service", "billing")?;
//!
//! let mut child = span.start_child("db-query")?;
//! let mut payload = std::collections::HashMap::new();
//! payload.insert("count", 42i64);
//! child.info("fetched ${count} rows", payload)?;
//! child.finish()?;
//!
//! span.finish()?;
//! assert_eq!(recorder.finished_spans()?.len(), 2);
//! # Ok::<(), tracetree::trace::TraceError>(())
//! ```
//!
//! ## Overview
//!
//! * [`Tracer`]s create root spans, derive child spans from propagated
//!   contexts, and own the configured [`Recorder`].
//! * [`Span`]s are mutable until finished, then frozen into a
//!   [`FinishedSpan`] record and handed to the recorder.
//! * [`TraceContext`]s are the immutable values that survive serialization
//!   and link spans across process boundaries.
//!
//! ## Cross-process traces
//!
//! A span's context can be injected into any text-map carrier and
//! reconstructed on the remote side:
//!
//! ```
//! use std::collections::HashMap;
//! use tracetree::propagation::{TextMapPropagator, TraceContextPropagator};
//! use tracetree::trace::Tracer;
//!
//! let tracer = Tracer::builder().build();
//! let propagator = TraceContextPropagator::new();
//!
//! let span = tracer.start_trace("client-call");
//! let mut headers: HashMap<String, String> = HashMap::new();
//! propagator.inject(span.trace_context(), &mut headers);
//!
//! // ... on the remote side ...
//! let decoded = propagator.extract(&headers)?;
//! let server_span = tracer.start_child_from_context(&decoded, "server-handle")?;
//! assert_eq!(server_span.trace_context().trace_id(), span.trace_context().trace_id());
//! # Ok::<(), tracetree::trace::TraceError>(())
//! ```

use thiserror::Error;

mod id_generator;
mod ids;
mod log;
mod recorder;
mod sampler;
mod span;
pub(crate) mod span_ref;
mod trace_context;
mod tracer;

pub use self::{
    id_generator::{IdGenerator, IncrementIdGenerator, RandomIdGenerator},
    ids::{SpanId, TraceId},
    log::{LogEntry, LogLevel, PayloadValue},
    recorder::{ChannelRecorder, InMemoryRecorder, NoopRecorder, Recorder},
    sampler::{AlwaysSample, NeverSample, Sampler},
    span::{FinishedSpan, Span},
    span_ref::{get_active_span, mark_span_as_active, SpanRef, TraceContextExt},
    trace_context::TraceContext,
    tracer::{SpanBuilder, Tracer, TracerBuilder},
};

/// Describe the result of operations in the tracing API.
pub type TraceResult<T> = Result<T, TraceError>;

/// Errors returned by the trace API.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum TraceError {
    /// A mutation was attempted on a span that has already finished.
    #[error("span is already finished, cannot {operation}")]
    InvalidState {
        /// The operation that was rejected.
        operation: &'static str,
    },

    /// A propagated trace context was corrupt or incomplete.
    #[error("malformed trace context: {0}")]
    MalformedContext(String),

    /// Other errors not covered above.
    #[error(transparent)]
    Other(#[from] Box<dyn std::error::Error + Send + Sync + 'static>),
}

impl TraceError {
    pub(crate) fn invalid_state(operation: &'static str) -> Self {
        TraceError::InvalidState { operation }
    }
}

impl From<String> for TraceError {
    fn from(err_msg: String) -> Self {
        TraceError::Other(Box::new(Custom(err_msg)))
    }
}

impl From<&'static str> for TraceError {
    fn from(err_msg: &'static str) -> Self {
        TraceError::Other(Box::new(Custom(err_msg.into())))
    }
}

/// Wrap type for string
#[derive(Error, Debug)]
#[error("{0}")]
struct Custom(String);
