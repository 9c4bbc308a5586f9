//! Sampling policy hook.
//!
//! The core only carries a trace's sampled/not-sampled flag; the decision
//! algorithm itself is external. A [`Sampler`] is consulted exactly once,
//! when a root span is created, and the decision is inherited unchanged by
//! every descendant span.
use crate::trace::TraceId;
use std::fmt;

/// The interface for deciding whether a new trace is sampled.
pub trait Sampler: Send + Sync + fmt::Debug {
    /// Decide the sampling flag for a trace rooted at `operation_name`.
    fn should_sample(&self, trace_id: TraceId, operation_name: &str) -> bool;
}

/// [`Sampler`] that samples every trace.
#[derive(Clone, Debug, Default)]
pub struct AlwaysSample;

impl Sampler for AlwaysSample {
    fn should_sample(&self, _trace_id: TraceId, _operation_name: &str) -> bool {
        true
    }
}

/// [`Sampler`] that samples no traces.
#[derive(Clone, Debug, Default)]
pub struct NeverSample;

impl Sampler for NeverSample {
    fn should_sample(&self, _trace_id: TraceId, _operation_name: &str) -> bool {
        false
    }
}
