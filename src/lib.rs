//! Causal span-tree instrumentation core for distributed tracing.
//!
//! `tracetree` models the hard part of tracing instrumentation: a
//! causally-linked tree of [`Span`]s representing units of work across
//! process and network boundaries, plus the immutable [`TraceContext`] that
//! lets that causal link survive serialization and cross-process
//! propagation.
//!
//! The crate deliberately stops at the instrumentation boundary. Finished
//! spans are handed to a pluggable [`Recorder`]; the sampling decision
//! algorithm is a pluggable [`Sampler`] hook and the core only carries the
//! resulting flag; and the request-scoped [`Context`] carrier is an
//! explicit, immutable value passed down the call chain, never a global
//! registry of in-flight spans.
//!
//! # Getting started
//!
//! ```
//! use tracetree::trace::{InMemoryRecorder, Tracer};
//!
//! let recorder = InMemoryRecorder::default();
//! let tracer = Tracer::builder().with_recorder(recorder.clone()).build();
//!
//! let mut span = tracer.start_trace("handle-request");
//! let mut child = span.start_child("db-query")?;
//! child.set_tag("db.instance", "users")?;
//! child.finish()?;
//! span.finish()?;
//!
//! let finished = recorder.finished_spans()?;
//! assert_eq!(finished.len(), 2);
//! assert_eq!(
//!     finished[0].context.parent_span_id(),
//!     Some(finished[1].context.span_id()),
//! );
//! # Ok::<(), tracetree::trace::TraceError>(())
//! ```
//!
//! See the [`trace`] module for span lifecycle and cross-process examples,
//! and [`propagation`] for the wire binding.
#![warn(
    future_incompatible,
    missing_debug_implementations,
    missing_docs,
    nonstandard_style,
    rust_2018_idioms,
    unreachable_pub,
    unused
)]
#![cfg_attr(docsrs, feature(doc_cfg))]

pub mod baggage;
mod common;
mod context;
pub mod propagation;
pub mod trace;

pub use common::{Tag, TagValue};
pub use context::{Context, ContextGuard, FutureExt, WithContext};
