//! The sink that accepts finished spans.
//!
//! The core hands every finished span to exactly one [`Recorder`], chosen
//! when the [`Tracer`](crate::trace::Tracer) is built. Transport, batching,
//! and retry/drop policy all live behind this trait; the implementations in
//! this module cover testing ([`InMemoryRecorder`]), discarding
//! ([`NoopRecorder`]), and handing spans to a consumer thread
//! ([`ChannelRecorder`]).
use crate::trace::{FinishedSpan, TraceResult};
use std::fmt;
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex};

/// The sink side of the span lifecycle.
///
/// `record_span` is called on the instrumented code path and MUST NOT block
/// the caller indefinitely; an asynchronous recorder only needs to enqueue.
/// Failure handling is the recorder's own concern and invisible to the core.
pub trait Recorder: Send + Sync + fmt::Debug {
    /// Accept a finished span's frozen record.
    fn record_span(&self, span: FinishedSpan);

    /// Flush and release any resources held by the recorder.
    ///
    /// Called by [`Tracer::shutdown`](crate::trace::Tracer::shutdown) at
    /// process teardown; flushing outstanding spans is the recorder's
    /// responsibility, not the tracer's.
    fn shutdown(&self) {}
}

/// A [`Recorder`] that discards every span.
#[derive(Clone, Debug, Default)]
pub struct NoopRecorder {
    _private: (),
}

impl NoopRecorder {
    /// Create a new recorder that drops all spans.
    pub fn new() -> Self {
        NoopRecorder { _private: () }
    }
}

impl Recorder for NoopRecorder {
    fn record_span(&self, _span: FinishedSpan) {}
}

/// A [`Recorder`] that stores finished spans in memory.
///
/// Useful for testing and debugging: clones share the same storage, so a
/// clone kept by the test can read back what the tracer recorded.
///
/// # Example
/// ```
/// use tracetree::trace::{InMemoryRecorder, Tracer};
///
/// let recorder = InMemoryRecorder::default();
/// let tracer = Tracer::builder().with_recorder(recorder.clone()).build();
///
/// tracer.start_trace("say hello").finish()?;
///
/// let spans = recorder.finished_spans()?;
/// assert_eq!(spans.len(), 1);
/// assert_eq!(spans[0].operation_name, "say hello");
/// # Ok::<(), tracetree::trace::TraceError>(())
/// ```
#[derive(Clone, Debug, Default)]
pub struct InMemoryRecorder {
    spans: Arc<Mutex<Vec<FinishedSpan>>>,
}

impl InMemoryRecorder {
    /// Create a new recorder with empty storage.
    pub fn new() -> Self {
        InMemoryRecorder::default()
    }

    /// Returns the finished spans recorded so far.
    ///
    /// # Errors
    ///
    /// Returns an error if the internal lock cannot be acquired.
    pub fn finished_spans(&self) -> TraceResult<Vec<FinishedSpan>> {
        self.spans
            .lock()
            .map(|spans_guard| spans_guard.iter().cloned().collect())
            .map_err(|_| "in-memory recorder lock poisoned".into())
    }

    /// Clears the internal storage of finished spans.
    pub fn reset(&self) {
        let _ = self.spans.lock().map(|mut spans_guard| spans_guard.clear());
    }
}

impl Recorder for InMemoryRecorder {
    fn record_span(&self, span: FinishedSpan) {
        match self.spans.lock() {
            Ok(mut spans_guard) => spans_guard.push(span),
            Err(_) => tracing::warn!("in-memory recorder lock poisoned; span discarded"),
        }
    }

    fn shutdown(&self) {
        self.reset();
    }
}

/// A [`Recorder`] that forwards finished spans over an unbounded channel.
///
/// `record_span` only enqueues and never blocks, so finishing a span stays
/// off the caller's critical path; the receiving side drains the channel on
/// its own schedule (a writer thread, a batcher).
#[derive(Clone, Debug)]
pub struct ChannelRecorder {
    sender: Sender<FinishedSpan>,
}

impl ChannelRecorder {
    /// Create a recorder and the receiver that drains it.
    pub fn new() -> (Self, Receiver<FinishedSpan>) {
        let (sender, receiver) = mpsc::channel();
        (ChannelRecorder { sender }, receiver)
    }
}

impl Recorder for ChannelRecorder {
    fn record_span(&self, span: FinishedSpan) {
        if self.sender.send(span).is_err() {
            tracing::debug!("span receiver dropped; span discarded");
        }
    }
}
