use crate::baggage::Baggage;
use crate::propagation::{Extractor, Injector};
use crate::trace::{SpanId, TraceContext, TraceError, TraceId, TraceResult};
use std::fmt;

const CONTEXT_HEADER: &str = "trace-context";
const BAGGAGE_HEADER: &str = "trace-baggage";
const NO_PARENT: &str = "0";

/// Methods to inject and extract a [`TraceContext`] through a text-map
/// carrier.
///
/// Implementations must uphold the round-trip law: extracting what was
/// injected yields a context equal to the original in every field.
pub trait TextMapPropagator: fmt::Debug {
    /// Encode the given context into the carrier behind `injector`.
    fn inject(&self, context: &TraceContext, injector: &mut dyn Injector);

    /// Decode a context from the carrier behind `extractor`.
    ///
    /// Fails with [`TraceError::MalformedContext`] when the carrier holds
    /// no context or a corrupt one.
    fn extract(&self, extractor: &dyn Extractor) -> TraceResult<TraceContext>;

    /// The carrier fields this propagator writes, so transports can
    /// allocate or clear them ahead of injection.
    fn fields(&self) -> &[String];
}

/// The default [`TextMapPropagator`] binding.
///
/// The `trace-context` header carries
/// `{trace_id}:{span_id}:{parent_span_id}:{sampled}` with ids in lowercase
/// hex, `0` in the parent slot for root contexts, and the sampled flag as
/// `1`/`0`. Baggage travels in the separate `trace-baggage` header in its
/// ordered `k=v,k=v` encoding, so extraction restores entries in the order
/// they were carried:
///
/// `trace-context: 913dd5b0d9a57bbcd6a0b1b02e9bfa81:d6a0b1b02e9bfa81:0:1`
#[derive(Clone, Debug)]
pub struct TraceContextPropagator {
    fields: [String; 2],
}

impl Default for TraceContextPropagator {
    fn default() -> Self {
        TraceContextPropagator::new()
    }
}

impl TraceContextPropagator {
    /// Create a `TraceContextPropagator`.
    pub fn new() -> Self {
        TraceContextPropagator {
            fields: [CONTEXT_HEADER.to_owned(), BAGGAGE_HEADER.to_owned()],
        }
    }

    fn extract_context_header(&self, extractor: &dyn Extractor) -> TraceResult<TraceContext> {
        let header_value = extractor
            .get(CONTEXT_HEADER)
            .ok_or_else(|| malformed("missing trace-context header"))?
            .trim();

        let parts = header_value.split_terminator(':').collect::<Vec<&str>>();
        if parts.len() != 4 {
            return Err(malformed("expected four trace-context sections"));
        }

        if parts[0].len() > 32 || parts[0].chars().any(|c| c.is_ascii_uppercase()) {
            return Err(malformed("invalid trace id"));
        }
        let trace_id =
            TraceId::from_hex(parts[0]).map_err(|_| malformed("invalid trace id"))?;

        if parts[1].len() > 16 || parts[1].chars().any(|c| c.is_ascii_uppercase()) {
            return Err(malformed("invalid span id"));
        }
        let span_id = SpanId::from_hex(parts[1]).map_err(|_| malformed("invalid span id"))?;

        let parent_span_id = if parts[2] == NO_PARENT {
            None
        } else {
            if parts[2].len() > 16 {
                return Err(malformed("invalid parent span id"));
            }
            Some(SpanId::from_hex(parts[2]).map_err(|_| malformed("invalid parent span id"))?)
        };

        let sampled = match parts[3] {
            "1" => true,
            "0" => false,
            _ => return Err(malformed("invalid sampled flag")),
        };

        // A syntactically broken baggage header degrades to empty baggage;
        // the causal identifiers above are the part that must not be guessed.
        let baggage = match extractor.get(BAGGAGE_HEADER) {
            Some(header) => header.parse::<Baggage>().unwrap_or_else(|err| {
                tracing::warn!("discarding unparsable trace baggage: {err}");
                Baggage::EMPTY
            }),
            None => Baggage::EMPTY,
        };

        let context = TraceContext::new(trace_id, span_id, parent_span_id, sampled, baggage);
        if !context.is_valid() {
            return Err(malformed("trace id and span id must be non-zero"));
        }

        Ok(context)
    }
}

impl TextMapPropagator for TraceContextPropagator {
    fn inject(&self, context: &TraceContext, injector: &mut dyn Injector) {
        if !context.is_valid() {
            return;
        }

        let parent = match context.parent_span_id() {
            Some(id) => id.to_string(),
            None => NO_PARENT.to_owned(),
        };
        let header_value = format!(
            "{}:{}:{}:{}",
            context.trace_id(),
            context.span_id(),
            parent,
            if context.is_sampled() { "1" } else { "0" },
        );
        injector.set(CONTEXT_HEADER, header_value);

        if !context.baggage().is_empty() {
            injector.set(BAGGAGE_HEADER, context.baggage().header());
        }
    }

    fn extract(&self, extractor: &dyn Extractor) -> TraceResult<TraceContext> {
        self.extract_context_header(extractor)
    }

    fn fields(&self) -> &[String] {
        self.fields.as_ref()
    }
}

fn malformed(reason: &str) -> TraceError {
    TraceError::MalformedContext(reason.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    const TRACE_ID: u128 = 0x0000_0000_0000_004d_0000_0000_0000_0016;
    const SPAN_ID: u64 = 0x0000_0000_0001_7c29;
    const PARENT_ID: u64 = 0x0000_0000_0000_00aa;

    fn contexts() -> Vec<TraceContext> {
        let root = TraceContext::root(TraceId::from(TRACE_ID), SpanId::from(SPAN_ID), true);
        let with_parent = TraceContext::new(
            TraceId::from(TRACE_ID),
            SpanId::from(SPAN_ID),
            Some(SpanId::from(PARENT_ID)),
            false,
            Baggage::EMPTY,
        );
        let with_baggage = root
            .with_baggage_item("tenant", "acme")
            .unwrap()
            .with_baggage_item("flavor", "canary")
            .unwrap();
        vec![root, with_parent, with_baggage]
    }

    #[test]
    fn inject_extract_round_trip() {
        let propagator = TraceContextPropagator::new();

        for context in contexts() {
            let mut carrier: HashMap<String, String> = HashMap::new();
            propagator.inject(&context, &mut carrier);

            let extracted = propagator.extract(&carrier).unwrap();
            assert_eq!(extracted, context, "round trip failed for {:?}", context);
        }
    }

    #[test]
    fn inject_writes_expected_header() {
        let propagator = TraceContextPropagator::new();
        let context = TraceContext::new(
            TraceId::from(TRACE_ID),
            SpanId::from(SPAN_ID),
            Some(SpanId::from(PARENT_ID)),
            true,
            Baggage::EMPTY,
        );

        let mut carrier: HashMap<String, String> = HashMap::new();
        propagator.inject(&context, &mut carrier);

        assert_eq!(
            Extractor::get(&carrier, CONTEXT_HEADER),
            Some("000000000000004d0000000000000016:0000000000017c29:00000000000000aa:1")
        );
    }

    #[test]
    fn invalid_context_is_not_injected() {
        let propagator = TraceContextPropagator::new();
        let mut carrier: HashMap<String, String> = HashMap::new();
        propagator.inject(&TraceContext::NONE, &mut carrier);

        assert!(carrier.is_empty());
    }

    #[test]
    fn extract_rejects_missing_or_corrupt_headers() {
        let propagator = TraceContextPropagator::new();
        let corrupt_headers = vec![
            None,
            Some(""),
            Some("only:three:parts"),
            Some("not-hex:0000000000017c29:0:1"),
            Some("000000000000004d0000000000000016:not-hex:0:1"),
            Some("000000000000004d0000000000000016:0000000000017c29:not-hex:1"),
            Some("000000000000004d0000000000000016:0000000000017c29:0:7"),
            // zero ids decode but are not a valid context
            Some("0:0:0:1"),
        ];

        for header in corrupt_headers {
            let mut carrier: HashMap<String, String> = HashMap::new();
            if let Some(value) = header {
                carrier.set(CONTEXT_HEADER, value.to_string());
            }

            assert!(
                matches!(
                    propagator.extract(&carrier),
                    Err(TraceError::MalformedContext(_))
                ),
                "header {:?} should be rejected",
                header
            );
        }
    }

    #[test]
    fn unparsable_baggage_degrades_to_empty() {
        let propagator = TraceContextPropagator::new();
        let mut carrier: HashMap<String, String> = HashMap::new();
        carrier.set(
            CONTEXT_HEADER,
            "000000000000004d0000000000000016:0000000000017c29:0:1".to_string(),
        );
        carrier.set(BAGGAGE_HEADER, "no-separator".to_string());

        let extracted = propagator.extract(&carrier).unwrap();
        assert!(extracted.baggage().is_empty());
        assert!(extracted.is_sampled());
    }
}
