//! Span log entries and their structured payloads.
//!
//! A log message is a template whose `${path}` placeholders reference fields
//! inside the entry's payload tree, e.g.
//! `"first transaction is worth ${transactions[0].amount}"`. Placeholders
//! are resolved when the entry is appended; a path that does not resolve is
//! replaced by an explicit missing marker rather than failing, since logging
//! must never abort the instrumented code path.

use std::collections::HashMap;
use std::fmt;
use std::time::SystemTime;

/// Severity of a span log entry.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub enum LogLevel {
    /// Informational events in the span's unit of work.
    Info,
    /// Error events in the span's unit of work.
    Error,
}

/// A structured log payload: a tree of maps, lists, and scalars.
#[non_exhaustive]
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub enum PayloadValue {
    /// A mapping of field names to nested values
    Map(HashMap<String, PayloadValue>),
    /// A sequence of nested values
    List(Vec<PayloadValue>),
    /// String values
    String(String),
    /// i64 values
    I64(i64),
    /// f64 values
    F64(f64),
    /// bool values
    Bool(bool),
}

impl Default for PayloadValue {
    fn default() -> Self {
        PayloadValue::Map(HashMap::new())
    }
}

macro_rules! from_payload_values {
   (
        $(
            ($t:ty, $val:expr);
        )+
    ) => {
        $(
            impl From<$t> for PayloadValue {
                fn from(t: $t) -> Self {
                    $val(t)
                }
            }
        )+
    }
}

from_payload_values!(
    (bool, PayloadValue::Bool);
    (i64, PayloadValue::I64);
    (f64, PayloadValue::F64);
    (String, PayloadValue::String);
);

impl From<&str> for PayloadValue {
    fn from(s: &str) -> Self {
        PayloadValue::String(s.to_string())
    }
}

impl From<()> for PayloadValue {
    /// The empty payload, for log calls that carry none.
    fn from(_: ()) -> Self {
        PayloadValue::default()
    }
}

impl<K, V> From<HashMap<K, V>> for PayloadValue
where
    K: Into<String>,
    V: Into<PayloadValue>,
{
    fn from(map: HashMap<K, V>) -> Self {
        PayloadValue::Map(
            map.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

impl<V> From<Vec<V>> for PayloadValue
where
    V: Into<PayloadValue>,
{
    fn from(items: Vec<V>) -> Self {
        PayloadValue::List(items.into_iter().map(Into::into).collect())
    }
}

impl fmt::Display for PayloadValue {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PayloadValue::Bool(v) => v.fmt(fmt),
            PayloadValue::I64(v) => v.fmt(fmt),
            PayloadValue::F64(v) => v.fmt(fmt),
            PayloadValue::String(v) => fmt.write_str(v.as_str()),
            PayloadValue::List(items) => {
                write!(fmt, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(fmt, ",")?;
                    }
                    write!(fmt, "{}", item)?;
                }
                write!(fmt, "]")
            }
            PayloadValue::Map(map) => {
                let mut keys = map.keys().collect::<Vec<_>>();
                keys.sort();
                write!(fmt, "{{")?;
                for (i, key) in keys.into_iter().enumerate() {
                    if i > 0 {
                        write!(fmt, ",")?;
                    }
                    write!(fmt, "{}={}", key, map[key])?;
                }
                write!(fmt, "}}")
            }
        }
    }
}

impl PayloadValue {
    /// Resolves a dotted field path against this payload tree.
    ///
    /// Path segments name map fields and may carry `[index]` suffixes into
    /// lists, e.g. `transactions[0].amount`. Returns `None` for paths that
    /// do not lead to a value.
    pub fn lookup(&self, path: &str) -> Option<&PayloadValue> {
        let mut current = self;
        for segment in path.split('.') {
            let (name, indices) = parse_segment(segment)?;
            if !name.is_empty() {
                match current {
                    PayloadValue::Map(map) => current = map.get(name)?,
                    _ => return None,
                }
            }
            for index in indices {
                match current {
                    PayloadValue::List(items) => current = items.get(index)?,
                    _ => return None,
                }
            }
        }
        Some(current)
    }
}

/// Split a path segment into its field name and trailing `[index]` parts.
fn parse_segment(segment: &str) -> Option<(&str, Vec<usize>)> {
    let bracket = segment.find('[').unwrap_or(segment.len());
    let (name, mut rest) = segment.split_at(bracket);
    let mut indices = Vec::new();
    while !rest.is_empty() {
        let close = rest.find(']')?;
        let index = rest.get(1..close)?.parse::<usize>().ok()?;
        indices.push(index);
        rest = &rest[close + 1..];
        if !rest.is_empty() && !rest.starts_with('[') {
            return None;
        }
    }
    Some((name, indices))
}

/// Resolve `${path}` placeholders in `template` against `payload`.
///
/// A placeholder whose path does not resolve is substituted with
/// `<missing: path>`. An unterminated `${` is copied through verbatim.
pub(crate) fn render_template(template: &str, payload: &PayloadValue) -> String {
    let mut rendered = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(start) = rest.find("${") {
        rendered.push_str(&rest[..start]);
        match rest[start + 2..].find('}') {
            Some(end) => {
                let path = &rest[start + 2..start + 2 + end];
                match payload.lookup(path) {
                    Some(value) => rendered.push_str(&value.to_string()),
                    None => {
                        rendered.push_str("<missing: ");
                        rendered.push_str(path);
                        rendered.push('>');
                    }
                }
                rest = &rest[start + 2 + end + 1..];
            }
            None => {
                rendered.push_str(&rest[start..]);
                rest = "";
            }
        }
    }
    rendered.push_str(rest);

    rendered
}

/// One entry in a span's append-only log.
#[derive(Clone, Debug)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct LogEntry {
    /// The instant the entry was appended.
    pub timestamp: SystemTime,
    /// Severity of the entry.
    pub level: LogLevel,
    /// The raw message template as passed to the log call.
    pub template: String,
    /// The template with its placeholders resolved against the payload.
    pub message: String,
    /// The structured payload the template references.
    pub payload: PayloadValue,
}

impl LogEntry {
    pub(crate) fn new(level: LogLevel, template: String, payload: PayloadValue) -> Self {
        let message = render_template(&template, &payload);
        LogEntry {
            timestamp: SystemTime::now(),
            level,
            template,
            message,
            payload,
        }
    }
}
