use std::borrow::Cow;
use std::fmt;

/// The value part of span [`Tag`] pairs.
///
/// Tag values are constrained to scalars. A span stores the string rendering
/// of the value, produced at the moment the tag is set, so later mutation of
/// whatever the caller derived the value from has no effect on the stored tag.
#[non_exhaustive]
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub enum TagValue {
    /// bool values
    Bool(bool),
    /// i64 values
    I64(i64),
    /// f64 values
    F64(f64),
    /// String values
    String(String),
}

impl TagValue {
    /// String representation of the `TagValue`
    ///
    /// This will allocate iff the underlying value is not a `String`.
    pub fn as_str(&self) -> Cow<'_, str> {
        match self {
            TagValue::Bool(v) => format!("{}", v).into(),
            TagValue::I64(v) => format!("{}", v).into(),
            TagValue::F64(v) => format!("{}", v).into(),
            TagValue::String(v) => Cow::Borrowed(v.as_str()),
        }
    }
}

macro_rules! from_tag_values {
   (
        $(
            ($t:ty, $val:expr);
        )+
    ) => {
        $(
            impl From<$t> for TagValue {
                fn from(t: $t) -> Self {
                    $val(t)
                }
            }
        )+
    }
}

from_tag_values!(
    (bool, TagValue::Bool);
    (i64, TagValue::I64);
    (f64, TagValue::F64);
    (String, TagValue::String);
);

impl From<&str> for TagValue {
    fn from(s: &str) -> Self {
        TagValue::String(s.to_string())
    }
}

impl From<Cow<'_, str>> for TagValue {
    fn from(s: Cow<'_, str>) -> Self {
        TagValue::String(s.into_owned())
    }
}

impl fmt::Display for TagValue {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TagValue::Bool(v) => v.fmt(fmt),
            TagValue::I64(v) => v.fmt(fmt),
            TagValue::F64(v) => v.fmt(fmt),
            TagValue::String(v) => fmt.write_str(v.as_str()),
        }
    }
}

/// A key-value pair describing a span tag.
#[derive(Clone, Debug, PartialEq)]
#[non_exhaustive]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct Tag {
    /// The tag name
    pub key: String,

    /// The tag value
    pub value: TagValue,
}

impl Tag {
    /// Create a new `Tag` pair.
    pub fn new<K, V>(key: K, value: V) -> Self
    where
        K: Into<String>,
        V: Into<TagValue>,
    {
        Tag {
            key: key.into(),
            value: value.into(),
        }
    }
}
