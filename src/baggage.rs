//! Cross-cutting request metadata propagated to every descendant span.
//!
//! Baggage is a set of name/value pairs carried by a
//! [`TraceContext`](crate::trace::TraceContext) and copied unchanged to every
//! child context derived from it. It annotates a whole subtree of a trace
//! with request-scoped properties (a tenant id, an experiment flag), it is
//! not tracing data itself.
//!
//! `Baggage` is a value type: all write operations return a new `Baggage`
//! and never mutate the original, so a parent context's baggage can be read
//! concurrently while a caller extends its own copy.
use crate::trace::{TraceError, TraceResult};
use std::collections::VecDeque;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

const MAX_KEY_VALUE_PAIRS: usize = 64;
const MAX_ENTRY_LEN: usize = 256;

/// An ordered set of name/value pairs propagated with a trace context.
///
/// Keys are ASCII strings without the `,`, `=`, or `;` delimiters; values
/// may be any string not containing `,` or `=`. Both are capped at 256
/// bytes, and a baggage holds at most 64 pairs.
#[derive(Clone, Debug, Default, Eq, PartialEq, Hash)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct Baggage(Option<VecDeque<(String, String)>>);

impl Baggage {
    /// The empty `Baggage`, as a constant
    pub const EMPTY: Baggage = Baggage(None);

    fn valid_key(key: &str) -> bool {
        if key.is_empty() || key.len() > MAX_ENTRY_LEN {
            return false;
        }

        key.as_bytes()
            .iter()
            .all(|b| b.is_ascii_graphic() && !matches!(b, b',' | b'=' | b';'))
    }

    fn valid_value(value: &str) -> bool {
        if value.len() > MAX_ENTRY_LEN {
            return false;
        }

        !(value.contains(',') || value.contains('='))
    }

    /// Creates a new `Baggage` from the given key-value collection.
    ///
    /// # Examples
    ///
    /// ```
    /// use tracetree::baggage::Baggage;
    ///
    /// let kvs = vec![("tenant", "acme"), ("flavor", "canary")];
    /// let baggage = Baggage::from_entries(kvs);
    ///
    /// assert!(baggage.is_ok());
    /// assert_eq!(baggage.unwrap().header(), String::from("tenant=acme,flavor=canary"))
    /// ```
    pub fn from_entries<T, K, V>(entries: T) -> TraceResult<Self>
    where
        T: IntoIterator<Item = (K, V)>,
        K: ToString,
        V: ToString,
    {
        let ordered_data = entries
            .into_iter()
            .map(|(key, value)| {
                let (key, value) = (key.to_string(), value.to_string());
                if !Baggage::valid_key(key.as_str()) {
                    return Err(BaggageError::Key(key));
                }
                if !Baggage::valid_value(value.as_str()) {
                    return Err(BaggageError::Value(value));
                }

                Ok((key, value))
            })
            .collect::<Result<VecDeque<_>, BaggageError>>()?;

        if ordered_data.is_empty() {
            Ok(Baggage(None))
        } else if ordered_data.len() > MAX_KEY_VALUE_PAIRS {
            Err(BaggageError::TooManyEntries.into())
        } else {
            Ok(Baggage(Some(ordered_data)))
        }
    }

    /// Retrieves a value for a given key if it exists.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.as_ref().and_then(|kvs| {
            kvs.iter().find_map(|item| {
                if item.0.as_str() == key {
                    Some(item.1.as_str())
                } else {
                    None
                }
            })
        })
    }

    /// Inserts the given key-value pair into a copy of the baggage.
    ///
    /// If a value already exists for the given key, the copy holds the new
    /// value at the front of the list. The original baggage is never
    /// modified. Invalid keys or values yield an `Err`.
    pub fn insert<K, V>(&self, key: K, value: V) -> TraceResult<Baggage>
    where
        K: Into<String>,
        V: Into<String>,
    {
        let (key, value) = (key.into(), value.into());
        if !Baggage::valid_key(key.as_str()) {
            return Err(BaggageError::Key(key).into());
        }
        if !Baggage::valid_value(value.as_str()) {
            return Err(BaggageError::Value(value).into());
        }

        let mut baggage = self.delete_from_deque(key.clone());
        let kvs = baggage.0.get_or_insert(VecDeque::with_capacity(1));
        if kvs.len() == MAX_KEY_VALUE_PAIRS {
            return Err(BaggageError::TooManyEntries.into());
        }

        kvs.push_front((key, value));

        Ok(baggage)
    }

    /// Removes the given key from a copy of the baggage.
    ///
    /// If the key is not present the copy is identical to the original.
    pub fn delete<K: Into<String>>(&self, key: K) -> TraceResult<Baggage> {
        let key = key.into();
        if !Baggage::valid_key(key.as_str()) {
            return Err(BaggageError::Key(key).into());
        }

        Ok(self.delete_from_deque(key))
    }

    /// Delete key from the baggage's deque. The key MUST be valid
    fn delete_from_deque(&self, key: String) -> Baggage {
        let mut owned = self.clone();
        if let Some(kvs) = owned.0.as_mut() {
            if let Some(index) = kvs.iter().position(|x| *x.0 == *key) {
                kvs.remove(index);
            }
        }
        owned
    }

    /// Returns the number of entries in this baggage.
    pub fn len(&self) -> usize {
        self.0.as_ref().map(VecDeque::len).unwrap_or(0)
    }

    /// Returns `true` if the baggage contains no entries.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Gets an iterator over the baggage entries, oldest last.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0
            .iter()
            .flatten()
            .map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Creates a baggage header string, delimiting each key and value with a
    /// `=` and each entry with a `,`.
    pub fn header(&self) -> String {
        self.0
            .as_ref()
            .map(|kvs| {
                kvs.iter()
                    .map(|(key, value)| format!("{}={}", key, value))
                    .collect::<Vec<String>>()
                    .join(",")
            })
            .unwrap_or_default()
    }
}

impl FromStr for Baggage {
    type Err = TraceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let list_members: Vec<&str> = s.split_terminator(',').collect();
        let mut key_value_pairs: Vec<(String, String)> = Vec::with_capacity(list_members.len());

        for list_member in list_members {
            match list_member.find('=') {
                None => return Err(BaggageError::Entry(list_member.to_string()).into()),
                Some(separator_index) => {
                    let (key, value) = list_member.split_at(separator_index);
                    key_value_pairs
                        .push((key.to_string(), value.trim_start_matches('=').to_string()));
                }
            }
        }

        Baggage::from_entries(key_value_pairs)
    }
}

impl fmt::Display for Baggage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.header())
    }
}

/// Error returned by `Baggage` operations.
#[derive(Error, Debug)]
#[non_exhaustive]
enum BaggageError {
    /// The key is invalid.
    #[error("{0} is not a valid baggage key")]
    Key(String),

    /// The value is invalid.
    #[error("{0} is not a valid baggage value")]
    Value(String),

    /// The list member is invalid.
    #[error("{0} is not a valid baggage list member")]
    Entry(String),

    /// The baggage holds the maximum number of entries.
    #[error("baggage holds the maximum of 64 entries")]
    TooManyEntries,
}

impl From<BaggageError> for TraceError {
    fn from(err: BaggageError) -> Self {
        TraceError::Other(Box::new(err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_is_copy_on_write() {
        let baggage = Baggage::from_entries(vec![("tenant", "acme")]).unwrap();
        let extended = baggage.insert("flavor", "canary").unwrap();

        assert!(baggage.get("flavor").is_none()); // The original doesn't change
        assert_eq!(extended.get("flavor").unwrap(), "canary");
        assert_eq!(extended.get("tenant").unwrap(), "acme");
    }

    #[test]
    fn insert_overwrites_existing_key() {
        let baggage = Baggage::from_entries(vec![("tenant", "acme")]).unwrap();
        let updated = baggage.insert("tenant", "initech").unwrap();

        assert_eq!(updated.get("tenant"), Some("initech"));
        assert_eq!(updated.len(), 1);
        assert_eq!(baggage.get("tenant"), Some("acme"));
    }

    #[test]
    fn delete_returns_copy_without_key() {
        let baggage = Baggage::from_entries(vec![("a", "1"), ("b", "2")]).unwrap();
        let smaller = baggage.delete("a").unwrap();

        assert!(smaller.get("a").is_none());
        assert_eq!(smaller.len(), 1);
        assert_eq!(baggage.len(), 2);
    }

    #[test]
    fn header_round_trip() {
        let baggage = Baggage::from_entries(vec![("tenant", "acme"), ("flavor", "")]).unwrap();
        let parsed: Baggage = baggage.header().parse().unwrap();

        assert_eq!(parsed, baggage);
        assert_eq!("".parse::<Baggage>().unwrap(), Baggage::EMPTY);
    }

    #[test]
    fn rejects_invalid_keys() {
        let test_data: Vec<(&'static str, bool)> = vec![
            ("tenant", true),
            ("123", true),
            ("a=b", false),
            ("a,b", false),
            ("", false),
            ("with space", false),
            ("héllo", false),
        ];

        for (key, expected) in test_data {
            assert_eq!(
                Baggage::EMPTY.insert(key, "v").is_ok(),
                expected,
                "test key: {:?}",
                key
            );
        }
    }

    #[test]
    fn rejects_malformed_header() {
        assert!("no-separator".parse::<Baggage>().is_err());
    }
}
