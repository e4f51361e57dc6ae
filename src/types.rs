use serde::{Deserialize, Serialize};

/// Timestamp type (nanoseconds since the Unix epoch, signed).
pub type Timestamp = i64;

/// A single key/value label attached to a point.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Tag {
    pub key: String,
    pub value: String,
}

impl Tag {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// One timestamped measurement as presented to the engine by a writer.
///
/// A point must carry at least one tag; the engines reject untagged points
/// before touching any storage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Point<T> {
    pub tags: Vec<Tag>,
    pub time: Timestamp,
    pub field: T,
}

impl<T> Point<T> {
    pub fn new(tags: Vec<Tag>, time: Timestamp, field: T) -> Self {
        Self { tags, time, field }
    }

    /// Converts the point into the stored form once its series has been resolved.
    pub fn into_value(self) -> Value<T> {
        Value {
            unix_nano: self.time,
            value: self.field,
        }
    }
}

/// The unit stored inside an entry: a timestamp and its payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Value<T> {
    pub unix_nano: Timestamp,
    pub value: T,
}

impl<T> Value<T> {
    pub fn new(unix_nano: Timestamp, value: T) -> Self {
        Self { unix_nano, value }
    }
}
