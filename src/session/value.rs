use super::CodecError;
use serde::ser::{SerializeMap, Serializer};
use serde::Serialize;
use std::collections::BTreeMap;

/// Every value a session can hold.
///
/// Mappings are key-ordered so encodings are deterministic. `Any*` variants
/// hold nested values of mixed kinds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum SessionValue {
    Int(i64),
    Str(String),
    IntSeq(Vec<i64>),
    StrSeq(Vec<String>),
    AnySeq(Vec<SessionValue>),
    IntIntMap(BTreeMap<i64, i64>),
    IntStrMap(BTreeMap<i64, String>),
    IntAnyMap(BTreeMap<i64, SessionValue>),
    StrIntMap(BTreeMap<String, i64>),
    StrStrMap(BTreeMap<String, String>),
    StrAnyMap(BTreeMap<String, SessionValue>),
    Record(Record),
}

impl SessionValue {
    /// Short, Go-like name of the value's shape, used in error messages.
    #[must_use]
    pub fn shape(&self) -> &'static str {
        match self {
            SessionValue::Int(_) => "int",
            SessionValue::Str(_) => "string",
            SessionValue::IntSeq(_) => "[]int",
            SessionValue::StrSeq(_) => "[]string",
            SessionValue::AnySeq(_) => "[]any",
            SessionValue::IntIntMap(_) => "map[int]int",
            SessionValue::IntStrMap(_) => "map[int]string",
            SessionValue::IntAnyMap(_) => "map[int]any",
            SessionValue::StrIntMap(_) => "map[string]int",
            SessionValue::StrStrMap(_) => "map[string]string",
            SessionValue::StrAnyMap(_) => "map[string]any",
            SessionValue::Record(_) => "record",
        }
    }

    #[must_use]
    pub fn as_int(&self) -> Option<i64> {
        match self {
            SessionValue::Int(v) => Some(*v),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            SessionValue::Str(v) => Some(v),
            _ => None,
        }
    }
}

/// Named fields in declaration order.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Record {
    fields: Vec<(String, SessionValue)>,
}

impl Record {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder form of [`Record::insert`].
    #[must_use]
    pub fn with(mut self, name: impl Into<String>, value: impl Into<SessionValue>) -> Self {
        self.insert(name, value);
        self
    }

    /// Set a field, keeping its original position if it already exists.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<SessionValue>) {
        let name = name.into();
        let value = value.into();
        match self.fields.iter_mut().find(|(n, _)| *n == name) {
            Some((_, slot)) => *slot = value,
            None => self.fields.push((name, value)),
        }
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&SessionValue> {
        self.fields.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    pub fn fields(&self) -> impl Iterator<Item = (&str, &SessionValue)> {
        self.fields.iter().map(|(n, v)| (n.as_str(), v))
    }

    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

impl Serialize for Record {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.fields.len()))?;
        for (name, value) in &self.fields {
            map.serialize_entry(name, value)?;
        }
        map.end()
    }
}

macro_rules! session_value_conversions {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<$ty> for SessionValue {
                fn from(value: $ty) -> Self {
                    SessionValue::$variant(value)
                }
            }

            impl TryFrom<SessionValue> for $ty {
                type Error = SessionValue;

                /// Hands the value back when it has another shape.
                fn try_from(value: SessionValue) -> Result<Self, Self::Error> {
                    match value {
                        SessionValue::$variant(inner) => Ok(inner),
                        other => Err(other),
                    }
                }
            }
        )*
    };
}

session_value_conversions! {
    i64 => Int,
    String => Str,
    Vec<i64> => IntSeq,
    Vec<String> => StrSeq,
    Vec<SessionValue> => AnySeq,
    BTreeMap<i64, i64> => IntIntMap,
    BTreeMap<i64, String> => IntStrMap,
    BTreeMap<i64, SessionValue> => IntAnyMap,
    BTreeMap<String, i64> => StrIntMap,
    BTreeMap<String, String> => StrStrMap,
    BTreeMap<String, SessionValue> => StrAnyMap,
    Record => Record,
}

impl From<i32> for SessionValue {
    fn from(value: i32) -> Self {
        SessionValue::Int(i64::from(value))
    }
}

impl From<&str> for SessionValue {
    fn from(value: &str) -> Self {
        SessionValue::Str(value.to_string())
    }
}

impl TryFrom<f64> for SessionValue {
    type Error = CodecError;

    fn try_from(_value: f64) -> Result<Self, Self::Error> {
        Err(CodecError::Unsupported {
            shape: "float".to_string(),
        })
    }
}

impl TryFrom<bool> for SessionValue {
    type Error = CodecError;

    fn try_from(_value: bool) -> Result<Self, Self::Error> {
        Err(CodecError::Unsupported {
            shape: "bool".to_string(),
        })
    }
}

impl TryFrom<serde_json::Value> for SessionValue {
    type Error = CodecError;

    /// Integers, strings, arrays and objects map onto the session universe;
    /// floats, booleans and nulls are rejected. Arrays become `AnySeq` and
    /// objects `StrAnyMap`.
    fn try_from(value: serde_json::Value) -> Result<Self, Self::Error> {
        use serde_json::Value;
        let unsupported = |shape: &str| CodecError::Unsupported {
            shape: shape.to_string(),
        };
        match value {
            Value::Null => Err(unsupported("null")),
            Value::Bool(_) => Err(unsupported("bool")),
            Value::Number(n) => n.as_i64().map(SessionValue::Int).ok_or_else(|| {
                unsupported(if n.is_u64() { "unsigned int beyond i64" } else { "float" })
            }),
            Value::String(s) => Ok(SessionValue::Str(s)),
            Value::Array(items) => items
                .into_iter()
                .map(SessionValue::try_from)
                .collect::<Result<Vec<_>, _>>()
                .map(SessionValue::AnySeq),
            Value::Object(entries) => entries
                .into_iter()
                .map(|(k, v)| Ok((k, SessionValue::try_from(v)?)))
                .collect::<Result<BTreeMap<_, _>, CodecError>>()
                .map(SessionValue::StrAnyMap),
        }
    }
}
