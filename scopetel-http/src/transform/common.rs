use serde::{Serialize, Serializer};
use std::borrow::Cow;
use std::time::{SystemTime, UNIX_EPOCH};

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub(crate) struct Resource {
    attributes: Vec<KeyValue>,
}

impl From<&scopetel::Resource> for Resource {
    fn from(value: &scopetel::Resource) -> Self {
        Resource {
            attributes: value.iter().map(Into::into).collect(),
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub(crate) enum Value {
    #[serde(rename = "boolValue")]
    Bool(bool),
    /// 64-bit integers are strings in the JSON mapping.
    #[serde(rename = "intValue")]
    Int(String),
    #[serde(rename = "doubleValue")]
    Double(f64),
    #[serde(rename = "stringValue")]
    String(String),
}

impl From<scopetel::Value> for Value {
    fn from(value: scopetel::Value) -> Self {
        match value {
            scopetel::Value::Bool(b) => Value::Bool(b),
            scopetel::Value::I64(i) => Value::Int(i.to_string()),
            scopetel::Value::F64(f) => Value::Double(f),
            scopetel::Value::String(s) => Value::String(s.into_owned()),
            other => Value::String(other.as_str().into_owned()),
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub(crate) struct KeyValue {
    key: String,
    value: Value,
}

impl KeyValue {
    pub(crate) fn string(key: &str, value: impl Into<String>) -> Self {
        KeyValue {
            key: key.to_string(),
            value: Value::String(value.into()),
        }
    }
}

impl From<scopetel::KeyValue> for KeyValue {
    fn from(value: scopetel::KeyValue) -> Self {
        KeyValue {
            key: value.key.into(),
            value: value.value.into(),
        }
    }
}

impl From<&scopetel::KeyValue> for KeyValue {
    fn from(value: &scopetel::KeyValue) -> Self {
        value.clone().into()
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub(crate) struct Scope {
    #[serde(skip_serializing_if = "str::is_empty")]
    name: Cow<'static, str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    version: Option<Cow<'static, str>>,
}

impl From<&scopetel::InstrumentationScope> for Scope {
    fn from(value: &scopetel::InstrumentationScope) -> Self {
        Scope {
            name: value.name().to_owned().into(),
            version: value.version().map(|v| v.to_owned().into()),
        }
    }
}

/// Serializes a timestamp as nanoseconds since the epoch, as a string.
pub(crate) fn as_unix_nano<S>(time: &SystemTime, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    let nanos = time
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos();

    serializer.serialize_str(&nanos.to_string())
}

pub(crate) fn as_opt_unix_nano<S>(
    time: &Option<SystemTime>,
    serializer: S,
) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    match time {
        None => serializer.serialize_none(),
        Some(time) => as_unix_nano(time, serializer),
    }
}

pub(crate) fn is_zero(v: &u32) -> bool {
    *v == 0
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::time::Duration;

    #[test]
    fn values_use_the_json_mapping() {
        let attributes: Vec<KeyValue> = vec![
            scopetel::KeyValue::new("b", true).into(),
            scopetel::KeyValue::new("i", 42).into(),
            scopetel::KeyValue::new("f", 1.5).into(),
            scopetel::KeyValue::new("s", "text").into(),
        ];
        assert_eq!(
            serde_json::to_value(attributes).unwrap(),
            json!([
                {"key": "b", "value": {"boolValue": true}},
                {"key": "i", "value": {"intValue": "42"}},
                {"key": "f", "value": {"doubleValue": 1.5}},
                {"key": "s", "value": {"stringValue": "text"}},
            ])
        );
    }

    #[test]
    fn timestamps_are_nanosecond_strings() {
        #[derive(Serialize)]
        struct Stamp {
            #[serde(serialize_with = "as_unix_nano")]
            at: SystemTime,
        }
        let at = UNIX_EPOCH + Duration::from_nanos(1_700_000_000_000_000_123);
        assert_eq!(
            serde_json::to_value(Stamp { at }).unwrap(),
            json!({"at": "1700000000000000123"})
        );
    }
}
