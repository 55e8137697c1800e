use std::borrow::{Borrow, Cow};
use std::fmt;
use std::hash::{Hash, Hasher};

/// Name of a tag, event attribute, log field or baggage entry.
#[non_exhaustive]
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Key(Cow<'static, str>);

impl Key {
    /// Wraps a static or owned string.
    ///
    /// ```
    /// use scopetel::Key;
    ///
    /// assert_eq!(Key::new("http.route").as_str(), "http.route");
    /// assert_eq!(Key::new(format!("user.{}", "id")), Key::new("user.id"));
    /// ```
    pub fn new(value: impl Into<Key>) -> Self {
        value.into()
    }

    /// `Key::new` for constants.
    pub const fn from_static_str(value: &'static str) -> Self {
        Key(Cow::Borrowed(value))
    }

    /// The key name.
    pub fn as_str(&self) -> &str {
        self.0.as_ref()
    }

    /// Returns `true` if the key holds no characters.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<&'static str> for Key {
    fn from(key_str: &'static str) -> Self {
        Key(Cow::Borrowed(key_str))
    }
}

impl From<String> for Key {
    fn from(string: String) -> Self {
        Key(Cow::Owned(string))
    }
}

impl From<Cow<'static, str>> for Key {
    fn from(string: Cow<'static, str>) -> Self {
        Key(string)
    }
}

impl From<Key> for String {
    fn from(key: Key) -> Self {
        key.0.into_owned()
    }
}

impl fmt::Debug for Key {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(fmt)
    }
}

impl fmt::Display for Key {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt.write_str(self.as_str())
    }
}

impl Borrow<str> for Key {
    fn borrow(&self) -> &str {
        self.as_str()
    }
}

impl AsRef<str> for Key {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

/// A scalar attribute value.
///
/// Tags, event attributes and log fields are restricted to these types.
/// Unsigned integers above `i64::MAX` saturate.
#[non_exhaustive]
#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    /// A boolean.
    Bool(bool),
    /// A signed integer.
    I64(i64),
    /// A float.
    F64(f64),
    /// A string.
    String(Cow<'static, str>),
}

impl Value {
    /// The value rendered as text. Borrows when it already is a string.
    pub fn as_str(&self) -> Cow<'_, str> {
        match self {
            Value::Bool(v) => format!("{}", v).into(),
            Value::I64(v) => format!("{}", v).into(),
            Value::F64(v) => format!("{}", v).into(),
            Value::String(v) => Cow::Borrowed(v.as_ref()),
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::F64(v)
    }
}

macro_rules! integer_values {
    (lossless: $($int:ty),+) => {
        $(
            impl From<$int> for Value {
                fn from(v: $int) -> Self {
                    Value::I64(i64::from(v))
                }
            }
        )+
    };
    (saturating: $($int:ty),+) => {
        $(
            impl From<$int> for Value {
                fn from(v: $int) -> Self {
                    Value::I64(i64::try_from(v).unwrap_or(i64::MAX))
                }
            }
        )+
    };
}

integer_values!(lossless: i32, i64, u32);
integer_values!(saturating: u64, usize);

impl From<Cow<'static, str>> for Value {
    fn from(s: Cow<'static, str>) -> Self {
        Value::String(s)
    }
}

impl From<&'static str> for Value {
    fn from(s: &'static str) -> Self {
        Value::String(Cow::Borrowed(s))
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(Cow::Owned(s))
    }
}

impl fmt::Display for Value {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Bool(v) => v.fmt(fmt),
            Value::I64(v) => v.fmt(fmt),
            Value::F64(v) => v.fmt(fmt),
            Value::String(v) => fmt.write_str(v),
        }
    }
}

/// An attribute: a [`Key`] and its [`Value`].
#[derive(Clone, Debug, PartialEq)]
#[non_exhaustive]
pub struct KeyValue {
    /// Name.
    pub key: Key,

    /// Value.
    pub value: Value,
}

impl KeyValue {
    /// Pairs `key` with `value`, converting both.
    pub fn new<K, V>(key: K, value: V) -> Self
    where
        K: Into<Key>,
        V: Into<Value>,
    {
        KeyValue {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// Hashable view of a [KeyValue], floats compared by bit pattern.
#[derive(Clone, Debug)]
pub(crate) struct HashKeyValue(pub(crate) KeyValue);

impl Hash for HashKeyValue {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.key.hash(state);
        match &self.0.value {
            Value::Bool(b) => {
                0u8.hash(state);
                b.hash(state)
            }
            Value::I64(i) => {
                1u8.hash(state);
                i.hash(state)
            }
            Value::F64(f) => {
                2u8.hash(state);
                f.to_bits().hash(state)
            }
            Value::String(s) => {
                3u8.hash(state);
                s.hash(state)
            }
        }
    }
}

impl PartialEq for HashKeyValue {
    fn eq(&self, other: &Self) -> bool {
        self.0.key == other.0.key
            && match (&self.0.value, &other.0.value) {
                (Value::F64(a), Value::F64(b)) => a.to_bits() == b.to_bits(),
                (a, b) => a == b,
            }
    }
}

impl Eq for HashKeyValue {}

/// Information about the component emitting telemetry, e.g.
/// `WebAPI.Weather.Forecast` version `1.0.0`.
///
/// Tracers, meters and loggers are all named by a scope, and the scope travels
/// with every exported item.
#[derive(Debug, Default, Clone, PartialEq, Eq, Hash)]
pub struct InstrumentationScope {
    name: Cow<'static, str>,
    version: Option<Cow<'static, str>>,
}

impl InstrumentationScope {
    /// Starts building a scope called `name`.
    pub fn builder<T: Into<Cow<'static, str>>>(name: T) -> InstrumentationScopeBuilder {
        InstrumentationScopeBuilder {
            name: name.into(),
            version: None,
        }
    }

    /// The scope name, e.g. `WebAPI.Weather.Forecast`.
    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The scope version, if one was given.
    #[inline]
    pub fn version(&self) -> Option<&str> {
        self.version.as_deref()
    }
}

/// Builder for [`InstrumentationScope`].
#[derive(Debug)]
pub struct InstrumentationScopeBuilder {
    name: Cow<'static, str>,
    version: Option<Cow<'static, str>>,
}

impl InstrumentationScopeBuilder {
    /// Sets the version.
    ///
    /// ```
    /// let scope = scopetel::InstrumentationScope::builder("WebAPI.Weather.Forecast")
    ///     .with_version("1.0.0")
    ///     .build();
    /// assert_eq!(scope.version(), Some("1.0.0"));
    /// ```
    pub fn with_version(mut self, version: impl Into<Cow<'static, str>>) -> Self {
        self.version = Some(version.into());
        self
    }

    /// Finishes the scope.
    pub fn build(self) -> InstrumentationScope {
        InstrumentationScope {
            name: self.name,
            version: self.version,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn value_display_and_conversions() {
        assert_eq!(Value::from(5_i32), Value::I64(5));
        assert_eq!(Value::from(u64::MAX), Value::I64(i64::MAX));
        assert_eq!(Value::from("add").as_str(), "add");
        assert_eq!(Value::from(1.5).to_string(), "1.5");
        assert_eq!(Value::from(true).to_string(), "true");
    }

    #[test]
    fn hash_key_value_treats_floats_by_bits() {
        let mut set = HashSet::new();
        set.insert(HashKeyValue(KeyValue::new("ratio", 0.5)));
        set.insert(HashKeyValue(KeyValue::new("ratio", 0.5)));
        set.insert(HashKeyValue(KeyValue::new("ratio", f64::NAN)));
        set.insert(HashKeyValue(KeyValue::new("ratio", f64::NAN)));
        assert_eq!(set.len(), 2);
    }
}
