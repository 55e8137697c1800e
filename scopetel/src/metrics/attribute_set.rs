use crate::common::{HashKeyValue, KeyValue};

/// A unique set of attributes identifying one time series.
///
/// Attributes are sorted by key so that the order in which callers pass them
/// does not matter. For duplicate keys the last value wins.
#[derive(Clone, Default, Debug, Hash, PartialEq, Eq)]
pub(crate) struct AttributeSet(Vec<HashKeyValue>);

impl From<&[KeyValue]> for AttributeSet {
    fn from(values: &[KeyValue]) -> Self {
        let mut vec: Vec<HashKeyValue> = Vec::with_capacity(values.len());
        for kv in values {
            if let Some(existing) = vec.iter_mut().find(|e| e.0.key == kv.key) {
                existing.0.value = kv.value.clone();
            } else {
                vec.push(HashKeyValue(kv.clone()));
            }
        }
        vec.sort_by(|a, b| a.0.key.cmp(&b.0.key));
        AttributeSet(vec)
    }
}

impl AttributeSet {
    pub(crate) fn to_key_values(&self) -> Vec<KeyValue> {
        self.0.iter().map(|kv| kv.0.clone()).collect()
    }
}
