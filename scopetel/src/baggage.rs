//! Name/value pairs that travel with a unit of work.
//!
//! Baggage lives on the ambient [`Context`]. Entries set while a span's
//! context is attached are seen by every span started afterwards from that
//! context, never by spans that were already running and never by the
//! enclosing scope once the context is detached.
//!
//! ```
//! use scopetel::Context;
//!
//! let _guard = Context::current_with_baggage([("tenant", "contoso")]).attach();
//! assert!(Context::set_baggage("user.id", "42"));
//! assert_eq!(Context::get_baggage("user.id").as_deref(), Some("42"));
//! assert_eq!(Context::get_baggage("tenant").as_deref(), Some("contoso"));
//! ```
//!
//! Baggage is never copied into metric attributes.
use crate::{Context, Key};
use std::borrow::Cow;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

const MAX_KEY_VALUE_PAIRS: usize = 64;
const MAX_LEN_OF_ALL_PAIRS: usize = 8192;

// https://datatracker.ietf.org/doc/html/rfc7230#section-3.2.6
const INVALID_ASCII_KEY_CHARS: [u8; 17] = [
    b'(', b')', b',', b'/', b':', b';', b'<', b'=', b'>', b'?', b'@', b'[', b'\\', b']', b'{',
    b'}', b'"',
];

/// A set of name/value pairs, each name mapping to exactly one value.
///
/// Cloning is cheap: entries are shared until one of the clones is modified.
///
/// ### Limits
///
/// * Maximum number of name/value pairs: `64`.
/// * Maximum total length of all name/value pairs: `8192`.
///
/// Inserts beyond these limits, or with a name that is not a valid token, are
/// rejected.
#[derive(Clone, Default)]
pub struct Baggage {
    inner: Option<Arc<HashMap<Key, Cow<'static, str>>>>,
    kv_content_len: usize,
}

impl Baggage {
    /// Creates an empty `Baggage`.
    pub fn new() -> Self {
        Baggage::default()
    }

    /// Returns the value for the given name, if present.
    pub fn get<K: AsRef<str>>(&self, key: K) -> Option<&str> {
        self.inner
            .as_ref()
            .and_then(|entries| entries.get(key.as_ref()))
            .map(|value| value.as_ref())
    }

    /// Inserts a name/value pair.
    ///
    /// Returns `true` if the pair was stored. Existing names are overwritten.
    pub fn insert<K, V>(&mut self, key: K, value: V) -> bool
    where
        K: Into<Key>,
        V: Into<Cow<'static, str>>,
    {
        let (key, value) = (key.into(), value.into());
        if !Self::is_key_valid(key.as_str().as_bytes()) {
            return false;
        }

        let entries = Arc::make_mut(self.inner.get_or_insert_with(Default::default));
        let prev_len = entries
            .get(key.as_str())
            .map(|prev| key.as_str().len() + prev.len() + 1);
        if prev_len.is_none() && entries.len() == MAX_KEY_VALUE_PAIRS {
            return false;
        }

        let entry_len = key.as_str().len() + value.len() + 1;
        let new_content_len = self.kv_content_len + entry_len - prev_len.unwrap_or(0);
        if new_content_len > MAX_LEN_OF_ALL_PAIRS {
            return false;
        }

        self.kv_content_len = new_content_len;
        entries.insert(key, value);
        true
    }

    /// Removes a name, returning its value if it was present.
    pub fn remove<K: AsRef<str>>(&mut self, key: K) -> Option<Cow<'static, str>> {
        let entries = Arc::make_mut(self.inner.as_mut()?);
        let (key, value) = entries.remove_entry(key.as_ref())?;
        self.kv_content_len -= key.as_str().len() + value.len() + 1;
        Some(value)
    }

    /// Returns the number of entries.
    pub fn len(&self) -> usize {
        self.inner.as_ref().map_or(0, |entries| entries.len())
    }

    /// Returns `true` if the baggage holds no entries.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Iterates over the entries in arbitrary order.
    pub fn iter(&self) -> impl Iterator<Item = (&Key, &str)> {
        self.inner
            .iter()
            .flat_map(|entries| entries.iter())
            .map(|(k, v)| (k, v.as_ref()))
    }

    fn is_key_valid(key: &[u8]) -> bool {
        !key.is_empty()
            && key
                .iter()
                .all(|b| b.is_ascii_graphic() && !INVALID_ASCII_KEY_CHARS.contains(b))
    }
}

impl<K, V> FromIterator<(K, V)> for Baggage
where
    K: Into<Key>,
    V: Into<Cow<'static, str>>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut baggage = Baggage::new();
        for (key, value) in iter {
            baggage.insert(key, value);
        }
        baggage
    }
}

impl PartialEq for Baggage {
    fn eq(&self, other: &Self) -> bool {
        self.len() == other.len() && self.iter().all(|(k, v)| other.get(k) == Some(v))
    }
}

impl fmt::Debug for Baggage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.iter()).finish()
    }
}

impl fmt::Display for Baggage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, (k, v)) in self.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            write!(f, "{}={}", k, v)?;
        }
        Ok(())
    }
}

impl Context {
    /// Returns a clone of this context with the given entries added to its
    /// baggage.
    pub fn with_baggage<I, K, V>(&self, entries: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<Key>,
        V: Into<Cow<'static, str>>,
    {
        let mut cx = self.clone();
        for (key, value) in entries {
            cx.baggage.insert(key, value);
        }
        cx
    }

    /// Returns a clone of the current context with the given entries added to
    /// its baggage.
    pub fn current_with_baggage<I, K, V>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<Key>,
        V: Into<Cow<'static, str>>,
    {
        Context::map_current(|cx| cx.with_baggage(entries))
    }

    /// Returns this context's baggage.
    pub fn baggage(&self) -> &Baggage {
        &self.baggage
    }

    /// Sets a baggage entry on the attached context of the calling execution
    /// unit.
    ///
    /// The entry is visible to spans started afterwards from this context and
    /// disappears when the context is detached. Returns `false`, without
    /// effect, when no context is attached or the entry breaks a baggage limit.
    pub fn set_baggage<K, V>(key: K, value: V) -> bool
    where
        K: Into<Key>,
        V: Into<Cow<'static, str>>,
    {
        let (key, value) = (key.into(), value.into());
        Context::map_attached_mut(|cx| cx.baggage.insert(key, value)).unwrap_or(false)
    }

    /// Reads a baggage entry from the current context.
    pub fn get_baggage<K: AsRef<str>>(key: K) -> Option<String> {
        Context::map_current(|cx| cx.baggage.get(key).map(str::to_owned))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_overwrites_and_tracks_length() {
        let mut baggage = Baggage::new();
        assert!(baggage.insert("user.id", "42"));
        assert!(baggage.insert("user.id", "43"));
        assert_eq!(baggage.len(), 1);
        assert_eq!(baggage.get("user.id"), Some("43"));
        assert_eq!(baggage.kv_content_len, "user.id".len() + 2 + 1);

        assert_eq!(baggage.remove("user.id").as_deref(), Some("43"));
        assert_eq!(baggage.kv_content_len, 0);
        assert!(baggage.is_empty());
    }

    #[test]
    fn rejects_invalid_keys() {
        let mut baggage = Baggage::new();
        assert!(!baggage.insert("", "v"));
        assert!(!baggage.insert("a b", "v"));
        assert!(!baggage.insert("a=b", "v"));
        assert!(baggage.is_empty());
    }

    #[test]
    fn enforces_pair_count_limit() {
        let mut baggage = Baggage::new();
        for i in 0..MAX_KEY_VALUE_PAIRS {
            assert!(baggage.insert(format!("k{}", i), "v"));
        }
        assert!(!baggage.insert("one.more", "v"));
        // replacing an existing key is still allowed at the limit
        assert!(baggage.insert("k0", "w"));
        assert_eq!(baggage.len(), MAX_KEY_VALUE_PAIRS);
    }

    #[test]
    fn enforces_total_length_limit() {
        let mut baggage = Baggage::new();
        assert!(!baggage.insert("big", "x".repeat(MAX_LEN_OF_ALL_PAIRS)));
        assert!(baggage.insert("big", "x".repeat(100)));
        assert_eq!(baggage.get("big").map(str::len), Some(100));
    }

    #[test]
    fn clones_do_not_share_writes() {
        let mut a: Baggage = [("k", "1")].into_iter().collect();
        let b = a.clone();
        a.insert("k", "2");
        assert_eq!(a.get("k"), Some("2"));
        assert_eq!(b.get("k"), Some("1"));
    }

    #[test]
    fn set_baggage_requires_attached_context() {
        assert!(!Context::set_baggage("user.id", "42"));
        assert_eq!(Context::get_baggage("user.id"), None);

        {
            let _guard = Context::new().attach();
            assert!(Context::set_baggage("user.id", "42"));
            assert_eq!(Context::get_baggage("user.id").as_deref(), Some("42"));
        }

        assert_eq!(Context::get_baggage("user.id"), None);
    }

    #[test]
    fn baggage_never_flows_upward() {
        let _outer = Context::current_with_baggage([("tier", "gold")]).attach();
        {
            let _inner = Context::current().attach();
            Context::set_baggage("user.id", "42");
            assert_eq!(Context::get_baggage("tier").as_deref(), Some("gold"));
        }
        assert_eq!(Context::get_baggage("user.id"), None);
        assert_eq!(Context::get_baggage("tier").as_deref(), Some("gold"));
    }
}
