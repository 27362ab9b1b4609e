use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Name of a key or button as reported by an input source ("space", "left", "t").
///
/// Cloning is a reference-count bump, so keys can be handed out of a
/// [`KeySet`] inside the polling loop without allocating.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct Key(Arc<str>);

impl Key {
    pub fn new(name: &str) -> Self {
        Key(Arc::from(name))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for Key {
    fn from(s: &str) -> Self {
        Key::new(s)
    }
}

impl From<String> for Key {
    fn from(s: String) -> Self {
        Key(Arc::from(s))
    }
}

impl From<Key> for String {
    fn from(k: Key) -> Self {
        k.0.to_string()
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Small ordered set of keys. Lookups are linear; sets hold a handful of keys.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeySet {
    keys: Vec<Key>,
}

impl KeySet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: Key) {
        if !self.keys.contains(&key) {
            self.keys.push(key);
        }
    }

    /// Union of two sets, `self` first.
    pub fn union(&self, other: &KeySet) -> KeySet {
        let mut out = self.clone();
        for k in &other.keys {
            out.insert(k.clone());
        }
        out
    }

    /// Returns the stored key matching `name`.
    pub fn get(&self, name: &str) -> Option<&Key> {
        self.keys.iter().find(|k| k.as_str() == name)
    }

    pub fn contains(&self, key: &Key) -> bool {
        self.keys.contains(key)
    }

    pub fn contains_name(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Key> {
        self.keys.iter()
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

impl<'a> FromIterator<&'a str> for KeySet {
    fn from_iter<I: IntoIterator<Item = &'a str>>(iter: I) -> Self {
        let mut set = KeySet::new();
        for name in iter {
            set.insert(Key::new(name));
        }
        set
    }
}

impl FromIterator<Key> for KeySet {
    fn from_iter<I: IntoIterator<Item = Key>>(iter: I) -> Self {
        let mut set = KeySet::new();
        for key in iter {
            set.insert(key);
        }
        set
    }
}

/// A key observed by an input source, stamped in session seconds.
#[derive(Debug, Clone, PartialEq)]
pub struct KeyPress {
    pub key: Key,
    pub time: f64,
}
