//! Case-insensitive, multi-valued header map

use std::collections::BTreeMap;

use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Header map keyed by lowercase name
///
/// A name can carry several values (`set-cookie`, `vary`). On the wire a
/// single value is a JSON string and several are an array; both forms are
/// accepted when reading.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Headers(BTreeMap<String, Vec<String>>);

impl Headers {
    pub fn new() -> Self {
        Self::default()
    }

    /// First value for `name`
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0
            .get(&name.to_ascii_lowercase())
            .and_then(|values| values.first())
            .map(String::as_str)
    }

    pub fn get_all(&self, name: &str) -> impl Iterator<Item = &str> {
        self.0
            .get(&name.to_ascii_lowercase())
            .into_iter()
            .flatten()
            .map(String::as_str)
    }

    /// Replace every value for `name`, returning the previous first value
    pub fn insert(&mut self, name: &str, value: impl Into<String>) -> Option<String> {
        self.0
            .insert(name.to_ascii_lowercase(), vec![value.into()])
            .and_then(|old| old.into_iter().next())
    }

    /// Add a value for `name`, keeping existing ones
    pub fn append(&mut self, name: &str, value: impl Into<String>) {
        self.0.entry(name.to_ascii_lowercase()).or_default().push(value.into());
    }

    /// Drop `name`, returning its first value
    pub fn remove(&mut self, name: &str) -> Option<String> {
        self.0
            .remove(&name.to_ascii_lowercase())
            .and_then(|values| values.into_iter().next())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.contains_key(&name.to_ascii_lowercase())
    }

    /// Every (name, value) pair, repeated names included
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0
            .iter()
            .flat_map(|(name, values)| values.iter().map(move |value| (name.as_str(), value.as_str())))
    }

    /// Number of distinct names
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<K: AsRef<str>, V: Into<String>> FromIterator<(K, V)> for Headers {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut headers = Headers::new();
        for (k, v) in iter {
            headers.append(k.as_ref(), v);
        }
        headers
    }
}

impl Serialize for Headers {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (name, values) in &self.0 {
            match values.as_slice() {
                [single] => map.serialize_entry(name, single)?,
                many => map.serialize_entry(name, many)?,
            }
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for Headers {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum OneOrMany {
            One(String),
            Many(Vec<String>),
        }

        let raw = BTreeMap::<String, OneOrMany>::deserialize(deserializer)?;
        let mut headers = Headers::new();
        for (name, values) in raw {
            match values {
                OneOrMany::One(value) => headers.append(&name, value),
                OneOrMany::Many(values) => {
                    for value in values {
                        headers.append(&name, value);
                    }
                }
            }
        }
        Ok(headers)
    }
}
