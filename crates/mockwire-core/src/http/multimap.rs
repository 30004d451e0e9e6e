//! Ordered string multi-map used for headers, search params and form data.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;
use std::fmt;

/// Insertion-ordered multi-map of string keys to string values.
///
/// Equality and containment compare the multiset of values per key and ignore
/// ordering, so `a=1&a=2` equals `a=2&a=1`.
#[derive(Debug, Clone, Default)]
pub struct HttpMultiMap {
    entries: Vec<(String, String)>,
}

impl HttpMultiMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// First value stored under `key`.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// All values stored under `key`, in insertion order.
    pub fn get_all(&self, key: &str) -> Vec<&str> {
        self.entries
            .iter()
            .filter(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
            .collect()
    }

    /// Replace every value of `key` with a single value.
    ///
    /// The new value takes the position of the first existing entry, or is appended.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        let value = value.into();
        match self.entries.iter().position(|(k, _)| *k == key) {
            Some(first) => {
                self.entries[first].1 = value;
                let mut index = 0;
                self.entries.retain(|(k, _)| {
                    let keep = index <= first || *k != key;
                    index += 1;
                    keep
                });
            }
            None => self.entries.push((key, value)),
        }
    }

    pub fn append(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.entries.push((key.into(), value.into()));
    }

    pub fn has(&self, key: &str) -> bool {
        self.entries.iter().any(|(k, _)| k == key)
    }

    pub fn delete(&mut self, key: &str) {
        self.entries.retain(|(k, _)| k != key);
    }

    /// Unique keys in first-insertion order.
    pub fn keys(&self) -> Vec<&str> {
        let mut keys: Vec<&str> = Vec::new();
        for (k, _) in &self.entries {
            if !keys.contains(&k.as_str()) {
                keys.push(k);
            }
        }
        keys
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Every key of `other` is present here with at least the same multiset of values.
    pub fn contains(&self, other: &HttpMultiMap) -> bool {
        other.keys().into_iter().all(|key| {
            let mut available = self.get_all(key);
            other.get_all(key).into_iter().all(|value| {
                match available.iter().position(|candidate| *candidate == value) {
                    Some(position) => {
                        available.swap_remove(position);
                        true
                    }
                    None => false,
                }
            })
        })
    }

    /// Same keys with the same multiset of values, regardless of order.
    pub fn equals(&self, other: &HttpMultiMap) -> bool {
        self.len() == other.len() && self.contains(other)
    }

    /// Copy of this map with lowercased keys, as used for header names.
    pub fn with_lowercase_keys(&self) -> Self {
        self.entries
            .iter()
            .map(|(k, v)| (k.to_lowercase(), v.clone()))
            .collect()
    }

    /// Parse a url-encoded string (`a=1&b=2`) with percent decoding.
    pub fn parse_query(query: &str) -> Self {
        let mut result = Self::new();
        let query = query.strip_prefix('?').unwrap_or(query);

        for pair in query.split('&') {
            if pair.is_empty() {
                continue;
            }

            let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
            result.append(decode_component(key), decode_component(value));
        }

        result
    }

    /// JSON view used by expressions: single values become strings, repeated keys arrays.
    pub fn to_value(&self) -> Value {
        let mut map = serde_json::Map::new();
        for key in self.keys() {
            let values = self.get_all(key);
            let value = if values.len() == 1 {
                Value::String(values[0].to_string())
            } else {
                Value::Array(
                    values
                        .into_iter()
                        .map(|v| Value::String(v.to_string()))
                        .collect(),
                )
            };
            map.insert(key.to_string(), value);
        }
        Value::Object(map)
    }
}

fn decode_component(raw: &str) -> String {
    let spaced = raw.replace('+', " ");
    urlencoding::decode(&spaced)
        .map(|s| s.into_owned())
        .unwrap_or(spaced)
}

impl PartialEq for HttpMultiMap {
    fn eq(&self, other: &Self) -> bool {
        self.equals(other)
    }
}

impl Eq for HttpMultiMap {}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for HttpMultiMap {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            entries: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

/// Url-encoded rendering (`a=1&b=2`).
impl fmt::Display for HttpMultiMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (index, (k, v)) in self.entries.iter().enumerate() {
            if index > 0 {
                f.write_str("&")?;
            }
            write!(f, "{}={}", urlencoding::encode(k), urlencoding::encode(v))?;
        }
        Ok(())
    }
}

impl Serialize for HttpMultiMap {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        self.to_value().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for HttpMultiMap {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = Value::deserialize(deserializer)?;
        let Value::Object(map) = value else {
            return Err(serde::de::Error::custom(
                "Expected an object of string or string-array values",
            ));
        };

        let mut result = HttpMultiMap::new();
        for (key, value) in map {
            match value {
                Value::Array(items) => {
                    for item in items {
                        result.append(key.clone(), scalar_to_string(item));
                    }
                }
                other => result.append(key, scalar_to_string(other)),
            }
        }
        Ok(result)
    }
}

fn scalar_to_string(value: Value) -> String {
    match value {
        Value::String(s) => s,
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use serde_json::json;

    fn m(pairs: &[(&str, &str)]) -> HttpMultiMap {
        pairs.iter().copied().collect()
    }

    #[rstest]
    #[case("", &[])]
    #[case("page=1", &[("page", "1")])]
    #[case("page=1&limit=10", &[("page", "1"), ("limit", "10")])]
    #[case("?page=1", &[("page", "1")])]
    #[case("key=value%20with%20spaces", &[("key", "value with spaces")])]
    #[case("key+name=a+b", &[("key name", "a b")])]
    #[case("page=1&page=2", &[("page", "1"), ("page", "2")])]
    #[case("page=1&&limit=10", &[("page", "1"), ("limit", "10")])]
    #[case("page&limit=10", &[("page", ""), ("limit", "10")])]
    fn test_parse_query(#[case] query: &str, #[case] expected: &[(&str, &str)]) {
        assert_eq!(HttpMultiMap::parse_query(query), m(expected));
    }

    #[rstest]
    #[case(&[("name", "User"), ("other", "param")], &[("name", "User")], true)]
    #[case(&[("name", "User")], &[("name", "User"), ("other", "param")], false)]
    #[case(&[("tag", "a"), ("tag", "b")], &[("tag", "b")], true)]
    #[case(&[("tag", "a")], &[("tag", "a"), ("tag", "a")], false)]
    #[case(&[("tag", "a"), ("tag", "a")], &[("tag", "a"), ("tag", "a")], true)]
    #[case(&[], &[], true)]
    #[case(&[("name", "User")], &[], true)]
    fn test_contains(
        #[case] receiver: &[(&str, &str)],
        #[case] other: &[(&str, &str)],
        #[case] expected: bool,
    ) {
        assert_eq!(m(receiver).contains(&m(other)), expected);
    }

    #[rstest]
    #[case(&[("a", "1"), ("a", "2")], &[("a", "2"), ("a", "1")], true)]
    #[case(&[("a", "1")], &[("a", "1"), ("b", "2")], false)]
    #[case(&[("a", "1"), ("a", "1")], &[("a", "1"), ("b", "1")], false)]
    fn test_equals(
        #[case] left: &[(&str, &str)],
        #[case] right: &[(&str, &str)],
        #[case] expected: bool,
    ) {
        assert_eq!(m(left).equals(&m(right)), expected);
        assert_eq!(m(right).equals(&m(left)), expected);
    }

    #[rstest]
    fn test_set_replaces_all_values_in_place() {
        let mut map = m(&[("a", "1"), ("b", "2"), ("a", "3")]);
        map.set("a", "9");
        assert_eq!(map.iter().collect::<Vec<_>>(), vec![("a", "9"), ("b", "2")]);

        map.set("c", "4");
        assert_eq!(map.get("c"), Some("4"));
    }

    #[rstest]
    fn test_get_all_delete_and_has() {
        let mut map = m(&[("a", "1"), ("b", "2"), ("a", "3")]);
        assert_eq!(map.get("a"), Some("1"));
        assert_eq!(map.get_all("a"), vec!["1", "3"]);
        assert_eq!(map.keys(), vec!["a", "b"]);

        map.delete("a");
        assert!(!map.has("a"));
        assert!(map.has("b"));
        assert_eq!(map.len(), 1);
    }

    #[rstest]
    fn test_display_encodes_entries() {
        let map = m(&[("name", "John Doe"), ("page", "1")]);
        assert_eq!(map.to_string(), "name=John%20Doe&page=1");
    }

    #[rstest]
    fn test_deserialize_from_object() {
        let map: HttpMultiMap =
            serde_json::from_value(json!({"tag": ["a", "b"], "page": 1})).expect("valid map");
        assert_eq!(map.get_all("tag"), vec!["a", "b"]);
        assert_eq!(map.get("page"), Some("1"));
        assert_eq!(
            serde_json::to_value(&map).expect("serializable"),
            json!({"tag": ["a", "b"], "page": "1"})
        );
    }
}
