use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Header name -> ordered list of values, exactly as the wire format requires.
///
/// Key insertion order is preserved (first-seen name order) and each name
/// keeps the exact casing it arrived with. All lookups in this codebase are
/// case-insensitive (`Sentry-Trace`, `Content-Type`, redaction matches) so
/// every read here goes through [`HeaderMap::get`] rather than indexing the
/// map directly.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HeaderMap(IndexMap<String, Vec<String>>);

impl HeaderMap {
    pub fn new() -> Self {
        Self(IndexMap::new())
    }

    /// Append a value under `name`, creating the entry if this is the first
    /// time `name` (case-insensitively) has been seen.
    pub fn append(&mut self, name: &str, value: impl Into<String>) {
        if let Some(existing_key) = self.find_key(name) {
            self.0.get_mut(&existing_key).unwrap().push(value.into());
        } else {
            self.0.insert(name.to_string(), vec![value.into()]);
        }
    }

    pub fn set(&mut self, name: &str, value: impl Into<String>) {
        if let Some(existing_key) = self.find_key(name) {
            self.0.insert(existing_key, vec![value.into()]);
        } else {
            self.0.insert(name.to_string(), vec![value.into()]);
        }
    }

    pub fn remove(&mut self, name: &str) {
        if let Some(existing_key) = self.find_key(name) {
            self.0.shift_remove(&existing_key);
        }
    }

    /// Case-insensitive lookup of all values for `name`.
    pub fn get(&self, name: &str) -> Option<&[String]> {
        self.find_key(name)
            .map(|key| self.0.get(&key).unwrap().as_slice())
    }

    /// First value for `name`, case-insensitive.
    pub fn get_first(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(|values| values.first()).map(String::as_str)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.find_key(name).is_some()
    }

    /// True if any header name contains `needle`, case-insensitively.
    pub fn any_name_contains(&self, needle: &str) -> bool {
        let needle = needle.to_ascii_lowercase();
        self.0.keys().any(|k| k.to_ascii_lowercase().contains(&needle))
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Vec<String>)> {
        self.0.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    fn find_key(&self, name: &str) -> Option<String> {
        self.0
            .keys()
            .find(|k| k.eq_ignore_ascii_case(name))
            .cloned()
    }
}

impl FromIterator<(String, Vec<String>)> for HeaderMap {
    fn from_iter<T: IntoIterator<Item = (String, Vec<String>)>>(iter: T) -> Self {
        Self(IndexMap::from_iter(iter))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn case_insensitive_lookup_preserves_original_casing() {
        let mut headers = HeaderMap::new();
        headers.append("Sentry-Trace", "abc-1");
        headers.append("sentry-trace", "def-2");

        assert_eq!(headers.get("SENTRY-TRACE"), Some(&["abc-1".to_string(), "def-2".to_string()][..]));
        assert_eq!(headers.iter().count(), 1);
        assert_eq!(headers.iter().next().unwrap().0, "Sentry-Trace");
    }

    #[test]
    fn any_name_contains_matches_substring_case_insensitively() {
        let mut headers = HeaderMap::new();
        headers.append("X-Api-Key", "secret");
        assert!(headers.any_name_contains("api-key"));
        assert!(!headers.any_name_contains("cookie"));
    }
}
