//! OGC key/value-pair parameters.

use url::form_urlencoded;

/// Ordered parameter list with case-insensitive keys.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KvpParams(Vec<(String, String)>);

impl KvpParams {
    /// Parses a raw query string (without the leading `?`) or a
    /// form-urlencoded body.
    pub fn parse(raw: &str) -> Self {
        let raw = raw.strip_prefix('?').unwrap_or(raw);
        Self(
            form_urlencoded::parse(raw.as_bytes())
                .into_owned()
                .filter(|(k, _)| !k.is_empty())
                .collect(),
        )
    }

    pub fn from_bytes(raw: &[u8]) -> Self {
        Self(
            form_urlencoded::parse(raw)
                .into_owned()
                .filter(|(k, _)| !k.is_empty())
                .collect(),
        )
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// First value for `key`, compared case-insensitively.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v.as_str())
    }

    /// First non-blank value among `keys`, trimmed.
    pub fn first_of(&self, keys: &[&str]) -> Option<&str> {
        keys.iter()
            .filter_map(|k| self.get(k))
            .map(str::trim)
            .find(|v| !v.is_empty())
    }

    pub fn contains(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    /// Replaces the first value for `key` (keeping its spelling) and drops
    /// duplicates, or appends a new pair.
    pub fn set(&mut self, key: &str, value: impl Into<String>) {
        let value = value.into();
        let mut seen = false;
        self.0.retain_mut(|(k, v)| {
            if !k.eq_ignore_ascii_case(key) {
                return true;
            }
            if seen {
                return false;
            }
            seen = true;
            *v = value.clone();
            true
        });
        if !seen {
            self.0.push((key.to_string(), value));
        }
    }

    /// Removes every pair for `key`; returns whether anything was removed.
    pub fn remove(&mut self, key: &str) -> bool {
        let before = self.0.len();
        self.0.retain(|(k, _)| !k.eq_ignore_ascii_case(key));
        self.0.len() != before
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Serializes back to `application/x-www-form-urlencoded`.
    pub fn to_query_string(&self) -> String {
        form_urlencoded::Serializer::new(String::new())
            .extend_pairs(self.0.iter())
            .finish()
    }
}

impl FromIterator<(String, String)> for KvpParams {
    fn from_iter<T: IntoIterator<Item = (String, String)>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_case_insensitive_lookup() {
        let p = KvpParams::parse("?service=WMS&Request=GetMap&layers=topp%3Astates");
        assert_eq!(p.get("SERVICE"), Some("WMS"));
        assert_eq!(p.get("request"), Some("GetMap"));
        assert_eq!(p.get("LAYERS"), Some("topp:states"));
        assert_eq!(p.get("missing"), None);
    }

    #[test]
    fn test_first_of_skips_blank_values() {
        let p = KvpParams::parse("LAYERS=&TYPENAME=%20topp:roads%20");
        assert_eq!(p.first_of(&["LAYERS", "LAYER", "TYPENAME"]), Some("topp:roads"));
    }

    #[test]
    fn test_set_keeps_original_spelling() {
        let mut p = KvpParams::parse("Layers=a&foo=1&LAYERS=b");
        p.set("LAYERS", "c");
        assert_eq!(p.to_query_string(), "Layers=c&foo=1");
        p.set("STYLES", "x y");
        assert_eq!(p.to_query_string(), "Layers=c&foo=1&STYLES=x+y");
        assert!(p.remove("foo"));
        assert!(!p.remove("foo"));
        assert_eq!(p.len(), 2);
    }
}
