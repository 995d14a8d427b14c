//! Path-prefix ignore filter.

/// Drops events whose path starts with a configured prefix.
///
/// Matching is a literal string prefix test, not a glob. Prefixes are
/// checked in configuration order and the first match wins.
#[derive(Debug, Clone, Default)]
pub struct IgnoreFilter {
    prefixes: Vec<String>,
}

impl IgnoreFilter {
    pub fn new<I, S>(prefixes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            prefixes: prefixes.into_iter().map(Into::into).collect(),
        }
    }

    /// The first prefix that matches `path`, if any.
    pub fn matching_prefix(&self, path: &str) -> Option<&str> {
        self.prefixes
            .iter()
            .find(|prefix| path.starts_with(prefix.as_str()))
            .map(String::as_str)
    }

    pub fn is_ignored(&self, path: &str) -> bool {
        self.matching_prefix(path).is_some()
    }
}
