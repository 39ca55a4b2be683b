// ==============================================================================
// Keyword name matching
// ==============================================================================
//
// Robot matches keyword names case-insensitively and ignores spaces and
// underscores. Names carrying embedded arguments (`Open Browser To ${url}`)
// additionally compile to an anchored regex matched against the literal call
// site. Hash and equality use the normalized form, so a `KeywordMatcher` can
// key the flat lookup index directly.

use std::fmt;
use std::hash::{Hash, Hasher};

use regex::Regex;
use smol_str::SmolStr;

#[derive(Clone)]
pub struct KeywordMatcher {
    name: SmolStr,
    normalized: String,
    embedded: Option<EmbeddedPattern>,
}

#[derive(Clone)]
struct EmbeddedPattern {
    regex: Regex,
    arg_names: Vec<SmolStr>,
}

impl KeywordMatcher {
    pub fn new(name: impl Into<SmolStr>) -> Self {
        let name = name.into();
        let normalized = normalize(&name);
        let embedded = compile_embedded(&name);
        Self {
            name,
            normalized,
            embedded,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn normalized(&self) -> &str {
        &self.normalized
    }

    pub fn has_embedded_args(&self) -> bool {
        self.embedded.is_some()
    }

    /// Exact (normalized) match. Embedded-argument names never match exactly.
    pub fn matches(&self, call: &str) -> bool {
        if self.embedded.is_some() {
            return self.matches_embedded(call).is_some();
        }
        self.normalized == normalize(call)
    }

    /// Match `call` against the embedded-argument pattern, returning each
    /// `(argument name, captured text)` pair on success.
    pub fn matches_embedded(&self, call: &str) -> Option<Vec<(SmolStr, SmolStr)>> {
        let pattern = self.embedded.as_ref()?;
        let captures = pattern.regex.captures(call)?;
        Some(
            pattern
                .arg_names
                .iter()
                .enumerate()
                .map(|(i, name)| {
                    let text = captures
                        .get(i + 1)
                        .map(|m| SmolStr::from(m.as_str()))
                        .unwrap_or_default();
                    (name.clone(), text)
                })
                .collect(),
        )
    }
}

/// Lowercase with spaces and underscores removed.
pub fn normalize(name: &str) -> String {
    name.chars()
        .filter(|c| *c != ' ' && *c != '_')
        .flat_map(|c| c.to_lowercase())
        .collect()
}

/// Compile `Open ${browser} To ${url:http.*}` into an anchored
/// case-insensitive regex. Returns `None` for names without embedded
/// arguments or with an invalid custom pattern.
fn compile_embedded(name: &str) -> Option<EmbeddedPattern> {
    if !name.contains("${") {
        return None;
    }

    let mut pattern = String::from("(?i)^");
    let mut arg_names = Vec::new();
    let mut rest = name;

    while let Some(open) = rest.find("${") {
        pattern.push_str(&regex::escape(&rest[..open]));
        let after = &rest[open + 2..];
        let close = find_closing_brace(after)?;
        let inner = &after[..close];
        let (arg_name, custom) = match inner.split_once(':') {
            Some((n, p)) => (n, Some(p)),
            None => (inner, None),
        };
        arg_names.push(SmolStr::from(arg_name));
        match custom {
            Some(custom) => {
                pattern.push('(');
                pattern.push_str(custom);
                pattern.push(')');
            }
            None => pattern.push_str("(.*?)"),
        }
        rest = &after[close + 1..];
    }
    pattern.push_str(&regex::escape(rest));
    pattern.push('$');

    let regex = match Regex::new(&pattern) {
        Ok(r) => r,
        Err(err) => {
            log::warn!("invalid embedded-argument pattern in '{name}': {err}");
            return None;
        }
    };
    Some(EmbeddedPattern { regex, arg_names })
}

/// Index of the `}` closing an embedded argument, honoring nested braces in
/// custom patterns like `${x:a{2}}`.
fn find_closing_brace(s: &str) -> Option<usize> {
    let mut depth = 0usize;
    for (i, c) in s.char_indices() {
        match c {
            '{' => depth += 1,
            '}' if depth == 0 => return Some(i),
            '}' => depth -= 1,
            _ => {}
        }
    }
    None
}

impl PartialEq for KeywordMatcher {
    fn eq(&self, other: &Self) -> bool {
        self.normalized == other.normalized
    }
}

impl Eq for KeywordMatcher {}

impl Hash for KeywordMatcher {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.normalized.hash(state);
    }
}

impl fmt::Debug for KeywordMatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeywordMatcher")
            .field("name", &self.name)
            .field("embedded", &self.embedded.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn case_space_underscore_insensitive() {
        let m = KeywordMatcher::new("Open Connection");
        assert!(m.matches("open connection"));
        assert!(m.matches("OPEN_CONNECTION"));
        assert!(m.matches("OpenConnection"));
        assert!(!m.matches("Open Connections"));
    }

    #[test]
    fn equality_on_normalized_form() {
        let a = KeywordMatcher::new("Log Many");
        let b = KeywordMatcher::new("log_many");
        assert_eq!(a, b);
    }

    #[test]
    fn embedded_argument_capture() {
        let m = KeywordMatcher::new("Open Browser To ${url}");
        assert!(m.has_embedded_args());
        let caps = m.matches_embedded("Open Browser To http://example.com").unwrap();
        assert_eq!(caps, vec![("url".into(), "http://example.com".into())]);
        assert!(m.matches_embedded("Close Browser").is_none());
    }

    #[test]
    fn embedded_custom_pattern() {
        let m = KeywordMatcher::new("Select ${count:\\d+} Rows");
        assert!(m.matches("Select 42 Rows"));
        assert!(!m.matches("Select many Rows"));
    }

    #[test]
    fn embedded_multiple_arguments() {
        let m = KeywordMatcher::new("${quantity} Copies Of ${item}");
        let caps = m.matches_embedded("3 Copies Of coffee").unwrap();
        assert_eq!(caps[0], ("quantity".into(), "3".into()));
        assert_eq!(caps[1], ("item".into(), "coffee".into()));
    }

    #[test]
    fn invalid_custom_pattern_disables_matching() {
        let m = KeywordMatcher::new("Bad ${x:([}");
        assert!(!m.has_embedded_args());
    }
}
