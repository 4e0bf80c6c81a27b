//! Full-path exclusion rules.
//!
//! A pattern is a regular expression that must match the *entire* entry path:
//! `data\.json` excludes `data.json` but not `sub/data.json`. Patterns that do
//! not compile never match; they are reported once at compile time and the
//! remaining rules keep working.

use regex::Regex;

/// Exclusion rules of one job, compiled once.
#[derive(Debug, Clone, Default)]
pub struct ExclusionSet {
    rules: Vec<Regex>,
}

impl ExclusionSet {
    /// Compile `patterns`, dropping (and logging) any that are malformed.
    pub fn compile<S: AsRef<str>>(patterns: &[S]) -> Self {
        let rules = patterns
            .iter()
            .filter_map(|pattern| {
                let pattern = pattern.as_ref();
                match anchored(pattern) {
                    Ok(rule) => Some(rule),
                    Err(err) => {
                        tracing::warn!("ignoring malformed exclude pattern {pattern:?}: {err}");
                        None
                    }
                }
            })
            .collect();
        Self { rules }
    }

    /// `true` when any rule matches the whole of `path`.
    pub fn is_excluded(&self, path: &str) -> bool {
        self.rules.iter().any(|rule| rule.is_match(path))
    }

    /// Number of usable rules.
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

/// One-off check that compiles `patterns` on every call.
///
/// Prefer [`ExclusionSet`] when checking many paths against the same rules.
pub fn is_excluded<S: AsRef<str>>(path: &str, patterns: &[S]) -> bool {
    patterns
        .iter()
        .any(|pattern| anchored(pattern.as_ref()).is_ok_and(|rule| rule.is_match(path)))
}

/// The bare pattern must compile on its own; otherwise an unbalanced group
/// such as `a)|(b` would close the anchoring group and match a prefix.
fn anchored(pattern: &str) -> Result<Regex, regex::Error> {
    Regex::new(pattern)?;
    Regex::new(&format!("^(?:{pattern})$"))
}
