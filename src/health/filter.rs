//! Tag filters selecting probes for execution
//!
//! A filter is a list of terms separated by commas or whitespace. A plain
//! term must be present on a probe, a term prefixed with `-` must be absent.
//! `a,-b` selects probes tagged `a` but not `b`; the empty filter selects all.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

/// Error while parsing a tag filter
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FilterError {
    #[error("Negation without a tag")]
    EmptyNegation,
    #[error("Invalid tag term: {0}")]
    InvalidTerm(String),
}

/// Whether `tag` is a valid tag name
pub(crate) fn is_valid_tag(tag: &str) -> bool {
    !tag.is_empty()
        && !tag.starts_with('-')
        && tag
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | ':' | '/' | '-'))
}

/// Positive/negative tag selection over registered probes
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TagFilter {
    include: BTreeSet<String>,
    exclude: BTreeSet<String>,
    /// Match when any (instead of every) positive tag is present
    any: bool,
}

impl TagFilter {
    /// Filter selecting every probe
    pub fn all() -> Self {
        Self::default()
    }

    /// Parse a filter expression such as `a,-b` or `db cache -slow`
    pub fn parse(expr: &str) -> Result<Self, FilterError> {
        let mut filter = Self::default();

        for term in expr
            .split(|c: char| c == ',' || c.is_whitespace())
            .filter(|t| !t.is_empty())
        {
            match term.strip_prefix('-') {
                Some("") => return Err(FilterError::EmptyNegation),
                Some(tag) if is_valid_tag(tag) => {
                    filter.exclude.insert(tag.to_string());
                }
                None if is_valid_tag(term) => {
                    filter.include.insert(term.to_string());
                }
                _ => return Err(FilterError::InvalidTerm(term.to_string())),
            }
        }

        Ok(filter)
    }

    /// Build a filter from explicit tag lists
    pub fn new<I, E>(include: I, exclude: E) -> Self
    where
        I: IntoIterator,
        I::Item: Into<String>,
        E: IntoIterator,
        E::Item: Into<String>,
    {
        Self {
            include: include.into_iter().map(Into::into).collect(),
            exclude: exclude.into_iter().map(Into::into).collect(),
            any: false,
        }
    }

    /// Switch to OR mode: any positive tag is enough to match
    pub fn combine_with_or(mut self) -> Self {
        self.any = true;
        self
    }

    /// Whether a probe carrying `tags` is selected
    pub fn matches(&self, tags: &BTreeSet<String>) -> bool {
        if self.exclude.iter().any(|t| tags.contains(t)) {
            return false;
        }
        if self.include.is_empty() {
            return true;
        }
        if self.any {
            self.include.iter().any(|t| tags.contains(t))
        } else {
            self.include.iter().all(|t| tags.contains(t))
        }
    }

    /// Whether this filter selects everything
    pub fn is_empty(&self) -> bool {
        self.include.is_empty() && self.exclude.is_empty()
    }
}

impl FromStr for TagFilter {
    type Err = FilterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for TagFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let terms: Vec<String> = self
            .include
            .iter()
            .cloned()
            .chain(self.exclude.iter().map(|t| format!("-{}", t)))
            .collect();
        f.write_str(&terms.join(","))
    }
}
