//! Glob filters on object names
//!
//! `*` matches any run of characters (including `/`), `?` one character and
//! `[...]` a character class, as in shell globs. An object passes a filter
//! only when it matches every pattern.

use crate::error::ExportError;
use globset::{GlobBuilder, GlobMatcher};

#[derive(Debug, Clone, Default)]
pub struct PatternFilter {
    patterns: Vec<(String, GlobMatcher)>,
}

impl PatternFilter {
    /// Compile every pattern; a malformed glob is an `InvalidPattern` error
    pub fn new<S: AsRef<str>>(patterns: &[S]) -> Result<Self, ExportError> {
        let patterns = patterns
            .iter()
            .map(|p| {
                let p = p.as_ref();
                GlobBuilder::new(p)
                    .literal_separator(false)
                    .build()
                    .map(|glob| (p.to_string(), glob.compile_matcher()))
                    .map_err(|e| ExportError::InvalidPattern {
                        pattern: p.to_string(),
                        message: e.to_string(),
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { patterns })
    }

    /// Whether `key` matches all patterns; an empty filter matches anything
    pub fn matches(&self, key: &str) -> bool {
        let matched = self.patterns.iter().all(|(_, glob)| glob.is_match(key));
        tracing::debug!(
            "Matching {} against {:?}: {}",
            key,
            self.patterns.iter().map(|(p, _)| p).collect::<Vec<_>>(),
            matched
        );
        matched
    }
}
