//! Identifier normalization
//!
//! Terraform identifiers may only contain ASCII letters, digits and
//! underscores and must not start with a digit.

use regex::Regex;
use std::sync::OnceLock;

static EMOJI: OnceLock<Regex> = OnceLock::new();
static NON_IDENTIFIER: OnceLock<Regex> = OnceLock::new();

fn emoji() -> &'static Regex {
    EMOJI.get_or_init(|| {
        Regex::new(concat!(
            "[",
            "\u{1F600}-\u{1F64F}",
            "\u{1F300}-\u{1F5FF}",
            "\u{1F680}-\u{1F6FF}",
            "\u{1F1E0}-\u{1F1FF}",
            "\u{2500}-\u{2BEF}",
            "\u{2702}-\u{27B0}",
            "\u{24C2}-\u{1F251}",
            "\u{1F926}-\u{1F937}",
            "\u{10000}-\u{10FFFF}",
            "\u{2640}-\u{2642}",
            "\u{2600}-\u{2B55}",
            "\u{200D}",
            "\u{23CF}",
            "\u{23E9}",
            "\u{231A}",
            "\u{FE0F}",
            "\u{3030}",
            "]+"
        ))
        .expect("emoji character class is valid")
    })
}

fn non_identifier() -> &'static Regex {
    NON_IDENTIFIER
        .get_or_init(|| Regex::new("[^a-zA-Z0-9_]+").expect("identifier class is valid"))
}

/// Turn arbitrary text into a valid symbolic identifier.
///
/// Emoji and pictographs are dropped, every run of other non-identifier
/// characters collapses to a single `_`, and a leading digit gets a `_`
/// prefix. The function is idempotent.
pub fn normalize_identifier(identifier: &str) -> String {
    let without_emoji = emoji().replace_all(identifier, "");
    let collapsed = non_identifier().replace_all(&without_emoji, "_");
    if collapsed.starts_with(|c: char| c.is_ascii_digit()) {
        format!("_{collapsed}")
    } else {
        collapsed.into_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collapses_separators() {
        assert_eq!(normalize_identifier("my-cluster name"), "my_cluster_name");
        assert_eq!(normalize_identifier("a--//b"), "a_b");
    }

    #[test]
    fn test_prefixes_leading_digit() {
        assert_eq!(normalize_identifier("0123-abc"), "_0123_abc");
    }

    #[test]
    fn test_drops_emoji() {
        assert_eq!(normalize_identifier("rocket🚀pool"), "rocketpool");
    }

    #[test]
    fn test_keeps_valid_identifier() {
        assert_eq!(
            normalize_identifier("databricks_cluster_abc_123"),
            "databricks_cluster_abc_123"
        );
        assert_eq!(normalize_identifier(""), "");
    }

    #[test]
    fn test_is_idempotent_on_mixed_input() {
        let once = normalize_identifier("9 lives/é-ñ 🚀");
        assert_eq!(normalize_identifier(&once), once);
    }
}
