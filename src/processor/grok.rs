//! Grok templates
//!
//! `%{NAME:capture}` expands to the named pattern inside a named group,
//! `%{NAME}` to the pattern inside a non-capturing group. Text around the
//! placeholders is regex syntax and is kept as is. The compiled expression
//! is anchored at both ends.

use crate::error::ExportError;
use regex::{Match, Regex};
use std::sync::OnceLock;

pub const DEFAULT_TEMPLATE: &str = "%{GREEDYDATA:value}";

static PLACEHOLDER: OnceLock<Regex> = OnceLock::new();

fn placeholder() -> &'static Regex {
    PLACEHOLDER.get_or_init(|| {
        Regex::new(r"%\{(\w+)(?::(\w+))?\}").expect("placeholder expression is valid")
    })
}

const BASE10NUM: &str = r"[+-]?(?:[0-9]+(?:\.[0-9]+)?|\.[0-9]+)";
const IPV4: &str = r"(?:(?:25[0-5]|2[0-4][0-9]|1[0-9]{2}|[1-9]?[0-9])\.){3}(?:25[0-5]|2[0-4][0-9]|1[0-9]{2}|[1-9]?[0-9])";

fn definition(name: &str) -> Option<&'static str> {
    let pattern = match name {
        "DATA" => ".*?",
        "GREEDYDATA" => ".*",
        "WORD" => r"\b\w+\b",
        "NOTSPACE" => r"\S+",
        "SPACE" => r"\s*",
        "INT" => r"[+-]?[0-9]+",
        "BASE10NUM" | "NUMBER" => BASE10NUM,
        "POSINT" => r"\b[1-9][0-9]*\b",
        "USERNAME" => r"[a-zA-Z0-9._-]+",
        "HOSTNAME" => r"\b[0-9A-Za-z][0-9A-Za-z-]{0,62}(?:\.[0-9A-Za-z][0-9A-Za-z-]{0,62})*\.?",
        "IP" => IPV4,
        "UUID" => r"[A-Fa-f0-9]{8}-(?:[A-Fa-f0-9]{4}-){3}[A-Fa-f0-9]{12}",
        "URIPATH" => r"(?:/[A-Za-z0-9$.+!*'(){},~:;=@#%_\-]*)+",
        _ => return None,
    };
    Some(pattern)
}

/// A compiled grok template
#[derive(Debug, Clone)]
pub struct GrokPattern {
    template: String,
    regex: Regex,
    captures: Vec<String>,
}

impl GrokPattern {
    /// Expand the placeholders and compile the anchored expression
    pub fn compile(template: &str) -> Result<Self, ExportError> {
        let invalid = |message: String| ExportError::InvalidPattern {
            pattern: template.to_string(),
            message,
        };

        let mut expanded = String::with_capacity(template.len() * 2);
        let mut captures = Vec::new();
        let mut last = 0;
        for caps in placeholder().captures_iter(template) {
            let whole = caps.get(0).ok_or_else(|| invalid("empty placeholder".into()))?;
            let name = &caps[1];
            let pattern = definition(name).ok_or_else(|| invalid(format!("unknown pattern {name}")))?;
            expanded.push_str(&template[last..whole.start()]);
            match caps.get(2) {
                Some(capture) => {
                    expanded.push_str(&format!("(?P<{}>{})", capture.as_str(), pattern));
                    captures.push(capture.as_str().to_string());
                }
                None => expanded.push_str(&format!("(?:{pattern})")),
            }
            last = whole.end();
        }
        expanded.push_str(&template[last..]);

        let regex = Regex::new(&format!("^{expanded}$")).map_err(|e| invalid(e.to_string()))?;
        Ok(Self {
            template: template.to_string(),
            regex,
            captures,
        })
    }

    /// The only named capture of a match.
    ///
    /// `None` when the line does not match, when more than one named
    /// group took part in the match or when the capture is empty.
    pub fn single_capture<'h>(&self, line: &'h str) -> Option<Match<'h>> {
        let caps = self.regex.captures(line)?;
        let mut fired = self.captures.iter().filter_map(|name| caps.name(name));
        let first = fired.next()?;
        if fired.next().is_some() {
            tracing::debug!("ambiguous match of {} on {:?}", self.template, line);
            return None;
        }
        (!first.as_str().is_empty()).then_some(first)
    }
}

impl Default for GrokPattern {
    fn default() -> Self {
        Self::compile(DEFAULT_TEMPLATE).expect("default template is valid")
    }
}
