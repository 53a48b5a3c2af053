//! URL glob matching for `@match` / `@include` / `@exclude`
//!
//! Patterns are flat string globs: `*` matches any run of characters
//! (including none) and everything else is literal. There is no notion
//! of scheme, host or path boundaries, so `https://*.example.com/*` also
//! accepts `https://evil.test/?.example.com/`. Hosts needing strict
//! host scoping must express it in the pattern itself.

use regex::Regex;

/// Patterns that match every URL.
pub const ALL_URLS: &str = "<all_urls>";

/// A compiled URL pattern.
#[derive(Debug, Clone)]
pub enum UrlPattern {
    /// `<all_urls>` or `*`
    Any,
    Glob(Regex),
    /// The pattern did not compile and never matches
    Invalid,
}

impl UrlPattern {
    pub fn compile(pattern: &str) -> Self {
        if pattern == ALL_URLS || pattern == "*" {
            return Self::Any;
        }

        match Regex::new(&glob_to_regex(pattern)) {
            Ok(regex) => Self::Glob(regex),
            Err(e) => {
                log::warn!("Invalid pattern {:?}: {}", pattern, e);
                Self::Invalid
            }
        }
    }

    /// Full-string match against `url`.
    pub fn matches(&self, url: &str) -> bool {
        match self {
            Self::Any => true,
            Self::Glob(regex) => regex.is_match(url),
            Self::Invalid => false,
        }
    }
}

/// Whether `url` satisfies a single pattern.
pub fn matches_pattern(url: &str, pattern: &str) -> bool {
    UrlPattern::compile(pattern).matches(url)
}

/// Whether any pattern in `patterns` accepts `url`, in declared order.
pub fn matches_any<S: AsRef<str>>(url: &str, patterns: &[S]) -> bool {
    patterns
        .iter()
        .any(|pattern| matches_pattern(url, pattern.as_ref()))
}

/// Escape every literal segment and join them with `.*`, anchored.
fn glob_to_regex(pattern: &str) -> String {
    let mut out = String::with_capacity(pattern.len() + 8);
    out.push('^');
    for (i, literal) in pattern.split('*').enumerate() {
        if i > 0 {
            out.push_str(".*");
        }
        out.push_str(&regex::escape(literal));
    }
    out.push('$');
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_urls() {
        assert!(matches_pattern("https://example.com/", "<all_urls>"));
        assert!(matches_pattern("about:blank", "*"));
        assert!(matches_pattern("", "*"));
    }

    #[test]
    fn test_wildcard_matches_any_sequence() {
        assert!(matches_pattern("https://example.com/", "https://example.com/*"));
        assert!(matches_pattern("https://example.com/a/b?c=d", "https://example.com/*"));
        assert!(matches_pattern("https://www.example.com/x", "https://*.example.com/*"));
        assert!(!matches_pattern("http://example.com/", "https://example.com/*"));
    }

    #[test]
    fn test_match_is_anchored() {
        assert!(!matches_pattern("https://example.com/page", "https://example.com/"));
        assert!(!matches_pattern("xhttps://example.com/", "https://example.com/*"));
        assert!(matches_pattern("https://example.com/", "https://example.com/"));
    }

    #[test]
    fn test_metacharacters_are_literal() {
        assert!(matches_pattern("https://a.com/?q=1", "https://a.com/?q=1"));
        assert!(!matches_pattern("https://aXcom/", "https://a.com/"));
        assert!(matches_pattern("https://a.com/(x)+[y]", "https://a.com/(x)+[y]"));
        assert!(matches_pattern("https://a.com/$^|\\", "https://a.com/$^|\\"));
    }

    #[test]
    fn test_no_host_boundary() {
        assert!(matches_pattern(
            "https://evil.test/?.example.com/",
            "https://*.example.com/*"
        ));
    }

    #[test]
    fn test_matches_any_short_circuits_on_order() {
        let patterns = ["https://a.com/*", "https://b.com/*"];
        assert!(matches_any("https://b.com/x", &patterns));
        assert!(!matches_any("https://c.com/x", &patterns));
        assert!(!matches_any::<&str>("https://c.com/x", &[]));
    }

    #[test]
    fn test_glob_to_regex() {
        assert_eq!(glob_to_regex("a*b"), "^a.*b$");
        assert_eq!(glob_to_regex("a.b"), "^a\\.b$");
    }
}
