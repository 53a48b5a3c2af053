//! Script selection for a page URL
//!
//! Policy, per record:
//! 1. Disabled records never run.
//! 2. Any matching `@exclude` rejects the record outright.
//! 3. `@match` then `@include` patterns are tried in order; the first hit
//!    accepts. A record declaring neither is inert.
//!
//! Output keeps the input order.

use crate::metadata::parse_metadata;
use crate::pattern::UrlPattern;
use crate::types::ScriptRecord;

/// Why a record was or was not selected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Disabled,
    Excluded,
    NoPatterns,
    NoMatch,
    Matched,
}

impl Verdict {
    pub fn is_match(self) -> bool {
        self == Verdict::Matched
    }
}

/// Evaluate one record against `url`.
pub fn evaluate(url: &str, script: &ScriptRecord) -> Verdict {
    if !script.enabled {
        return Verdict::Disabled;
    }

    let metadata = parse_metadata(&script.code);

    if metadata
        .excludes()
        .iter()
        .any(|pattern| UrlPattern::compile(pattern).matches(url))
    {
        return Verdict::Excluded;
    }

    let mut patterns = metadata
        .matches()
        .iter()
        .chain(metadata.includes())
        .peekable();

    if patterns.peek().is_none() {
        return Verdict::NoPatterns;
    }

    if patterns.any(|pattern| UrlPattern::compile(pattern).matches(url)) {
        Verdict::Matched
    } else {
        Verdict::NoMatch
    }
}

/// The records to inject into `url`, in input order.
pub fn resolve(url: &str, scripts: &[ScriptRecord]) -> Vec<ScriptRecord> {
    scripts
        .iter()
        .filter(|script| evaluate(url, script).is_match())
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn script(name: &str, headers: &[&str]) -> ScriptRecord {
        let mut code = String::from("// ==UserScript==\n");
        code.push_str(&format!("// @name {}\n", name));
        for header in headers {
            code.push_str("// ");
            code.push_str(header);
            code.push('\n');
        }
        code.push_str("// ==/UserScript==\nvoid 0;\n");

        ScriptRecord {
            id: format!("id_{}", name),
            name: name.to_string(),
            code,
            enabled: true,
            created: 0,
            modified: 0,
            version: None,
            update_url: None,
            install_url: None,
        }
    }

    fn names(scripts: &[ScriptRecord]) -> Vec<&str> {
        scripts.iter().map(|s| s.name.as_str()).collect()
    }

    #[test]
    fn test_exclude_takes_precedence() {
        let a = script("A", &["@match https://example.com/*"]);
        let b = script(
            "B",
            &["@exclude https://example.com/admin*", "@match https://example.com/*"],
        );
        let all = vec![a, b];

        assert_eq!(names(&resolve("https://example.com/admin/x", &all)), vec!["A"]);
        assert_eq!(names(&resolve("https://example.com/home", &all)), vec!["A", "B"]);
    }

    #[test]
    fn test_disabled_never_resolves() {
        let mut a = script("A", &["@match <all_urls>"]);
        a.enabled = false;
        let all = vec![a, script("B", &["@match *"])];
        assert_eq!(names(&resolve("https://anything.test/", &all)), vec!["B"]);
        assert_eq!(evaluate("https://anything.test/", &all[0]), Verdict::Disabled);
    }

    #[test]
    fn test_no_patterns_is_inert() {
        let a = script("A", &["@description does nothing"]);
        assert_eq!(evaluate("https://example.com/", &a), Verdict::NoPatterns);
        assert!(resolve("https://example.com/", &[a]).is_empty());
    }

    #[test]
    fn test_exclude_only_is_inert() {
        let a = script("A", &["@exclude https://other.com/*"]);
        assert_eq!(evaluate("https://example.com/", &a), Verdict::NoPatterns);
    }

    #[test]
    fn test_include_patterns_count() {
        let a = script("A", &["@include https://*.example.com/*"]);
        assert!(evaluate("https://www.example.com/x", &a).is_match());
        assert_eq!(evaluate("https://example.org/", &a), Verdict::NoMatch);
    }

    #[test]
    fn test_exclude_beats_all_urls() {
        let a = script("A", &["@match <all_urls>", "@exclude *://bank.test/*"]);
        assert_eq!(evaluate("https://bank.test/login", &a), Verdict::Excluded);
        assert!(evaluate("https://news.test/", &a).is_match());
    }

    #[test]
    fn test_output_keeps_input_order() {
        let all = vec![
            script("C", &["@match *"]),
            script("A", &["@match https://x.test/*"]),
            script("B", &["@include https://x.test/*"]),
        ];
        assert_eq!(names(&resolve("https://x.test/", &all)), vec!["C", "A", "B"]);
    }

    #[test]
    fn test_code_without_header_never_matches() {
        let mut a = script("A", &[]);
        a.code = "console.log('bare');".to_string();
        assert!(resolve("https://example.com/", &[a]).is_empty());
    }
}
