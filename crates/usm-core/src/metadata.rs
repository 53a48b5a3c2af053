//! Userscript metadata block parsing
//!
//! A userscript declares itself in a comment header:
//!
//! ```text
//! // ==UserScript==
//! // @name     Example
//! // @match    https://example.com/*
//! // ==/UserScript==
//! ```
//!
//! Parsing is pure and never fails: a source without a block yields an
//! empty [`ParsedMetadata`].

use std::collections::BTreeMap;

use serde::Serialize;

pub const BLOCK_START: &str = "==UserScript==";
pub const BLOCK_END: &str = "==/UserScript==";

/// Declaration key to its values, in source order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ParsedMetadata {
    entries: BTreeMap<String, Vec<String>>,
}

impl ParsedMetadata {
    /// All values for a key. Absent keys yield an empty slice.
    pub fn values(&self, key: &str) -> &[String] {
        self.entries.get(key).map(Vec::as_slice).unwrap_or(&[])
    }

    /// First value for a key.
    pub fn first(&self, key: &str) -> Option<&str> {
        self.values(key).first().map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn name(&self) -> Option<&str> {
        self.first("name")
    }

    pub fn version(&self) -> Option<&str> {
        self.first("version")
    }

    pub fn description(&self) -> Option<&str> {
        self.first("description")
    }

    pub fn author(&self) -> Option<&str> {
        self.first("author")
    }

    /// `@updateURL`, falling back to `@downloadURL`.
    pub fn update_url(&self) -> Option<&str> {
        self.first("updateURL").or_else(|| self.first("downloadURL"))
    }

    pub fn matches(&self) -> &[String] {
        self.values("match")
    }

    pub fn includes(&self) -> &[String] {
        self.values("include")
    }

    pub fn excludes(&self) -> &[String] {
        self.values("exclude")
    }

    fn push(&mut self, key: &str, value: &str) {
        self.entries
            .entry(key.to_string())
            .or_default()
            .push(value.to_string());
    }
}

/// Parse the first metadata block in `code`.
pub fn parse_metadata(code: &str) -> ParsedMetadata {
    let mut metadata = ParsedMetadata::default();

    let mut lines = code.lines();
    if !lines.any(|line| line.contains(BLOCK_START)) {
        return metadata;
    }

    let mut block = Vec::new();
    let mut closed = false;
    for line in lines {
        if line.contains(BLOCK_END) {
            closed = true;
            break;
        }
        block.push(line);
    }

    if !closed {
        return metadata;
    }

    for line in block {
        if let Some((key, value)) = parse_declaration(line) {
            metadata.push(key, value);
        }
    }

    metadata
}

/// Extract `@<key><whitespace><value>` from a header line.
///
/// The declaration may start anywhere in the line (normally after `//`).
/// Keys are word characters; the value is the trimmed rest of the line.
fn parse_declaration(line: &str) -> Option<(&str, &str)> {
    for (at, _) in line.match_indices('@') {
        let rest = &line[at + 1..];
        let key_len = rest
            .bytes()
            .take_while(|b| b.is_ascii_alphanumeric() || *b == b'_')
            .count();
        if key_len == 0 {
            continue;
        }

        let (key, tail) = rest.split_at(key_len);
        if !tail.starts_with(|c: char| c.is_whitespace()) {
            continue;
        }

        let value = tail.trim();
        if value.is_empty() {
            continue;
        }

        return Some((key, value));
    }

    None
}
