//! URL helpers for install detection
//!
//! These work directly on string slices; navigation URLs are not parsed
//! into a full URL type.

/// File suffix that marks a URL as an installable userscript.
pub const USERSCRIPT_SUFFIX: &str = ".user.js";

/// The part after `scheme://`, if the URL has one.
fn after_scheme(url: &str) -> Option<&str> {
    url.split_once("://").map(|(_, rest)| rest)
}

/// Path of a URL without query or fragment; `/` when there is none.
pub fn extract_path(url: &str) -> &str {
    let rest = match after_scheme(url) {
        Some(rest) => rest,
        None => return "/",
    };

    let location = rest.split(['?', '#']).next().unwrap_or_default();
    match location.find('/') {
        Some(slash) => &location[slash..],
        None => "/",
    }
}

/// Whether navigating to `url` should open the install flow.
pub fn is_userscript_url(url: &str) -> bool {
    let path = extract_path(url).as_bytes();
    let suffix = USERSCRIPT_SUFFIX.as_bytes();
    path.len() >= suffix.len() && path[path.len() - suffix.len()..].eq_ignore_ascii_case(suffix)
}

/// Install page URL carrying the script URL as `?url=`.
pub fn install_page_url(install_page: &str, script_url: &str) -> String {
    format!("{}?url={}", install_page, urlencoding::encode(script_url))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_path() {
        assert_eq!(extract_path("https://example.com/path/to/file"), "/path/to/file");
        assert_eq!(extract_path("https://example.com/"), "/");
        assert_eq!(extract_path("https://example.com"), "/");
        assert_eq!(extract_path("https://example.com?query"), "/");
        assert_eq!(extract_path("https://example.com/a.js?x=1#frag"), "/a.js");
        assert_eq!(extract_path("https://example.com#/a.user.js"), "/");
        assert_eq!(extract_path("file:///home/me/a.user.js"), "/home/me/a.user.js");
    }

    #[test]
    fn test_is_userscript_url() {
        assert!(is_userscript_url("https://example.com/scripts/foo.user.js"));
        assert!(is_userscript_url("https://example.com/FOO.USER.JS"));
        assert!(is_userscript_url("https://example.com/foo.user.js?v=2"));
        assert!(is_userscript_url("https://example.com/foo.user.js#top"));
        assert!(!is_userscript_url("https://example.com/foo.js"));
        assert!(!is_userscript_url("https://example.com/foo.user.js/readme"));
        assert!(!is_userscript_url("https://example.com/?file=foo.user.js"));
        assert!(!is_userscript_url("not a url"));
    }

    #[test]
    fn test_install_page_url() {
        assert_eq!(
            install_page_url("install/install.html", "https://a.com/x y.user.js?v=1"),
            "install/install.html?url=https%3A%2F%2Fa.com%2Fx%20y.user.js%3Fv%3D1"
        );
    }
}
