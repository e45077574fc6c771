//! Href resolution against a device base URL.

/// Strip trailing slashes so the base can be joined with `/`-prefixed paths.
pub fn normalize_base_url(base_url: &str) -> String {
    base_url.trim_end_matches('/').to_string()
}

/// Whether `s` starts with `prefix`, ignoring ASCII case.
pub(crate) fn starts_with_ignore_case(s: &str, prefix: &str) -> bool {
    s.len() >= prefix.len()
        && s.as_bytes()[..prefix.len()].eq_ignore_ascii_case(prefix.as_bytes())
}

/// Resolve a property or action `href` to an absolute URL.
///
/// Absolute `http(s)://` hrefs are returned unchanged so a Thing can point
/// at properties hosted elsewhere. Root-relative hrefs are appended to the
/// base, anything else is treated as a relative path segment. The result is
/// not validated.
pub fn resolve_url(base_url: &str, href: &str) -> String {
    if starts_with_ignore_case(href, "http://") || starts_with_ignore_case(href, "https://") {
        return href.to_string();
    }

    let base = base_url.trim_end_matches('/');
    if href.starts_with('/') {
        format!("{}{}", base, href)
    } else {
        format!("{}/{}", base, href)
    }
}

/// Join a fixed endpoint path (always `/`-prefixed) onto a base URL.
pub(crate) fn endpoint(base_url: &str, path: &str) -> String {
    format!("{}{}", base_url.trim_end_matches('/'), path)
}
