//! Legacy session detection

use axum::http::{header, HeaderMap};

/// Check whether a raw `Cookie` header carries the session cookie
///
/// This is a plain substring test for `"<name>="`, so it also fires when the
/// text appears inside another cookie's name or value. The header is taken
/// as raw bytes; values that are not visible ASCII are still searched.
pub fn has_session(cookie_header: impl AsRef<[u8]>, session_cookie: &str) -> bool {
    let needle = format!("{}=", session_cookie);
    let needle = needle.as_bytes();
    cookie_header
        .as_ref()
        .windows(needle.len())
        .any(|w| w == needle)
}

/// All `Cookie` header lines of a request joined into one raw value
pub fn cookie_header(headers: &HeaderMap) -> Vec<u8> {
    let mut joined = Vec::new();
    for (i, value) in headers.get_all(header::COOKIE).iter().enumerate() {
        if i > 0 {
            joined.extend_from_slice(b"; ");
        }
        joined.extend_from_slice(value.as_bytes());
    }
    joined
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_detects_session_cookie() {
        assert!(has_session("WikiSession=abc", "WikiSession"));
        assert!(has_session("theme=dark; WikiSession=abc; lang=en", "WikiSession"));
        assert!(!has_session("theme=dark", "WikiSession"));
        assert!(!has_session("", "WikiSession"));
    }

    #[test]
    fn test_match_is_loose() {
        // Inside another cookie's value
        assert!(has_session("tracker=WikiSession=1", "WikiSession"));
        // Suffix of another cookie's name
        assert!(has_session("OldWikiSession=1", "WikiSession"));
        // Name without '=' does not count
        assert!(!has_session("WikiSession", "WikiSession"));
    }

    #[test]
    fn test_joins_multiple_cookie_lines() {
        let mut headers = HeaderMap::new();
        headers.append(header::COOKIE, HeaderValue::from_static("theme=dark"));
        headers.append(header::COOKIE, HeaderValue::from_static("WikiSession=abc"));

        let joined = cookie_header(&headers);
        assert_eq!(joined, b"theme=dark; WikiSession=abc");
        assert!(has_session(&joined, "WikiSession"));
        assert!(cookie_header(&HeaderMap::new()).is_empty());
    }

    #[test]
    fn test_non_ascii_cookie_line_is_searched() {
        let mut headers = HeaderMap::new();
        headers.append(
            header::COOKIE,
            HeaderValue::from_bytes(b"name=caf\xe9; WikiSession=abc").unwrap(),
        );
        assert!(headers.get(header::COOKIE).unwrap().to_str().is_err());

        assert!(has_session(cookie_header(&headers), "WikiSession"));
    }
}
