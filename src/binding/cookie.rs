//! `Cookie` request header parsing.

use axum::http::header::COOKIE;
use axum::http::HeaderMap;
use serde::Serialize;

/// One `name=value` pair from a `Cookie` header.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Cookie {
    pub name: String,
    pub value: String,
}

/// All cookies sent with the request, in header order. Multiple `Cookie`
/// headers are concatenated.
pub fn parse_cookies(headers: &HeaderMap) -> Vec<Cookie> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|line| line.split(';'))
        .filter_map(|pair| {
            let (name, value) = pair.split_once('=')?;
            let name = name.trim();
            if name.is_empty() {
                return None;
            }
            let value = value.trim().trim_matches('"');
            Some(Cookie {
                name: name.to_string(),
                value: value.to_string(),
            })
        })
        .collect()
}

/// First cookie named `name`.
pub fn find_cookie(headers: &HeaderMap, name: &str) -> Option<Cookie> {
    parse_cookies(headers).into_iter().find(|c| c.name == name)
}
