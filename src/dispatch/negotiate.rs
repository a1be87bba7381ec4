//! Content negotiation and response serialisation.
//!
//! # Design Decisions
//! - A single declared produced type wins outright
//! - Otherwise the first declared type that the `Accept` header names
//!   (full type or bare subtype, case-insensitive) wins
//! - No match falls back to the first declared type, or JSON

use thiserror::Error;

use crate::dispatch::handler::ReplyBody;

pub const APPLICATION_JSON: &str = "application/json";
pub const APPLICATION_XML: &str = "application/xml";
pub const TEXT_PLAIN: &str = "text/plain";

/// Wire format a media type maps to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Json,
    Xml,
    Text,
}

impl Format {
    pub fn for_media_type(media_type: &str) -> Self {
        let lower = media_type.to_ascii_lowercase();
        if lower.contains("json") {
            Format::Json
        } else if lower.contains("xml") {
            Format::Xml
        } else {
            Format::Text
        }
    }
}

#[derive(Debug, Error)]
pub enum EncodeError {
    #[error("json encoding failed: {0}")]
    Json(#[from] serde_json::Error),
    #[error("xml encoding failed: {0}")]
    Xml(String),
}

/// Pick the response media type for a route's `produces` list.
pub fn negotiate(produces: &[String], accept: Option<&str>) -> String {
    if let [only] = produces {
        return only.clone();
    }

    if let Some(accept) = accept.map(str::to_ascii_lowercase) {
        let chosen = produces.iter().find(|declared| {
            let declared = declared.to_ascii_lowercase();
            let subtype = declared
                .split('/')
                .nth(1)
                .map(|s| s.split(';').next().unwrap_or(s).trim())
                .unwrap_or_default();
            accept.contains(&declared) || (!subtype.is_empty() && subtype != "*" && accept.contains(subtype))
        });
        if let Some(chosen) = chosen {
            return chosen.clone();
        }
    }

    produces
        .first()
        .cloned()
        .unwrap_or_else(|| APPLICATION_JSON.to_string())
}

/// Encode `body` for `media_type`. `None` means there is nothing to send.
pub fn encode(body: &ReplyBody, media_type: &str) -> Result<Option<Vec<u8>>, EncodeError> {
    match body {
        ReplyBody::Empty => Ok(None),
        ReplyBody::Raw(text) => Ok(Some(text.clone().into_bytes())),
        ReplyBody::Value(value) => {
            let bytes = match Format::for_media_type(media_type) {
                Format::Json => value.to_json()?,
                Format::Xml => value.to_xml().map_err(EncodeError::Xml)?.into_bytes(),
                Format::Text => value.to_text()?.into_bytes(),
            };
            Ok(Some(bytes))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn types(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_single_declared_type_wins() {
        assert_eq!(negotiate(&types(&[TEXT_PLAIN]), Some("application/json")), TEXT_PLAIN);
    }

    #[test]
    fn test_accept_matching() {
        let produces = types(&[APPLICATION_JSON, APPLICATION_XML]);
        assert_eq!(negotiate(&produces, Some("text/xml")), APPLICATION_XML);
        assert_eq!(negotiate(&produces, Some("Application/XML;q=0.9")), APPLICATION_XML);
        assert_eq!(negotiate(&produces, Some("application/json")), APPLICATION_JSON);
    }

    #[test]
    fn test_fallbacks() {
        let produces = types(&[APPLICATION_JSON, APPLICATION_XML]);
        assert_eq!(negotiate(&produces, Some("*/*")), APPLICATION_JSON);
        assert_eq!(negotiate(&produces, None), APPLICATION_JSON);
        assert_eq!(negotiate(&[], Some("text/xml")), APPLICATION_JSON);
        assert_eq!(negotiate(&types(&[APPLICATION_XML, TEXT_PLAIN]), Some("image/png")), APPLICATION_XML);
    }

    #[test]
    fn test_encode_by_format() {
        let body = ReplyBody::Value(Box::new(vec![1, 2]));
        assert_eq!(encode(&body, APPLICATION_JSON).unwrap().unwrap(), b"[1,2]".to_vec());
        let raw = ReplyBody::Raw("<as-is/>".into());
        assert_eq!(encode(&raw, APPLICATION_JSON).unwrap().unwrap(), b"<as-is/>".to_vec());
        assert!(encode(&ReplyBody::Empty, APPLICATION_JSON).unwrap().is_none());
        let text = ReplyBody::Value(Box::new("hi".to_string()));
        assert_eq!(encode(&text, TEXT_PLAIN).unwrap().unwrap(), b"hi".to_vec());
    }
}
