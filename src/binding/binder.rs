//! Parameter binding.
//!
//! # Responsibilities
//! - Resolve each declared parameter from its source
//! - Apply required/default policy, validation pattern, then coercion
//! - Decode structured bodies and run their validation
//!
//! # Design Decisions
//! - Never stop at the first failure: every parameter is attempted and all
//!   problems are reported in one response
//! - A coercion failure is data, not a fault; it becomes an "invalid data"
//!   entry naming the key and the raw value

use std::any::Any;
use std::fmt;

use axum::http::StatusCode;
use regex::Regex;

use crate::binding::body::BodyType;
use crate::binding::coerce::{coerce, Value};
use crate::binding::cookie::{find_cookie, Cookie};
use crate::dispatch::context::{RequestContext, ResponseContext};
use crate::dispatch::negotiate::Format;
use crate::error::ErrorEntry;
use crate::routing::meta::{ParamSpec, Source, TargetType};
use crate::routing::router::Route;

/// One bound parameter.
pub enum Bound {
    Value(Value),
    Cookie(Cookie),
    /// Decoded body; take it out with [`BoundArgs::take_body`].
    Body(Box<dyn Any + Send + Sync>),
    /// Marker for a `Request` source; the request itself is on the call.
    Request,
    /// Marker for a `Response` source; handlers shape the response via `Reply`.
    Response,
    /// Optional parameter with no value.
    Absent,
}

impl fmt::Debug for Bound {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Bound::Value(v) => f.debug_tuple("Value").field(v).finish(),
            Bound::Cookie(c) => f.debug_tuple("Cookie").field(c).finish(),
            Bound::Body(_) => f.write_str("Body(..)"),
            Bound::Request => f.write_str("Request"),
            Bound::Response => f.write_str("Response"),
            Bound::Absent => f.write_str("Absent"),
        }
    }
}

/// Bound parameters in declaration order.
#[derive(Debug, Default)]
pub struct BoundArgs {
    values: Vec<Bound>,
    labels: Vec<String>,
}

impl BoundArgs {
    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Bound> {
        self.values.get(index)
    }

    /// Position of the parameter with this key (or `"body"` for bodies).
    pub fn index_of(&self, label: &str) -> Option<usize> {
        self.labels.iter().position(|l| l == label)
    }

    pub fn value(&self, index: usize) -> Option<&Value> {
        match self.values.get(index)? {
            Bound::Value(v) => Some(v),
            _ => None,
        }
    }

    pub fn text(&self, index: usize) -> Option<&str> {
        self.value(index)?.as_str()
    }

    pub fn int(&self, index: usize) -> Option<i64> {
        self.value(index)?.as_i64()
    }

    pub fn float(&self, index: usize) -> Option<f64> {
        self.value(index)?.as_f64()
    }

    pub fn boolean(&self, index: usize) -> Option<bool> {
        self.value(index)?.as_bool()
    }

    pub fn cookie(&self, index: usize) -> Option<&Cookie> {
        match self.values.get(index)? {
            Bound::Cookie(c) => Some(c),
            _ => None,
        }
    }

    /// Move a decoded body out. Later calls for the same index return `None`.
    pub fn take_body<T: 'static>(&mut self, index: usize) -> Option<T> {
        let slot = self.values.get_mut(index)?;
        match std::mem::replace(slot, Bound::Absent) {
            Bound::Body(boxed) => match boxed.downcast::<T>() {
                Ok(value) => Some(*value),
                Err(boxed) => {
                    *slot = Bound::Body(boxed);
                    None
                }
            },
            other => {
                *slot = other;
                None
            }
        }
    }
}

/// Binds every parameter of a route against one request.
pub struct ParameterBinder;

impl ParameterBinder {
    /// Bind all parameters of `route`. Problems are recorded on `response`
    /// (status 400 family, one entry each); the returned args hold `Absent`
    /// where binding failed.
    pub fn bind(route: &Route, request: &RequestContext, response: &mut ResponseContext) -> BoundArgs {
        let mut args = BoundArgs::default();
        for (index, spec) in route.meta.params.iter().enumerate() {
            let bound = match Self::bind_one(spec, route.validator(index), request) {
                Ok(bound) => bound,
                Err(entries) => {
                    response.reject(entries);
                    Bound::Absent
                }
            };
            args.values.push(bound);
            args.labels.push(spec.label().to_string());
        }
        args
    }

    pub fn bind_one(spec: &ParamSpec, validator: Option<&Regex>, request: &RequestContext) -> Result<Bound, Vec<ErrorEntry>> {
        match spec.source {
            Source::Request => Ok(Bound::Request),
            Source::Response => Ok(Bound::Response),
            Source::Cookie => bind_cookie(spec, validator, request),
            Source::BodyText => bind_body_text(spec, request),
            Source::BodyJson => bind_structured(spec, Format::Json, request),
            Source::BodyXml => bind_structured(spec, Format::Xml, request),
            Source::BodyNegotiated => {
                let content_type = request.content_type().unwrap_or_default();
                match Format::for_media_type(content_type) {
                    Format::Text => bind_body_text(spec, request),
                    format => bind_structured(spec, format, request),
                }
            }
            Source::Path | Source::Matrix | Source::Query | Source::Form | Source::Header => {
                let raw = raw_value(spec, request);
                bind_text(spec, validator, raw).map_err(|e| vec![e])
            }
        }
    }
}

/// Raw value for a keyed source. Repeated query/form keys are joined with
/// the list delimiter so collections can be sent either way.
fn raw_value(spec: &ParamSpec, request: &RequestContext) -> Option<String> {
    let key = spec.key.as_deref()?;
    match spec.source {
        Source::Path => request.path_params.get(key).cloned(),
        Source::Matrix => request.matrix_params.get(key).cloned(),
        Source::Header => request.header(key).map(str::to_string),
        Source::Query => join_values(request.query_values(key), spec),
        Source::Form => join_values(request.form_values(key), spec),
        _ => None,
    }
}

fn join_values(values: Vec<&str>, spec: &ParamSpec) -> Option<String> {
    match values.as_slice() {
        [] => None,
        [one] => Some(one.to_string()),
        many if spec.target.is_collection() => Some(many.join(&spec.list_delimiter.to_string())),
        [first, ..] => Some(first.to_string()),
    }
}

fn missing(spec: &ParamSpec) -> ErrorEntry {
    ErrorEntry::for_field(StatusCode::BAD_REQUEST, spec.label(), "missing required field")
}

fn invalid(spec: &ParamSpec, raw: &str, reason: &str) -> ErrorEntry {
    ErrorEntry::for_field(
        StatusCode::BAD_REQUEST,
        spec.label(),
        format!("invalid data for `{}`: `{}` ({})", spec.label(), raw, reason),
    )
}

/// Required/default policy, then pattern, then coercion.
fn bind_text(spec: &ParamSpec, validator: Option<&Regex>, raw: Option<String>) -> Result<Bound, ErrorEntry> {
    let raw = match raw.filter(|r| !r.trim().is_empty()) {
        Some(raw) => raw,
        None => match &spec.default_value {
            Some(default) => default.clone(),
            None if spec.required => return Err(missing(spec)),
            None => return Ok(Bound::Absent),
        },
    };

    if let Some(pattern) = validator {
        if !pattern.is_match(&raw) {
            return Err(invalid(spec, &raw, "does not match the required pattern"));
        }
    }

    coerce(&raw, &spec.target, spec)
        .map(Bound::Value)
        .map_err(|reason| invalid(spec, &raw, &reason))
}

fn bind_cookie(spec: &ParamSpec, validator: Option<&Regex>, request: &RequestContext) -> Result<Bound, Vec<ErrorEntry>> {
    let key = spec.key.as_deref().unwrap_or_default();
    let found = find_cookie(&request.headers, key);
    if matches!(spec.target, TargetType::Cookie) {
        return match found {
            Some(cookie) => Ok(Bound::Cookie(cookie)),
            None if spec.required => Err(vec![missing(spec)]),
            None => Ok(Bound::Absent),
        };
    }
    bind_text(spec, validator, found.map(|c| c.value)).map_err(|e| vec![e])
}

fn bind_body_text(spec: &ParamSpec, request: &RequestContext) -> Result<Bound, Vec<ErrorEntry>> {
    let text = std::str::from_utf8(&request.body)
        .map_err(|_| vec![ErrorEntry::for_field(StatusCode::BAD_REQUEST, spec.label(), "malformed body: not UTF-8")])?;
    if text.trim().is_empty() {
        return if spec.required {
            Err(vec![missing_body(spec)])
        } else {
            Ok(Bound::Absent)
        };
    }
    Ok(Bound::Value(Value::Text(text.to_string())))
}

fn missing_body(spec: &ParamSpec) -> ErrorEntry {
    ErrorEntry::for_field(StatusCode::BAD_REQUEST, spec.label(), "missing required body")
}

fn bind_structured(spec: &ParamSpec, format: Format, request: &RequestContext) -> Result<Bound, Vec<ErrorEntry>> {
    let TargetType::Body(body_type) = &spec.target else {
        return Err(vec![ErrorEntry::for_field(
            StatusCode::INTERNAL_SERVER_ERROR,
            spec.label(),
            "parameter has no body type",
        )]);
    };

    if request.body.iter().all(u8::is_ascii_whitespace) {
        return if spec.required {
            Err(vec![missing_body(spec)])
        } else {
            Ok(Bound::Absent)
        };
    }

    let decoded = decode(body_type, format, &request.body).map_err(|reason| {
        vec![ErrorEntry::for_field(
            StatusCode::BAD_REQUEST,
            spec.label(),
            format!("malformed body: {}", reason),
        )]
    })?;

    let violations = body_type.validate(&*decoded);
    if violations.is_empty() {
        Ok(Bound::Body(decoded))
    } else {
        Err(violations
            .into_iter()
            .map(|v| ErrorEntry::for_field(StatusCode::BAD_REQUEST, v.field, v.message))
            .collect())
    }
}

fn decode(body_type: &BodyType, format: Format, bytes: &[u8]) -> Result<Box<dyn Any + Send + Sync>, String> {
    match format {
        Format::Xml => body_type.decode_xml(bytes),
        _ => body_type.decode_json(bytes),
    }
}
