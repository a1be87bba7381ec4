//! Declarative route and parameter metadata.
//!
//! Routes are described by value at startup. Nothing here is compiled; the
//! registry turns a `RouteMeta` into a lookup-ready route.

use std::collections::BTreeSet;
use std::fmt;

use axum::http::Method;

use crate::binding::body::BodyType;
use crate::dispatch::handler::{BoxedHandler, Handler};

/// Where a parameter's value comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Source {
    /// The whole request context.
    Request,
    /// The response under construction.
    Response,
    Path,
    Matrix,
    Query,
    Form,
    Header,
    Cookie,
    BodyText,
    BodyJson,
    BodyXml,
    /// JSON, XML or text, chosen from `Content-Type` at bind time.
    BodyNegotiated,
}

impl Source {
    /// Sources that look a value up by key.
    pub fn is_keyed(self) -> bool {
        matches!(
            self,
            Source::Path | Source::Matrix | Source::Query | Source::Form | Source::Header | Source::Cookie
        )
    }

    pub fn is_structured_body(self) -> bool {
        matches!(self, Source::BodyJson | Source::BodyXml | Source::BodyNegotiated)
    }
}

/// Case normalisation applied before an enum lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EnumCase {
    #[default]
    AsIs,
    Upper,
    Lower,
}

/// Declared type a raw value is coerced into.
#[derive(Debug, Clone)]
pub enum TargetType {
    Text,
    Integer,
    Float,
    Boolean,
    /// One of the listed variant names.
    Enum(Vec<String>),
    /// `YYYY-MM-DD`.
    Date,
    /// RFC 3339.
    DateTime,
    Uri,
    List(Box<TargetType>),
    /// Like `List`, duplicates removed, first occurrence kept.
    Set(Box<TargetType>),
    Map(Box<TargetType>, Box<TargetType>),
    /// Whole cookie entry rather than its value.
    Cookie,
    /// Deserialized request body.
    Body(BodyType),
}

impl TargetType {
    pub fn list_of(inner: TargetType) -> Self {
        TargetType::List(Box::new(inner))
    }

    pub fn set_of(inner: TargetType) -> Self {
        TargetType::Set(Box::new(inner))
    }

    pub fn map_of(key: TargetType, value: TargetType) -> Self {
        TargetType::Map(Box::new(key), Box::new(value))
    }

    pub fn enumeration<I, S>(variants: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        TargetType::Enum(variants.into_iter().map(Into::into).collect())
    }

    pub fn is_collection(&self) -> bool {
        matches!(self, TargetType::List(_) | TargetType::Set(_) | TargetType::Map(..))
    }
}

/// One declared handler parameter.
#[derive(Debug, Clone)]
pub struct ParamSpec {
    pub source: Source,
    pub key: Option<String>,
    pub target: TargetType,
    pub required: bool,
    pub default_value: Option<String>,
    /// Full-match regex the raw value must satisfy.
    pub validation_pattern: Option<String>,
    pub enum_case: EnumCase,
    pub list_delimiter: char,
    pub pair_delimiter: char,
}

impl ParamSpec {
    fn new(source: Source, key: Option<String>, target: TargetType) -> Self {
        Self {
            source,
            key,
            target,
            required: false,
            default_value: None,
            validation_pattern: None,
            enum_case: EnumCase::AsIs,
            list_delimiter: ',',
            pair_delimiter: ':',
        }
    }

    /// Path parameters are required unless told otherwise.
    pub fn path(key: impl Into<String>) -> Self {
        Self::new(Source::Path, Some(key.into()), TargetType::Text).required()
    }

    pub fn matrix(key: impl Into<String>) -> Self {
        Self::new(Source::Matrix, Some(key.into()), TargetType::Text)
    }

    pub fn query(key: impl Into<String>) -> Self {
        Self::new(Source::Query, Some(key.into()), TargetType::Text)
    }

    pub fn form(key: impl Into<String>) -> Self {
        Self::new(Source::Form, Some(key.into()), TargetType::Text)
    }

    pub fn header(key: impl Into<String>) -> Self {
        Self::new(Source::Header, Some(key.into()), TargetType::Text)
    }

    pub fn cookie(key: impl Into<String>) -> Self {
        Self::new(Source::Cookie, Some(key.into()), TargetType::Text)
    }

    pub fn body_text() -> Self {
        Self::new(Source::BodyText, None, TargetType::Text)
    }

    pub fn json(body: BodyType) -> Self {
        Self::new(Source::BodyJson, None, TargetType::Body(body))
    }

    pub fn xml(body: BodyType) -> Self {
        Self::new(Source::BodyXml, None, TargetType::Body(body))
    }

    pub fn negotiated(body: BodyType) -> Self {
        Self::new(Source::BodyNegotiated, None, TargetType::Body(body))
    }

    pub fn request() -> Self {
        Self::new(Source::Request, None, TargetType::Text)
    }

    pub fn response() -> Self {
        Self::new(Source::Response, None, TargetType::Text)
    }

    pub fn target(mut self, target: TargetType) -> Self {
        self.target = target;
        self
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn optional(mut self) -> Self {
        self.required = false;
        self
    }

    pub fn default_value(mut self, value: impl Into<String>) -> Self {
        self.default_value = Some(value.into());
        self
    }

    pub fn pattern(mut self, pattern: impl Into<String>) -> Self {
        self.validation_pattern = Some(pattern.into());
        self
    }

    pub fn enum_case(mut self, case: EnumCase) -> Self {
        self.enum_case = case;
        self
    }

    pub fn delimiters(mut self, list: char, pair: char) -> Self {
        self.list_delimiter = list;
        self.pair_delimiter = pair;
        self
    }

    /// Name used in error entries.
    pub fn label(&self) -> &str {
        match (&self.key, self.source) {
            (Some(key), _) => key,
            (None, Source::Request) => "request",
            (None, Source::Response) => "response",
            (None, _) => "body",
        }
    }
}

/// Who may call a route.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Access {
    /// No caller needed.
    PermitAll,
    /// Any authenticated caller.
    Authenticated,
    /// Caller must hold at least one of these roles.
    AnyRole(BTreeSet<String>),
    DenyAll,
}

impl Access {
    /// An empty role set denies everyone.
    pub fn roles<I, S>(roles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let roles: BTreeSet<String> = roles.into_iter().map(Into::into).collect();
        if roles.is_empty() {
            Access::DenyAll
        } else {
            Access::AnyRole(roles)
        }
    }
}

/// A registered route: method, path template, policy, parameters and handler.
#[derive(Clone)]
pub struct RouteMeta {
    pub method: Method,
    pub template: String,
    pub access: Access,
    /// Accepted request content types. Empty accepts anything.
    pub consumes: Vec<String>,
    /// Offered response content types. Empty negotiates from the default.
    pub produces: Vec<String>,
    pub params: Vec<ParamSpec>,
    pub handler: BoxedHandler,
}

impl RouteMeta {
    pub fn new(method: Method, template: impl Into<String>, handler: impl Handler) -> Self {
        Self {
            method,
            template: template.into(),
            access: Access::Authenticated,
            consumes: Vec::new(),
            produces: Vec::new(),
            params: Vec::new(),
            handler: handler.into_boxed_handler(),
        }
    }

    pub fn permit_all(mut self) -> Self {
        self.access = Access::PermitAll;
        self
    }

    pub fn deny_all(mut self) -> Self {
        self.access = Access::DenyAll;
        self
    }

    pub fn roles<I, S>(mut self, roles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.access = Access::roles(roles);
        self
    }

    pub fn consumes(mut self, media_type: impl Into<String>) -> Self {
        self.consumes.push(media_type.into());
        self
    }

    pub fn produces(mut self, media_type: impl Into<String>) -> Self {
        self.produces.push(media_type.into());
        self
    }

    pub fn param(mut self, spec: ParamSpec) -> Self {
        self.params.push(spec);
        self
    }

    /// Keys of the declared matrix parameters.
    pub fn matrix_keys(&self) -> Vec<String> {
        self.params
            .iter()
            .filter(|p| p.source == Source::Matrix)
            .filter_map(|p| p.key.clone())
            .collect()
    }
}

impl fmt::Debug for RouteMeta {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RouteMeta")
            .field("method", &self.method)
            .field("template", &self.template)
            .field("access", &self.access)
            .field("consumes", &self.consumes)
            .field("produces", &self.produces)
            .field("params", &self.params)
            .finish_non_exhaustive()
    }
}
