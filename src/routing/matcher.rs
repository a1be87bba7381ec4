//! Path template compilation and matching.
//!
//! # Responsibilities
//! - Parse `/a/{name}/{id:\d+}` templates into literal and placeholder segments
//! - Compile templates without placeholders to an exact key
//! - Compile everything else to one anchored regex
//! - Extract path and matrix parameter values from a concrete path
//!
//! # Design Decisions
//! - Full-match semantics: the compiled regex is anchored at both ends
//! - A non-trailing placeholder is one token; the trailing placeholder also
//!   tolerates any sub-path after its token
//! - Matrix keys are extracted independently of the structural match, so
//!   clause order inside a segment does not matter
//! - Placeholder constraints see the raw token; captured values are
//!   percent-decoded afterwards

use std::collections::HashMap;

use percent_encoding::percent_decode_str;
use regex::Regex;

use crate::routing::error::RouteError;

const DEFAULT_TOKEN: &str = "[^/;]+";
const MATRIX_CLAUSES: &str = "(?:;[^/]*)?";
const TRAILING_SUBPATH: &str = "(?:/.*)?";

/// A declared path placeholder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathParamMeta {
    pub name: String,
    /// 0-based segment index in the path.
    pub position: usize,
    /// Constraint on the captured token.
    pub regex: Option<String>,
}

/// A declared matrix key and its extractor.
#[derive(Debug, Clone)]
pub struct MatrixParamMeta {
    pub key: String,
    extractor: Regex,
}

impl MatrixParamMeta {
    fn new(key: &str) -> Result<Self, regex::Error> {
        let extractor = Regex::new(&format!(";{}=([^;/]*)", regex::escape(key)))?;
        Ok(Self {
            key: key.to_string(),
            extractor,
        })
    }

    /// Value of this key anywhere in `path`, if present.
    pub fn extract<'p>(&self, path: &'p str) -> Option<&'p str> {
        self.extractor
            .captures(path)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str())
    }
}

/// Parameters captured by a successful match.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PathMatch {
    pub path_params: HashMap<String, String>,
    pub matrix_params: HashMap<String, String>,
}

#[derive(Debug, Clone)]
enum Segment {
    Literal(String),
    Placeholder { name: String, regex: Option<String> },
}

/// Compiled form of a regex-matched template.
#[derive(Debug, Clone)]
pub struct CompiledPath {
    regex: Regex,
    params: Vec<PathParamMeta>,
    matrix: Vec<MatrixParamMeta>,
}

/// How a route's path is looked up.
#[derive(Debug, Clone)]
pub enum PathMatcher {
    /// Plain string equality; stored in the exact map.
    Exact(String),
    Pattern(CompiledPath),
}

impl PathMatcher {
    /// Compile `template`. `matrix_keys` are the route's declared matrix
    /// parameters; any of them forces pattern matching.
    pub fn compile(template: &str, matrix_keys: &[String]) -> Result<Self, RouteError> {
        let segments = split_template(template)?;
        let has_placeholder = segments
            .iter()
            .any(|s| matches!(s, Segment::Placeholder { .. }));

        if !has_placeholder && matrix_keys.is_empty() {
            return Ok(PathMatcher::Exact(template.to_string()));
        }

        let with_matrix = !matrix_keys.is_empty();
        let last = segments.len().saturating_sub(1);
        let mut source = String::from("^");
        let mut params: Vec<PathParamMeta> = Vec::new();

        for (position, segment) in segments.iter().enumerate() {
            source.push('/');
            match segment {
                Segment::Literal(text) => source.push_str(&regex::escape(text)),
                Segment::Placeholder { name, regex } => {
                    if params.iter().any(|p| &p.name == name) {
                        return Err(invalid(template, format!("placeholder `{}` declared twice", name)));
                    }
                    let token = regex.as_deref().unwrap_or(DEFAULT_TOKEN);
                    source.push_str(&format!("(?P<p{}>{})", params.len(), token));
                    params.push(PathParamMeta {
                        name: name.clone(),
                        position,
                        regex: regex.clone(),
                    });
                }
            }
            if with_matrix {
                source.push_str(MATRIX_CLAUSES);
            }
            if position == last && matches!(segment, Segment::Placeholder { .. }) {
                source.push_str(TRAILING_SUBPATH);
            }
        }
        source.push('$');

        let regex = Regex::new(&source).map_err(|e| RouteError::InvalidPattern {
            template: template.to_string(),
            source: e,
        })?;

        let matrix = matrix_keys
            .iter()
            .map(|key| MatrixParamMeta::new(key))
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| RouteError::InvalidPattern {
                template: template.to_string(),
                source: e,
            })?;

        Ok(PathMatcher::Pattern(CompiledPath { regex, params, matrix }))
    }

    pub fn is_exact(&self) -> bool {
        matches!(self, PathMatcher::Exact(_))
    }

    /// Declared placeholders, in template order. Empty for exact matchers.
    pub fn params(&self) -> &[PathParamMeta] {
        match self {
            PathMatcher::Exact(_) => &[],
            PathMatcher::Pattern(compiled) => &compiled.params,
        }
    }

    /// Match `path` in full and capture its parameters.
    pub fn matches(&self, path: &str) -> Option<PathMatch> {
        match self {
            PathMatcher::Exact(key) => (key == path).then(PathMatch::default),
            PathMatcher::Pattern(compiled) => {
                let captures = compiled.regex.captures(path)?;
                let path_params = compiled
                    .params
                    .iter()
                    .enumerate()
                    .filter_map(|(i, meta)| {
                        captures
                            .name(&format!("p{}", i))
                            .map(|m| (meta.name.clone(), decode(m.as_str())))
                    })
                    .collect();
                let matrix_params = compiled
                    .matrix
                    .iter()
                    .filter_map(|meta| meta.extract(path).map(|v| (meta.key.clone(), decode(v))))
                    .collect();
                Some(PathMatch {
                    path_params,
                    matrix_params,
                })
            }
        }
    }
}

/// `+` stays literal in a path, unlike in a query string.
fn decode(raw: &str) -> String {
    percent_decode_str(raw).decode_utf8_lossy().into_owned()
}

fn invalid(template: &str, reason: impl Into<String>) -> RouteError {
    RouteError::InvalidTemplate {
        template: template.to_string(),
        reason: reason.into(),
    }
}

/// Split on `/` outside braces, so placeholder regexes may contain `/` and `{n}`.
fn split_template(template: &str) -> Result<Vec<Segment>, RouteError> {
    let rest = template
        .strip_prefix('/')
        .ok_or_else(|| invalid(template, "must start with `/`"))?;

    let mut raw_segments = Vec::new();
    let mut current = String::new();
    let mut depth = 0usize;
    for ch in rest.chars() {
        match ch {
            '{' => {
                depth += 1;
                current.push(ch);
            }
            '}' => {
                if depth == 0 {
                    return Err(invalid(template, "unmatched `}`"));
                }
                depth -= 1;
                current.push(ch);
            }
            '/' if depth == 0 => raw_segments.push(std::mem::take(&mut current)),
            _ => current.push(ch),
        }
    }
    if depth != 0 {
        return Err(invalid(template, "unclosed `{`"));
    }
    raw_segments.push(current);

    raw_segments
        .into_iter()
        .map(|raw| parse_segment(template, raw))
        .collect()
}

fn parse_segment(template: &str, raw: String) -> Result<Segment, RouteError> {
    if !raw.contains('{') {
        return Ok(Segment::Literal(raw));
    }
    let inner = raw
        .strip_prefix('{')
        .and_then(|s| s.strip_suffix('}'))
        .filter(|inner| closes_at_end(inner))
        .ok_or_else(|| invalid(template, format!("placeholder must occupy a whole segment: `{}`", raw)))?;

    let (name, regex) = match inner.split_once(':') {
        Some((name, regex)) => (name.trim(), Some(regex.trim().to_string())),
        None => (inner.trim(), None),
    };
    if name.is_empty() || !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-' || c == '.') {
        return Err(invalid(template, format!("bad placeholder name `{}`", name)));
    }
    if matches!(regex.as_deref(), Some("")) {
        return Err(invalid(template, format!("empty regex for `{}`", name)));
    }
    Ok(Segment::Placeholder {
        name: name.to_string(),
        regex,
    })
}

/// True when the braces inside `inner` are balanced, i.e. the outer `{ }`
/// pair spans the whole segment.
fn closes_at_end(inner: &str) -> bool {
    let mut depth = 0i32;
    for ch in inner.chars() {
        match ch {
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth < 0 {
                    return false;
                }
            }
            _ => {}
        }
    }
    depth == 0
}
