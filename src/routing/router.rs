//! Route registry: compiled routes and request resolution.
//!
//! # Responsibilities
//! - Compile every declared route once, at startup
//! - Reject the whole route set if any route is malformed or duplicated
//! - Resolve (method, path) to exactly one route or an explicit no-match
//!
//! # Design Decisions
//! - Immutable after construction (thread-safe without locks)
//! - O(1) exact lookup via HashMap, checked first
//! - O(n) pattern scan in registration order; first match wins, no
//!   specificity ranking

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use axum::http::Method;
use regex::Regex;

use crate::routing::error::{RegistryError, RouteError};
use crate::routing::matcher::{PathMatch, PathMatcher};
use crate::routing::meta::{RouteMeta, Source, TargetType};

/// A route ready for lookup and binding.
#[derive(Debug)]
pub struct Route {
    pub meta: RouteMeta,
    matcher: PathMatcher,
    /// Compiled validation pattern per parameter, same order as `meta.params`.
    validators: Vec<Option<Regex>>,
}

impl Route {
    pub fn matcher(&self) -> &PathMatcher {
        &self.matcher
    }

    pub fn validator(&self, index: usize) -> Option<&Regex> {
        self.validators.get(index).and_then(Option::as_ref)
    }
}

/// Result of a successful resolution.
#[derive(Debug, Clone)]
pub struct Resolved {
    pub route: Arc<Route>,
    pub params: PathMatch,
}

/// All registered routes, split into exact and pattern tables.
#[derive(Debug, Default)]
pub struct RouteRegistry {
    exact: HashMap<Method, HashMap<String, Arc<Route>>>,
    pattern: HashMap<Method, Vec<Arc<Route>>>,
}

impl RouteRegistry {
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::default()
    }

    /// Look up `exact[method][path]`, then scan `pattern[method]` in order.
    pub fn resolve(&self, method: &Method, path: &str) -> Option<Resolved> {
        if let Some(route) = self.exact.get(method).and_then(|table| table.get(path)) {
            return Some(Resolved {
                route: Arc::clone(route),
                params: PathMatch::default(),
            });
        }

        self.pattern.get(method)?.iter().find_map(|route| {
            route.matcher.matches(path).map(|params| Resolved {
                route: Arc::clone(route),
                params,
            })
        })
    }

    pub fn len(&self) -> usize {
        self.exact.values().map(HashMap::len).sum::<usize>() + self.pattern.values().map(Vec::len).sum::<usize>()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Collects routes and compiles them together.
#[derive(Default)]
pub struct RegistryBuilder {
    routes: Vec<RouteMeta>,
}

impl RegistryBuilder {
    pub fn route(mut self, meta: RouteMeta) -> Self {
        self.routes.push(meta);
        self
    }

    pub fn routes(mut self, metas: impl IntoIterator<Item = RouteMeta>) -> Self {
        self.routes.extend(metas);
        self
    }

    /// Compile everything. Any problem fails the whole set.
    pub fn build(self) -> Result<RouteRegistry, RegistryError> {
        let mut registry = RouteRegistry::default();
        let mut seen: HashSet<(Method, String)> = HashSet::new();
        let mut errors = Vec::new();

        for meta in self.routes {
            if !seen.insert((meta.method.clone(), meta.template.clone())) {
                errors.push(RouteError::Conflict {
                    method: meta.method.to_string(),
                    template: meta.template.clone(),
                });
                continue;
            }

            match compile(meta) {
                Ok(route) => {
                    let route = Arc::new(route);
                    let method = route.meta.method.clone();
                    match &route.matcher {
                        PathMatcher::Exact(key) => {
                            registry
                                .exact
                                .entry(method)
                                .or_default()
                                .insert(key.clone(), Arc::clone(&route));
                        }
                        PathMatcher::Pattern(_) => {
                            registry.pattern.entry(method).or_default().push(Arc::clone(&route));
                        }
                    }
                    tracing::debug!(
                        method = %route.meta.method,
                        template = %route.meta.template,
                        exact = route.matcher.is_exact(),
                        "Route registered"
                    );
                }
                Err(mut route_errors) => errors.append(&mut route_errors),
            }
        }

        if errors.is_empty() {
            tracing::info!(routes = registry.len(), "Route registry built");
            Ok(registry)
        } else {
            Err(RegistryError(errors))
        }
    }
}

fn compile(meta: RouteMeta) -> Result<Route, Vec<RouteError>> {
    let matcher = PathMatcher::compile(&meta.template, &meta.matrix_keys()).map_err(|e| vec![e])?;

    let mut errors = Vec::new();
    let mut validators = Vec::with_capacity(meta.params.len());
    let param_error = |param: &str, reason: String| RouteError::InvalidParam {
        method: meta.method.to_string(),
        template: meta.template.clone(),
        param: param.to_string(),
        reason,
    };

    for spec in &meta.params {
        let label = spec.label().to_string();

        if spec.source.is_keyed() && spec.key.as_deref().map_or(true, str::is_empty) {
            errors.push(param_error(&label, "keyed source without a key".into()));
        }
        if spec.source == Source::Path {
            let declared = matcher.params().iter().any(|p| Some(p.name.as_str()) == spec.key.as_deref());
            if !declared {
                errors.push(param_error(&label, "no such placeholder in template".into()));
            }
        }
        match (&spec.target, spec.source.is_structured_body()) {
            (TargetType::Body(_), false) => {
                errors.push(param_error(&label, "body types bind only from a JSON/XML body".into()));
            }
            (target, true) if !matches!(target, TargetType::Body(_)) => {
                errors.push(param_error(&label, "JSON/XML body needs a body type".into()));
            }
            (TargetType::Cookie, _) if spec.source != Source::Cookie => {
                errors.push(param_error(&label, "cookie objects bind only from cookies".into()));
            }
            _ => {}
        }

        match spec.validation_pattern.as_deref().map(|p| Regex::new(&format!("^(?:{})$", p))) {
            Some(Ok(regex)) => validators.push(Some(regex)),
            Some(Err(e)) => {
                errors.push(param_error(&label, format!("bad validation pattern: {}", e)));
                validators.push(None);
            }
            None => validators.push(None),
        }
    }

    if errors.is_empty() {
        Ok(Route {
            meta,
            matcher,
            validators,
        })
    } else {
        Err(errors)
    }
}
