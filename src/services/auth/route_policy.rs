//! Compiles the declarative path -> required-scopes map into a request-time matcher.
//!
//! Two kinds of entry exist:
//! - exact paths, looked up by string equality
//! - patterns, either derived from parameterized templates such as
//!   `/users/:id` or supplied precompiled, scanned in configuration order
//!
//! Resolution is exact first, then the first matching pattern, then the default.
//! An entry whose scopes are empty does not settle the lookup: an exact one
//! moves on to the pattern scan and a matching pattern one to the default.
//! Pattern matching is a linear scan, O(number of patterns) per request.
use std::collections::HashMap;

use regex::Regex;
use tracing::{debug, warn};

use super::scope::Scopes;

/// Replacement for a `:name` template segment: exactly one path segment.
const PARAM_SEGMENT: &str = "[^/]+";

#[derive(Debug, Clone)]
pub enum RoutePattern {
    Exact(String),
    Compiled(Regex),
    /// A pattern source that failed to compile. It never matches, so requests
    /// fall through to the default requirement instead of breaking startup.
    Unmatchable(String),
}

impl RoutePattern {
    pub fn matches(&self, path: &str) -> bool {
        match self {
            Self::Exact(p) => p == path,
            Self::Compiled(re) => re.is_match(path),
            Self::Unmatchable(_) => false,
        }
    }

    fn compile(source: &str, regex: Result<Regex, regex::Error>) -> Self {
        match regex {
            Ok(re) => {
                debug!(pattern = %re, source, "compiled route pattern");
                Self::Compiled(re)
            }
            Err(error) => {
                warn!(%error, source, "route pattern does not compile and will never match");
                Self::Unmatchable(source.to_owned())
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct CompiledRoute {
    pub pattern: RoutePattern,
    pub scopes: Scopes,
}

/// Where a required-scope set came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopeSource {
    Exact,
    /// Index into the compiled route list.
    Pattern(usize),
    Default,
}

#[derive(Debug, Clone, Copy)]
pub struct ResolvedScopes<'a> {
    pub scopes: &'a Scopes,
    pub source: ScopeSource,
}

#[derive(Debug, Clone, Default)]
pub struct RoutePolicy {
    routes: Vec<CompiledRoute>,
    exact: HashMap<String, usize>,
    default_scopes: Scopes,
}

impl RoutePolicy {
    /// Builds the policy.
    ///
    /// `scopes_by_uri` entries whose path holds a `:param` segment become
    /// patterns (in the order given) and are not kept as exact paths.
    /// `precompiled` regex sources are appended after them, verbatim.
    pub fn compile<E, P>(scopes_by_uri: E, precompiled: P, default_scopes: &str) -> Self
    where
        E: IntoIterator<Item = (String, String)>,
        P: IntoIterator<Item = (String, String)>,
    {
        let mut exact_routes = Vec::new();
        let mut pattern_routes = Vec::new();

        for (path, scopes) in scopes_by_uri {
            let scopes = Scopes::parse(&scopes);
            if is_parameterized(&path) {
                let pattern = RoutePattern::compile(&path, template_regex(&path));
                pattern_routes.push(CompiledRoute { pattern, scopes });
            } else {
                exact_routes.push(CompiledRoute {
                    pattern: RoutePattern::Exact(path),
                    scopes,
                });
            }
        }

        for (source, scopes) in precompiled {
            let pattern = RoutePattern::compile(&source, Regex::new(&source));
            pattern_routes.push(CompiledRoute {
                pattern,
                scopes: Scopes::parse(&scopes),
            });
        }

        let mut routes = exact_routes;
        routes.append(&mut pattern_routes);

        let mut exact = HashMap::new();
        for (idx, route) in routes.iter().enumerate() {
            if let RoutePattern::Exact(path) = &route.pattern {
                // A repeated path keeps its first entry.
                exact.entry(path.clone()).or_insert(idx);
            }
        }

        Self {
            routes,
            exact,
            default_scopes: Scopes::parse(default_scopes),
        }
    }

    pub fn resolve(&self, path: &str) -> ResolvedScopes<'_> {
        let exact = self
            .exact
            .get(path)
            .map(|&idx| &self.routes[idx])
            .filter(|route| !route.scopes.is_empty());
        if let Some(route) = exact {
            return ResolvedScopes {
                scopes: &route.scopes,
                source: ScopeSource::Exact,
            };
        }

        let matched = self
            .routes
            .iter()
            .enumerate()
            .filter(|(_, route)| !matches!(route.pattern, RoutePattern::Exact(_)))
            .find(|(_, route)| route.pattern.matches(path));

        match matched {
            Some((idx, route)) if !route.scopes.is_empty() => ResolvedScopes {
                scopes: &route.scopes,
                source: ScopeSource::Pattern(idx),
            },
            _ => ResolvedScopes {
                scopes: &self.default_scopes,
                source: ScopeSource::Default,
            },
        }
    }

    pub fn routes(&self) -> &[CompiledRoute] {
        &self.routes
    }
}

/// A template is parameterized when some segment after a `/` starts with `:`
/// and names the parameter.
pub fn is_parameterized(template: &str) -> bool {
    template.split('/').skip(1).any(is_param_segment)
}

fn is_param_segment(segment: &str) -> bool {
    segment.len() > 1 && segment.starts_with(':')
}

/// `/users/:id/posts` -> `^/users/[^/]+/posts$`, with literal segments escaped.
fn template_regex(template: &str) -> Result<Regex, regex::Error> {
    let body = template
        .split('/')
        .enumerate()
        .map(|(idx, segment)| {
            if idx > 0 && is_param_segment(segment) {
                PARAM_SEGMENT.to_owned()
            } else {
                regex::escape(segment)
            }
        })
        .collect::<Vec<_>>()
        .join("/");

    Regex::new(&format!("^{body}$"))
}
