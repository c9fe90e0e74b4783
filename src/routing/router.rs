//! Route lookup.
//!
//! # Responsibilities
//! - Store compiled routes
//! - Look up the matching route for a request head
//! - Return matched route or explicit no-match

use axum::http::{request::Parts, Method};
use thiserror::Error;
use url::Url;

use crate::config::RouteConfig;
use crate::routing::matcher::{
    AndMatcher, HostMatcher, Matcher, MethodMatcher, PathMatcher, PathPrefixMatcher,
};
use crate::routing::{ResolvedRoute, RouteResolver};

/// Errors compiling a route table.
#[derive(Debug, Error)]
pub enum RouteError {
    #[error("route {route}: invalid endpoint {endpoint:?}: {source}")]
    Endpoint {
        route: String,
        endpoint: String,
        source: url::ParseError,
    },

    #[error("route {route}: invalid method {method:?}")]
    Method { route: String, method: String },
}

#[derive(Debug)]
struct CompiledRoute {
    target: ResolvedRoute,
    priority: u32,
    matcher: AndMatcher,
}

/// Immutable, priority-ordered route table.
#[derive(Debug, Default)]
pub struct RouteTable {
    routes: Vec<CompiledRoute>,
}

impl RouteTable {
    /// Compile route definitions.
    pub fn from_config(routes: &[RouteConfig]) -> Result<Self, RouteError> {
        let mut compiled = Vec::with_capacity(routes.len());

        for route in routes {
            let endpoint = Url::parse(&route.endpoint).map_err(|source| RouteError::Endpoint {
                route: route.name.clone(),
                endpoint: route.endpoint.clone(),
                source,
            })?;

            let mut matchers: Vec<Box<dyn Matcher>> = Vec::new();
            if let Some(host) = &route.host {
                matchers.push(Box::new(HostMatcher::new(host.clone())));
            }
            if let Some(path) = &route.path {
                matchers.push(Box::new(PathMatcher::new(path.clone())));
            }
            if let Some(prefix) = &route.path_prefix {
                matchers.push(Box::new(PathPrefixMatcher::new(prefix.clone())));
            }
            if !route.methods.is_empty() {
                let methods = route
                    .methods
                    .iter()
                    .map(|m| {
                        Method::from_bytes(m.to_ascii_uppercase().as_bytes()).map_err(|_| {
                            RouteError::Method {
                                route: route.name.clone(),
                                method: m.clone(),
                            }
                        })
                    })
                    .collect::<Result<Vec<_>, _>>()?;
                matchers.push(Box::new(MethodMatcher::new(methods)));
            }

            compiled.push(CompiledRoute {
                target: ResolvedRoute {
                    name: route.name.clone(),
                    endpoint,
                },
                priority: route.priority,
                matcher: AndMatcher::new(matchers),
            });
        }

        // Stable sort keeps declaration order among equal priorities.
        compiled.sort_by(|a, b| b.priority.cmp(&a.priority));

        Ok(Self { routes: compiled })
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}

impl RouteResolver for RouteTable {
    fn resolve(&self, parts: &Parts) -> Option<ResolvedRoute> {
        self.routes
            .iter()
            .find(|r| r.matcher.matches(parts))
            .map(|r| r.target.clone())
    }
}
