//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (timeouts > 0, addresses parse)
//! - Check routes: unique names, usable endpoints, valid methods
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Pure function: GatewayConfig → Result<(), Vec<ValidationError>>

use std::collections::HashSet;
use std::net::SocketAddr;

use axum::http::Method;
use thiserror::Error;
use url::Url;

use crate::config::schema::GatewayConfig;

/// A single semantic problem in the configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("invalid bind address {0:?}")]
    BindAddress(String),

    #[error("invalid metrics address {0:?}")]
    MetricsAddress(String),

    #[error("timeouts.{0} must be greater than zero")]
    ZeroTimeout(&'static str),

    #[error("route at index {0} has an empty name")]
    EmptyRouteName(usize),

    #[error("duplicate route name {0:?}")]
    DuplicateRoute(String),

    #[error("route {0:?} has no host, path or path_prefix condition")]
    UnconstrainedRoute(String),

    #[error("route {route:?}: endpoint {endpoint:?} is not an http(s) URL")]
    Endpoint { route: String, endpoint: String },

    #[error("route {route:?}: invalid method {method:?}")]
    Method { route: String, method: String },
}

/// Validate a parsed configuration.
pub fn validate_config(config: &GatewayConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::BindAddress(config.listener.bind_address.clone()));
    }
    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::MetricsAddress(
            config.observability.metrics_address.clone(),
        ));
    }
    if config.timeouts.connect_secs == 0 {
        errors.push(ValidationError::ZeroTimeout("connect_secs"));
    }
    if config.timeouts.request_secs == 0 {
        errors.push(ValidationError::ZeroTimeout("request_secs"));
    }

    let mut names = HashSet::new();
    for (index, route) in config.routes.iter().enumerate() {
        if route.name.is_empty() {
            errors.push(ValidationError::EmptyRouteName(index));
        } else if !names.insert(route.name.as_str()) {
            errors.push(ValidationError::DuplicateRoute(route.name.clone()));
        }

        if route.host.is_none() && route.path.is_none() && route.path_prefix.is_none() {
            errors.push(ValidationError::UnconstrainedRoute(route.name.clone()));
        }

        let endpoint_ok = Url::parse(&route.endpoint)
            .map(|u| matches!(u.scheme(), "http" | "https"))
            .unwrap_or(false);
        if !endpoint_ok {
            errors.push(ValidationError::Endpoint {
                route: route.name.clone(),
                endpoint: route.endpoint.clone(),
            });
        }

        for method in &route.methods {
            if Method::from_bytes(method.to_ascii_uppercase().as_bytes()).is_err() {
                errors.push(ValidationError::Method {
                    route: route.name.clone(),
                    method: method.clone(),
                });
            }
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::RouteConfig;

    fn route(name: &str, endpoint: &str) -> RouteConfig {
        RouteConfig {
            name: name.into(),
            host: None,
            path: Some("/".into()),
            path_prefix: None,
            methods: Vec::new(),
            endpoint: endpoint.into(),
            priority: 0,
        }
    }

    #[test]
    fn test_default_config_is_valid() {
        assert!(validate_config(&GatewayConfig::default()).is_ok());
    }

    #[test]
    fn test_route_errors_are_collected() {
        let mut config = GatewayConfig::default();
        config.routes.push(route("a", "http://engine/exec"));
        config.routes.push(route("a", "ftp://engine/exec"));
        let mut unconstrained = route("", "http://engine/exec");
        unconstrained.path = None;
        unconstrained.methods = vec!["NOT A METHOD".into()];
        config.routes.push(unconstrained);

        let errors = validate_config(&config).unwrap_err();
        assert_eq!(
            errors,
            vec![
                ValidationError::DuplicateRoute("a".into()),
                ValidationError::Endpoint {
                    route: "a".into(),
                    endpoint: "ftp://engine/exec".into()
                },
                ValidationError::EmptyRouteName(2),
                ValidationError::UnconstrainedRoute("".into()),
                ValidationError::Method {
                    route: "".into(),
                    method: "NOT A METHOD".into()
                },
            ]
        );
    }

    #[test]
    fn test_listener_and_metrics_addresses() {
        let mut config = GatewayConfig::default();
        config.listener.bind_address = "nowhere".into();
        config.observability.metrics_enabled = true;
        config.observability.metrics_address = "also nowhere".into();

        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors.len(), 2);
    }
}
