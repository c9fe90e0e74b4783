//! HTTP server setup and the per-request gateway handler.
//!
//! # Responsibilities
//! - Create the axum Router with one catch-all handler
//! - Wire up middleware (request ID, tracing, body limit, Server header)
//! - Resolve routes against the current, hot-swappable route table
//! - Build the envelope and hand it to a spawned forwarding task
//! - Answer with the response head the forwarding task produces

use std::sync::Arc;
use std::time::Instant;

use arc_swap::ArcSwap;
use axum::{
    body::Body,
    extract::State,
    http::{header, HeaderValue, Method, Request, StatusCode},
    response::{IntoResponse, Response},
    routing::any,
    Router,
};
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::sync::{broadcast, mpsc};
use tower_http::{
    limit::RequestBodyLimitLayer, set_header::SetResponseHeaderLayer, trace::TraceLayer,
};
use tracing::Instrument;

use crate::config::GatewayConfig;
use crate::error::{GatewayError, ALLOWED_METHODS};
use crate::http::forwarder::RequestForwarder;
use crate::http::request::{propagate_request_id_layer, request_id, set_request_id_layer};
use crate::http::signing::CookieSigner;
use crate::http::sink::StreamingSink;
use crate::observability::metrics;
use crate::protocol::{Envelope, EnvelopeError};
use crate::routing::router::RouteError;
use crate::routing::{ResolvedRoute, RouteResolver, RouteTable};

/// Methods that go through the forwarding pipeline.
const FORWARDED_METHODS: [Method; 6] = [
    Method::GET,
    Method::HEAD,
    Method::POST,
    Method::PUT,
    Method::PATCH,
    Method::DELETE,
];

#[derive(Debug, Error)]
pub enum ServerError {
    #[error(transparent)]
    Routes(#[from] RouteError),

    #[error("failed to build backend client: {0}")]
    Client(#[from] reqwest::Error),

    #[error("invalid server header value: {0:?}")]
    ServerHeader(String),
}

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub routes: Arc<ArcSwap<RouteTable>>,
    pub forwarder: RequestForwarder,
    pub signer: Option<CookieSigner>,
}

/// The gateway's HTTP server.
pub struct HttpServer {
    router: Router,
    routes: Arc<ArcSwap<RouteTable>>,
    config: GatewayConfig,
}

impl HttpServer {
    /// Create a new HTTP server with the given configuration.
    pub fn new(config: GatewayConfig) -> Result<Self, ServerError> {
        let routes = Arc::new(ArcSwap::from_pointee(RouteTable::from_config(&config.routes)?));
        let forwarder = RequestForwarder::new(&config.timeouts)?;
        let signer = config.cookies.secret.as_deref().map(CookieSigner::new);
        if signer.is_none() {
            tracing::warn!("No cookie secret configured; signed cookies are unavailable");
        }

        let state = AppState {
            routes: routes.clone(),
            forwarder,
            signer,
        };

        let router = Self::build_router(&config, state)?;
        Ok(Self {
            router,
            routes,
            config,
        })
    }

    /// Build the axum router with all middleware layers.
    fn build_router(config: &GatewayConfig, state: AppState) -> Result<Router, ServerError> {
        let server_header = HeaderValue::from_str(&config.security.server_header)
            .map_err(|_| ServerError::ServerHeader(config.security.server_header.clone()))?;

        Ok(Router::new()
            .route("/{*path}", any(gateway_handler))
            .route("/", any(gateway_handler))
            .with_state(state)
            .layer(RequestBodyLimitLayer::new(config.security.max_body_size))
            .layer(SetResponseHeaderLayer::if_not_present(header::SERVER, server_header))
            .layer(propagate_request_id_layer())
            .layer(TraceLayer::new_for_http())
            .layer(set_request_id_layer()))
    }

    /// Serve on `listener` until `shutdown` fires.
    ///
    /// Each configuration received on `config_updates` replaces the route
    /// table; an invalid one is logged and the current table kept.
    pub async fn run(
        self,
        listener: TcpListener,
        mut config_updates: mpsc::UnboundedReceiver<GatewayConfig>,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, routes = self.routes.load().len(), "HTTP server starting");

        let routes = self.routes.clone();
        tokio::spawn(async move {
            while let Some(config) = config_updates.recv().await {
                match RouteTable::from_config(&config.routes) {
                    Ok(table) => {
                        tracing::info!(routes = table.len(), "Route table reloaded");
                        routes.store(Arc::new(table));
                    }
                    Err(e) => {
                        tracing::error!(error = %e, "Rejected route update, keeping current routes");
                    }
                }
            }
        });

        axum::serve(listener, self.router)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
                tracing::info!("HTTP server draining");
            })
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }

    /// Get a reference to the config.
    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    /// Handle to the live route table.
    pub fn routes(&self) -> Arc<ArcSwap<RouteTable>> {
        self.routes.clone()
    }
}

/// Entry point for every inbound request.
async fn gateway_handler(State(state): State<AppState>, request: Request<Body>) -> Response {
    let start = Instant::now();
    let request_id = request_id(request.headers());
    let method = request.method().clone();
    let path = request.uri().path().to_string();

    if method == Method::OPTIONS {
        let response = (StatusCode::OK, [(header::ALLOW, ALLOWED_METHODS)]).into_response();
        metrics::record_request(method.as_str(), response.status().as_u16(), "none", start);
        return response;
    }

    if !FORWARDED_METHODS.contains(&method) {
        tracing::debug!(request_id = %request_id, method = %method, "Method not allowed");
        let response = GatewayError::MethodNotAllowed(method.clone()).into_response();
        metrics::record_request(method.as_str(), response.status().as_u16(), "none", start);
        return response;
    }

    let (parts, body) = request.into_parts();

    let Some(route) = state.routes.load().resolve(&parts) else {
        tracing::warn!(request_id = %request_id, method = %method, path = %path, "No route matched");
        let response = GatewayError::RouteNotFound { method: method.clone(), path }.into_response();
        metrics::record_request(method.as_str(), response.status().as_u16(), "none", start);
        return response;
    };
    let route_name = route.name.clone();

    tracing::debug!(
        request_id = %request_id,
        method = %method,
        path = %path,
        route = %route_name,
        "Forwarding request"
    );

    let response = match forward_request(&state, parts, body, route, &request_id).await {
        Ok(response) => response,
        Err(e) => {
            tracing::warn!(request_id = %request_id, route = %route_name, error = %e, "Request failed");
            e.into_response()
        }
    };

    metrics::record_request(method.as_str(), response.status().as_u16(), &route_name, start);
    response
}

/// Translate the request and wait for the forwarding task's response head.
async fn forward_request(
    state: &AppState,
    parts: axum::http::request::Parts,
    body: Body,
    route: ResolvedRoute,
    request_id: &str,
) -> Result<Response, GatewayError> {
    // The body limit layer bounds what can be read here.
    let body = axum::body::to_bytes(body, usize::MAX)
        .await
        .map_err(|e| EnvelopeError::BodyRead(e.to_string()))?;
    let envelope = Envelope::build(&route, &parts, &body)?;

    let (mut sink, head) = StreamingSink::new(state.signer.clone(), &parts.headers);
    let forwarder = state.forwarder.clone();
    let span = tracing::info_span!(
        "stream",
        request_id = %request_id,
        route = %route.name,
        event_id = %envelope.event_id
    );

    tokio::spawn(
        async move {
            let outcome = forwarder.forward(&envelope, &route.endpoint, &mut sink).await;
            tracing::debug!(outcome = ?outcome, "Stream ended");
        }
        .instrument(span),
    );

    head.await.map_err(|_| GatewayError::ExecutionFailed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RouteConfig;
    use tower::ServiceExt;

    fn config_with_route(endpoint: &str) -> GatewayConfig {
        let mut config = GatewayConfig::default();
        config.routes.push(RouteConfig {
            name: "api".into(),
            host: None,
            path: None,
            path_prefix: Some("/api".into()),
            methods: Vec::new(),
            endpoint: endpoint.into(),
            priority: 0,
        });
        config
    }

    fn request(method: Method, uri: &str) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .body(Body::empty())
            .unwrap()
    }

    #[tokio::test]
    async fn test_options_answers_allow_without_backend() {
        let server = HttpServer::new(GatewayConfig::default()).unwrap();
        let response = server.router.oneshot(request(Method::OPTIONS, "/anything")).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::ALLOW], ALLOWED_METHODS);
        assert_eq!(response.headers()[header::SERVER], "Asyncy");
        assert!(response.headers().contains_key("x-request-id"));
    }

    #[tokio::test]
    async fn test_unknown_route_status_depends_on_method() {
        let server = HttpServer::new(config_with_route("http://127.0.0.1:9/run")).unwrap();

        let get = server.router.clone().oneshot(request(Method::GET, "/other")).await.unwrap();
        assert_eq!(get.status(), StatusCode::NOT_FOUND);

        let head = server.router.clone().oneshot(request(Method::HEAD, "/other")).await.unwrap();
        assert_eq!(head.status(), StatusCode::METHOD_NOT_ALLOWED);

        let post = server.router.oneshot(request(Method::POST, "/other")).await.unwrap();
        assert_eq!(post.status(), StatusCode::METHOD_NOT_ALLOWED);
    }

    #[tokio::test]
    async fn test_unsupported_method_is_rejected() {
        let server = HttpServer::new(config_with_route("http://127.0.0.1:9/run")).unwrap();
        let trace = Method::from_bytes(b"TRACE").unwrap();
        let response = server.router.oneshot(request(trace, "/api")).await.unwrap();

        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(response.headers()[header::ALLOW], ALLOWED_METHODS);
    }

    #[tokio::test]
    async fn test_malformed_json_body_is_rejected() {
        let server = HttpServer::new(config_with_route("http://127.0.0.1:9/run")).unwrap();
        let request = Request::builder()
            .method(Method::POST)
            .uri("/api")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from("{not json"))
            .unwrap();
        let response = server.router.oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_oversized_body_is_rejected() {
        let mut config = config_with_route("http://127.0.0.1:9/run");
        config.security.max_body_size = 8;
        let server = HttpServer::new(config).unwrap();
        let request = Request::builder()
            .method(Method::POST)
            .uri("/api")
            .header(header::CONTENT_LENGTH, "32")
            .body(Body::from(vec![b'a'; 32]))
            .unwrap();
        let response = server.router.oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    }

    #[tokio::test]
    async fn test_invalid_route_config_is_an_error() {
        let config = config_with_route("not a url");
        assert!(matches!(HttpServer::new(config), Err(ServerError::Routes(_))));
    }

    #[tokio::test]
    async fn test_invalid_server_header_is_an_error() {
        let mut config = GatewayConfig::default();
        config.security.server_header = "bad\nvalue".into();
        assert!(matches!(HttpServer::new(config), Err(ServerError::ServerHeader(_))));
    }
}
