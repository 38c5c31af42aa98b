//! Portcullis proxy server
//!
//! Every inbound request runs through the same pipeline:
//! route by hostname, skip requests that already carry a legacy session,
//! intercept the login endpoint, and relay everything else unchanged.
//! Request bodies are streamed to the origin; only a form POST to a login
//! endpoint is read into memory, up to `server.max_body_bytes`.

mod forwarder;

pub use forwarder::{
    forwardable_headers, relay, response_from_parts, ForwardError, Forwarder, InboundRequest,
};

use crate::config::Config;
use crate::intercept::{cookie_header, has_session, InterceptOutcome, LoginInterceptor};
use crate::router::{normalize_host, CredentialResolver, HostRouter, Route};
use crate::storage::StorageBackend;
use crate::{ApplicationConfig, PortcullisError};
use axum::extract::{Request, State};
use axum::http::{header, request::Parts, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Router;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::{debug, info, warn};

/// Immutable state shared by all in-flight requests
pub struct ProxyState {
    config: Config,
    router: HostRouter,
    resolver: CredentialResolver,
    forwarder: Forwarder,
}

/// Main Portcullis server
pub struct ProxyServer {
    state: Arc<ProxyState>,
}

impl ProxyServer {
    /// Create a new proxy server
    pub fn new(config: Config, storage: Arc<dyn StorageBackend>) -> Result<Self, PortcullisError> {
        let router = HostRouter::new(storage.clone(), config.admin.hostname.clone());
        let resolver = CredentialResolver::new(storage);
        let forwarder = Forwarder::new(config.upstream.clone())?;

        Ok(Self {
            state: Arc::new(ProxyState {
                config,
                router,
                resolver,
                forwarder,
            }),
        })
    }

    /// Build the axum router; every path and method lands in one handler
    pub fn router(&self) -> Router {
        Router::new()
            .fallback(handle)
            .layer(TraceLayer::new_for_http())
            .with_state(self.state.clone())
    }

    /// Serve on an already bound listener until the task is dropped
    pub async fn serve(self, listener: TcpListener) -> std::io::Result<()> {
        axum::serve(listener, self.router()).await
    }

    /// Bind the configured address and serve until Ctrl+C
    pub async fn run(self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let bind = self.state.config.server.bind.clone();
        let listener = TcpListener::bind(&bind).await?;

        info!(bind = %bind, "Starting Portcullis proxy");

        axum::serve(listener, self.router())
            .with_graceful_shutdown(async {
                let _ = tokio::signal::ctrl_c().await;
                info!("Shutting down");
            })
            .await?;

        Ok(())
    }

    /// Get the server configuration
    pub fn config(&self) -> &Config {
        &self.state.config
    }
}

async fn handle(State(state): State<Arc<ProxyState>>, request: Request) -> Response {
    let method = request.method().clone();
    let path = request.uri().path().to_string();

    match dispatch(&state, request).await {
        Ok(response) => response,
        Err(e) => {
            warn!(method = %method, path = %path, status = e.status().as_u16(), error = %e, "Request failed");
            e.into_response()
        }
    }
}

async fn dispatch(state: &ProxyState, request: Request) -> Result<Response, PortcullisError> {
    let (parts, body) = request.into_parts();
    let hostname = request_hostname(&parts);

    let inbound = InboundRequest {
        method: parts.method,
        uri: parts.uri,
        headers: parts.headers,
        body,
        hostname,
    };

    match state.router.route(&inbound.hostname).await? {
        Route::Admin => handle_admin(state, inbound).await,
        Route::Application(app) => handle_application(state, &app, inbound).await,
        Route::Passthrough => Ok(state.forwarder.passthrough(inbound).await?),
    }
}

async fn handle_application(
    state: &ProxyState,
    app: &ApplicationConfig,
    inbound: InboundRequest,
) -> Result<Response, PortcullisError> {
    let cookies = cookie_header(&inbound.headers);
    if has_session(&cookies, &app.session_cookie) {
        debug!(host = %app.hostname, "Legacy session present, passing through");
        return Ok(state.forwarder.passthrough(inbound).await?);
    }

    if !LoginInterceptor::is_login_request(app, &inbound.method, inbound.path()) {
        return Ok(state.forwarder.passthrough(inbound).await?);
    }

    let email = state.config.identity.principal_email(&inbound.headers);
    let method = inbound.method.clone();
    let interceptor = LoginInterceptor::new(
        app,
        &state.resolver,
        &state.forwarder,
        state.config.server.max_body_bytes,
    );
    let intercepted = interceptor.intercept(inbound, &email).await?;

    if intercepted.outcome != InterceptOutcome::Normal {
        info!(
            host = %app.hostname,
            method = %method,
            email = %email,
            outcome = %intercepted.outcome,
            status = intercepted.response.status().as_u16(),
            "Login intercepted"
        );
    }

    Ok(intercepted.response)
}

/// The admin surface lives elsewhere; only identified callers are let through
async fn handle_admin(state: &ProxyState, inbound: InboundRequest) -> Result<Response, PortcullisError> {
    if state
        .config
        .identity
        .asserted_email(&inbound.headers)
        .is_none()
    {
        return Err(PortcullisError::MissingIdentity);
    }

    match &state.config.admin.upstream {
        Some(base) => Ok(state.forwarder.forward_to(base, inbound).await?),
        None => Ok((
            StatusCode::NOT_FOUND,
            "Administration is not served by this proxy",
        )
            .into_response()),
    }
}

/// Hostname an inbound request was addressed to, normalized
fn request_hostname(parts: &Parts) -> String {
    parts
        .headers
        .get(header::HOST)
        .and_then(|v| v.to_str().ok())
        .or_else(|| parts.uri.host())
        .map(normalize_host)
        .unwrap_or_default()
}
