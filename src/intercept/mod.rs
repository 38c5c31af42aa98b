//! Login interception
//!
//! Requests that hit an application's login path move through three states:
//!
//! - `Normal`: nothing was injected, the request was relayed unchanged
//! - `TokenIssued`: the login page went out prefilled with a placeholder token
//! - `Submitted`: real credentials were sent to the origin, either by
//!   swapping out a returned placeholder or by auto-login
//!
//! A GET with no resolvable credential falls back to `Normal` so the user
//! can log in by hand. A POST carrying a valid placeholder with no
//! resolvable credential is refused with 401.

mod form;
mod inject;
mod session;
mod token;

pub use form::{is_form_encoded, LoginForm, FORM_CONTENT_TYPE};
pub use inject::inject_autofill;
pub use session::{cookie_header, has_session};
pub use token::PasswordToken;

use crate::proxy::{
    forwardable_headers, relay, response_from_parts, ForwardError, Forwarder, InboundRequest,
};
use crate::router::CredentialResolver;
use crate::{ApplicationConfig, CredentialRecord, PortcullisError};
use axum::body::Body;
use axum::http::{header, HeaderMap, HeaderValue, Method};
use axum::response::Response;
use std::fmt;
use tracing::debug;

/// Headers copied onto a synthesized auto-login request
const AUTO_LOGIN_HEADERS: [header::HeaderName; 4] =
    [header::USER_AGENT, header::COOKIE, header::ACCEPT, header::REFERER];

/// Which interception state a handled request ended in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InterceptOutcome {
    Normal,
    TokenIssued,
    Submitted,
}

impl fmt::Display for InterceptOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InterceptOutcome::Normal => write!(f, "normal"),
            InterceptOutcome::TokenIssued => write!(f, "token_issued"),
            InterceptOutcome::Submitted => write!(f, "submitted"),
        }
    }
}

/// A response produced by the interceptor and the state it ended in
pub struct Intercepted {
    pub response: Response,
    pub outcome: InterceptOutcome,
}

/// Drives the login endpoint of one application
pub struct LoginInterceptor<'a> {
    app: &'a ApplicationConfig,
    resolver: &'a CredentialResolver,
    forwarder: &'a Forwarder,
    /// Largest login form body that will be read into memory
    max_body_bytes: usize,
}

impl<'a> LoginInterceptor<'a> {
    /// Create an interceptor for `app`
    pub fn new(
        app: &'a ApplicationConfig,
        resolver: &'a CredentialResolver,
        forwarder: &'a Forwarder,
        max_body_bytes: usize,
    ) -> Self {
        Self {
            app,
            resolver,
            forwarder,
            max_body_bytes,
        }
    }

    /// Whether a request targets the application's login endpoint
    pub fn is_login_request(app: &ApplicationConfig, method: &Method, path: &str) -> bool {
        path == app.login_path && (*method == Method::GET || *method == Method::POST)
    }

    /// Handle a request to the login endpoint on behalf of `email`
    pub async fn intercept(
        &self,
        inbound: InboundRequest,
        email: &str,
    ) -> Result<Intercepted, PortcullisError> {
        let method = inbound.method.clone();
        match method {
            Method::GET => self.on_login_page(inbound, email).await,
            Method::POST => self.on_login_submit(inbound, email).await,
            _ => self.passthrough(inbound).await,
        }
    }

    async fn passthrough(&self, inbound: InboundRequest) -> Result<Intercepted, PortcullisError> {
        Ok(Intercepted {
            response: self.forwarder.passthrough(inbound).await?,
            outcome: InterceptOutcome::Normal,
        })
    }

    async fn on_login_page(
        &self,
        inbound: InboundRequest,
        email: &str,
    ) -> Result<Intercepted, PortcullisError> {
        let credential = match self.resolver.resolve_for(&self.app.hostname, email).await? {
            Some(credential) => credential,
            None => {
                debug!(host = %self.app.hostname, email = %email, "No credential matched, leaving login page alone");
                return self.passthrough(inbound).await;
            }
        };

        if self.app.auto_login {
            self.auto_login(inbound, &credential).await
        } else {
            self.prefill_page(inbound, &credential, email).await
        }
    }

    /// Log in server-side and hand the origin's answer straight back
    async fn auto_login(
        &self,
        inbound: InboundRequest,
        credential: &CredentialRecord,
    ) -> Result<Intercepted, PortcullisError> {
        let body = LoginForm::credentials(
            &self.app.username_field,
            &credential.legacy_username,
            &self.app.password_field,
            credential.legacy_password.expose(),
        )
        .encode()
        .map_err(|e| PortcullisError::InvalidRequest(e.to_string()))?;

        let mut headers = HeaderMap::new();
        headers.insert(header::CONTENT_TYPE, HeaderValue::from_static(FORM_CONTENT_TYPE));
        for name in AUTO_LOGIN_HEADERS {
            for value in inbound.headers.get_all(&name) {
                headers.append(name.clone(), value.clone());
            }
        }

        let url = self
            .forwarder
            .origin_url(&inbound.hostname, inbound.path_and_query());
        let origin = self
            .forwarder
            .send(Method::POST, &url, headers, Some(body.into()))
            .await?;

        Ok(Intercepted {
            response: relay(origin),
            outcome: InterceptOutcome::Submitted,
        })
    }

    /// Fetch the login page and prefill it with the username and a token
    async fn prefill_page(
        &self,
        inbound: InboundRequest,
        credential: &CredentialRecord,
        email: &str,
    ) -> Result<Intercepted, PortcullisError> {
        let url = self
            .forwarder
            .origin_url(&inbound.hostname, inbound.path_and_query());

        // Ask for an identity-encoded body so it can be rewritten
        let mut headers = forwardable_headers(&inbound.headers);
        headers.remove(header::ACCEPT_ENCODING);
        headers.remove(header::CONTENT_LENGTH);

        let origin = self
            .forwarder
            .send(Method::GET, &url, headers, None)
            .await?;
        let status = origin.status();
        let origin_headers = origin.headers().clone();
        let page = origin.bytes().await.map_err(ForwardError::from)?;

        let token = PasswordToken::for_today(email);
        let page = inject_autofill(&page, self.app, &credential.legacy_username, &token);
        let length = HeaderValue::from(page.len());

        let mut response = response_from_parts(status, &origin_headers, Body::from(page));
        response.headers_mut().insert(header::CONTENT_LENGTH, length);

        Ok(Intercepted {
            response,
            outcome: InterceptOutcome::TokenIssued,
        })
    }

    /// Swap a returned placeholder for the real credentials
    async fn on_login_submit(
        &self,
        mut inbound: InboundRequest,
        email: &str,
    ) -> Result<Intercepted, PortcullisError> {
        if !is_form_encoded(&inbound.headers) {
            return self.passthrough(inbound).await;
        }

        let body = inbound.buffer_body(self.max_body_bytes).await?;
        let mut form = match LoginForm::parse(&body) {
            Some(form) => form,
            None => return self.passthrough(inbound).await,
        };

        let token = PasswordToken::for_today(email);
        let carries_token = form
            .get(&self.app.password_field)
            .is_some_and(|submitted| token.matches(submitted));
        if !carries_token {
            return self.passthrough(inbound).await;
        }

        let credential = self
            .resolver
            .resolve_for(&self.app.hostname, email)
            .await?
            .ok_or_else(|| PortcullisError::CredentialNotFound {
                hostname: self.app.hostname.clone(),
                email: email.to_string(),
            })?;

        form.set(&self.app.username_field, &credential.legacy_username);
        form.set(&self.app.password_field, credential.legacy_password.expose());
        let body = form
            .encode()
            .map_err(|e| PortcullisError::InvalidRequest(e.to_string()))?;

        let mut headers = forwardable_headers(&inbound.headers);
        headers.remove(header::CONTENT_LENGTH);
        headers.remove(header::HOST);
        headers.insert(header::CONTENT_TYPE, HeaderValue::from_static(FORM_CONTENT_TYPE));

        let url = self
            .forwarder
            .origin_url(&inbound.hostname, inbound.path_and_query());
        let origin = self
            .forwarder
            .send(Method::POST, &url, headers, Some(body.into()))
            .await?;

        Ok(Intercepted {
            response: relay(origin),
            outcome: InterceptOutcome::Submitted,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_login_request_detection() {
        let app = ApplicationConfig::new("wiki.example.com", "/login", "user", "pass", "WikiSession");
        assert!(LoginInterceptor::is_login_request(&app, &Method::GET, "/login"));
        assert!(LoginInterceptor::is_login_request(&app, &Method::POST, "/login"));
        assert!(!LoginInterceptor::is_login_request(&app, &Method::PUT, "/login"));
        assert!(!LoginInterceptor::is_login_request(&app, &Method::GET, "/login/"));
        assert!(!LoginInterceptor::is_login_request(&app, &Method::GET, "/Login"));
    }

    #[test]
    fn test_outcome_names() {
        assert_eq!(InterceptOutcome::Normal.to_string(), "normal");
        assert_eq!(InterceptOutcome::TokenIssued.to_string(), "token_issued");
        assert_eq!(InterceptOutcome::Submitted.to_string(), "submitted");
    }
}
