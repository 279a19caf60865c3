//! Codeflow - terminal harness for a backend-mediated OAuth 2.0 code flow
//!
//! This library drives the client side of an authorization code flow in which
//! a backend owns the identity provider integration (Keycloak in practice):
//! the browser is sent to the backend's login endpoint, the authorization code
//! that comes back on the callback URL is handed to the backend for exchange,
//! and the resulting bearer token is used to fetch the user's profile.
//!
//! # Features
//!
//! - Session lifecycle: login, code exchange, profile fetch, logout, full logout
//! - Pluggable storage backend (memory, file, OS keyring)
//! - Injected navigation and page view, with in-memory fakes for testing
//! - Loopback callback listener for the provider redirect
//!
//! # Example
//!
//! ```
//! use codeflow::prelude::*;
//! use std::sync::Arc;
//! use url::Url;
//!
//! let config = HarnessConfig::new(
//!     Url::parse("http://localhost:8081").unwrap(),
//!     Url::parse("http://localhost:5173/callback").unwrap(),
//!     Url::parse("http://localhost:5173").unwrap(),
//! )
//! .unwrap();
//!
//! let navigator = Arc::new(MemoryNavigator::new(config.logout_redirect_url.clone()));
//! let controller = SessionController::new(
//!     config.clone(),
//!     Arc::new(MemoryStore::new()),
//!     HttpBackend::new(&config).unwrap(),
//!     navigator.clone(),
//!     Arc::new(ViewState::new()),
//! );
//!
//! let login_url = controller.login(false).unwrap();
//! assert_eq!(navigator.last_navigation(), Some(login_url));
//! ```

pub mod backend;
pub mod callback;
pub mod config;
pub mod controller;
pub mod error;
pub mod lock;
pub mod navigator;
pub mod session;
pub mod view;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::backend::{Backend, Endpoints, HttpBackend, UserProfile};
    pub use crate::callback::CallbackServer;
    pub use crate::config::HarnessConfig;
    pub use crate::controller::{SessionController, SessionState};
    pub use crate::error::{Result, SessionError};
    pub use crate::navigator::{BrowserNavigator, MemoryNavigator, NavigationEvent, Navigator};
    pub use crate::session::{
        FileStore, KeyValueStore, MemoryStore, SecureStore, Session, SessionStore, TokenSet,
    };
    pub use crate::view::{Element, View, ViewState};
}

#[cfg(test)]
mod tests {
    use super::prelude::*;
    use serde_json::json;
    use std::sync::Arc;
    use url::Url;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_full_session_flow() {
        let server = MockServer::start().await;
        let config = HarnessConfig::new(
            Url::parse(&server.uri()).unwrap(),
            Url::parse("http://localhost:5173/callback").unwrap(),
            Url::parse("http://localhost:5173").unwrap(),
        )
        .unwrap();

        Mock::given(method("POST"))
            .and(path("/api/v1/auth/code"))
            .and(body_json(json!({
                "code": "abc123",
                "redirectUri": "http://localhost:5173/callback"
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "access_token": "T1",
                "id_token": "I1",
                "expires_in": 300
            })))
            .expect(1)
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path("/api/v1/user/me"))
            .and(header("Authorization", "Bearer T1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": {"name": "Ann", "email": "a@x.com"}
            })))
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path("/api/v1/auth/logout"))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        let storage = Arc::new(MemoryStore::new());
        let navigator = Arc::new(MemoryNavigator::new(config.logout_redirect_url.clone()));
        let view = Arc::new(ViewState::new());
        let controller = SessionController::new(
            config.clone(),
            storage.clone(),
            HttpBackend::new(&config).unwrap(),
            navigator.clone(),
            view.clone(),
        );

        // Signed out to begin with
        assert_eq!(controller.render().await, SessionState::Unauthenticated);
        controller.login(false).unwrap();

        // Provider sends the browser back with a code
        let page = Url::parse("http://localhost:5173/callback?code=abc123").unwrap();
        let state = controller.initialize(&page).await;
        assert_eq!(
            state,
            SessionState::Authenticated(UserProfile {
                name: "Ann".to_string(),
                email: "a@x.com".to_string(),
            })
        );
        assert!(view.is_visible(Element::LogoutButton));

        let destination = controller.logout().await.unwrap();
        assert_eq!(destination, config.logout_redirect_url);
        assert!(storage.is_empty());
        assert_eq!(view.visible_elements(), vec![Element::LoginButton]);
    }
}
