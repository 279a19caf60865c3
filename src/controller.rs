/// Session controller driving the page from storage and the backend
use crate::backend::{Backend, Endpoints, UserProfile};
use crate::config::HarnessConfig;
use crate::error::{Result, SessionError};
use crate::navigator::Navigator;
use crate::session::{KeyValueStore, SessionStore};
use crate::view::{Element, View};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};
use url::Url;

/// Query parameters the provider appends to the callback that must not
/// linger in the visible URL
const CALLBACK_PARAMS: [&str; 3] = ["code", "session_state", "iss"];

const MISSING_TOKEN_MESSAGE: &str = "No access token found. Please log in again.";

/// What the page shows after a render
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    Unauthenticated,
    Authenticated(UserProfile),
}

impl SessionState {
    pub fn is_authenticated(&self) -> bool {
        matches!(self, SessionState::Authenticated(_))
    }
}

/// Drives the authorization code flow for one page load
///
/// A controller instance corresponds to one page load: it exchanges at most
/// one authorization code over its lifetime. `render` is the single place
/// that decides what the page shows, and it re-reads storage every time,
/// since the redirect round-trip (or another process sharing the store) may
/// have changed it between renders.
///
/// Failure policy:
/// - a rejected code exchange is shown to the user, then the page renders;
/// - a rejected profile fetch silently clears both tokens and renders the
///   signed-out page, with no reload, whichever path triggered it;
/// - an action that needs a token when none is stored is shown to the user
///   and makes no network call;
/// - the logout notification is awaited for a bounded time and its outcome
///   discarded, while local cleanup always happens.
pub struct SessionController<S, B, N, V>
where
    S: KeyValueStore,
    B: Backend,
    N: Navigator,
    V: View,
{
    config: HarnessConfig,
    endpoints: Endpoints,
    session: SessionStore<S>,
    backend: B,
    navigator: Arc<N>,
    view: Arc<V>,
    code_consumed: AtomicBool,
}

impl<S, B, N, V> SessionController<S, B, N, V>
where
    S: KeyValueStore,
    B: Backend,
    N: Navigator,
    V: View,
{
    pub fn new(
        config: HarnessConfig,
        storage: Arc<S>,
        backend: B,
        navigator: Arc<N>,
        view: Arc<V>,
    ) -> Self {
        Self {
            endpoints: Endpoints::new(&config),
            config,
            session: SessionStore::new(storage),
            backend,
            navigator,
            view,
            code_consumed: AtomicBool::new(false),
        }
    }

    pub fn config(&self) -> &HarnessConfig {
        &self.config
    }

    /// Page load
    ///
    /// With a `code` in `page_url` the code is exchanged and the callback
    /// parameters are then stripped from the visible URL, whatever the
    /// outcome. Without one the page simply renders.
    pub async fn initialize(&self, page_url: &Url) -> SessionState {
        let mut code = None;
        let mut provider_error = None;
        let mut provider_description = None;
        for (key, value) in page_url.query_pairs() {
            match &*key {
                "code" => code = Some(value.into_owned()),
                "error" => provider_error = Some(value.into_owned()),
                "error_description" => provider_description = Some(value.into_owned()),
                _ => {}
            }
        }

        if let Some(error) = provider_error {
            let err = SessionError::ProviderError {
                error,
                description: provider_description,
            };
            warn!(error = %err, "identity provider reported a failed login");
            self.view.alert(&format!("Login failed: {}", err));
        }

        match code {
            Some(code) => {
                let state = self.exchange_code(&code).await;
                self.navigator.replace(&strip_callback_params(page_url));
                state
            }
            None => self.render().await,
        }
    }

    /// Send the browser to the backend's login endpoint
    ///
    /// A pending force-login flag (set by [`Self::full_logout`]) is consumed
    /// here and makes the login forced regardless of `force_login`.
    pub fn login(&self, force_login: bool) -> Result<Url> {
        let flagged = self
            .session
            .take_force_login()
            .map_err(SessionError::StorageError)?;
        let forced = flagged || force_login;

        let url = self.endpoints.login_url(&self.config.callback_url, forced)?;
        info!(forced, "redirecting to login");
        self.navigator
            .navigate(&url)
            .map_err(SessionError::NavigationError)?;
        Ok(url)
    }

    /// Exchange an authorization code, then render
    ///
    /// Never fails: a rejection is shown to the user and the page renders
    /// either way. The code is single-use upstream, so a controller only
    /// ever sends one; later calls just render.
    pub async fn exchange_code(&self, code: &str) -> SessionState {
        if self.code_consumed.swap(true, Ordering::SeqCst) {
            warn!("authorization code already exchanged for this page load, skipping");
            return self.render().await;
        }

        if let Err(e) = self.store_exchanged_tokens(code).await {
            warn!(error = %e, "authorization code exchange failed");
            self.view.alert(&format!("Login failed: {}", e));
        }

        self.render().await
    }

    async fn store_exchanged_tokens(&self, code: &str) -> Result<()> {
        let tokens = self
            .backend
            .exchange_code(code, &self.config.callback_url)
            .await?;

        self.session
            .save_tokens(&tokens)
            .map_err(SessionError::StorageError)?;

        info!(id_token = tokens.id_token.is_some(), "session established");
        Ok(())
    }

    /// End the session
    ///
    /// With both tokens stored the backend is notified (bounded wait, outcome
    /// discarded) and the browser returns to the app. Otherwise the browser
    /// goes straight to the backend's logout endpoint. Local tokens are
    /// cleared in both cases.
    ///
    /// A store that cannot be read is treated as holding no tokens: cleanup,
    /// navigation and render still happen, and the read error is returned
    /// afterwards.
    pub async fn logout(&self) -> Result<Url> {
        let loaded = self.session.load();
        let tokens = match &loaded {
            Ok(session) => session.access_token.as_deref().zip(session.id_token.as_deref()),
            Err(e) => {
                warn!(error = %e, "failed to read stored tokens, logging out without them");
                None
            }
        };

        let destination = match tokens {
            Some((access_token, id_token)) => {
                self.notify_logout(access_token, id_token).await;
                Ok(self.config.logout_redirect_url.clone())
            }
            None => self.endpoints.logout_url(&self.config.logout_redirect_url, None),
        };

        let cleared = self.session.clear_tokens();
        if let Err(e) = &cleared {
            warn!(error = %e, "failed to clear stored tokens");
        }

        let destination = destination?;
        info!(%destination, "logged out");
        self.navigator
            .navigate(&destination)
            .map_err(SessionError::NavigationError)?;
        self.render().await;

        loaded.map_err(SessionError::StorageError)?;
        cleared.map_err(SessionError::StorageError)?;
        Ok(destination)
    }

    async fn notify_logout(&self, access_token: &str, id_token: &str) {
        let notification = self.backend.notify_logout(
            access_token,
            id_token,
            &self.config.logout_redirect_url,
        );

        // Best effort: whatever happens here, local cleanup proceeds.
        match tokio::time::timeout(self.config.logout_notify_timeout, notification).await {
            Ok(Ok(status)) => debug!(%status, "backend acknowledged logout"),
            Ok(Err(e)) => debug!(error = %e, "logout notification failed, discarding"),
            Err(_) => debug!(
                timeout_ms = self.config.logout_notify_timeout.as_millis() as u64,
                "logout notification timed out, discarding"
            ),
        }
    }

    /// Log out and make the next login interactive
    pub async fn full_logout(&self) -> Result<Url> {
        self.session
            .set_force_login(true)
            .map_err(SessionError::StorageError)?;
        self.logout().await
    }

    /// The fetch-data control
    ///
    /// Requires a stored access token. A rejected fetch invalidates the
    /// session exactly like the render path does.
    pub async fn fetch_profile(&self) -> Result<UserProfile> {
        let Some(access_token) = self.stored_access_token()? else {
            self.view.alert(MISSING_TOKEN_MESSAGE);
            return Err(SessionError::MissingCredential);
        };

        match self.backend.current_user(&access_token).await {
            Ok(profile) => {
                self.show_profile(&profile);
                Ok(profile)
            }
            Err(e) => {
                self.invalidate_session(&e);
                Err(e)
            }
        }
    }

    /// The copy-token control
    pub fn copy_token(&self) -> Result<String> {
        match self.stored_access_token()? {
            Some(token) => Ok(token),
            None => {
                self.view.alert(MISSING_TOKEN_MESSAGE);
                Err(SessionError::MissingCredential)
            }
        }
    }

    /// Bring the page in line with what storage holds
    pub async fn render(&self) -> SessionState {
        let access_token = match self.session.access_token() {
            Ok(token) => token,
            Err(e) => {
                warn!(error = %e, "failed to read stored access token, rendering signed out");
                None
            }
        };

        let Some(access_token) = access_token else {
            self.show_signed_out();
            return SessionState::Unauthenticated;
        };

        self.show_signed_in(&access_token);

        match self.backend.current_user(&access_token).await {
            Ok(profile) => {
                self.show_profile(&profile);
                SessionState::Authenticated(profile)
            }
            Err(e) => {
                self.invalidate_session(&e);
                SessionState::Unauthenticated
            }
        }
    }

    fn stored_access_token(&self) -> Result<Option<String>> {
        self.session
            .access_token()
            .map_err(SessionError::StorageError)
    }

    fn invalidate_session(&self, cause: &SessionError) {
        warn!(error = %cause, "profile fetch rejected, clearing session");
        if let Err(e) = self.session.clear_tokens() {
            warn!(error = %e, "failed to clear stored tokens");
        }
        self.show_signed_out();
    }

    fn show_signed_out(&self) {
        self.view.set_visible(Element::LoginButton, true);
        for element in Element::SIGNED_IN_CONTROLS {
            self.view.set_visible(element, false);
        }
        self.view.set_visible(Element::Greeting, false);
        self.view.set_visible(Element::TokenBlock, false);
        self.view.set_text(Element::Username, "");
        self.view.set_text(Element::Email, "");
        self.view.set_text(Element::RawToken, "");
    }

    fn show_signed_in(&self, access_token: &str) {
        self.view.set_visible(Element::LoginButton, false);
        for element in Element::SIGNED_IN_CONTROLS {
            self.view.set_visible(element, true);
        }
        self.view.set_visible(Element::TokenBlock, true);
        self.view.set_text(Element::RawToken, access_token);
        // Greeting stays hidden until the profile arrives
        self.view.set_visible(Element::Greeting, false);
    }

    fn show_profile(&self, profile: &UserProfile) {
        self.view.set_text(Element::Username, &profile.name);
        self.view.set_text(Element::Email, &profile.email);
        self.view.set_visible(Element::Greeting, true);
    }
}

/// `page_url` without the provider's callback parameters
fn strip_callback_params(page_url: &Url) -> Url {
    let kept: Vec<(String, String)> = page_url
        .query_pairs()
        .filter(|(key, _)| !CALLBACK_PARAMS.contains(&&**key))
        .map(|(key, value)| (key.into_owned(), value.into_owned()))
        .collect();

    let mut url = page_url.clone();
    if kept.is_empty() {
        url.set_query(None);
    } else {
        url.query_pairs_mut().clear().extend_pairs(kept);
    }
    url
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_callback_params() {
        let page = Url::parse(
            "http://localhost:5173/callback?session_state=s1&code=abc123&iss=http%3A%2F%2Fkc",
        )
        .unwrap();
        assert_eq!(
            strip_callback_params(&page).as_str(),
            "http://localhost:5173/callback"
        );

        let page = Url::parse("http://localhost:5173/callback?code=abc123&tab=profile").unwrap();
        assert_eq!(
            strip_callback_params(&page).as_str(),
            "http://localhost:5173/callback?tab=profile"
        );
    }

    #[test]
    fn test_session_state() {
        assert!(!SessionState::Unauthenticated.is_authenticated());
        assert!(SessionState::Authenticated(UserProfile::default()).is_authenticated());
    }
}
