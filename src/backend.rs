/// Backend REST surface: login/logout URLs, code exchange and profile fetch
use crate::config::HarnessConfig;
use crate::error::{Result, SessionError};
use crate::session::TokenSet;
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::debug;
use url::Url;

/// Maximum length of a response body quoted in an error message
const MAX_ERROR_BODY_LENGTH: usize = 200;

/// Profile returned by `GET /user/me`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: String,
}

/// Envelope the backend wraps API payloads in
#[derive(Debug, Deserialize)]
struct ApiEnvelope<T> {
    data: T,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CodeExchangeRequest<'a> {
    code: &'a str,
    redirect_uri: &'a str,
}

/// Error bodies the backend is known to produce
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ErrorBody {
    Detailed { error: ErrorDetails },
    Flat { error: String },
    Message { message: String },
}

#[derive(Debug, Deserialize)]
struct ErrorDetails {
    message: String,
}

impl ErrorBody {
    fn into_message(self) -> String {
        match self {
            ErrorBody::Detailed { error } => error.message,
            ErrorBody::Flat { error } => error,
            ErrorBody::Message { message } => message,
        }
    }
}

/// Extract a human-readable message from a rejected code exchange
fn rejection_message(status: StatusCode, body: &str) -> String {
    serde_json::from_str::<ErrorBody>(body)
        .map(ErrorBody::into_message)
        .ok()
        .filter(|message| !message.trim().is_empty())
        .unwrap_or_else(|| format!("code exchange failed with status {}", status))
}

fn truncate_body(body: &str) -> &str {
    match body.char_indices().nth(MAX_ERROR_BODY_LENGTH) {
        Some((idx, _)) => &body[..idx],
        None => body,
    }
}

/// URL builder for the backend's `/api/v1` endpoints
#[derive(Debug, Clone)]
pub struct Endpoints {
    api_base: Url,
}

impl Endpoints {
    pub fn new(config: &HarnessConfig) -> Self {
        Self {
            api_base: config.backend_base_url.clone(),
        }
    }

    fn endpoint(&self, path: &[&str]) -> Result<Url> {
        let mut url = self.api_base.clone();
        url.set_query(None);
        url.set_fragment(None);
        url.path_segments_mut()
            .map_err(|_| SessionError::ConfigError("backend URL cannot carry a path".into()))?
            .pop_if_empty()
            .extend(["api", "v1"])
            .extend(path);
        Ok(url)
    }

    /// Where the browser goes to start a login
    ///
    /// A forced login asks the backend to make the provider show its login
    /// form even when a single-sign-on session already exists.
    pub fn login_url(&self, redirect_uri: &Url, force_login: bool) -> Result<Url> {
        let mut url = self.endpoint(&["auth", "login"])?;
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("redirect_uri", redirect_uri.as_str());
            if force_login {
                query.append_pair("prompt", "true");
            }
        }
        Ok(url)
    }

    /// Backend logout endpoint, optionally carrying the identity token hint
    pub fn logout_url(&self, redirect_uri: &Url, id_token_hint: Option<&str>) -> Result<Url> {
        let mut url = self.endpoint(&["auth", "logout"])?;
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("redirect_uri", redirect_uri.as_str());
            if let Some(hint) = id_token_hint {
                query.append_pair("id_token_hint", hint);
            }
        }
        Ok(url)
    }

    pub fn code_exchange_url(&self) -> Result<Url> {
        self.endpoint(&["auth", "code"])
    }

    pub fn current_user_url(&self) -> Result<Url> {
        self.endpoint(&["user", "me"])
    }
}

/// The three network calls the session controller makes
#[async_trait]
pub trait Backend: Send + Sync {
    /// Exchange a single-use authorization code for tokens
    async fn exchange_code(&self, code: &str, redirect_uri: &Url) -> Result<TokenSet>;

    /// Fetch the profile of the user the access token belongs to
    async fn current_user(&self, access_token: &str) -> Result<UserProfile>;

    /// Tell the backend the session is ending
    ///
    /// Callers treat this as best effort and discard the outcome.
    async fn notify_logout(
        &self,
        access_token: &str,
        id_token: &str,
        redirect_uri: &Url,
    ) -> Result<StatusCode>;
}

/// reqwest-backed [`Backend`]
#[derive(Clone)]
pub struct HttpBackend {
    client: Client,
    endpoints: Endpoints,
}

impl HttpBackend {
    pub fn new(config: &HarnessConfig) -> Result<Self> {
        let client = Client::builder().timeout(config.request_timeout).build()?;

        Ok(Self {
            client,
            endpoints: Endpoints::new(config),
        })
    }
}

#[async_trait]
impl Backend for HttpBackend {
    async fn exchange_code(&self, code: &str, redirect_uri: &Url) -> Result<TokenSet> {
        let url = self.endpoints.code_exchange_url()?;
        debug!(%url, "exchanging authorization code");

        let response = self
            .client
            .post(url)
            .json(&CodeExchangeRequest {
                code,
                redirect_uri: redirect_uri.as_str(),
            })
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            return Err(SessionError::ExchangeRejected(rejection_message(status, &body)));
        }

        serde_json::from_str(&body).map_err(|e| {
            SessionError::InvalidResponse(format!(
                "unexpected code exchange body ({}): {}",
                e,
                truncate_body(&body)
            ))
        })
    }

    async fn current_user(&self, access_token: &str) -> Result<UserProfile> {
        let url = self.endpoints.current_user_url()?;

        let response = self.client.get(url).bearer_auth(access_token).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(SessionError::SessionRejected(status));
        }

        let envelope: ApiEnvelope<UserProfile> = response.json().await?;
        Ok(envelope.data)
    }

    async fn notify_logout(
        &self,
        access_token: &str,
        id_token: &str,
        redirect_uri: &Url,
    ) -> Result<StatusCode> {
        let url = self.endpoints.logout_url(redirect_uri, Some(id_token))?;

        let response = self.client.get(url).bearer_auth(access_token).send().await?;
        Ok(response.status())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn endpoints(base: &str) -> Endpoints {
        let config = HarnessConfig::new(
            Url::parse(base).unwrap(),
            Url::parse("http://localhost:5173/callback").unwrap(),
            Url::parse("http://localhost:5173").unwrap(),
        )
        .unwrap();
        Endpoints::new(&config)
    }

    #[test]
    fn test_login_url() {
        let endpoints = endpoints("http://localhost:8081");
        let callback = Url::parse("http://localhost:5173/callback").unwrap();

        let url = endpoints.login_url(&callback, false).unwrap();
        assert_eq!(
            url.as_str(),
            "http://localhost:8081/api/v1/auth/login?redirect_uri=http%3A%2F%2Flocalhost%3A5173%2Fcallback"
        );

        let forced = endpoints.login_url(&callback, true).unwrap();
        assert!(forced.as_str().ends_with("&prompt=true"));
    }

    #[test]
    fn test_logout_url() {
        let endpoints = endpoints("http://localhost:8081/");
        let redirect = Url::parse("http://localhost:5173").unwrap();

        let bare = endpoints.logout_url(&redirect, None).unwrap();
        assert_eq!(bare.path(), "/api/v1/auth/logout");
        let pairs: Vec<_> = bare.query_pairs().into_owned().collect();
        assert_eq!(
            pairs,
            vec![("redirect_uri".to_string(), "http://localhost:5173/".to_string())]
        );

        let hinted = endpoints.logout_url(&redirect, Some("I1")).unwrap();
        assert!(hinted
            .query_pairs()
            .any(|(k, v)| k == "id_token_hint" && v == "I1"));
    }

    #[test]
    fn test_endpoints_respect_base_path() {
        let endpoints = endpoints("https://example.com/tracker/?debug=1");

        assert_eq!(
            endpoints.code_exchange_url().unwrap().as_str(),
            "https://example.com/tracker/api/v1/auth/code"
        );
        assert_eq!(
            endpoints.current_user_url().unwrap().as_str(),
            "https://example.com/tracker/api/v1/user/me"
        );
    }

    #[test]
    fn test_rejection_message_shapes() {
        let status = StatusCode::UNAUTHORIZED;

        assert_eq!(
            rejection_message(status, r#"{"error": "Error exchanging code"}"#),
            "Error exchanging code"
        );
        assert_eq!(
            rejection_message(
                status,
                r#"{"success": false, "error": {"message": "Code expired", "code": "INVALID_GRANT"}}"#
            ),
            "Code expired"
        );
        assert_eq!(
            rejection_message(status, "<html>Bad Gateway</html>"),
            "code exchange failed with status 401 Unauthorized"
        );
        assert_eq!(
            rejection_message(status, r#"{"error": ""}"#),
            "code exchange failed with status 401 Unauthorized"
        );
    }

    #[test]
    fn test_code_exchange_request_shape() {
        let body = serde_json::to_value(CodeExchangeRequest {
            code: "abc123",
            redirect_uri: "http://localhost:5173/callback",
        })
        .unwrap();

        assert_eq!(
            body,
            serde_json::json!({"code": "abc123", "redirectUri": "http://localhost:5173/callback"})
        );
    }

    #[test]
    fn test_truncate_body() {
        let long = "x".repeat(500);
        assert_eq!(truncate_body(&long).len(), MAX_ERROR_BODY_LENGTH);
        assert_eq!(truncate_body("short"), "short");
    }
}
