//! Token auth against the runs service.

use std::fmt;

use reqwest::{Client, RequestBuilder, StatusCode};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::{normalize_text_option, ClientConfig};
use crate::remote::{status_error, RemoteError};

const LOGIN_PATH: &str = "/api/auth/login/";
const REGISTER_PATH: &str = "/api/auth/register/";

/// Opaque API token sent as `Authorization: Token <token>`
#[derive(Clone, PartialEq, Eq)]
pub struct Credential(String);

impl Credential {
    /// Wrap a raw token, rejecting blank values
    pub fn new(token: impl Into<String>) -> Option<Self> {
        normalize_text_option(Some(token.into())).map(Self)
    }

    pub fn token(&self) -> &str {
        &self.0
    }

    pub fn authorization_header(&self) -> String {
        format!("Token {}", self.0)
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str("Credential([REDACTED])")
    }
}

#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthSession {
    pub token: String,
    pub email: String,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
}

impl AuthSession {
    /// `None` when the persisted token is blank
    pub fn credential(&self) -> Option<Credential> {
        Credential::new(self.token.clone())
    }

    pub fn display_name(&self) -> String {
        match (self.first_name.as_deref(), self.last_name.as_deref()) {
            (Some(first), Some(last)) => format!("{first} {last}"),
            (Some(name), None) | (None, Some(name)) => name.to_string(),
            (None, None) => self.email.clone(),
        }
    }
}

impl fmt::Debug for AuthSession {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("AuthSession")
            .field("token", &"[REDACTED]")
            .field("email", &self.email)
            .field("first_name", &self.first_name)
            .field("last_name", &self.last_name)
            .finish()
    }
}

/// Fields for `POST /api/auth/register/`
#[derive(Clone, PartialEq, Eq)]
pub struct Registration {
    pub email: String,
    pub password: String,
    pub first_name: String,
    pub last_name: String,
}

impl fmt::Debug for Registration {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("Registration")
            .field("email", &self.email)
            .field("password", &"[REDACTED]")
            .field("first_name", &self.first_name)
            .field("last_name", &self.last_name)
            .finish()
    }
}

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Invalid credentials: {0}")]
    InvalidInput(&'static str),
    #[error("Email or password is incorrect")]
    Unauthorized,
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Failed to parse JSON payload: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Auth API error: {0}")]
    Api(String),
    #[error("Session storage error: {0}")]
    Storage(String),
}

pub type AuthResult<T> = Result<T, AuthError>;

impl From<RemoteError> for AuthError {
    fn from(error: RemoteError) -> Self {
        match error {
            RemoteError::Unauthorized => Self::Unauthorized,
            other => Self::Api(other.to_string()),
        }
    }
}

/// Where the signed-in session lives between process runs
pub trait SessionPersistence: Clone + Send + Sync + 'static {
    fn load_session(&self) -> AuthResult<Option<AuthSession>>;
    fn save_session(&self, session: &AuthSession) -> AuthResult<()>;
    fn clear_session(&self) -> AuthResult<()>;
}

#[derive(Clone)]
pub struct AuthClient<S: SessionPersistence> {
    config: ClientConfig,
    client: Client,
    store: S,
}

impl<S: SessionPersistence> AuthClient<S> {
    pub fn new(config: ClientConfig, store: S) -> AuthResult<Self> {
        let client = Client::builder().timeout(config.request_timeout).build()?;
        Ok(Self {
            config,
            client,
            store,
        })
    }

    /// The persisted session, if any. Tokens do not expire client-side.
    pub fn current_session(&self) -> AuthResult<Option<AuthSession>> {
        self.store.load_session()
    }

    pub async fn login(&self, email: &str, password: &str) -> AuthResult<AuthSession> {
        validate_credentials(email, password)?;

        let payload = serde_json::json!({
            "email": email.trim(),
            "password": password,
        });
        let request = self.client.post(self.config.endpoint(LOGIN_PATH)).json(&payload);
        let response = send_auth_request(request, StatusCode::OK).await?;
        let session = response.into_session(email.trim())?;

        self.store.save_session(&session)?;
        tracing::info!("Signed in as {}", session.email);
        Ok(session)
    }

    pub async fn register(&self, registration: &Registration) -> AuthResult<AuthSession> {
        validate_credentials(&registration.email, &registration.password)?;

        let payload = serde_json::json!({
            "email": registration.email.trim(),
            "password": registration.password,
            "password_confirm": registration.password,
            "first_name": registration.first_name.trim(),
            "last_name": registration.last_name.trim(),
        });
        let request = self
            .client
            .post(self.config.endpoint(REGISTER_PATH))
            .json(&payload);
        let response = send_auth_request(request, StatusCode::CREATED).await?;
        let session = response.into_session(registration.email.trim())?;

        self.store.save_session(&session)?;
        tracing::info!("Registered {}", session.email);
        Ok(session)
    }

    /// Forget the local session. The service has no logout endpoint.
    pub fn logout(&self) -> AuthResult<()> {
        self.store.clear_session()
    }
}

async fn send_auth_request(
    request: RequestBuilder,
    expected: StatusCode,
) -> AuthResult<AuthResponse> {
    let response = request.header("Accept", "application/json").send().await?;
    let status = response.status();
    let body = response.text().await?;
    if status != expected {
        return Err(status_error(status, &body).into());
    }
    Ok(serde_json::from_str(&body)?)
}

fn validate_credentials(email: &str, password: &str) -> AuthResult<()> {
    if email.trim().is_empty() {
        return Err(AuthError::InvalidInput("email is required"));
    }
    if password.is_empty() {
        return Err(AuthError::InvalidInput("password is required"));
    }
    Ok(())
}

#[derive(Debug, Deserialize)]
struct AuthResponse {
    token: String,
    email: Option<String>,
    first_name: Option<String>,
    last_name: Option<String>,
}

impl AuthResponse {
    fn into_session(self, fallback_email: &str) -> AuthResult<AuthSession> {
        let token = normalize_text_option(Some(self.token))
            .ok_or_else(|| AuthError::Api("auth response did not include a token".to_string()))?;
        Ok(AuthSession {
            token,
            email: normalize_text_option(self.email)
                .unwrap_or_else(|| fallback_email.to_string()),
            first_name: normalize_text_option(self.first_name),
            last_name: normalize_text_option(self.last_name),
        })
    }
}
