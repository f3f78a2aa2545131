//! REST client for the identity provider.
//!
//! Speaks the provider's auth surface (`/auth/v1/*`): OTP verification, code
//! exchange, session adoption, password update, sign-out and recovery email.
//! The client owns the session store and broadcasts [`AuthEvent`]s whenever
//! the stored session changes, which is what recovery flows race against.

use crate::APP_USER_AGENT;
use crate::provider::{AuthEvent, IdentityProvider, ProviderError, Session, SignOutScope};
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde_json::{json, Value};
use std::sync::{Arc, PoisonError, RwLock};
use tokio::sync::broadcast;
use tracing::{debug, info_span, Instrument};
use url::Url;

const EVENT_CHANNEL_CAPACITY: usize = 16;

pub struct HttpProvider {
    http: Client,
    base_url: String,
    api_key: SecretString,
    session: Arc<RwLock<Option<Session>>>,
    events: broadcast::Sender<AuthEvent>,
}

impl HttpProvider {
    /// Build a client for the provider at `base_url`.
    ///
    /// # Errors
    /// Returns an error if `base_url` cannot be parsed, has no host, or uses
    /// an unsupported scheme.
    pub fn new(base_url: &str, api_key: SecretString) -> Result<Self> {
        let http = Client::builder().user_agent(APP_USER_AGENT).build()?;
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);

        Ok(Self {
            http,
            base_url: base_endpoint(base_url)?,
            api_key,
            session: Arc::new(RwLock::new(None)),
            events,
        })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    fn stored_session(&self) -> Option<Session> {
        self.session
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn install_session(&self, session: Session, event: AuthEvent) {
        *self
            .session
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Some(session);
        let _ = self.events.send(event);
    }

    fn clear_session(&self) {
        *self
            .session
            .write()
            .unwrap_or_else(PoisonError::into_inner) = None;
        let _ = self.events.send(AuthEvent::SignedOut);
    }

    /// POST a JSON payload and parse the session out of the response body.
    async fn post_for_session(
        &self,
        span_name: &'static str,
        url: &str,
        payload: Value,
    ) -> Result<Session, ProviderError> {
        let span = info_span!(
            "provider",
            otel.name = span_name,
            http.method = "POST",
            url = %url
        );
        let response = self
            .http
            .post(url)
            .header("apikey", self.api_key.expose_secret())
            .json(&payload)
            .send()
            .instrument(span)
            .await?;

        if !response.status().is_success() {
            return Err(error_from_response(url, response).await);
        }

        let json_response: Value = response.json().await?;
        session_from_json(&json_response)
    }
}

#[async_trait]
impl IdentityProvider for HttpProvider {
    async fn verify_recovery_token_hash(
        &self,
        token_hash: &str,
    ) -> Result<Session, ProviderError> {
        let url = self.endpoint("/auth/v1/verify");
        let payload = json!({
            "type": "recovery",
            "token_hash": token_hash
        });

        let session = self.post_for_session("verify_otp", &url, payload).await?;
        self.install_session(session.clone(), AuthEvent::PasswordRecovery);

        Ok(session)
    }

    async fn exchange_authorization_code(&self, code: &str) -> Result<Session, ProviderError> {
        let url = self.endpoint("/auth/v1/token?grant_type=pkce");
        let payload = json!({
            "auth_code": code
        });

        let session = self.post_for_session("exchange_code", &url, payload).await?;
        self.install_session(session.clone(), AuthEvent::SignedIn);

        Ok(session)
    }

    async fn set_session(
        &self,
        access_token: &str,
        refresh_token: &str,
    ) -> Result<Session, ProviderError> {
        // The pair comes straight out of a URL; probe the user endpoint to
        // confirm it is live before adopting it as the session.
        let url = self.endpoint("/auth/v1/user");
        let span = info_span!(
            "provider",
            otel.name = "set_session",
            http.method = "GET",
            url = %url
        );
        let response = self
            .http
            .get(&url)
            .header("apikey", self.api_key.expose_secret())
            .bearer_auth(access_token)
            .send()
            .instrument(span)
            .await?;

        if !response.status().is_success() {
            return Err(error_from_response(&url, response).await);
        }

        let session = Session::new(
            SecretString::from(access_token.to_string()),
            SecretString::from(refresh_token.to_string()),
        );
        self.install_session(session.clone(), AuthEvent::SignedIn);

        Ok(session)
    }

    async fn current_session(&self) -> Result<Option<Session>, ProviderError> {
        Ok(self.stored_session())
    }

    fn subscribe(&self) -> broadcast::Receiver<AuthEvent> {
        self.events.subscribe()
    }

    async fn update_password(&self, new_password: &SecretString) -> Result<(), ProviderError> {
        let Some(session) = self.stored_session() else {
            return Err(ProviderError::Unauthorized);
        };

        let url = self.endpoint("/auth/v1/user");
        let payload = json!({
            "password": new_password.expose_secret()
        });

        let span = info_span!(
            "provider",
            otel.name = "update_password",
            http.method = "PUT",
            url = %url
        );
        let response = self
            .http
            .put(&url)
            .header("apikey", self.api_key.expose_secret())
            .bearer_auth(session.access_token().expose_secret())
            .json(&payload)
            .send()
            .instrument(span)
            .await?;

        if !response.status().is_success() {
            return Err(error_from_response(&url, response).await);
        }

        Ok(())
    }

    async fn sign_out(&self, scope: SignOutScope) -> Result<(), ProviderError> {
        let remote = match self.stored_session() {
            Some(session) => {
                let url = self.endpoint(&format!("/auth/v1/logout?scope={}", scope.as_str()));
                let span = info_span!(
                    "provider",
                    otel.name = "sign_out",
                    http.method = "POST",
                    url = %url
                );
                let response = self
                    .http
                    .post(&url)
                    .header("apikey", self.api_key.expose_secret())
                    .bearer_auth(session.access_token().expose_secret())
                    .send()
                    .instrument(span)
                    .await?;

                if response.status().is_success() {
                    Ok(())
                } else {
                    Err(error_from_response(&url, response).await)
                }
            }
            None => Ok(()),
        };

        // Always drop the local session, even when the revoke call failed.
        self.clear_session();

        remote
    }

    async fn send_recovery_email(
        &self,
        email: &str,
        redirect_url: &Url,
    ) -> Result<(), ProviderError> {
        let url = self.endpoint(&format!(
            "/auth/v1/recover?redirect_to={}",
            urlencoded(redirect_url.as_str())
        ));
        let payload = json!({
            "email": email
        });

        let span = info_span!(
            "provider",
            otel.name = "send_recovery_email",
            http.method = "POST",
            url = %url
        );
        let response = self
            .http
            .post(&url)
            .header("apikey", self.api_key.expose_secret())
            .json(&payload)
            .send()
            .instrument(span)
            .await?;

        if !response.status().is_success() {
            return Err(error_from_response(&url, response).await);
        }

        Ok(())
    }
}

/// Normalize the provider base URL to `scheme://host:port`.
fn base_endpoint(base_url: &str) -> Result<String> {
    let url = Url::parse(base_url)?;

    let scheme = url.scheme();

    let host = url
        .host()
        .ok_or_else(|| anyhow!("Error parsing URL: no host specified"))?
        .to_owned();

    let port = match url.port() {
        Some(p) => p,
        None => match scheme {
            "http" => 80,
            "https" => 443,
            _ => return Err(anyhow!("Error parsing URL: unsupported scheme {scheme}")),
        },
    };

    let endpoint = format!("{scheme}://{host}:{port}");

    debug!("provider endpoint: {}", endpoint);

    Ok(endpoint)
}

fn urlencoded(value: &str) -> String {
    url::form_urlencoded::byte_serialize(value.as_bytes()).collect()
}

fn session_from_json(json_response: &Value) -> Result<Session, ProviderError> {
    let access_token = json_response
        .get("access_token")
        .and_then(Value::as_str)
        .ok_or_else(|| ProviderError::Malformed("no access_token found".to_string()))?;
    let refresh_token = json_response
        .get("refresh_token")
        .and_then(Value::as_str)
        .ok_or_else(|| ProviderError::Malformed("no refresh_token found".to_string()))?;

    Ok(Session::new(
        SecretString::from(access_token.to_string()),
        SecretString::from(refresh_token.to_string()),
    ))
}

fn provider_error_message(json_response: &Value) -> &str {
    json_response
        .get("error_description")
        .or_else(|| json_response.get("msg"))
        .or_else(|| json_response.get("message"))
        .and_then(Value::as_str)
        .unwrap_or("")
}

fn is_same_password_rejection(message: &str) -> bool {
    message.to_lowercase().contains("different from the old password")
        || message.to_lowercase().contains("same password")
}

async fn error_from_response(url: &str, response: reqwest::Response) -> ProviderError {
    let status = response.status();

    if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        return ProviderError::Unauthorized;
    }

    let json_response: Value = response.json().await.unwrap_or(Value::Null);
    let message = provider_error_message(&json_response);

    if is_same_password_rejection(message) {
        return ProviderError::SamePassword;
    }

    ProviderError::Rejected(format!("{url} - {status}, {message}"))
}
