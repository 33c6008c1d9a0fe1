use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response};
use serde::{Deserialize, Serialize};
use url::Url;

use super::{AccessToken, AuthBackend, AuthResult};
use crate::error::{AuthError, Result};
use crate::models::Principal;

const AUTH_PATH: &str = "auth/v1/";

#[derive(Debug, Serialize)]
struct PasswordGrant<'a> {
    email: &'a str,
    password: &'a str,
}

#[derive(Debug, Serialize)]
struct SignUpRequest<'a> {
    email: &'a str,
    password: &'a str,
    data: UserMetadata,
}

#[derive(Debug, Serialize)]
struct RecoverRequest<'a> {
    email: &'a str,
}

#[derive(Debug, Serialize)]
struct UpdateUserRequest<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    password: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<UserMetadata>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct UserMetadata {
    #[serde(default)]
    display_name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    user: AuthUser,
}

#[derive(Debug, Deserialize)]
struct AuthUser {
    id: String,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    user_metadata: UserMetadata,
}

#[derive(Debug, Default, Deserialize)]
struct ErrorResponse {
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    error_code: Option<String>,
    #[serde(default)]
    error_description: Option<String>,
    #[serde(default)]
    msg: Option<String>,
}

impl ErrorResponse {
    fn into_auth_error(self) -> AuthError {
        let message = self
            .msg
            .or(self.error_description)
            .or_else(|| self.error.clone())
            .unwrap_or_else(|| "Request rejected".to_string());
        let code = self.error_code.or(self.error).unwrap_or_default();

        match code.as_str() {
            "invalid_credentials" | "invalid_grant" if !message.contains("not confirmed") => {
                AuthError::InvalidCredentials
            }
            "email_not_confirmed" => AuthError::EmailNotConfirmed,
            "otp_expired" | "flow_state_expired" => AuthError::ExpiredLink,
            _ if message.contains("Email not confirmed") => AuthError::EmailNotConfirmed,
            _ => AuthError::Rejected(message),
        }
    }
}

fn network(e: reqwest::Error) -> AuthError {
    AuthError::Network(e.to_string())
}

/// Email/password client for a GoTrue-style auth service.
pub struct RestAuthBackend {
    client: Client,
    base: Url,
    anon_key: String,
    token: AccessToken,
}

impl RestAuthBackend {
    pub fn new(base_url: &str, anon_key: &str, token: AccessToken, timeout: Duration) -> Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        let base = Url::parse(base_url)?.join(AUTH_PATH)?;
        Ok(Self {
            client,
            base,
            anon_key: anon_key.to_string(),
            token,
        })
    }

    fn endpoint(&self, path: &str) -> AuthResult<Url> {
        self.base
            .join(path)
            .map_err(|e| AuthError::Rejected(format!("URL error: {}", e)))
    }

    fn request(&self, request: RequestBuilder) -> RequestBuilder {
        let request = request.header("apikey", &self.anon_key);
        match self.token.get() {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn send(&self, request: RequestBuilder) -> AuthResult<Response> {
        let response = self.request(request).send().await.map_err(network)?;
        if response.status().is_success() {
            return Ok(response);
        }
        let error: ErrorResponse = response.json().await.unwrap_or_default();
        Err(error.into_auth_error())
    }

    fn require_token(&self) -> AuthResult<()> {
        self.token.get().map(|_| ()).ok_or(AuthError::NotSignedIn)
    }
}

#[async_trait]
impl AuthBackend for RestAuthBackend {
    async fn sign_in(&self, email: &str, password: &str) -> AuthResult<Principal> {
        let request = self
            .client
            .post(self.endpoint("token")?)
            .query(&[("grant_type", "password")])
            .json(&PasswordGrant { email, password });

        let response: TokenResponse = self.send(request).await?.json().await.map_err(network)?;
        self.token.set(Some(response.access_token));

        let user = response.user;
        Ok(Principal::new(
            user.id,
            user.email.unwrap_or_default(),
            user.user_metadata.display_name.as_deref(),
        ))
    }

    async fn sign_up(&self, email: &str, password: &str, display_name: &str) -> AuthResult<()> {
        let request = self.client.post(self.endpoint("signup")?).json(&SignUpRequest {
            email,
            password,
            data: UserMetadata {
                display_name: Some(display_name.to_string()),
            },
        });
        self.send(request).await?;
        Ok(())
    }

    async fn sign_out(&self) -> AuthResult<()> {
        if self.token.get().is_none() {
            return Ok(());
        }
        let request = self.client.post(self.endpoint("logout")?);
        let result = self.send(request).await.map(|_| ());
        self.token.set(None);
        result
    }

    async fn request_password_reset(&self, email: &str) -> AuthResult<()> {
        let request = self
            .client
            .post(self.endpoint("recover")?)
            .json(&RecoverRequest { email });
        self.send(request).await?;
        Ok(())
    }

    async fn update_profile(&self, display_name: &str) -> AuthResult<()> {
        self.require_token()?;
        let request = self.client.put(self.endpoint("user")?).json(&UpdateUserRequest {
            password: None,
            data: Some(UserMetadata {
                display_name: Some(display_name.to_string()),
            }),
        });
        self.send(request).await?;
        Ok(())
    }

    async fn update_password(&self, new_password: &str) -> AuthResult<()> {
        self.require_token()?;
        let request = self.client.put(self.endpoint("user")?).json(&UpdateUserRequest {
            password: Some(new_password),
            data: None,
        });
        self.send(request).await?;
        Ok(())
    }
}
