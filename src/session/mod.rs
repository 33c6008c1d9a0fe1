mod memory;
mod rest;

pub use memory::MemoryAuthBackend;
pub use rest::RestAuthBackend;

use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use tokio::sync::watch;

use crate::error::AuthError;
use crate::models::Principal;

pub type AuthResult<T> = std::result::Result<T, AuthError>;

/// Bearer token of the current session, shared with the data client so its
/// requests are made on behalf of the signed-in user.
#[derive(Debug, Clone, Default)]
pub struct AccessToken(Arc<RwLock<Option<String>>>);

impl AccessToken {
    pub fn get(&self) -> Option<String> {
        self.0.read().ok().and_then(|token| token.clone())
    }

    pub fn set(&self, token: Option<String>) {
        if let Ok(mut current) = self.0.write() {
            *current = token;
        }
    }
}

#[async_trait]
pub trait AuthBackend: Send + Sync {
    async fn sign_in(&self, email: &str, password: &str) -> AuthResult<Principal>;
    async fn sign_up(&self, email: &str, password: &str, display_name: &str) -> AuthResult<()>;
    async fn sign_out(&self) -> AuthResult<()>;
    async fn request_password_reset(&self, email: &str) -> AuthResult<()>;
    async fn update_profile(&self, display_name: &str) -> AuthResult<()>;
    async fn update_password(&self, new_password: &str) -> AuthResult<()>;
}

/// Tracks the signed-in principal and tells subscribers when it changes.
pub struct SessionManager {
    backend: Arc<dyn AuthBackend>,
    current: watch::Sender<Option<Principal>>,
}

impl SessionManager {
    pub fn new(backend: Arc<dyn AuthBackend>) -> Self {
        let (current, _) = watch::channel(None);
        Self { backend, current }
    }

    pub fn current(&self) -> Option<Principal> {
        self.current.borrow().clone()
    }

    /// Receiver that observes every sign-in, sign-out and profile change.
    pub fn subscribe(&self) -> watch::Receiver<Option<Principal>> {
        self.current.subscribe()
    }

    pub async fn sign_in(&self, email: &str, password: &str) -> AuthResult<Principal> {
        let principal = self.backend.sign_in(email.trim(), password).await?;
        tracing::info!("Signed in as {}", principal.email);
        self.current.send_replace(Some(principal.clone()));
        Ok(principal)
    }

    /// Registers an account. The user still has to confirm the email before
    /// signing in, so the current principal is left alone.
    pub async fn sign_up(&self, email: &str, password: &str, display_name: &str) -> AuthResult<()> {
        self.backend
            .sign_up(email.trim(), password, display_name.trim())
            .await
    }

    /// Ends the session locally even when the backend call fails.
    pub async fn sign_out(&self) -> AuthResult<()> {
        let result = self.backend.sign_out().await;
        if let Err(e) = &result {
            tracing::warn!("Backend sign-out failed, clearing local session anyway: {}", e);
        }
        self.current.send_replace(None);
        result
    }

    pub async fn request_password_reset(&self, email: &str) -> AuthResult<()> {
        self.backend.request_password_reset(email.trim()).await
    }

    pub async fn update_profile(&self, display_name: &str) -> AuthResult<Principal> {
        if self.current().is_none() {
            return Err(AuthError::NotSignedIn);
        }
        let display_name = display_name.trim();
        self.backend.update_profile(display_name).await?;

        self.current.send_modify(|current| {
            if let Some(principal) = current {
                *principal = Principal::new(
                    principal.id.clone(),
                    principal.email.clone(),
                    Some(display_name),
                );
            }
        });
        self.current().ok_or(AuthError::NotSignedIn)
    }

    pub async fn update_password(&self, new_password: &str) -> AuthResult<()> {
        if self.current().is_none() {
            return Err(AuthError::NotSignedIn);
        }
        self.backend.update_password(new_password).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manager() -> (SessionManager, Arc<MemoryAuthBackend>) {
        let backend = Arc::new(MemoryAuthBackend::new());
        backend.add_account("ada@example.com", "secret", "Ada");
        (SessionManager::new(backend.clone()), backend)
    }

    #[tokio::test]
    async fn sign_in_publishes_principal() {
        let (session, _) = manager();
        let mut rx = session.subscribe();

        let principal = session.sign_in("ada@example.com", "secret").await.unwrap();
        assert!(rx.has_changed().unwrap());
        assert_eq!(rx.borrow_and_update().as_ref(), Some(&principal));
        assert_eq!(principal.display_name, "Ada");
    }

    #[tokio::test]
    async fn failed_sign_in_keeps_current_principal() {
        let (session, _) = manager();
        session.sign_in("ada@example.com", "secret").await.unwrap();

        let err = session.sign_in("ada@example.com", "wrong").await.unwrap_err();
        assert_eq!(err, AuthError::InvalidCredentials);
        assert_eq!(session.current().unwrap().email, "ada@example.com");
    }

    #[tokio::test]
    async fn unconfirmed_account_cannot_sign_in() {
        let (session, backend) = manager();
        session.sign_up("bob@example.com", "pw", "Bob").await.unwrap();

        let err = session.sign_in("bob@example.com", "pw").await.unwrap_err();
        assert_eq!(err, AuthError::EmailNotConfirmed);

        backend.confirm_email("bob@example.com");
        tokio_test::assert_ok!(session.sign_in("bob@example.com", "pw").await);
    }

    #[tokio::test]
    async fn sign_out_notifies_none() {
        let (session, _) = manager();
        session.sign_in("ada@example.com", "secret").await.unwrap();
        let mut rx = session.subscribe();

        session.sign_out().await.unwrap();
        assert!(rx.has_changed().unwrap());
        assert!(rx.borrow_and_update().is_none());
    }

    #[tokio::test]
    async fn profile_update_republishes_display_name() {
        let (session, _) = manager();
        assert_eq!(
            session.update_profile("Nope").await.unwrap_err(),
            AuthError::NotSignedIn
        );

        session.sign_in("ada@example.com", "secret").await.unwrap();
        let updated = session.update_profile("Ada L.").await.unwrap();
        assert_eq!(updated.display_name, "Ada L.");
        assert_eq!(session.current().unwrap().display_name, "Ada L.");
    }
}
