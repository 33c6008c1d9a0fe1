use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use uuid::Uuid;

use super::{AuthBackend, AuthResult};
use crate::error::AuthError;
use crate::models::Principal;

#[derive(Debug, Clone)]
struct Account {
    id: String,
    password: String,
    display_name: String,
    confirmed: bool,
}

#[derive(Debug, Default)]
struct Inner {
    accounts: HashMap<String, Account>,
    signed_in: Option<String>,
    reset_requests: Vec<String>,
}

/// Account registry kept in memory, for offline use and tests.
#[derive(Debug, Default)]
pub struct MemoryAuthBackend {
    inner: Mutex<Inner>,
}

impl MemoryAuthBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a confirmed account and returns its user id.
    pub fn add_account(&self, email: &str, password: &str, display_name: &str) -> String {
        let id = Uuid::new_v4().to_string();
        self.lock().accounts.insert(
            email.to_string(),
            Account {
                id: id.clone(),
                password: password.to_string(),
                display_name: display_name.to_string(),
                confirmed: true,
            },
        );
        id
    }

    pub fn confirm_email(&self, email: &str) {
        if let Some(account) = self.lock().accounts.get_mut(email) {
            account.confirmed = true;
        }
    }

    pub fn reset_requests(&self) -> Vec<String> {
        self.lock().reset_requests.clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn with_signed_in<T>(&self, f: impl FnOnce(&mut Account) -> T) -> AuthResult<T> {
        let mut inner = self.lock();
        let email = inner.signed_in.clone().ok_or(AuthError::NotSignedIn)?;
        let account = inner
            .accounts
            .get_mut(&email)
            .ok_or(AuthError::NotSignedIn)?;
        Ok(f(account))
    }
}

#[async_trait]
impl AuthBackend for MemoryAuthBackend {
    async fn sign_in(&self, email: &str, password: &str) -> AuthResult<Principal> {
        let mut inner = self.lock();
        let account = inner
            .accounts
            .get(email)
            .filter(|a| a.password == password)
            .cloned()
            .ok_or(AuthError::InvalidCredentials)?;
        if !account.confirmed {
            return Err(AuthError::EmailNotConfirmed);
        }
        inner.signed_in = Some(email.to_string());
        Ok(Principal::new(account.id, email, Some(&account.display_name)))
    }

    async fn sign_up(&self, email: &str, password: &str, display_name: &str) -> AuthResult<()> {
        let mut inner = self.lock();
        if inner.accounts.contains_key(email) {
            return Err(AuthError::Rejected("User already registered".to_string()));
        }
        inner.accounts.insert(
            email.to_string(),
            Account {
                id: Uuid::new_v4().to_string(),
                password: password.to_string(),
                display_name: display_name.to_string(),
                confirmed: false,
            },
        );
        Ok(())
    }

    async fn sign_out(&self) -> AuthResult<()> {
        self.lock().signed_in = None;
        Ok(())
    }

    async fn request_password_reset(&self, email: &str) -> AuthResult<()> {
        self.lock().reset_requests.push(email.to_string());
        Ok(())
    }

    async fn update_profile(&self, display_name: &str) -> AuthResult<()> {
        self.with_signed_in(|account| account.display_name = display_name.to_string())
    }

    async fn update_password(&self, new_password: &str) -> AuthResult<()> {
        if new_password.len() < 6 {
            return Err(AuthError::Rejected(
                "Password should be at least 6 characters".to_string(),
            ));
        }
        self.with_signed_in(|account| account.password = new_password.to_string())
    }
}
