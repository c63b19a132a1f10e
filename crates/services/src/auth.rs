use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use gxp_core::model::UserId;
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::{AccountError, AuthError};

/// Shortest password accepted by a password change.
pub const MIN_PASSWORD_LEN: usize = 6;

/// Authentication backend. Every call is a black-box success or failure.
#[async_trait]
pub trait AuthGateway: Send + Sync {
    /// # Errors
    ///
    /// Returns `AuthError::InvalidCredentials` for a wrong email or password.
    async fn sign_in(&self, email: &str, password: &str) -> Result<UserId, AuthError>;

    /// # Errors
    ///
    /// Returns `AuthError::Unavailable` if the backend cannot be reached.
    async fn sign_out(&self) -> Result<(), AuthError>;

    /// Send a reset email. Unknown addresses are not reported.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::Unavailable` if the backend cannot be reached.
    async fn send_password_reset(&self, email: &str) -> Result<(), AuthError>;

    /// Confirm the signed-in user's current password.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::NotSignedIn` or `AuthError::InvalidCredentials`.
    async fn reauthenticate(&self, current_password: &str) -> Result<(), AuthError>;

    /// # Errors
    ///
    /// Returns `AuthError::NotSignedIn` when nobody is signed in.
    async fn update_password(&self, new_password: &str) -> Result<(), AuthError>;

    async fn current_user(&self) -> Option<UserId>;
}

//
// ─── IN-MEMORY GATEWAY ─────────────────────────────────────────────────────────
//

#[derive(Debug, Clone)]
struct Account {
    uid: UserId,
    password: String,
}

/// Process-local gateway for tests and offline use.
#[derive(Debug, Default, Clone)]
pub struct InMemoryAuthGateway {
    accounts: Arc<Mutex<HashMap<String, Account>>>,
    signed_in: Arc<Mutex<Option<String>>>,
    resets_sent: Arc<Mutex<Vec<String>>>,
}

fn lock<T>(mutex: &Mutex<T>) -> Result<MutexGuard<'_, T>, AuthError> {
    mutex
        .lock()
        .map_err(|_| AuthError::Unavailable("auth state poisoned".into()))
}

impl InMemoryAuthGateway {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an account and return its new uid.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::Unavailable` if the internal state is poisoned.
    pub fn register(&self, email: &str, password: &str) -> Result<UserId, AuthError> {
        let uid = UserId::new(Uuid::new_v4().to_string());
        lock(&self.accounts)?.insert(
            email.trim().to_ascii_lowercase(),
            Account {
                uid: uid.clone(),
                password: password.to_owned(),
            },
        );
        Ok(uid)
    }

    /// Addresses a reset email was sent to, oldest first.
    #[must_use]
    pub fn resets_sent(&self) -> Vec<String> {
        lock(&self.resets_sent).map(|v| v.clone()).unwrap_or_default()
    }

    fn signed_in_email(&self) -> Result<String, AuthError> {
        lock(&self.signed_in)?.clone().ok_or(AuthError::NotSignedIn)
    }
}

#[async_trait]
impl AuthGateway for InMemoryAuthGateway {
    async fn sign_in(&self, email: &str, password: &str) -> Result<UserId, AuthError> {
        let key = email.trim().to_ascii_lowercase();
        let uid = match lock(&self.accounts)?.get(&key) {
            Some(account) if account.password == password => account.uid.clone(),
            _ => return Err(AuthError::InvalidCredentials),
        };
        *lock(&self.signed_in)? = Some(key);
        Ok(uid)
    }

    async fn sign_out(&self) -> Result<(), AuthError> {
        *lock(&self.signed_in)? = None;
        Ok(())
    }

    async fn send_password_reset(&self, email: &str) -> Result<(), AuthError> {
        lock(&self.resets_sent)?.push(email.trim().to_ascii_lowercase());
        Ok(())
    }

    async fn reauthenticate(&self, current_password: &str) -> Result<(), AuthError> {
        let email = self.signed_in_email()?;
        match lock(&self.accounts)?.get(&email) {
            Some(account) if account.password == current_password => Ok(()),
            _ => Err(AuthError::InvalidCredentials),
        }
    }

    async fn update_password(&self, new_password: &str) -> Result<(), AuthError> {
        let email = self.signed_in_email()?;
        let mut accounts = lock(&self.accounts)?;
        let account = accounts.get_mut(&email).ok_or(AuthError::NotSignedIn)?;
        account.password = new_password.to_owned();
        Ok(())
    }

    async fn current_user(&self) -> Option<UserId> {
        let email = lock(&self.signed_in).ok()?.clone()?;
        lock(&self.accounts).ok()?.get(&email).map(|a| a.uid.clone())
    }
}

//
// ─── ACCOUNT SERVICE ───────────────────────────────────────────────────────────
//

fn required<'a>(field: &'static str, value: &'a str) -> Result<&'a str, AccountError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(AccountError::EmptyField(field));
    }
    Ok(trimmed)
}

/// Account flows with local validation in front of the gateway.
#[derive(Clone)]
pub struct AccountService {
    auth: Arc<dyn AuthGateway>,
}

impl AccountService {
    #[must_use]
    pub fn new(auth: Arc<dyn AuthGateway>) -> Self {
        Self { auth }
    }

    /// # Errors
    ///
    /// Returns `AccountError::EmptyField` for blank input, otherwise the gateway's error.
    pub async fn sign_in(&self, email: &str, password: &str) -> Result<UserId, AccountError> {
        let email = required("email", email)?;
        if password.is_empty() {
            return Err(AccountError::EmptyField("password"));
        }
        let uid = self.auth.sign_in(email, password).await?;
        info!(uid = %uid, "signed in");
        Ok(uid)
    }

    /// # Errors
    ///
    /// Returns the gateway's error.
    pub async fn sign_out(&self) -> Result<(), AccountError> {
        self.auth.sign_out().await?;
        Ok(())
    }

    /// # Errors
    ///
    /// Returns `AccountError::EmptyField` for a blank email, otherwise the gateway's error.
    pub async fn send_password_reset(&self, email: &str) -> Result<(), AccountError> {
        let email = required("email", email)?;
        self.auth.send_password_reset(email).await?;
        debug!("password reset requested");
        Ok(())
    }

    /// Change the signed-in user's password.
    ///
    /// The new password is checked locally first; only then is the user
    /// re-authenticated with `current` and the password updated.
    ///
    /// # Errors
    ///
    /// Returns `AccountError::EmptyField`, `AccountError::PasswordTooShort` or
    /// `AccountError::PasswordMismatch` without contacting the gateway, and
    /// `AccountError::Auth` if re-authentication or the update fails.
    pub async fn change_password(
        &self,
        current: &str,
        new: &str,
        confirm: &str,
    ) -> Result<(), AccountError> {
        if current.is_empty() {
            return Err(AccountError::EmptyField("current password"));
        }
        if new.is_empty() {
            return Err(AccountError::EmptyField("new password"));
        }
        if new.chars().count() < MIN_PASSWORD_LEN {
            return Err(AccountError::PasswordTooShort {
                min: MIN_PASSWORD_LEN,
            });
        }
        if new != confirm {
            return Err(AccountError::PasswordMismatch);
        }
        self.auth.reauthenticate(current).await?;
        self.auth.update_password(new).await?;
        info!("password changed");
        Ok(())
    }
}
