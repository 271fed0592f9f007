#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Operator login gate.
//!
//! Credential checking goes through the [`CredentialVerifier`] trait so a
//! real identity provider can replace [`DemoCredentials`] without
//! touching callers. The logged-in user is kept in a [`Session`] and
//! persisted by a [`SessionStore`] so it survives restarts. Passwords are
//! never persisted.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use strum_macros::Display;
use thiserror::Error;

/// Default location of the persisted session.
pub const DEFAULT_SESSION_PATH: &str = ".fightwatch/session.json";

/// Errors from login and session persistence.
#[derive(Debug, Error)]
pub enum AuthError {
    /// No account matches the given username, password and phone.
    #[error("Invalid credentials")]
    InvalidCredentials,

    /// The operation needs an admin and the current user is not one.
    #[error("Admin access required")]
    NotAdmin,

    /// Nobody is logged in.
    #[error("Not logged in")]
    NotLoggedIn,

    /// Session file could not be read or written.
    #[error("Session I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Session file is not valid JSON.
    #[error("Session JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// What a logged-in user may do.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Role {
    /// May run monitors.
    User,
    /// May also see the incident dashboard.
    Admin,
}

impl Role {
    /// Whether this role can see the dashboard.
    #[must_use]
    pub const fn is_admin(self) -> bool {
        matches!(self, Self::Admin)
    }
}

/// Login input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    /// Account name.
    pub username: String,
    /// Account password.
    pub password: String,
    /// Registered phone number.
    pub phone: String,
}

/// The persisted current user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserAccount {
    /// Account name.
    pub username: String,
    /// Registered phone number.
    pub phone: String,
    /// Granted role.
    pub role: Role,
}

/// Checks a username/password/phone triple.
pub trait CredentialVerifier: Send + Sync {
    /// Returns the account's role when the triple matches an account.
    fn verify(&self, username: &str, password: &str, phone: &str) -> Option<Role>;
}

struct DemoAccount {
    username: &'static str,
    password: &'static str,
    phone: &'static str,
    role: Role,
}

const DEMO_ACCOUNTS: &[DemoAccount] = &[
    DemoAccount {
        username: "admin",
        password: "admin123",
        phone: "1234567890",
        role: Role::Admin,
    },
    DemoAccount {
        username: "user",
        password: "user123",
        phone: "0987654321",
        role: Role::User,
    },
];

/// The two fixed demo accounts.
///
/// | username | password   | phone        | role  |
/// |----------|------------|--------------|-------|
/// | `admin`  | `admin123` | `1234567890` | admin |
/// | `user`   | `user123`  | `0987654321` | user  |
#[derive(Debug, Clone, Copy, Default)]
pub struct DemoCredentials;

impl CredentialVerifier for DemoCredentials {
    fn verify(&self, username: &str, password: &str, phone: &str) -> Option<Role> {
        DEMO_ACCOUNTS
            .iter()
            .find(|a| a.username == username && a.password == password && a.phone == phone)
            .map(|a| a.role)
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct PersistedSession {
    user: Option<UserAccount>,
}

/// JSON file holding the current user between runs.
#[derive(Debug, Clone)]
pub struct SessionStore {
    path: PathBuf,
}

impl SessionStore {
    /// Creates a store backed by `path`.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Backing file path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads the persisted user. A missing file means nobody is logged in.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError`] if the file exists but cannot be read or
    /// parsed.
    pub fn load(&self) -> Result<Option<UserAccount>, AuthError> {
        let text = match std::fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let persisted: PersistedSession = serde_json::from_str(&text)?;
        Ok(persisted.user)
    }

    /// Writes `user` as the current user, creating parent directories.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError`] if the file cannot be written.
    pub fn save(&self, user: &UserAccount) -> Result<(), AuthError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let text = serde_json::to_string_pretty(&PersistedSession {
            user: Some(user.clone()),
        })?;
        std::fs::write(&self.path, text)?;
        Ok(())
    }

    /// Removes the persisted user.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError`] if the file exists but cannot be removed.
    pub fn clear(&self) -> Result<(), AuthError> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// The operator's session: at most one logged-in user.
#[derive(Debug)]
pub struct Session {
    store: SessionStore,
    current: Option<UserAccount>,
}

impl Session {
    /// Opens the session persisted in `store`.
    ///
    /// An unreadable or corrupt session file is logged and treated as
    /// logged out.
    #[must_use]
    pub fn open(store: SessionStore) -> Self {
        let current = store.load().unwrap_or_else(|e| {
            log::warn!(
                "Ignoring unreadable session at {}: {e}",
                store.path().display()
            );
            None
        });
        Self { store, current }
    }

    /// The logged-in user, if any.
    #[must_use]
    pub const fn current(&self) -> Option<&UserAccount> {
        self.current.as_ref()
    }

    /// Verifies `credentials`, persists the matching account and makes it
    /// the current user.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::InvalidCredentials`] if the verifier rejects
    /// the triple, or an I/O error if the session cannot be saved.
    pub fn login(
        &mut self,
        verifier: &dyn CredentialVerifier,
        credentials: &Credentials,
    ) -> Result<&UserAccount, AuthError> {
        let role = verifier
            .verify(
                &credentials.username,
                &credentials.password,
                &credentials.phone,
            )
            .ok_or_else(|| {
                log::warn!("Login rejected for '{}'", credentials.username);
                AuthError::InvalidCredentials
            })?;

        let user = UserAccount {
            username: credentials.username.clone(),
            phone: credentials.phone.clone(),
            role,
        };
        self.store.save(&user)?;
        log::info!("Logged in as {} ({role})", user.username);

        Ok(self.current.insert(user))
    }

    /// Forgets the current user, here and on disk.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError`] if the session file cannot be removed.
    pub fn logout(&mut self) -> Result<(), AuthError> {
        self.store.clear()?;
        if let Some(user) = self.current.take() {
            log::info!("Logged out {}", user.username);
        }
        Ok(())
    }

    /// The current user if they are an admin.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::NotLoggedIn`] or [`AuthError::NotAdmin`].
    pub fn require_admin(&self) -> Result<&UserAccount, AuthError> {
        match &self.current {
            None => Err(AuthError::NotLoggedIn),
            Some(user) if user.role.is_admin() => Ok(user),
            Some(_) => Err(AuthError::NotAdmin),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_store(name: &str) -> SessionStore {
        let dir = std::env::temp_dir().join(name);
        let _ = std::fs::remove_dir_all(&dir);
        SessionStore::new(dir.join("nested").join("session.json"))
    }

    fn creds(username: &str, password: &str, phone: &str) -> Credentials {
        Credentials {
            username: username.to_string(),
            password: password.to_string(),
            phone: phone.to_string(),
        }
    }

    #[test]
    fn roles_display_and_serialize_lowercase() {
        assert_eq!(Role::Admin.to_string(), "admin");
        assert_eq!(serde_json::to_string(&Role::User).unwrap(), "\"user\"");
        assert!(Role::Admin.is_admin());
        assert!(!Role::User.is_admin());
    }

    #[test]
    fn demo_verifier_accepts_exactly_the_fixed_accounts() {
        let v = DemoCredentials;
        assert_eq!(v.verify("admin", "admin123", "1234567890"), Some(Role::Admin));
        assert_eq!(v.verify("user", "user123", "0987654321"), Some(Role::User));

        assert_eq!(v.verify("admin", "admin123", "0987654321"), None);
        assert_eq!(v.verify("user", "admin123", "1234567890"), None);
        assert_eq!(v.verify("Admin", "admin123", "1234567890"), None);
        assert_eq!(v.verify("", "", ""), None);
    }

    #[test]
    fn login_persists_across_sessions_without_password() {
        let store = temp_store("fightwatch_auth_persist");

        let mut session = Session::open(store.clone());
        assert!(session.current().is_none());
        let user = session
            .login(&DemoCredentials, &creds("admin", "admin123", "1234567890"))
            .unwrap();
        assert_eq!(user.role, Role::Admin);

        let text = std::fs::read_to_string(store.path()).unwrap();
        assert!(!text.contains("admin123"));

        let reopened = Session::open(store.clone());
        assert_eq!(reopened.current().unwrap().username, "admin");
        assert!(reopened.require_admin().is_ok());

        let _ = std::fs::remove_dir_all(store.path().parent().unwrap().parent().unwrap());
    }

    #[test]
    fn logout_removes_persisted_user() {
        let store = temp_store("fightwatch_auth_logout");
        let mut session = Session::open(store.clone());
        session
            .login(&DemoCredentials, &creds("user", "user123", "0987654321"))
            .unwrap();

        session.logout().unwrap();
        assert!(session.current().is_none());
        assert!(Session::open(store.clone()).current().is_none());

        // Logging out twice is harmless.
        session.logout().unwrap();

        let _ = std::fs::remove_dir_all(store.path().parent().unwrap().parent().unwrap());
    }

    #[test]
    fn rejected_login_keeps_previous_user() {
        let store = temp_store("fightwatch_auth_rejected");
        let mut session = Session::open(store.clone());
        session
            .login(&DemoCredentials, &creds("user", "user123", "0987654321"))
            .unwrap();

        let err = session
            .login(&DemoCredentials, &creds("admin", "wrong", "1234567890"))
            .unwrap_err();
        assert!(matches!(err, AuthError::InvalidCredentials));
        assert_eq!(session.current().unwrap().username, "user");
        assert!(matches!(session.require_admin(), Err(AuthError::NotAdmin)));

        let _ = std::fs::remove_dir_all(store.path().parent().unwrap().parent().unwrap());
    }

    #[test]
    fn corrupt_session_file_means_logged_out() {
        let store = temp_store("fightwatch_auth_corrupt");
        std::fs::create_dir_all(store.path().parent().unwrap()).unwrap();
        std::fs::write(store.path(), "{not json").unwrap();

        assert!(store.load().is_err());
        let session = Session::open(store.clone());
        assert!(session.current().is_none());
        assert!(matches!(session.require_admin(), Err(AuthError::NotLoggedIn)));

        let _ = std::fs::remove_dir_all(store.path().parent().unwrap().parent().unwrap());
    }

    #[test]
    fn injected_verifier_replaces_demo_accounts() {
        struct EveryoneIsAdmin;
        impl CredentialVerifier for EveryoneIsAdmin {
            fn verify(&self, _username: &str, _password: &str, _phone: &str) -> Option<Role> {
                Some(Role::Admin)
            }
        }

        let store = temp_store("fightwatch_auth_injected");
        let mut session = Session::open(store.clone());
        let user = session
            .login(&EveryoneIsAdmin, &creds("ops", "x", "555"))
            .unwrap();
        assert_eq!(user.role, Role::Admin);

        let _ = std::fs::remove_dir_all(store.path().parent().unwrap().parent().unwrap());
    }
}
