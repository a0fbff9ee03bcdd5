//! Registration, login and password recovery on top of the store.
//!
//! The logged-in user is remembered in the settings file by username only.
//! Validation failures are [`AuthError`]s carrying the message key a front
//! end shows inline.

use std::sync::Arc;

use cityguide_core::SettingsFile;
use cityguide_store::schema::DEFAULT_ADMIN_USERNAME;
use cityguide_store::{NewUser, Role, SqliteStore, User};
use thiserror::Error;
use tracing::info;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthError {
    #[error("all fields must be filled in")]
    FillAll,
    #[error("user already exists")]
    UserExists,
    #[error("wrong username or password")]
    WrongCredentials,
    #[error("passwords do not match")]
    PasswordMismatch,
}

impl AuthError {
    /// Localization key for the inline error message.
    pub fn message_key(&self) -> &'static str {
        match self {
            Self::FillAll => "auth_fill_all",
            Self::UserExists => "auth_user_exists",
            Self::WrongCredentials => "auth_wrong_credentials",
            Self::PasswordMismatch => "auth_password_mismatch",
        }
    }
}

#[derive(Error, Debug)]
pub enum SessionError {
    #[error(transparent)]
    Auth(#[from] AuthError),
    #[error(transparent)]
    Store(#[from] cityguide_core::Error),
}

pub type SessionResult<T> = std::result::Result<T, SessionError>;

/// Sign-up form. Every field is required.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RegistrationForm {
    pub username: String,
    pub password: String,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub secret_word: String,
}

/// The remembered user, resolved against the database.
#[derive(Debug, Clone, PartialEq)]
pub struct CurrentUser {
    pub user: User,
    /// Admin mode is granted to the built-in `admin` login only.
    pub is_admin: bool,
}

pub struct SessionService {
    store: Arc<SqliteStore>,
    settings: SettingsFile,
}

impl SessionService {
    pub fn new(store: Arc<SqliteStore>, settings: SettingsFile) -> Self {
        Self { store, settings }
    }

    /// Create a regular user and remember them as the current user.
    pub fn register(&self, form: &RegistrationForm) -> SessionResult<i64> {
        let fields = [
            &form.username,
            &form.password,
            &form.first_name,
            &form.last_name,
            &form.email,
            &form.secret_word,
        ];
        if fields.iter().any(|f| f.trim().is_empty()) {
            return Err(AuthError::FillAll.into());
        }
        let username = form.username.trim();
        if self.store.get_user_by_username(username)?.is_some() {
            return Err(AuthError::UserExists.into());
        }

        let id = self
            .store
            .create_user(&NewUser {
                username: username.to_string(),
                password: form.password.clone(),
                role: Some("user".to_string()),
                first_name: form.first_name.clone(),
                last_name: form.last_name.clone(),
                email: form.email.clone(),
                secret_word: form.secret_word.clone(),
            })
            .map_err(|e| match e {
                cityguide_core::Error::Conflict(_) => SessionError::Auth(AuthError::UserExists),
                other => other.into(),
            })?;
        self.settings.set_last_user(username, false)?;
        info!("Registered user {}", username);
        Ok(id)
    }

    pub fn login(&self, username: &str, password: &str) -> SessionResult<CurrentUser> {
        let username = username.trim();
        if username.is_empty() || password.trim().is_empty() {
            return Err(AuthError::FillAll.into());
        }
        let user = self
            .store
            .verify_login(username, password)?
            .ok_or(AuthError::WrongCredentials)?;

        let is_admin = user.username == DEFAULT_ADMIN_USERNAME;
        self.settings.set_last_user(&user.username, is_admin)?;
        info!("User {} logged in", user.username);
        Ok(CurrentUser { user, is_admin })
    }

    /// The remembered user, if they still exist.
    pub fn current_user(&self) -> SessionResult<Option<CurrentUser>> {
        let Some(last) = self.settings.last_user() else {
            return Ok(None);
        };
        let user = self.store.get_user_by_username(&last.username)?;
        Ok(user.map(|user| CurrentUser {
            is_admin: user.username == DEFAULT_ADMIN_USERNAME,
            user,
        }))
    }

    pub fn logout(&self) -> SessionResult<()> {
        self.settings.clear_last_user()?;
        Ok(())
    }

    /// Delete the remembered user's account and forget them.
    ///
    /// Returns `false` when nobody is logged in or the user is the
    /// built-in admin, which is never deleted.
    pub fn delete_current_user(&self) -> SessionResult<bool> {
        let Some(current) = self.current_user()? else {
            return Ok(false);
        };
        if current.user.username == DEFAULT_ADMIN_USERNAME {
            return Ok(false);
        }
        let deleted = self.store.delete_user(current.user.id)?;
        self.settings.clear_last_user()?;
        Ok(deleted)
    }

    /// Admin user management: create `username` or update their password
    /// and role, then remember them as the current user.
    ///
    /// Returns `false` without touching anything when either field is blank.
    pub fn update_user_info(&self, username: &str, password: &str, is_admin: bool) -> SessionResult<bool> {
        let username = username.trim();
        let password = password.trim();
        if username.is_empty() || password.is_empty() {
            return Ok(false);
        }
        let role = if is_admin { Role::Admin } else { Role::User };

        match self.store.get_user_by_username(username)? {
            Some(user) => {
                self.store.update_user(user.id, username, Some(password), Some(role))?;
                info!("Updated user {} ({})", username, role);
            }
            None => {
                self.store.create_user(&NewUser {
                    username: username.to_string(),
                    password: password.to_string(),
                    role: Some(role.as_str().to_string()),
                    ..Default::default()
                })?;
                info!("Created user {} ({})", username, role);
            }
        }

        self.settings.set_last_user(username, username == DEFAULT_ADMIN_USERNAME)?;
        Ok(true)
    }

    /// First password recovery step: the secret word must match the account.
    pub fn verify_secret_word(&self, username: &str, secret_word: &str) -> SessionResult<User> {
        let username = username.trim();
        let secret_word = secret_word.trim();
        if username.is_empty() || secret_word.is_empty() {
            return Err(AuthError::FillAll.into());
        }
        match self.store.get_user_by_username(username)? {
            Some(user) if user.secret_word == secret_word => Ok(user),
            _ => Err(AuthError::WrongCredentials.into()),
        }
    }

    /// Second recovery step: set a new password after re-checking the secret.
    pub fn reset_password(
        &self,
        username: &str,
        secret_word: &str,
        new_password: &str,
        confirm: &str,
    ) -> SessionResult<()> {
        let user = self.verify_secret_word(username, secret_word)?;
        let new_password = new_password.trim();
        if new_password.is_empty() || confirm.trim().is_empty() {
            return Err(AuthError::FillAll.into());
        }
        if new_password != confirm.trim() {
            return Err(AuthError::PasswordMismatch.into());
        }
        self.store.set_password(user.id, new_password)?;
        info!("Password reset for {}", user.username);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn service() -> (TempDir, SessionService) {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(SqliteStore::open_in_memory().unwrap());
        let settings = SettingsFile::new(dir.path().join("settings.json"));
        (dir, SessionService::new(store, settings))
    }

    fn form(username: &str) -> RegistrationForm {
        RegistrationForm {
            username: username.into(),
            password: "secret".into(),
            first_name: "Анна".into(),
            last_name: "Петрова".into(),
            email: "anna@example.com".into(),
            secret_word: "кот".into(),
        }
    }

    fn auth_err(result: SessionResult<impl std::fmt::Debug>) -> AuthError {
        match result.unwrap_err() {
            SessionError::Auth(e) => e,
            other => panic!("expected auth error, got {:?}", other),
        }
    }

    #[test]
    fn test_register_requires_every_field() {
        let (_dir, svc) = service();
        let mut incomplete = form("anna");
        incomplete.email = "   ".into();
        let err = auth_err(svc.register(&incomplete));
        assert_eq!(err, AuthError::FillAll);
        assert_eq!(err.message_key(), "auth_fill_all");
    }

    #[test]
    fn test_register_then_duplicate() {
        let (_dir, svc) = service();
        svc.register(&form("anna")).unwrap();

        let current = svc.current_user().unwrap().unwrap();
        assert_eq!(current.user.username, "anna");
        assert!(!current.is_admin);

        let err = auth_err(svc.register(&form("anna")));
        assert_eq!(err.message_key(), "auth_user_exists");
    }

    #[test]
    fn test_login_paths() {
        let (_dir, svc) = service();
        assert_eq!(auth_err(svc.login("", "1234")), AuthError::FillAll);
        assert_eq!(auth_err(svc.login("admin", "wrong")), AuthError::WrongCredentials);
        assert_eq!(auth_err(svc.login("ghost", "1234")), AuthError::WrongCredentials);

        let admin = svc.login("admin", "1234").unwrap();
        assert!(admin.is_admin);
        assert!(svc.current_user().unwrap().unwrap().is_admin);

        svc.logout().unwrap();
        assert!(svc.current_user().unwrap().is_none());
    }

    #[test]
    fn test_delete_current_user_never_removes_admin() {
        let (_dir, svc) = service();
        svc.login("admin", "1234").unwrap();
        assert!(!svc.delete_current_user().unwrap());
        assert!(svc.current_user().unwrap().is_some());

        svc.register(&form("boris")).unwrap();
        assert!(svc.delete_current_user().unwrap());
        assert!(svc.current_user().unwrap().is_none());
        assert_eq!(auth_err(svc.login("boris", "secret")), AuthError::WrongCredentials);
    }

    #[test]
    fn test_password_recovery() {
        let (_dir, svc) = service();
        svc.register(&form("anna")).unwrap();

        assert_eq!(
            auth_err(svc.verify_secret_word("anna", "собака")),
            AuthError::WrongCredentials
        );
        assert_eq!(svc.verify_secret_word("anna", " кот ").unwrap().username, "anna");

        let err = auth_err(svc.reset_password("anna", "кот", "new-pass", "other"));
        assert_eq!(err.message_key(), "auth_password_mismatch");
        assert_eq!(
            auth_err(svc.reset_password("anna", "кот", "", "")),
            AuthError::FillAll
        );

        svc.reset_password("anna", "кот", "new-pass", "new-pass").unwrap();
        assert!(svc.login("anna", "new-pass").is_ok());
        assert_eq!(auth_err(svc.login("anna", "secret")), AuthError::WrongCredentials);
    }

    #[test]
    fn test_update_user_info_creates_then_updates() {
        let (_dir, svc) = service();
        assert!(!svc.update_user_info("  ", "pw", false).unwrap());
        assert!(!svc.update_user_info("vera", " ", false).unwrap());
        assert!(svc.current_user().unwrap().is_none());

        assert!(svc.update_user_info(" vera ", "first", true).unwrap());
        let current = svc.current_user().unwrap().unwrap();
        assert_eq!(current.user.username, "vera");
        assert_eq!(current.user.role, Role::Admin);
        // admin mode belongs to the built-in login, not the role
        assert!(!current.is_admin);

        assert!(svc.update_user_info("vera", "second", false).unwrap());
        let vera = svc.login("vera", "second").unwrap();
        assert_eq!(vera.user.role, Role::User);
        assert_eq!(auth_err(svc.login("vera", "first")), AuthError::WrongCredentials);

        assert!(svc.update_user_info("admin", "4321", true).unwrap());
        assert!(svc.current_user().unwrap().unwrap().is_admin);
        assert!(svc.login("admin", "4321").is_ok());
    }
}
