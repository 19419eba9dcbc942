use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};
use uuid::Uuid;

use super::{IdentityProvider, User, UserId};
use crate::error::AuthError;

const SESSION_FILE: &str = "session.json";

/// Email sign-in without a password round trip. The uid is derived from the
/// normalized address, so the same address always maps to the same collection.
pub struct LocalEmailProvider {
    path: PathBuf,
}

impl LocalEmailProvider {
    pub fn new(data_dir: impl AsRef<Path>) -> Self {
        Self {
            path: data_dir.as_ref().join(SESSION_FILE),
        }
    }

    fn io_err(&self, source: io::Error) -> AuthError {
        AuthError::Io {
            path: self.path.clone(),
            source,
        }
    }

    fn persist(&self, user: &User) -> Result<(), AuthError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|e| self.io_err(e))?;
        }
        let json = serde_json::to_string_pretty(user).map_err(|source| AuthError::Corrupt {
            path: self.path.clone(),
            source,
        })?;
        fs::write(&self.path, json).map_err(|e| self.io_err(e))
    }
}

impl IdentityProvider for LocalEmailProvider {
    fn restore(&self) -> Result<Option<User>, AuthError> {
        let json = match fs::read_to_string(&self.path) {
            Ok(json) => json,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(self.io_err(e)),
        };
        let user: User = match serde_json::from_str(&json) {
            Ok(user) => user,
            Err(e) => {
                warn!("discarding unreadable session file {}: {e}", self.path.display());
                fs::remove_file(&self.path).map_err(|e| self.io_err(e))?;
                return Ok(None);
            }
        };
        debug!(uid = %user.uid, "restored session");
        Ok(Some(user))
    }

    fn sign_in_with_email(&mut self, email: &str) -> Result<User, AuthError> {
        let email = normalize_email(email)?;
        let user = User {
            uid: uid_for_email(&email),
            email,
        };
        self.persist(&user)?;
        info!(uid = %user.uid, "email sign-in complete");
        Ok(user)
    }

    fn sign_out(&mut self) -> Result<(), AuthError> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(self.io_err(e)),
        }
    }
}

fn normalize_email(raw: &str) -> Result<String, AuthError> {
    let email = raw.trim().to_lowercase();
    let invalid = || AuthError::InvalidEmail(raw.trim().to_owned());
    let (local, domain) = email.split_once('@').ok_or_else(invalid)?;
    if local.is_empty()
        || domain.contains('@')
        || email.chars().any(char::is_whitespace)
        || !domain.contains('.')
        || domain.starts_with('.')
        || domain.ends_with('.')
    {
        return Err(invalid());
    }
    Ok(email)
}

pub(crate) fn uid_for_email(email: &str) -> UserId {
    UserId::new(
        Uuid::new_v5(&Uuid::NAMESPACE_URL, format!("mailto:{email}").as_bytes())
            .simple()
            .to_string(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn sign_in_persists_and_restores() {
        let dir = TempDir::new().unwrap();
        let mut provider = LocalEmailProvider::new(dir.path());
        assert!(provider.restore().unwrap().is_none());

        let user = provider.sign_in_with_email(" Alice@Example.com ").unwrap();
        assert_eq!(user.email, "alice@example.com");

        let restored = LocalEmailProvider::new(dir.path()).restore().unwrap();
        assert_eq!(restored, Some(user));
    }

    #[test]
    fn same_address_maps_to_same_uid() {
        assert_eq!(
            uid_for_email("bob@example.com"),
            uid_for_email("bob@example.com")
        );
        assert_ne!(
            uid_for_email("bob@example.com"),
            uid_for_email("carol@example.com")
        );
    }

    #[test]
    fn rejects_malformed_addresses() {
        for raw in ["", "bob", "@example.com", "bob@", "bob@localhost", "a b@x.io", "a@b@c.io"] {
            assert!(
                matches!(normalize_email(raw), Err(AuthError::InvalidEmail(_))),
                "{raw:?} should be rejected"
            );
        }
    }

    #[test]
    fn sign_out_forgets_user() {
        let dir = TempDir::new().unwrap();
        let mut provider = LocalEmailProvider::new(dir.path());
        provider.sign_in_with_email("dave@example.com").unwrap();
        provider.sign_out().unwrap();
        assert!(provider.restore().unwrap().is_none());
        provider.sign_out().unwrap();
    }

    #[test]
    fn truncated_session_file_is_discarded() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(SESSION_FILE);
        fs::write(&path, "{\"uid\":").unwrap();

        let provider = LocalEmailProvider::new(dir.path());
        assert!(provider.restore().unwrap().is_none());
        assert!(!path.exists());
        assert!(provider.restore().unwrap().is_none());
    }
}
