//! Identity boundary.
//!
//! The signed-in user lives in an explicit [`Session`] rather than in
//! ambient global state. Consumers get a read-only [`SessionHandle`].

use std::fmt;

use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::info;

use crate::error::AuthError;

pub mod local;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(String);

impl UserId {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub uid: UserId,
    pub email: String,
}

pub trait IdentityProvider {
    /// User left signed in by a previous run, if any.
    fn restore(&self) -> Result<Option<User>, AuthError>;
    fn sign_in_with_email(&mut self, email: &str) -> Result<User, AuthError>;
    fn sign_out(&mut self) -> Result<(), AuthError>;
}

/// Owner of the signed-in/signed-out state.
pub struct Session {
    tx: watch::Sender<Option<User>>,
}

impl Session {
    pub fn signed_out() -> Self {
        let (tx, _) = watch::channel(None);
        Self { tx }
    }

    pub fn signed_in(user: User) -> Self {
        let (tx, _) = watch::channel(Some(user));
        Self { tx }
    }

    pub fn sign_in(&self, user: User) {
        info!(uid = %user.uid, "signed in");
        self.tx.send_replace(Some(user));
    }

    pub fn sign_out(&self) {
        if self.tx.send_replace(None).is_some() {
            info!("signed out");
        }
    }

    pub fn current_user(&self) -> Option<User> {
        self.tx.borrow().clone()
    }

    pub fn handle(&self) -> SessionHandle {
        SessionHandle {
            rx: self.tx.subscribe(),
        }
    }
}

/// Read-only view of a [`Session`].
#[derive(Clone)]
pub struct SessionHandle {
    rx: watch::Receiver<Option<User>>,
}

impl SessionHandle {
    pub fn current_uid(&self) -> Option<UserId> {
        self.rx.borrow().as_ref().map(|u| u.uid.clone())
    }
}
