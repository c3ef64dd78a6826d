use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::watch;

use crate::error::{CoreError, Result};

/// Opaque id the backend scopes every collection by.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct UserId(String);

impl UserId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
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

/// Current-user lookup with change notification.
#[derive(Clone)]
pub struct Session {
    current: Arc<watch::Sender<Option<UserId>>>,
}

impl Session {
    pub fn signed_out() -> Self {
        let (tx, _rx) = watch::channel(None);
        Self {
            current: Arc::new(tx),
        }
    }

    pub fn signed_in(user: UserId) -> Self {
        let session = Self::signed_out();
        session.sign_in(user);
        session
    }

    pub fn sign_in(&self, user: UserId) {
        tracing::info!(user = %user, "session signed in");
        self.current.send_replace(Some(user));
    }

    pub fn sign_out(&self) {
        if self.current.send_replace(None).is_some() {
            tracing::info!("session signed out");
        }
    }

    pub fn current_user(&self) -> Option<UserId> {
        self.current.borrow().clone()
    }

    pub fn require_user(&self) -> Result<UserId> {
        self.current_user().ok_or(CoreError::NotSignedIn)
    }

    /// Receiver that wakes on every sign-in and sign-out.
    pub fn subscribe(&self) -> watch::Receiver<Option<UserId>> {
        self.current.subscribe()
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::signed_out()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn require_user_gates_on_sign_in() {
        let session = Session::signed_out();
        assert!(matches!(session.require_user(), Err(CoreError::NotSignedIn)));
        session.sign_in(UserId::new("u1"));
        assert_eq!(session.require_user().unwrap().as_str(), "u1");
    }

    #[tokio::test]
    async fn subscribers_see_session_changes() {
        let session = Session::signed_out();
        let mut rx = session.subscribe();
        session.sign_in(UserId::new("u1"));
        rx.changed().await.unwrap();
        assert_eq!(rx.borrow().as_ref().map(UserId::as_str), Some("u1"));

        session.sign_out();
        rx.changed().await.unwrap();
        assert!(rx.borrow().is_none());
    }
}
