//! Signed-in user state shared across screens.
//!
//! One store per sign-in. Screens read the current value, write through
//! [`SessionStore::update_profile`], and observe changes via a `watch`
//! receiver; after [`SessionStore::sign_out`] observers see `None`.

use std::sync::Arc;

use tokio::sync::watch;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub user_id: String,
    pub display_name: String,
}

#[derive(Debug, Clone)]
pub struct SessionStore {
    tx: Arc<watch::Sender<Option<Session>>>,
}

impl SessionStore {
    pub fn sign_in(user_id: impl Into<String>, display_name: impl Into<String>) -> Self {
        let session = Session {
            user_id: user_id.into(),
            display_name: display_name.into(),
        };
        tracing::info!(user_id = %session.user_id, "signed in");
        let (tx, _) = watch::channel(Some(session));
        Self { tx: Arc::new(tx) }
    }

    pub fn current(&self) -> Option<Session> {
        self.tx.borrow().clone()
    }

    pub fn user_id(&self) -> Option<String> {
        self.tx.borrow().as_ref().map(|s| s.user_id.clone())
    }

    /// Returns false when signed out or the name is unchanged; observers are only woken on a change.
    pub fn update_profile(&self, display_name: impl Into<String>) -> bool {
        let display_name = display_name.into();
        self.tx.send_if_modified(|current| match current {
            Some(session) if session.display_name != display_name => {
                session.display_name = display_name;
                true
            }
            _ => false,
        })
    }

    pub fn subscribe(&self) -> watch::Receiver<Option<Session>> {
        self.tx.subscribe()
    }

    pub fn sign_out(&self) {
        if let Some(previous) = self.tx.send_replace(None) {
            tracing::info!(user_id = %previous.user_id, "signed out");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn observers_see_profile_updates() {
        let store = SessionStore::sign_in("u1", "Avery");
        let mut rx = store.subscribe();

        assert!(store.update_profile("Avery K."));
        rx.changed().await.unwrap();
        assert_eq!(rx.borrow_and_update().as_ref().unwrap().display_name, "Avery K.");

        assert!(!store.update_profile("Avery K."));
        assert!(!rx.has_changed().unwrap());
    }

    #[tokio::test]
    async fn sign_out_clears_for_every_reader() {
        let store = SessionStore::sign_in("u1", "Avery");
        let screen = store.clone();
        let mut rx = store.subscribe();

        store.sign_out();
        rx.changed().await.unwrap();
        assert!(rx.borrow().is_none());
        assert!(screen.current().is_none());
        assert!(screen.user_id().is_none());
        assert!(!screen.update_profile("ghost"));
    }
}
