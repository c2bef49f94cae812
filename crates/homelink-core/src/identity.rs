//! Identity provider abstraction.
//!
//! The engine only needs to know who is signed in and to be told when that
//! changes. Auth state is exposed as a [`watch::Receiver`]; dropping the
//! receiver unsubscribes.

use std::sync::Arc;

use tokio::sync::watch;
use tracing::info;

use homelink_types::AuthUser;

/// Source of authentication state.
pub trait IdentityProvider: Send + Sync {
    /// Subscribe to auth state changes. The current user (or `None`) is
    /// available immediately through `borrow()`.
    fn on_auth_state_changed(&self) -> watch::Receiver<Option<AuthUser>>;

    /// The user signed in right now.
    fn current_user(&self) -> Option<AuthUser> {
        self.on_auth_state_changed().borrow().clone()
    }
}

/// An identity provider driven explicitly by the caller.
///
/// Used by the CLI (a fixed uid from flags or config) and by tests that
/// script sign-in and sign-out.
#[derive(Debug, Clone)]
pub struct StaticIdentity {
    tx: Arc<watch::Sender<Option<AuthUser>>>,
}

impl Default for StaticIdentity {
    fn default() -> Self {
        Self::signed_out()
    }
}

impl StaticIdentity {
    pub fn signed_out() -> Self {
        let (tx, _) = watch::channel(None);
        Self { tx: Arc::new(tx) }
    }

    pub fn signed_in(user: AuthUser) -> Self {
        let (tx, _) = watch::channel(Some(user));
        Self { tx: Arc::new(tx) }
    }

    pub fn sign_in(&self, user: AuthUser) {
        info!("Signed in as {}", user.uid);
        self.tx.send_replace(Some(user));
    }

    pub fn sign_out(&self) {
        info!("Signed out");
        self.tx.send_replace(None);
    }
}

impl IdentityProvider for StaticIdentity {
    fn on_auth_state_changed(&self) -> watch::Receiver<Option<AuthUser>> {
        self.tx.subscribe()
    }
}

/// Read view of the session the sync engine is attached to.
#[derive(Debug, Clone)]
pub struct Session {
    rx: watch::Receiver<Option<String>>,
}

impl Session {
    pub(crate) fn new(rx: watch::Receiver<Option<String>>) -> Self {
        Self { rx }
    }

    /// Uid of the attached user.
    pub fn uid(&self) -> Option<String> {
        self.rx.borrow().clone()
    }

    pub fn is_authenticated(&self) -> bool {
        self.rx.borrow().is_some()
    }

    /// Watch the attached uid.
    pub fn subscribe(&self) -> watch::Receiver<Option<String>> {
        self.rx.clone()
    }
}
