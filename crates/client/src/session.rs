//! Session store: the authority on the current identity and bearer token.
//!
//! The store is the single writer of the persisted token; every other
//! component (request client, live connection handshake) reads it through
//! accessors. Eviction happens only on explicit logout or a 401 — transient
//! refresh failures keep the cached session (fail open).

use std::sync::{Arc, RwLock};

use lancelink_shared::UserIdentity;

use crate::api_client::ApiClient;
use crate::error::ApiError;
use crate::storage::{Storage, REDIRECT_KEY, SESSION_KEY, TOKEN_KEY};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    Uninitialized,
    Loading,
    Authenticated,
    Anonymous,
}

type ExpiredListener = Arc<dyn Fn(&str) + Send + Sync>;
type ResetListener = Arc<dyn Fn() + Send + Sync>;

struct SessionInner {
    state: SessionState,
    token: Option<String>,
    identity: Option<UserIdentity>,
    on_expired: Option<ExpiredListener>,
    on_reset: Option<ResetListener>,
}

/// Shared handle to the session. Cheap to clone; all clones observe the
/// same state.
#[derive(Clone)]
pub struct SessionStore {
    storage: Storage,
    inner: Arc<RwLock<SessionInner>>,
}

impl SessionStore {
    pub fn new(storage: Storage) -> Self {
        Self {
            storage,
            inner: Arc::new(RwLock::new(SessionInner {
                state: SessionState::Uninitialized,
                token: None,
                identity: None,
                on_expired: None,
                on_reset: None,
            })),
        }
    }

    /// Bring the session up on startup: restore the persisted snapshot so
    /// the UI can render an authenticated view immediately, then validate
    /// it against the server. Anonymous sessions skip the network trip.
    pub async fn initialize(&self, api: &ApiClient) {
        self.load_persisted();
        if self.is_authenticated() {
            self.refresh(api).await;
        }
    }

    /// Load the persisted session synchronously, without touching the
    /// network. [`SessionStore::initialize`] wraps this with the follow-up
    /// identity refresh.
    pub fn load_persisted(&self) {
        let mut inner = self.inner.write().expect("session lock poisoned");
        inner.state = SessionState::Loading;

        let token: Option<String> = self.storage.load(TOKEN_KEY);
        match token {
            Some(token) => {
                inner.identity = self.storage.load(SESSION_KEY);
                inner.token = Some(token);
                inner.state = SessionState::Authenticated;
            }
            None => {
                inner.token = None;
                inner.identity = None;
                inner.state = SessionState::Anonymous;
            }
        }
    }

    /// Persist a fresh login and switch to the authenticated state.
    pub fn login(&self, token: String, identity: UserIdentity) {
        self.storage.save(TOKEN_KEY, &token);
        self.storage.save(SESSION_KEY, &identity);

        let mut inner = self.inner.write().expect("session lock poisoned");
        inner.token = Some(token);
        inner.identity = Some(identity);
        inner.state = SessionState::Authenticated;
    }

    /// Clear everything and notify the reset hook.
    ///
    /// The hook is the native stand-in for the web client's full page
    /// reload: it must tear down every component that caches session state,
    /// including the live connection.
    pub fn logout(&self) {
        self.storage.remove(TOKEN_KEY);
        self.storage.remove(SESSION_KEY);
        self.storage.remove(REDIRECT_KEY);

        let listener = {
            let mut inner = self.inner.write().expect("session lock poisoned");
            inner.token = None;
            inner.identity = None;
            inner.state = SessionState::Anonymous;
            inner.on_reset.clone()
        };
        if let Some(listener) = listener {
            listener();
        }
    }

    /// Re-fetch the identity from the server.
    ///
    /// On success the persisted snapshot is rewritten to match server state.
    /// A 401 evicts the session (the request client calls [`Self::expire`]
    /// before the error reaches us). Every other failure is fail-open: the
    /// cached session stays, and we only log a warning.
    pub async fn refresh(&self, api: &ApiClient) {
        match api.me().await {
            Ok(identity) => {
                self.storage.save(SESSION_KEY, &identity);
                let mut inner = self.inner.write().expect("session lock poisoned");
                inner.identity = Some(identity);
                inner.state = SessionState::Authenticated;
            }
            Err(ApiError::SessionExpired) => {
                // expire() already ran; nothing left to do
            }
            Err(err) => {
                tracing::warn!("identity refresh failed, keeping cached session: {err}");
            }
        }
    }

    /// Eviction path for a 401: clear the persisted token and snapshot,
    /// remember where the user was for the post-login redirect, and notify
    /// the expiry listener (which navigates to the login entry point).
    pub fn expire(&self, return_to: &str) {
        self.storage.remove(TOKEN_KEY);
        self.storage.remove(SESSION_KEY);
        self.storage.save(REDIRECT_KEY, &return_to.to_string());

        let listener = {
            let mut inner = self.inner.write().expect("session lock poisoned");
            let had_session = inner.token.is_some();
            inner.token = None;
            inner.identity = None;
            inner.state = SessionState::Anonymous;
            if had_session {
                inner.on_expired.clone()
            } else {
                None
            }
        };
        if let Some(listener) = listener {
            listener(return_to);
        }
    }

    /// Consume the stored post-login redirect path, if any.
    pub fn take_login_redirect(&self) -> Option<String> {
        let path: Option<String> = self.storage.load(REDIRECT_KEY);
        if path.is_some() {
            self.storage.remove(REDIRECT_KEY);
        }
        path
    }

    pub fn on_session_expired(&self, listener: impl Fn(&str) + Send + Sync + 'static) {
        let mut inner = self.inner.write().expect("session lock poisoned");
        inner.on_expired = Some(Arc::new(listener));
    }

    pub fn on_reset(&self, listener: impl Fn() + Send + Sync + 'static) {
        let mut inner = self.inner.write().expect("session lock poisoned");
        inner.on_reset = Some(Arc::new(listener));
    }

    pub fn state(&self) -> SessionState {
        self.inner.read().expect("session lock poisoned").state.clone()
    }

    pub fn is_authenticated(&self) -> bool {
        self.state() == SessionState::Authenticated
    }

    pub fn token(&self) -> Option<String> {
        self.inner.read().expect("session lock poisoned").token.clone()
    }

    pub fn identity(&self) -> Option<UserIdentity> {
        self.inner
            .read()
            .expect("session lock poisoned")
            .identity
            .clone()
    }

    pub fn user_id(&self) -> Option<String> {
        self.inner
            .read()
            .expect("session lock poisoned")
            .identity
            .as_ref()
            .map(|identity| identity.id.clone())
    }

    pub(crate) fn storage(&self) -> &Storage {
        &self.storage
    }
}
