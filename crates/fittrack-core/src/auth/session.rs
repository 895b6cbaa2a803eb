//! Session state machine.
//!
//! `SessionManager` is the only writer of session state. Views read it via
//! [`SessionManager::current`] or follow it with [`SessionManager::subscribe`].
//!
//! Every transition that replaces token or user (restore start, successful
//! sign-in, logout, expiry) bumps a generation counter. An async operation
//! only applies its result if the counter still holds the value it saw when
//! it started, so a bootstrap or login that finishes after a logout is
//! dropped instead of resurrecting the session. Starting a login attempt
//! does not move the counter; a failed attempt changes nothing.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::api::{ApiClient, ApiError, ErrorKind, ServerErrors};
use crate::models::{LoginRequest, RegisterRequest, UserProfile};

use super::TokenStore;

const LOGIN_FAILED: &str = "Login failed";
const REGISTRATION_FAILED: &str = "Registration failed";
const SERVER_UNREACHABLE: &str = "Unable to reach the server. Please try again.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    Anonymous,
    /// Restoring a session from a stored token.
    Bootstrapping,
    /// A login or registration request is in flight.
    Authenticating,
    Authenticated,
}

/// Point-in-time view of the session.
#[derive(Clone, PartialEq)]
pub struct SessionSnapshot {
    pub token: Option<String>,
    pub user: Option<UserProfile>,
    pub loading: bool,
    pub phase: SessionPhase,
}

impl SessionSnapshot {
    /// State at process start, before the credential store has been read.
    fn starting() -> Self {
        Self {
            token: None,
            user: None,
            loading: true,
            phase: SessionPhase::Bootstrapping,
        }
    }

    fn anonymous() -> Self {
        Self {
            token: None,
            user: None,
            loading: false,
            phase: SessionPhase::Anonymous,
        }
    }

    /// True only when both a token and a user are present.
    pub fn is_authenticated(&self) -> bool {
        self.token.is_some() && self.user.is_some()
    }

    /// Finish an operation: derive the phase from what is held.
    ///
    /// A token without a user only exists while a restore is in flight, so
    /// that shape settles back to `Bootstrapping` rather than a half-filled
    /// session.
    fn settle(&mut self) {
        if self.is_authenticated() {
            self.loading = false;
            self.phase = SessionPhase::Authenticated;
        } else if self.token.is_some() {
            self.loading = true;
            self.phase = SessionPhase::Bootstrapping;
        } else {
            self.loading = false;
            self.phase = SessionPhase::Anonymous;
        }
    }
}

impl fmt::Debug for SessionSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionSnapshot")
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .field("user", &self.user)
            .field("loading", &self.loading)
            .field("phase", &self.phase)
            .finish()
    }
}

/// Why a login or registration did not produce a session.
#[derive(Error, Debug)]
pub enum AuthError {
    /// Field-keyed validation messages from the server, passed through as-is.
    #[error("{0}")]
    Rejected(ServerErrors),

    /// Network failure or an unexpected response.
    #[error("{0}")]
    Transport(String),

    /// The session changed (logout, another login) before the response arrived.
    #[error("Session changed while the request was in flight")]
    Superseded,
}

impl AuthError {
    fn from_api(err: ApiError, fallback: &str) -> Self {
        match err {
            ApiError::Rejected(errors) => AuthError::Rejected(errors),
            ApiError::Network(_) => AuthError::Transport(SERVER_UNREACHABLE.to_string()),
            _ => AuthError::Transport(fallback.to_string()),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            AuthError::Rejected(_) => ErrorKind::Validation,
            AuthError::Transport(_) | AuthError::Superseded => ErrorKind::Transport,
        }
    }

    /// Structured server messages, when there are any.
    pub fn server_errors(&self) -> Option<&ServerErrors> {
        match self {
            AuthError::Rejected(errors) => Some(errors),
            _ => None,
        }
    }
}

/// What a protected view should do with the current session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteDecision {
    /// Still loading; show a placeholder.
    Wait,
    RedirectToLogin,
    Allow,
}

/// Gate for views that require a signed-in user.
pub fn guard(session: &SessionSnapshot) -> RouteDecision {
    if session.loading {
        RouteDecision::Wait
    } else if !session.is_authenticated() {
        RouteDecision::RedirectToLogin
    } else {
        RouteDecision::Allow
    }
}

pub struct SessionManager {
    api: ApiClient,
    store: Arc<dyn TokenStore>,
    state: watch::Sender<SessionSnapshot>,
    epoch: AtomicU64,
}

impl SessionManager {
    /// The manager persists tokens through the same store the client reads
    /// them from.
    pub fn new(api: ApiClient) -> Self {
        let store = api.token_store().clone();
        let (state, _) = watch::channel(SessionSnapshot::starting());
        Self {
            api,
            store,
            state,
            epoch: AtomicU64::new(0),
        }
    }

    pub fn api(&self) -> &ApiClient {
        &self.api
    }

    pub fn current(&self) -> SessionSnapshot {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.state.subscribe()
    }

    /// Generation of the session state. Capture it before a data request so
    /// a 401 can later be matched to the session that made the request.
    pub fn epoch(&self) -> u64 {
        self.epoch.load(Ordering::SeqCst)
    }

    /// Replace the session outright: bump the generation and apply `f`.
    fn begin(&self, f: impl FnOnce(&mut SessionSnapshot)) -> u64 {
        let mut started = 0;
        self.state.send_modify(|state| {
            started = self.epoch.fetch_add(1, Ordering::SeqCst) + 1;
            f(state);
        });
        started
    }

    /// Mark a login or registration in flight. Token and user are left
    /// alone, so the generation does not move.
    fn attempt(&self) -> u64 {
        let mut epoch = 0;
        self.state.send_modify(|state| {
            epoch = self.epoch.load(Ordering::SeqCst);
            state.loading = true;
            state.phase = SessionPhase::Authenticating;
        });
        epoch
    }

    /// Apply `f` only if the session has not been replaced since `epoch`.
    fn complete(&self, epoch: u64, f: impl FnOnce(&mut SessionSnapshot)) -> bool {
        self.state.send_if_modified(|state| {
            if self.epoch.load(Ordering::SeqCst) != epoch {
                return false;
            }
            f(state);
            true
        })
    }

    /// Like `complete`, but `f` replaces the session, so the generation
    /// moves on and anything still in flight from `epoch` becomes stale.
    fn replace(&self, epoch: u64, f: impl FnOnce(&mut SessionSnapshot)) -> bool {
        self.complete(epoch, |state| {
            self.epoch.fetch_add(1, Ordering::SeqCst);
            f(state);
        })
    }

    fn persist_token(&self, token: &str) {
        if let Err(e) = self.store.set(token) {
            warn!(error = %e, "Failed to persist token, session will not survive a restart");
        }
    }

    fn erase_token(&self) {
        if let Err(e) = self.store.clear() {
            warn!(error = %e, "Failed to clear stored token");
        }
    }

    /// Restore the session from the stored token, if there is one.
    ///
    /// Any failure to fetch the profile is treated as an invalid token: the
    /// store is cleared and the session ends anonymous. There is no retry.
    pub async fn start(&self) -> SessionSnapshot {
        let Some(token) = self.store.get() else {
            debug!("No stored token, starting anonymous");
            self.begin(|state| *state = SessionSnapshot::anonymous());
            return self.current();
        };

        let epoch = self.begin(|state| {
            state.token = Some(token.clone());
            state.user = None;
            state.loading = true;
            state.phase = SessionPhase::Bootstrapping;
        });

        match self.api.current_user_with_token(&token).await {
            Ok(user) => {
                let username = user.username.clone();
                if self.complete(epoch, |state| {
                    state.token = Some(token);
                    state.user = Some(user);
                    state.settle();
                }) {
                    info!(username = %username, "Session restored");
                } else {
                    debug!("Bootstrap finished after the session changed, discarding");
                }
            }
            Err(e) => {
                warn!(error = %e, "Failed to fetch user (likely invalid token), clearing session");
                if !self.complete(epoch, |state| {
                    self.erase_token();
                    let attempting = state.phase == SessionPhase::Authenticating;
                    *state = SessionSnapshot::anonymous();
                    if attempting {
                        state.loading = true;
                        state.phase = SessionPhase::Authenticating;
                    }
                }) {
                    debug!("Bootstrap failed after the session changed, discarding");
                }
            }
        }

        self.current()
    }

    /// Log in with username and password.
    ///
    /// A failed attempt leaves any existing session exactly as it was.
    pub async fn login(&self, credentials: &LoginRequest) -> Result<UserProfile, AuthError> {
        let epoch = self.attempt();

        match self.api.login(credentials).await {
            Ok(response) => {
                let (token, user) = response.into_parts();
                self.establish(epoch, token, user)
            }
            Err(e) => {
                warn!(username = %credentials.username, error = %e, "Login failed");
                self.complete(epoch, SessionSnapshot::settle);
                Err(AuthError::from_api(e, LOGIN_FAILED))
            }
        }
    }

    /// Create an account and sign in as it.
    pub async fn register(&self, payload: &RegisterRequest) -> Result<UserProfile, AuthError> {
        let epoch = self.attempt();

        match self.api.register(payload).await {
            Ok(response) => self.establish(epoch, response.token, response.user),
            Err(e) => {
                warn!(username = %payload.username, error = %e, "Registration failed");
                self.complete(epoch, SessionSnapshot::settle);
                Err(AuthError::from_api(e, REGISTRATION_FAILED))
            }
        }
    }

    fn establish(&self, epoch: u64, token: String, user: UserProfile) -> Result<UserProfile, AuthError> {
        let applied = self.replace(epoch, |state| {
            self.persist_token(&token);
            state.token = Some(token);
            state.user = Some(user.clone());
            state.settle();
        });

        if applied {
            info!(username = %user.username, user_id = user.id, "Signed in");
            Ok(user)
        } else {
            debug!("Sign-in finished after the session changed, discarding");
            Err(AuthError::Superseded)
        }
    }

    /// End the session. Always succeeds, calling it twice is harmless.
    pub fn logout(&self) {
        self.begin(|state| {
            self.erase_token();
            *state = SessionSnapshot::anonymous();
        });
        info!("Logged out");
    }

    /// End the session because a request made during generation `epoch`
    /// got a 401. Ignored if the session has moved on since then.
    pub fn expire(&self, epoch: u64) -> bool {
        let expired = self.state.send_if_modified(|state| {
            if self.epoch.load(Ordering::SeqCst) != epoch || !state.is_authenticated() {
                return false;
            }
            self.epoch.fetch_add(1, Ordering::SeqCst);
            self.erase_token();
            *state = SessionSnapshot::anonymous();
            true
        });
        if expired {
            warn!("Session expired (401), returning to anonymous");
        }
        expired
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::MemoryTokenStore;
    use std::time::Duration;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn user_json() -> serde_json::Value {
        serde_json::json!({
            "id": 7, "username": "alice", "email": "a@x.com", "first_name": "Alice", "last_name": "Smith"
        })
    }

    fn manager(server: &MockServer, store: Arc<MemoryTokenStore>) -> SessionManager {
        let api = ApiClient::new(server.uri(), store).unwrap();
        SessionManager::new(api)
    }

    async fn authenticated(server: &MockServer, store: Arc<MemoryTokenStore>) -> SessionManager {
        Mock::given(method("GET"))
            .and(path("/user/"))
            .respond_with(ResponseTemplate::new(200).set_body_json(user_json()))
            .mount(server)
            .await;
        store.set("t0").unwrap();
        let session = manager(server, store);
        session.start().await;
        assert!(session.current().is_authenticated());
        session
    }

    #[test]
    fn test_guard_decisions() {
        let mut snapshot = SessionSnapshot::starting();
        assert_eq!(guard(&snapshot), RouteDecision::Wait);

        snapshot = SessionSnapshot::anonymous();
        assert_eq!(guard(&snapshot), RouteDecision::RedirectToLogin);

        snapshot.token = Some("t".to_string());
        assert_eq!(guard(&snapshot), RouteDecision::RedirectToLogin);

        snapshot.user = Some(serde_json::from_value(user_json()).unwrap());
        assert_eq!(guard(&snapshot), RouteDecision::Allow);
    }

    #[test]
    fn test_snapshot_debug_redacts_token() {
        let mut snapshot = SessionSnapshot::anonymous();
        snapshot.token = Some("supersecret".to_string());
        let printed = format!("{:?}", snapshot);
        assert!(!printed.contains("supersecret"));
        assert!(printed.contains("<redacted>"));
    }

    #[tokio::test]
    async fn test_new_session_is_loading() {
        let server = MockServer::start().await;
        let session = manager(&server, Arc::new(MemoryTokenStore::new()));
        let snapshot = session.current();
        assert!(snapshot.loading);
        assert!(!snapshot.is_authenticated());
    }

    #[tokio::test]
    async fn test_start_without_token_is_anonymous() {
        let server = MockServer::start().await;
        let session = manager(&server, Arc::new(MemoryTokenStore::new()));

        let snapshot = session.start().await;
        assert_eq!(snapshot.phase, SessionPhase::Anonymous);
        assert!(!snapshot.loading);
        assert!(server.received_requests().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_start_with_valid_token_restores_user() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/user/"))
            .and(header("authorization", "Token abc123"))
            .respond_with(ResponseTemplate::new(200).set_body_json(user_json()))
            .expect(1)
            .mount(&server)
            .await;

        let store = Arc::new(MemoryTokenStore::with_token("abc123"));
        let session = manager(&server, store.clone());

        let snapshot = session.start().await;
        assert_eq!(snapshot.phase, SessionPhase::Authenticated);
        assert_eq!(snapshot.token.as_deref(), Some("abc123"));
        assert_eq!(snapshot.user.unwrap().username, "alice");
        assert_eq!(store.get().as_deref(), Some("abc123"));
    }

    #[tokio::test]
    async fn test_start_with_rejected_token_clears_store() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/user/"))
            .respond_with(ResponseTemplate::new(401))
            .expect(1)
            .mount(&server)
            .await;

        let store = Arc::new(MemoryTokenStore::with_token("abc123"));
        let session = manager(&server, store.clone());

        let snapshot = session.start().await;
        assert_eq!(snapshot.phase, SessionPhase::Anonymous);
        assert!(snapshot.token.is_none());
        assert!(snapshot.user.is_none());
        assert!(store.get().is_none());
    }

    #[tokio::test]
    async fn test_start_with_server_error_clears_store() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/user/"))
            .respond_with(ResponseTemplate::new(500))
            .expect(1)
            .mount(&server)
            .await;

        let store = Arc::new(MemoryTokenStore::with_token("abc123"));
        let session = manager(&server, store.clone());

        assert_eq!(session.start().await.phase, SessionPhase::Anonymous);
        assert!(store.get().is_none());
    }

    #[tokio::test]
    async fn test_login_persists_token_and_user() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/login/"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "token": "t1", "user_id": 7, "username": "alice", "email": "a@x.com"
            })))
            .mount(&server)
            .await;

        let store = Arc::new(MemoryTokenStore::new());
        let session = manager(&server, store.clone());
        session.start().await;

        let user = session
            .login(&LoginRequest {
                username: "alice".to_string(),
                password: "secret".to_string(),
            })
            .await
            .unwrap();

        assert_eq!(user.id, 7);
        assert_eq!(store.get().as_deref(), Some("t1"));
        let snapshot = session.current();
        assert_eq!(snapshot.phase, SessionPhase::Authenticated);
        assert_eq!(snapshot.token.as_deref(), Some("t1"));
        assert!(!snapshot.loading);
    }

    #[tokio::test]
    async fn test_failed_login_keeps_existing_session() {
        let server = MockServer::start().await;
        let store = Arc::new(MemoryTokenStore::new());
        let session = authenticated(&server, store.clone()).await;
        let before = session.current();

        Mock::given(method("POST"))
            .and(path("/login/"))
            .respond_with(ResponseTemplate::new(400).set_body_json(serde_json::json!({
                "non_field_errors": ["Unable to log in with provided credentials."]
            })))
            .mount(&server)
            .await;

        let err = session
            .login(&LoginRequest {
                username: "mallory".to_string(),
                password: "wrong".to_string(),
            })
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Validation);
        assert_eq!(
            err.server_errors().unwrap().form_messages(),
            vec!["Unable to log in with provided credentials."]
        );
        assert_eq!(session.current(), before);
        assert_eq!(store.get().as_deref(), Some("t0"));
    }

    #[tokio::test]
    async fn test_login_transport_error_is_generic() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/login/"))
            .respond_with(ResponseTemplate::new(502).set_body_string("<html>Bad gateway</html>"))
            .mount(&server)
            .await;

        let session = manager(&server, Arc::new(MemoryTokenStore::new()));
        session.start().await;
        let err = session
            .login(&LoginRequest {
                username: "alice".to_string(),
                password: "secret".to_string(),
            })
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Transport);
        assert_eq!(err.to_string(), LOGIN_FAILED);
        let snapshot = session.current();
        assert_eq!(snapshot.phase, SessionPhase::Anonymous);
        assert!(!snapshot.loading);
    }

    #[tokio::test]
    async fn test_register_signs_in() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/register/"))
            .respond_with(ResponseTemplate::new(201).set_body_json(serde_json::json!({
                "token": "t2",
                "user": {"id": 9, "username": "bob", "email": "b@x.com", "first_name": "", "last_name": ""}
            })))
            .mount(&server)
            .await;

        let store = Arc::new(MemoryTokenStore::new());
        let session = manager(&server, store.clone());
        session.start().await;

        let user = session
            .register(&RegisterRequest {
                username: "bob".to_string(),
                email: Some("b@x.com".to_string()),
                password: "longenough".to_string(),
                first_name: None,
                last_name: None,
            })
            .await
            .unwrap();

        assert_eq!(user.id, 9);
        assert_eq!(store.get().as_deref(), Some("t2"));
        assert!(session.current().is_authenticated());
    }

    #[tokio::test]
    async fn test_logout_twice_is_harmless() {
        let server = MockServer::start().await;
        let store = Arc::new(MemoryTokenStore::new());
        let session = authenticated(&server, store.clone()).await;

        session.logout();
        assert_eq!(session.current().phase, SessionPhase::Anonymous);
        assert!(store.get().is_none());

        session.logout();
        assert_eq!(session.current(), SessionSnapshot::anonymous());
        assert!(store.get().is_none());
    }

    #[tokio::test]
    async fn test_logout_during_bootstrap_wins() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/user/"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(user_json())
                    .set_delay(Duration::from_millis(300)),
            )
            .mount(&server)
            .await;

        let store = Arc::new(MemoryTokenStore::with_token("abc123"));
        let session = Arc::new(manager(&server, store.clone()));

        let bootstrap = tokio::spawn({
            let session = session.clone();
            async move { session.start().await }
        });
        tokio::time::sleep(Duration::from_millis(50)).await;
        session.logout();

        let snapshot = bootstrap.await.unwrap();
        assert_eq!(snapshot.phase, SessionPhase::Anonymous);
        assert!(snapshot.user.is_none());
        assert!(store.get().is_none());
    }

    #[tokio::test]
    async fn test_logout_during_login_supersedes_it() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/login/"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({
                        "token": "late", "user_id": 7, "username": "alice", "email": "a@x.com"
                    }))
                    .set_delay(Duration::from_millis(300)),
            )
            .mount(&server)
            .await;

        let store = Arc::new(MemoryTokenStore::new());
        let session = Arc::new(manager(&server, store.clone()));
        session.start().await;

        let login = tokio::spawn({
            let session = session.clone();
            async move {
                session
                    .login(&LoginRequest {
                        username: "alice".to_string(),
                        password: "secret".to_string(),
                    })
                    .await
            }
        });
        tokio::time::sleep(Duration::from_millis(50)).await;
        session.logout();

        assert!(matches!(login.await.unwrap(), Err(AuthError::Superseded)));
        assert!(store.get().is_none());
        assert_eq!(session.current().phase, SessionPhase::Anonymous);
    }

    fn alice() -> LoginRequest {
        LoginRequest {
            username: "alice".to_string(),
            password: "secret".to_string(),
        }
    }

    #[tokio::test]
    async fn test_failed_login_during_bootstrap_still_clears_rejected_token() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/user/"))
            .respond_with(
                ResponseTemplate::new(401)
                    .set_body_json(serde_json::json!({"detail": "Invalid token."}))
                    .set_delay(Duration::from_millis(300)),
            )
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/login/"))
            .respond_with(ResponseTemplate::new(400).set_body_json(serde_json::json!({
                "non_field_errors": ["Unable to log in with provided credentials."]
            })))
            .mount(&server)
            .await;

        let store = Arc::new(MemoryTokenStore::with_token("expired"));
        let session = Arc::new(manager(&server, store.clone()));

        let bootstrap = tokio::spawn({
            let session = session.clone();
            async move { session.start().await }
        });
        tokio::time::sleep(Duration::from_millis(50)).await;

        let err = session.login(&alice()).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);

        // The restore is still running; the session must not look settled.
        let midway = session.current();
        assert_eq!(midway.phase, SessionPhase::Bootstrapping);
        assert!(midway.loading);

        let snapshot = bootstrap.await.unwrap();
        assert_eq!(snapshot, SessionSnapshot::anonymous());
        assert!(store.get().is_none());
    }

    #[tokio::test]
    async fn test_login_during_bootstrap_wins() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/user/"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(user_json())
                    .set_delay(Duration::from_millis(300)),
            )
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/login/"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "token": "t1", "user_id": 8, "username": "carol", "email": "c@x.com"
            })))
            .mount(&server)
            .await;

        let store = Arc::new(MemoryTokenStore::with_token("old"));
        let session = Arc::new(manager(&server, store.clone()));

        let bootstrap = tokio::spawn({
            let session = session.clone();
            async move { session.start().await }
        });
        tokio::time::sleep(Duration::from_millis(50)).await;

        let user = session
            .login(&LoginRequest {
                username: "carol".to_string(),
                password: "secret".to_string(),
            })
            .await
            .unwrap();
        assert_eq!(user.username, "carol");

        let snapshot = bootstrap.await.unwrap();
        assert_eq!(snapshot.phase, SessionPhase::Authenticated);
        assert_eq!(snapshot.token.as_deref(), Some("t1"));
        assert_eq!(snapshot.user.unwrap().username, "carol");
        assert_eq!(store.get().as_deref(), Some("t1"));
    }

    #[tokio::test]
    async fn test_register_during_failing_bootstrap_keeps_new_token() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/user/"))
            .respond_with(ResponseTemplate::new(401).set_delay(Duration::from_millis(300)))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/register/"))
            .respond_with(ResponseTemplate::new(201).set_body_json(serde_json::json!({
                "token": "t2",
                "user": {"id": 9, "username": "bob", "email": "b@x.com"}
            })))
            .mount(&server)
            .await;

        let store = Arc::new(MemoryTokenStore::with_token("expired"));
        let session = Arc::new(manager(&server, store.clone()));

        let bootstrap = tokio::spawn({
            let session = session.clone();
            async move { session.start().await }
        });
        tokio::time::sleep(Duration::from_millis(50)).await;

        session
            .register(&RegisterRequest {
                username: "bob".to_string(),
                email: Some("b@x.com".to_string()),
                password: "longenough".to_string(),
                first_name: None,
                last_name: None,
            })
            .await
            .unwrap();

        let snapshot = bootstrap.await.unwrap();
        assert!(snapshot.is_authenticated());
        assert_eq!(snapshot.user.unwrap().username, "bob");
        assert_eq!(store.get().as_deref(), Some("t2"));
    }

    #[tokio::test]
    async fn test_expire_still_applies_after_failed_login() {
        let server = MockServer::start().await;
        let store = Arc::new(MemoryTokenStore::new());
        let session = authenticated(&server, store.clone()).await;
        Mock::given(method("POST"))
            .and(path("/login/"))
            .respond_with(ResponseTemplate::new(400).set_body_json(serde_json::json!({
                "non_field_errors": ["Unable to log in with provided credentials."]
            })))
            .mount(&server)
            .await;

        let epoch = session.epoch();
        assert!(session.login(&alice()).await.is_err());
        assert!(session.current().is_authenticated());

        assert!(session.expire(epoch));
        assert_eq!(session.current(), SessionSnapshot::anonymous());
        assert!(store.get().is_none());
    }

    #[tokio::test]
    async fn test_expire_ends_current_session_only() {
        let server = MockServer::start().await;
        let store = Arc::new(MemoryTokenStore::new());
        let session = authenticated(&server, store.clone()).await;

        let stale = session.epoch();
        session.logout();
        Mock::given(method("POST"))
            .and(path("/login/"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "token": "t1", "user_id": 7, "username": "alice", "email": "a@x.com"
            })))
            .mount(&server)
            .await;
        session
            .login(&LoginRequest {
                username: "alice".to_string(),
                password: "secret".to_string(),
            })
            .await
            .unwrap();

        assert!(!session.expire(stale));
        assert!(session.current().is_authenticated());

        assert!(session.expire(session.epoch()));
        assert_eq!(session.current().phase, SessionPhase::Anonymous);
        assert!(store.get().is_none());
    }

    #[tokio::test]
    async fn test_subscribers_see_transitions() {
        let server = MockServer::start().await;
        let store = Arc::new(MemoryTokenStore::new());
        let session = authenticated(&server, store).await;

        let mut rx = session.subscribe();
        assert!(rx.borrow_and_update().is_authenticated());

        session.logout();
        rx.changed().await.unwrap();
        assert_eq!(rx.borrow().phase, SessionPhase::Anonymous);
    }
}
