//! Authentication module for managing the user session and its token.
//!
//! This module provides:
//! - `TokenStore`: durable storage for the single session token
//! - `SessionManager`: the session state machine consumed by every view
//!
//! Only the token is ever persisted. The session itself lives in memory and
//! is rebuilt from the token at startup.

pub mod credentials;
pub mod session;

pub use credentials::{FileTokenStore, KeyringTokenStore, MemoryTokenStore, TokenStore, TOKEN_KEY};
pub use session::{
    guard, AuthError, RouteDecision, SessionManager, SessionPhase, SessionSnapshot,
};
