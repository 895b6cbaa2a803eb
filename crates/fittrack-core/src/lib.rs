//! Core library for fittrack.
//!
//! This crate holds everything the fittrack clients share:
//!
//! - `auth`: the persisted credential store and the session state machine
//! - `api`: the authorized request gateway for the fittrack REST API
//! - `models`: user profile, health metric, meal and goal types
//! - `validation`: local form validation run before anything hits the network
//! - `dashboard`: dashboard loading, chart series and goal toggling
//! - `config`: configuration file and environment overrides

pub mod api;
pub mod auth;
pub mod config;
pub mod dashboard;
pub mod models;
pub mod utils;
pub mod validation;

pub use api::{ApiClient, ApiError, ErrorKind, ServerErrors};
pub use auth::{
    guard, AuthError, FileTokenStore, KeyringTokenStore, MemoryTokenStore, RouteDecision,
    SessionManager, SessionPhase, SessionSnapshot, TokenStore,
};
pub use config::Config;
pub use dashboard::{chart_series, ChartPoint, Dashboard, Tracker};
