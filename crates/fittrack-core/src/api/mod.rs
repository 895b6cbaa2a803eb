//! Authorized request gateway for the fittrack REST API.
//!
//! `ApiClient` wraps every outbound call: it attaches the stored session
//! token as `Authorization: Token <value>` and maps failed responses into
//! `ApiError`. It never clears credentials itself; a 401 is reported to the
//! caller and the session state machine decides what to do with it.

pub mod client;
pub mod error;

pub use client::ApiClient;
pub use error::{ApiError, ApiResult, ErrorKind, ServerErrors};
