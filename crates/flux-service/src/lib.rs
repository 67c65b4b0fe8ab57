//! Flux HTTP service.
//!
//! This crate provides the server side of the Flux control panel:
//!
//! - PayPal Instant Payment Notification processing (verification, credit
//!   exchange, auditing)
//! - Module/action request dispatch
//! - Read-only admin endpoints over the donation ledger
//!
//! # Authentication
//!
//! 1. **Session tokens** - HS256 JWTs issued by the login subsystem, used by
//!    the dispatcher's authorization check
//! 2. **Admin API key** - `X-Admin-Key` header for the admin endpoints
//!
//! PayPal notifications are unauthenticated; they are trusted only after the
//! verification call-back succeeds.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::missing_errors_doc)] // Axum handlers all return Result
#![allow(clippy::module_name_repetitions)]

pub mod auth;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod handlers;
pub mod ipn;
pub mod paypal;
pub mod routes;
pub mod servers;
pub mod state;

pub use auth::{AdminAuth, Session, SessionClaims};
pub use config::{ConfigError, DuplicatePolicy, ServerGroupConfig, ServiceConfig};
pub use dispatcher::{
    resolve_route, AccessTable, Authorizer, DispatchConfig, DispatchError, DispatchRequest, Route,
};
pub use error::ApiError;
pub use ipn::{
    IpnError, NoCreditReason, NotificationOutcome, NotificationProcessor, PaypalLog,
    ProcessorSettings,
};
pub use paypal::{NotificationVerifier, PaypalVerifier, Verification};
pub use routes::create_router;
pub use servers::{ServerGroup, ServerRegistry};
pub use state::AppState;
