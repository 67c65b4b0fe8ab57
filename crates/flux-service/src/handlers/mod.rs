//! API handlers.

pub mod admin;
pub mod dispatch;
pub mod health;
pub mod paypal;
