//! # Quetty CBS Library
//!
//! Claims-based security (CBS) token authentication for AMQP 1.0
//! connections. A SAS token credential opens a dedicated CBS session on an
//! established connection, presents its token, and is then polled to drive
//! the put-token exchange, retry transient failures and renew the token
//! before it expires.
//!
//! ## Modules
//!
//! - [`auth`] - Credentials, SAS token signing, connection strings and token providers
//! - [`cbs`] - The CBS authenticator state machine and its transport traits
//! - [`common`] - Error types shared across the crate

pub mod auth;
pub mod cbs;
pub mod common;
