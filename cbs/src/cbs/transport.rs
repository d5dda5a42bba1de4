//! Seam between the authenticator and the AMQP transport.
//!
//! The transport owns sockets, framing and the CBS put-token exchange. The
//! authenticator only opens a session and a link through these traits, reads
//! status snapshots from the link and tells it to authenticate or refresh.

use super::status::FailureInfo;
use crate::common::TransportError;
use async_trait::async_trait;
use std::time::Duration;

/// Incoming and outgoing window of the dedicated CBS session: one maximum
/// frame worth of bytes.
pub const MAX_FRAME_SIZE_BYTES: u32 = 64 * 1024;

/// Parameters for opening a CBS token link.
#[derive(Clone)]
pub struct CbsLinkConfig {
    pub audience: String,
    pub token_type: String,
    pub token: String,
    /// Expiry of `token` in whole seconds since the Unix epoch
    pub expires_at: u64,
    /// Timeout for each put-token operation
    pub timeout: Duration,
}

impl std::fmt::Debug for CbsLinkConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CbsLinkConfig")
            .field("audience", &self.audience)
            .field("token_type", &self.token_type)
            .field("token", &"<redacted>")
            .field("expires_at", &self.expires_at)
            .field("timeout", &self.timeout)
            .finish()
    }
}

/// An open AMQP connection that can host sessions.
#[async_trait]
pub trait AmqpConnection: Send + Sync {
    async fn open_session(
        &self,
        incoming_window: u32,
        outgoing_window: u32,
    ) -> Result<Box<dyn CbsSession>, TransportError>;
}

/// A session dedicated to the CBS exchange.
#[async_trait]
pub trait CbsSession: Send + Sync {
    /// Attaches a CBS link presenting `config.token` for `config.audience`.
    ///
    /// Fails when the target does not exist or cannot be reached.
    async fn open_cbs_link(
        &mut self,
        config: &CbsLinkConfig,
    ) -> Result<Box<dyn CbsLink>, TransportError>;

    async fn destroy(&mut self);
}

/// A CBS token link.
#[async_trait]
pub trait CbsLink: Send + Sync {
    /// Raw status code of the link's current authentication state.
    async fn status_code(&mut self) -> Result<u32, TransportError>;

    /// Sends (or re-sends) the put-token request.
    async fn authenticate(&mut self) -> Result<(), TransportError>;

    /// Replaces the token on the link without restarting the handshake.
    async fn refresh(&mut self, token: &str, expires_at: u64) -> Result<(), TransportError>;

    /// Detail of the last rejected put-token request.
    async fn failure_info(&mut self) -> Result<FailureInfo, TransportError>;

    async fn destroy(&mut self);
}
