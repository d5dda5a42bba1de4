pub mod authenticator;
pub mod status;
pub mod transport;

pub use authenticator::{CbsAuthenticator, PollOutcome};
pub use status::{CbsAuthStatus, FailureInfo};
pub use transport::{AmqpConnection, CbsLink, CbsLinkConfig, CbsSession, MAX_FRAME_SIZE_BYTES};
