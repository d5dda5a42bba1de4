pub mod errors;

pub use errors::{AuthError, TransportError};
