use crate::common::AuthError;
use std::fmt;

/// Authentication status snapshot reported by a CBS link.
///
/// The link exposes only its current status, never transition events, so
/// the same value (notably [`RefreshRequired`](Self::RefreshRequired)) may
/// be observed on many consecutive polls.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum CbsAuthStatus {
    Ok = 0,
    Idle = 1,
    InProgress = 2,
    Timeout = 3,
    RefreshRequired = 4,
    Expired = 5,
    Error = 6,
    Failure = 7,
}

impl CbsAuthStatus {
    pub fn code(self) -> u32 {
        self as u32
    }
}

impl TryFrom<u32> for CbsAuthStatus {
    type Error = AuthError;

    fn try_from(code: u32) -> Result<Self, AuthError> {
        match code {
            0 => Ok(CbsAuthStatus::Ok),
            1 => Ok(CbsAuthStatus::Idle),
            2 => Ok(CbsAuthStatus::InProgress),
            3 => Ok(CbsAuthStatus::Timeout),
            4 => Ok(CbsAuthStatus::RefreshRequired),
            5 => Ok(CbsAuthStatus::Expired),
            6 => Ok(CbsAuthStatus::Error),
            7 => Ok(CbsAuthStatus::Failure),
            other => Err(AuthError::Authentication(format!(
                "Invalid auth state: {other}"
            ))),
        }
    }
}

impl fmt::Display for CbsAuthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CbsAuthStatus::Ok => "ok",
            CbsAuthStatus::Idle => "idle",
            CbsAuthStatus::InProgress => "in progress",
            CbsAuthStatus::Timeout => "timeout",
            CbsAuthStatus::RefreshRequired => "refresh required",
            CbsAuthStatus::Expired => "expired",
            CbsAuthStatus::Error => "error",
            CbsAuthStatus::Failure => "failure",
        };
        f.write_str(name)
    }
}

/// Server-provided detail for a rejected put-token request.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FailureInfo {
    pub description: String,
    pub code: i32,
}
