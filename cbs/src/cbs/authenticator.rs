use super::status::CbsAuthStatus;
use super::transport::{AmqpConnection, CbsLink, CbsLinkConfig, CbsSession, MAX_FRAME_SIZE_BYTES};
use crate::auth::{RetryPolicy, SasTokenCredential};
use crate::common::AuthError;
use tokio::sync::Mutex;
use tokio::time::sleep;

/// Result of a single [`CbsAuthenticator::poll`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PollOutcome {
    /// Status read from the link at the start of the poll
    pub status: CbsAuthStatus,
    /// The link reported a put-token timeout; the caller decides whether to
    /// keep polling
    pub timed_out: bool,
    /// A put-token request is outstanding
    pub in_progress: bool,
}

impl PollOutcome {
    fn new(status: CbsAuthStatus) -> Self {
        Self {
            status,
            timed_out: false,
            in_progress: false,
        }
    }

    /// The token is currently accepted.
    pub fn is_authenticated(&self) -> bool {
        self.status == CbsAuthStatus::Ok
    }
}

// Everything a poll reads or mutates lives behind one lock.
struct AuthenticatorState {
    session: Box<dyn CbsSession>,
    link: Box<dyn CbsLink>,
    credential: SasTokenCredential,
    retries: u32,
}

/// Drives CBS token authentication for one connection.
///
/// The underlying link only exposes a status snapshot, so the authenticator
/// must be polled repeatedly (from a timer or on every transport tick) until
/// it reports success or fails. It stays alive after success: the link will
/// later report [`CbsAuthStatus::RefreshRequired`] as the token approaches
/// expiry, and the next poll re-issues the token.
///
/// # Concurrency
///
/// [`poll`](Self::poll) is the only mutating entry point and is serialized
/// end-to-end by an async mutex. Concurrent pollers wait for one another,
/// including any retry backoff and token refresh in progress.
/// [`close`](Self::close) consumes the authenticator, so no poll can run
/// after it.
///
/// # Examples
///
/// ```no_run
/// use cbs::auth::SasTokenCredential;
/// use std::time::Duration;
///
/// let credential = SasTokenCredential::from_shared_access_key(uri, "send", key, None)?;
/// let authenticator = credential.create_authenticator(&connection).await?;
///
/// loop {
///     let outcome = authenticator.poll().await?;
///     if outcome.is_authenticated() {
///         break;
///     }
///     tokio::time::sleep(Duration::from_millis(50)).await;
/// }
/// ```
pub struct CbsAuthenticator {
    state: Mutex<AuthenticatorState>,
    retry_policy: RetryPolicy,
}

impl CbsAuthenticator {
    /// Opens the dedicated CBS session and token link for `credential`.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::ConnectionSetup`] if the session or the link
    /// cannot be opened. A session opened before a link failure is destroyed.
    pub async fn open(
        connection: &dyn AmqpConnection,
        credential: SasTokenCredential,
    ) -> Result<Self, AuthError> {
        let mut session = connection
            .open_session(MAX_FRAME_SIZE_BYTES, MAX_FRAME_SIZE_BYTES)
            .await
            .map_err(|e| {
                AuthError::ConnectionSetup(format!(
                    "Unable to open authentication session: {e}"
                ))
            })?;

        let config = CbsLinkConfig {
            audience: credential.audience().to_string(),
            token_type: credential.token_type().to_string(),
            token: credential.token().to_string(),
            expires_at: credential.expires_at_secs(),
            timeout: credential.timeout(),
        };

        let link = match session.open_cbs_link(&config).await {
            Ok(link) => link,
            Err(e) => {
                session.destroy().await;
                return Err(AuthError::ConnectionSetup(format!(
                    "Unable to open authentication session. Please confirm target URI exists. ({e})"
                )));
            }
        };

        log::info!("Opened CBS authentication link for '{}'", config.audience);

        Ok(Self {
            retry_policy: credential.retry_policy(),
            state: Mutex::new(AuthenticatorState {
                session,
                link,
                credential,
                retries: 0,
            }),
        })
    }

    /// Reads the link status once and performs the matching transition.
    ///
    /// | Status            | Action                                                      |
    /// |-------------------|-------------------------------------------------------------|
    /// | `Idle`            | issue put-token, `in_progress`                              |
    /// | `InProgress`      | `in_progress`                                               |
    /// | `Ok`              | nothing                                                     |
    /// | `Timeout`         | `timed_out`                                                 |
    /// | `RefreshRequired` | renew the credential's token and push it onto the link      |
    /// | `Error`           | retry after backoff, or fail once retries are exhausted     |
    /// | `Expired`         | fail                                                        |
    /// | `Failure`         | fail                                                        |
    ///
    /// # Errors
    ///
    /// - [`AuthError::TokenAuthFailure`] when put-token keeps failing after
    ///   `max_retries` retries, with the server's description and code
    /// - [`AuthError::TokenExpired`] when the link reports expiry or the
    ///   credential cannot renew its token
    /// - [`AuthError::Authentication`] when the link cannot be opened, the
    ///   status is unknown, or a transport call fails
    pub async fn poll(&self) -> Result<PollOutcome, AuthError> {
        let mut guard = self.state.lock().await;
        let AuthenticatorState {
            link,
            credential,
            retries,
            ..
        } = &mut *guard;

        let status = CbsAuthStatus::try_from(link.status_code().await?)?;
        let mut outcome = PollOutcome::new(status);

        match status {
            CbsAuthStatus::Error => {
                if *retries >= self.retry_policy.max_retries() {
                    log::warn!("Authentication put-token failed, retries exhausted");
                    let info = link.failure_info().await?;
                    return Err(AuthError::TokenAuthFailure {
                        description: info.description,
                        code: info.code,
                    });
                }

                *retries += 1;
                log::info!(
                    "Authentication put-token failed, retrying ({}/{})",
                    retries,
                    self.retry_policy.max_retries()
                );
                let backoff = self.retry_policy.backoff();
                if !backoff.is_zero() {
                    sleep(backoff).await;
                }
                link.authenticate().await?;
                outcome.in_progress = true;
            }
            CbsAuthStatus::Failure => {
                return Err(AuthError::Authentication(
                    "Failed to open CBS authentication link.".to_string(),
                ));
            }
            CbsAuthStatus::Expired => {
                return Err(AuthError::TokenExpired(
                    "CBS authentication expired.".to_string(),
                ));
            }
            CbsAuthStatus::Timeout => outcome.timed_out = true,
            CbsAuthStatus::InProgress => outcome.in_progress = true,
            CbsAuthStatus::RefreshRequired => {
                log::info!("Token will expire soon, attempting to refresh");
                // The credential keeps its old token until the link accepts the new one.
                let refreshed = credential.fetch_token().await?;
                link.refresh(&refreshed.token, refreshed.expires_at as u64)
                    .await?;
                credential.apply_token(refreshed);
            }
            CbsAuthStatus::Idle => {
                log::debug!("Issuing put-token for '{}'", credential.audience());
                link.authenticate().await?;
                outcome.in_progress = true;
            }
            CbsAuthStatus::Ok => {}
        }

        Ok(outcome)
    }

    /// Number of put-token retries performed so far.
    pub async fn retries(&self) -> u32 {
        self.state.lock().await.retries
    }

    /// Snapshot of the credential, including the most recent token the link
    /// accepted.
    pub async fn credential(&self) -> SasTokenCredential {
        self.state.lock().await.credential.clone()
    }

    /// Tears down the CBS link and its session.
    pub async fn close(self) {
        let mut state = self.state.into_inner();
        state.link.destroy().await;
        state.session.destroy().await;
        log::info!(
            "Closed CBS authentication link for '{}'",
            state.credential.audience()
        );
    }
}

impl std::fmt::Debug for CbsAuthenticator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CbsAuthenticator")
            .field("retry_policy", &self.retry_policy)
            .finish_non_exhaustive()
    }
}
