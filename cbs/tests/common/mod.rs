#![allow(dead_code)]

use async_trait::async_trait;
use cbs::cbs::{AmqpConnection, CbsAuthStatus, CbsLink, CbsLinkConfig, CbsSession, FailureInfo};
use cbs::common::TransportError;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

/// Everything the scripted transport observed.
#[derive(Debug, Default)]
pub struct TransportLog {
    pub session_windows: Option<(u32, u32)>,
    pub link_config: Option<CbsLinkConfig>,
    pub status_reads: u32,
    pub authenticate_calls: u32,
    pub refreshes: Vec<(String, u64)>,
    pub failure_info_reads: u32,
    pub link_destroyed: bool,
    pub session_destroyed: bool,
    /// Set while a status read has not yet been followed by authenticate
    pub poll_in_flight: bool,
    /// Number of status reads that started while another poll was mid-way
    pub overlapping_polls: u32,
}

struct StatusScript {
    queued: VecDeque<u32>,
    steady: u32,
}

/// In-memory AMQP connection whose CBS link replays a script of statuses.
///
/// Queued status codes are returned in order; once the queue is drained
/// every read returns the steady status.
#[derive(Clone)]
pub struct ScriptedConnection {
    log: Arc<Mutex<TransportLog>>,
    script: Arc<Mutex<StatusScript>>,
    failure_info: FailureInfo,
    fail_session_open: bool,
    fail_link_open: bool,
    fail_status_reads: bool,
    fail_refresh: bool,
}

impl ScriptedConnection {
    pub fn new(
        statuses: impl IntoIterator<Item = CbsAuthStatus>,
        steady: CbsAuthStatus,
    ) -> Self {
        Self::from_codes(statuses.into_iter().map(CbsAuthStatus::code), steady.code())
    }

    pub fn steady(status: CbsAuthStatus) -> Self {
        Self::new([], status)
    }

    pub fn from_codes(codes: impl IntoIterator<Item = u32>, steady: u32) -> Self {
        Self {
            log: Arc::new(Mutex::new(TransportLog::default())),
            script: Arc::new(Mutex::new(StatusScript {
                queued: codes.into_iter().collect(),
                steady,
            })),
            failure_info: FailureInfo {
                description: "Put-token rejected".to_string(),
                code: 401,
            },
            fail_session_open: false,
            fail_link_open: false,
            fail_status_reads: false,
            fail_refresh: false,
        }
    }

    pub fn with_failure_info(mut self, description: &str, code: i32) -> Self {
        self.failure_info = FailureInfo {
            description: description.to_string(),
            code,
        };
        self
    }

    pub fn failing_session_open(mut self) -> Self {
        self.fail_session_open = true;
        self
    }

    pub fn failing_link_open(mut self) -> Self {
        self.fail_link_open = true;
        self
    }

    pub fn failing_status_reads(mut self) -> Self {
        self.fail_status_reads = true;
        self
    }

    pub fn failing_refresh(mut self) -> Self {
        self.fail_refresh = true;
        self
    }

    pub fn log(&self) -> std::sync::MutexGuard<'_, TransportLog> {
        self.log.lock().unwrap()
    }
}

#[async_trait]
impl AmqpConnection for ScriptedConnection {
    async fn open_session(
        &self,
        incoming_window: u32,
        outgoing_window: u32,
    ) -> Result<Box<dyn CbsSession>, TransportError> {
        if self.fail_session_open {
            return Err(TransportError::new("open_session", "connection closed"));
        }
        self.log().session_windows = Some((incoming_window, outgoing_window));
        Ok(Box::new(ScriptedSession {
            connection: self.clone(),
        }))
    }
}

struct ScriptedSession {
    connection: ScriptedConnection,
}

#[async_trait]
impl CbsSession for ScriptedSession {
    async fn open_cbs_link(
        &mut self,
        config: &CbsLinkConfig,
    ) -> Result<Box<dyn CbsLink>, TransportError> {
        if self.connection.fail_link_open {
            return Err(TransportError::new("open_cbs_link", "node not found"));
        }
        self.connection.log().link_config = Some(config.clone());
        Ok(Box::new(ScriptedLink {
            connection: self.connection.clone(),
        }))
    }

    async fn destroy(&mut self) {
        self.connection.log().session_destroyed = true;
    }
}

struct ScriptedLink {
    connection: ScriptedConnection,
}

#[async_trait]
impl CbsLink for ScriptedLink {
    async fn status_code(&mut self) -> Result<u32, TransportError> {
        if self.connection.fail_status_reads {
            return Err(TransportError::new("get_status", "link detached"));
        }
        {
            let mut log = self.connection.log();
            log.status_reads += 1;
            if log.poll_in_flight {
                log.overlapping_polls += 1;
            }
            log.poll_in_flight = true;
        }
        tokio::task::yield_now().await;

        let mut script = self.connection.script.lock().unwrap();
        Ok(script.queued.pop_front().unwrap_or(script.steady))
    }

    async fn authenticate(&mut self) -> Result<(), TransportError> {
        tokio::task::yield_now().await;
        let mut log = self.connection.log();
        log.authenticate_calls += 1;
        log.poll_in_flight = false;
        Ok(())
    }

    async fn refresh(&mut self, token: &str, expires_at: u64) -> Result<(), TransportError> {
        if self.connection.fail_refresh {
            return Err(TransportError::new("refresh", "put-token rejected"));
        }
        self.connection
            .log()
            .refreshes
            .push((token.to_string(), expires_at));
        Ok(())
    }

    async fn failure_info(&mut self) -> Result<FailureInfo, TransportError> {
        self.connection.log().failure_info_reads += 1;
        Ok(self.connection.failure_info.clone())
    }

    async fn destroy(&mut self) {
        self.connection.log().link_destroyed = true;
    }
}

pub const TEST_URI: &str = "sb://test-namespace.servicebus.windows.net/orders";
