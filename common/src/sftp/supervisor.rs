// Connection supervision: one session per operation, torn down exactly once
//
// Lifecycle: Connecting → Authenticated → Executing → Closed | Failed

use crate::errors::TransferError;
use crate::models::TransportConfig;
use crate::sftp::{Connector, RemoteSession};
use std::fmt;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

/// Session lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Connecting,
    Authenticated,
    Executing,
    Closed,
    Failed,
}

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("Invalid session state transition: {from} -> {to}")]
pub struct InvalidTransition {
    pub from: SessionState,
    pub to: SessionState,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::Connecting => "connecting",
            SessionState::Authenticated => "authenticated",
            SessionState::Executing => "executing",
            SessionState::Closed => "closed",
            SessionState::Failed => "failed",
        };
        f.write_str(name)
    }
}

impl SessionState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionState::Closed | SessionState::Failed)
    }

    /// Checked transition. Terminal states accept nothing.
    pub fn transition(self, to: SessionState) -> Result<SessionState, InvalidTransition> {
        use SessionState::*;

        let allowed = match (self, to) {
            (Connecting, Authenticated) | (Connecting, Failed) => true,
            (Authenticated, Executing) | (Authenticated, Closed) | (Authenticated, Failed) => true,
            (Executing, Executing) | (Executing, Closed) | (Executing, Failed) => true,
            _ => false,
        };

        if allowed {
            Ok(to)
        } else {
            Err(InvalidTransition { from: self, to })
        }
    }
}

/// An authenticated session owned by exactly one operation
///
/// The boxed transport session is taken out on the first `close`/`fail`, so the
/// underlying `close` runs at most once no matter how many exit paths race to
/// tear it down. Dropping an unclosed session (e.g. a cancelled request)
/// schedules the close on the current runtime.
pub struct SupervisedSession {
    inner: Option<Box<dyn RemoteSession>>,
    state: SessionState,
    address: String,
}

impl SupervisedSession {
    /// Wrap a freshly authenticated session
    pub fn new(session: Box<dyn RemoteSession>, address: impl Into<String>) -> Self {
        Self {
            inner: Some(session),
            state: SessionState::Authenticated,
            address: address.into(),
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    /// Borrow the transport session for protocol calls
    pub fn session(&mut self) -> Result<&mut (dyn RemoteSession + 'static), TransferError> {
        self.state = self
            .state
            .transition(SessionState::Executing)
            .map_err(|e| TransferError::Connection(e.to_string()))?;

        match self.inner.as_deref_mut() {
            Some(session) => Ok(session),
            None => Err(TransferError::Connection(
                "SFTP session already closed".to_string(),
            )),
        }
    }

    /// Close after success. Idempotent.
    pub async fn close(&mut self) -> Result<(), TransferError> {
        self.teardown(SessionState::Closed).await
    }

    /// Close after failure. Idempotent; teardown errors are only logged.
    pub async fn fail(&mut self) {
        if let Err(e) = self.teardown(SessionState::Failed).await {
            warn!(address = %self.address, error = %e, "Teardown after failure also failed");
        }
    }

    /// Tear the session down according to the operation's outcome and pass the outcome through
    pub async fn finish<T>(&mut self, result: Result<T, TransferError>) -> Result<T, TransferError> {
        match result {
            Ok(value) => {
                if let Err(e) = self.close().await {
                    warn!(address = %self.address, error = %e, "Session close failed after success");
                }
                Ok(value)
            }
            Err(error) => {
                self.fail().await;
                Err(error)
            }
        }
    }

    async fn teardown(&mut self, terminal: SessionState) -> Result<(), TransferError> {
        if self.state.is_terminal() {
            debug!(address = %self.address, state = %self.state, "Session already torn down");
            return Ok(());
        }
        let next = self
            .state
            .transition(terminal)
            .map_err(|e| TransferError::Connection(e.to_string()))?;
        self.state = next;

        match self.inner.take() {
            Some(mut session) => {
                debug!(address = %self.address, state = %next, "Closing session");
                session.close().await
            }
            None => Ok(()),
        }
    }
}

impl fmt::Debug for SupervisedSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SupervisedSession")
            .field("address", &self.address)
            .field("state", &self.state)
            .field("open", &self.inner.is_some())
            .finish()
    }
}

impl Drop for SupervisedSession {
    fn drop(&mut self) {
        let Some(mut session) = self.inner.take() else {
            return;
        };

        warn!(address = %self.address, state = %self.state, "Session dropped without close");
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                let address = self.address.clone();
                handle.spawn(async move {
                    if let Err(e) = session.close().await {
                        warn!(address = %address, error = %e, "Deferred session close failed");
                    }
                });
            }
            Err(_) => {
                warn!(address = %self.address, "No runtime available, session released without close");
            }
        }
    }
}

/// Open one authenticated session under a connect deadline
///
/// Fails fast with `Configuration` when no password is set. Never retries.
#[instrument(skip(connector, config), fields(host = %config.host, port = %config.port))]
pub async fn open_session(
    connector: &dyn Connector,
    config: &TransportConfig,
    connect_timeout: Duration,
) -> Result<SupervisedSession, TransferError> {
    config.validate()?;

    let mut state = SessionState::Connecting;
    debug!(state = %state, "Opening session");

    let connected = match tokio::time::timeout(connect_timeout, connector.connect(config)).await {
        Ok(result) => result,
        Err(_) => Err(TransferError::timeout("connect", connect_timeout)),
    };

    match connected {
        Ok(session) => {
            state = state
                .transition(SessionState::Authenticated)
                .map_err(|e| TransferError::Connection(e.to_string()))?;
            info!(state = %state, "Session ready");
            Ok(SupervisedSession::new(session, config.address()))
        }
        Err(error) => {
            warn!(error = %error, "Session could not be opened");
            Err(error)
        }
    }
}
