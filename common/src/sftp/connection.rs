// SFTP connection management over ssh2 (libssh2)
// libssh2 calls block, so every call runs on tokio's blocking pool.

use crate::errors::TransferError;
use crate::models::{RemoteEntry, RemoteStat, TransportConfig};
use crate::sftp::auth::{authenticate_password, verify_host_key};
use crate::sftp::operations;
use crate::sftp::{
    Connector, HostKeyPolicy, RemoteFile, RemoteSession, CIPHER_ALGORITHMS, HOST_KEY_ALGORITHMS,
    KEX_ALGORITHMS, MAC_ALGORITHMS,
};
use async_trait::async_trait;
use ssh2::{MethodType, Session, Sftp};
use std::net::{Shutdown, TcpStream, ToSocketAddrs};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tracing::{debug, error, info, instrument, warn};

/// Production connector: one fresh SSH connection per operation
#[derive(Debug, Clone)]
pub struct Ssh2Connector {
    host_key_policy: HostKeyPolicy,
    connect_timeout: Duration,
    io_timeout: Duration,
}

impl Ssh2Connector {
    /// `io_timeout` bounds every blocking libssh2 call once connected, so a
    /// stalled server cannot pin a blocking thread past the caller's deadline.
    pub fn new(host_key_policy: HostKeyPolicy, connect_timeout: Duration, io_timeout: Duration) -> Self {
        Self {
            host_key_policy,
            connect_timeout,
            io_timeout,
        }
    }
}

#[async_trait]
impl Connector for Ssh2Connector {
    async fn connect(
        &self,
        config: &TransportConfig,
    ) -> Result<Box<dyn RemoteSession>, TransferError> {
        let config = config.clone();
        let policy = self.host_key_policy.clone();
        let connect_timeout = self.connect_timeout;
        let io_timeout = self.io_timeout;

        let connection = run_blocking(move || {
            SftpConnection::connect(&config, &policy, connect_timeout, io_timeout)
        })
        .await?;

        Ok(Box::new(connection))
    }
}

struct SftpState {
    session: Session,
    sftp: Sftp,
    tcp: TcpStream,
}

/// SFTP connection wrapper
pub struct SftpConnection {
    state: Arc<Mutex<Option<SftpState>>>,
    address: String,
}

impl SftpConnection {
    /// Establish an authenticated SSH connection and open the SFTP channel (blocking)
    #[instrument(skip(config, policy), fields(host = %config.host, port = %config.port))]
    pub fn connect(
        config: &TransportConfig,
        policy: &HostKeyPolicy,
        connect_timeout: Duration,
        io_timeout: Duration,
    ) -> Result<Self, TransferError> {
        let address = config.address();
        info!(address = %address, "Establishing SFTP connection");

        let socket_addr = address
            .to_socket_addrs()
            .map_err(|e| TransferError::Connection(format!("Failed to resolve {}: {}", address, e)))?
            .next()
            .ok_or_else(|| TransferError::Connection(format!("No address found for {}", address)))?;

        let tcp = TcpStream::connect_timeout(&socket_addr, connect_timeout).map_err(|e| {
            error!(error = %e, address = %address, "Failed to connect");
            TransferError::Connection(format!("Failed to connect to {}: {}", address, e))
        })?;

        tcp.set_read_timeout(Some(io_timeout)).map_err(|e| {
            TransferError::Connection(format!("Failed to set read timeout: {}", e))
        })?;
        tcp.set_write_timeout(Some(io_timeout)).map_err(|e| {
            TransferError::Connection(format!("Failed to set write timeout: {}", e))
        })?;

        let mut sess = Session::new().map_err(|e| {
            error!(error = %e, "Failed to create SSH session");
            TransferError::Connection(format!("Failed to create SSH session: {}", e))
        })?;

        sess.set_tcp_stream(tcp.try_clone().map_err(|e| {
            TransferError::Connection(format!("Failed to clone TCP stream: {}", e))
        })?);
        sess.set_timeout(duration_ms(connect_timeout));

        apply_algorithm_preferences(&sess)?;

        sess.handshake().map_err(|e| {
            error!(error = %e, "SSH handshake failed");
            TransferError::Connection(format!("SSH handshake failed: {}", e))
        })?;

        verify_host_key(&sess, policy)?;
        authenticate_password(&sess, &config.username, &config.password)?;

        sess.set_timeout(duration_ms(io_timeout));

        let sftp = sess.sftp().map_err(|e| {
            error!(error = %e, "Failed to open SFTP channel");
            TransferError::Connection(format!("Failed to open SFTP channel: {}", e))
        })?;

        info!(address = %address, "SFTP connection established successfully");
        Ok(Self {
            state: Arc::new(Mutex::new(Some(SftpState {
                session: sess,
                sftp,
                tcp,
            }))),
            address,
        })
    }

    async fn with_sftp<T, F>(&self, f: F) -> Result<T, TransferError>
    where
        T: Send + 'static,
        F: FnOnce(&Sftp) -> Result<T, TransferError> + Send + 'static,
    {
        let state = self.state.clone();
        run_blocking(move || {
            let guard = lock(&state)?;
            let sftp_state = guard
                .as_ref()
                .ok_or_else(|| TransferError::Connection("SFTP session already closed".to_string()))?;
            f(&sftp_state.sftp)
        })
        .await
    }
}

/// Negotiate only the allow-listed algorithms
fn apply_algorithm_preferences(sess: &Session) -> Result<(), TransferError> {
    let preferences = [
        (MethodType::Kex, "kex", KEX_ALGORITHMS),
        (MethodType::HostKey, "host key", HOST_KEY_ALGORITHMS),
        (MethodType::CryptCs, "client cipher", CIPHER_ALGORITHMS),
        (MethodType::CryptSc, "server cipher", CIPHER_ALGORITHMS),
        (MethodType::MacCs, "client mac", MAC_ALGORITHMS),
        (MethodType::MacSc, "server mac", MAC_ALGORITHMS),
    ];

    for (method, label, prefs) in preferences {
        sess.method_pref(method, prefs).map_err(|e| {
            TransferError::Connection(format!("Failed to set {} preferences: {}", label, e))
        })?;
    }

    debug!("Algorithm preferences applied");
    Ok(())
}

#[async_trait]
impl RemoteSession for SftpConnection {
    async fn read_dir(&mut self, path: &str) -> Result<Vec<RemoteEntry>, TransferError> {
        let path = path.to_string();
        self.with_sftp(move |sftp| operations::list_dir(sftp, &path))
            .await
    }

    async fn stat(&mut self, path: &str) -> Result<RemoteStat, TransferError> {
        let path = path.to_string();
        self.with_sftp(move |sftp| operations::stat(sftp, &path)).await
    }

    async fn open(&mut self, path: &str) -> Result<Box<dyn RemoteFile>, TransferError> {
        let owned = path.to_string();
        let file = self
            .with_sftp(move |sftp| operations::open(sftp, &owned))
            .await?;

        Ok(Box::new(SftpFile {
            state: Arc::new(Mutex::new(Some(FileState { file, position: 0 }))),
            path: path.to_string(),
        }))
    }

    async fn append(&mut self, path: &str, data: &[u8]) -> Result<(), TransferError> {
        let path = path.to_string();
        let data = data.to_vec();
        self.with_sftp(move |sftp| operations::append(sftp, &path, &data))
            .await
    }

    async fn close(&mut self) -> Result<(), TransferError> {
        let state = self.state.clone();
        let address = self.address.clone();

        run_blocking(move || {
            let Some(SftpState { session, sftp, tcp }) = lock(&state)?.take() else {
                return Ok(());
            };

            drop(sftp);
            if let Err(e) = session.disconnect(None, "closing", None) {
                warn!(error = %e, address = %address, "SSH disconnect failed");
            }
            let _ = tcp.shutdown(Shutdown::Both);

            debug!(address = %address, "SFTP connection closed");
            Ok(())
        })
        .await
    }
}

struct FileState {
    file: ssh2::File,
    position: u64,
}

/// Open remote file handle
struct SftpFile {
    state: Arc<Mutex<Option<FileState>>>,
    path: String,
}

#[async_trait]
impl RemoteFile for SftpFile {
    async fn fstat(&mut self) -> Result<RemoteStat, TransferError> {
        let state = self.state.clone();
        let path = self.path.clone();
        run_blocking(move || {
            let mut guard = lock(&state)?;
            let file_state = guard.as_mut().ok_or_else(|| closed_handle(&path))?;
            file_state
                .file
                .stat()
                .map(|stat| operations::stat_from(&stat))
                .map_err(|e| operations::map_ssh_error(e, "fstat", &path))
        })
        .await
    }

    async fn read_at(&mut self, offset: u64, len: usize) -> Result<Vec<u8>, TransferError> {
        let state = self.state.clone();
        let path = self.path.clone();
        run_blocking(move || {
            let mut guard = lock(&state)?;
            let file_state = guard.as_mut().ok_or_else(|| closed_handle(&path))?;
            operations::read_at(
                &mut file_state.file,
                &path,
                &mut file_state.position,
                offset,
                len,
            )
        })
        .await
    }

    async fn close(&mut self) -> Result<(), TransferError> {
        let state = self.state.clone();
        let path = self.path.clone();
        run_blocking(move || {
            if let Some(mut file_state) = lock(&state)?.take() {
                file_state
                    .file
                    .close()
                    .map_err(|e| operations::map_ssh_error(e, "close", &path))?;
            }
            Ok(())
        })
        .await
    }
}

fn closed_handle(path: &str) -> TransferError {
    TransferError::Connection(format!("File handle already closed: {}", path))
}

fn lock<T>(state: &Mutex<T>) -> Result<MutexGuard<'_, T>, TransferError> {
    state
        .lock()
        .map_err(|e| TransferError::Connection(format!("SFTP state lock poisoned: {}", e)))
}

fn duration_ms(duration: Duration) -> u32 {
    u32::try_from(duration.as_millis()).unwrap_or(u32::MAX)
}

async fn run_blocking<T, F>(f: F) -> Result<T, TransferError>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, TransferError> + Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| TransferError::Connection(format!("SFTP worker task failed: {}", e)))?
}
