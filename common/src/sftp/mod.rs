// SFTP transport module
// Seams: Connector opens sessions, RemoteSession/RemoteFile perform file-protocol calls.

mod auth;
mod connection;
mod operations;
pub mod supervisor;

pub use auth::{authenticate_password, format_fingerprint, verify_host_key};
pub use connection::{SftpConnection, Ssh2Connector};
pub use supervisor::{open_session, SessionState, SupervisedSession};

use crate::errors::TransferError;
use crate::models::{RemoteEntry, RemoteStat, TransportConfig};
use async_trait::async_trait;

/// Key-exchange algorithms offered to the server, in preference order.
///
/// The four allow-lists are a compatibility contract with the legacy recorder
/// host; changing them can lock the service out of that server.
pub const KEX_ALGORITHMS: &str =
    "diffie-hellman-group14-sha256,diffie-hellman-group14-sha1,diffie-hellman-group-exchange-sha256";
pub const CIPHER_ALGORITHMS: &str = "aes128-ctr,aes192-ctr,aes256-ctr,aes128-cbc";
pub const HOST_KEY_ALGORITHMS: &str = "ssh-rsa,ssh-dss,ecdsa-sha2-nistp256,ssh-ed25519";
pub const MAC_ALGORITHMS: &str = "hmac-sha2-256,hmac-sha2-512,hmac-sha1,hmac-md5";

/// How the server's host key is trusted
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum HostKeyPolicy {
    /// Accept any host key. Known risk: no protection against MITM.
    #[default]
    AcceptAny,
    /// Require the SHA-256 digest of the host key to match (hex, colons optional)
    Sha256Fingerprint(String),
}

/// Opens authenticated sessions
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(
        &self,
        config: &TransportConfig,
    ) -> Result<Box<dyn RemoteSession>, TransferError>;
}

/// An authenticated connection with an attached SFTP channel
///
/// Owned by exactly one operation. `close` tears down the connection; callers
/// go through [`SupervisedSession`] which guarantees it runs at most once.
#[async_trait]
pub trait RemoteSession: Send {
    async fn read_dir(&mut self, path: &str) -> Result<Vec<RemoteEntry>, TransferError>;

    async fn stat(&mut self, path: &str) -> Result<RemoteStat, TransferError>;

    async fn open(&mut self, path: &str) -> Result<Box<dyn RemoteFile>, TransferError>;

    /// Append bytes to a remote file, creating it if needed
    async fn append(&mut self, path: &str, data: &[u8]) -> Result<(), TransferError>;

    async fn close(&mut self) -> Result<(), TransferError>;
}

/// An open remote file handle
#[async_trait]
pub trait RemoteFile: Send {
    async fn fstat(&mut self) -> Result<RemoteStat, TransferError>;

    /// Read up to `len` bytes at `offset`. An empty result means end of file.
    async fn read_at(&mut self, offset: u64, len: usize) -> Result<Vec<u8>, TransferError>;

    async fn close(&mut self) -> Result<(), TransferError>;
}
