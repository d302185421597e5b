// Domain models for the remote media library

use crate::errors::TransferError;
use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Connection parameters for one remote host
///
/// Immutable per operation. An empty password is a configuration error that
/// every operation reports before touching the network.
#[derive(Clone, Serialize, Deserialize)]
pub struct TransportConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub base_path: String,
}

impl TransportConfig {
    pub fn new(
        host: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
        base_path: impl Into<String>,
    ) -> Self {
        Self {
            host: host.into(),
            port: 22,
            username: username.into(),
            password: password.into(),
            base_path: base_path.into(),
        }
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Fail fast when credentials are missing
    pub fn validate(&self) -> Result<(), TransferError> {
        if self.password.is_empty() {
            return Err(TransferError::Configuration(
                "SSH_PASSWORD not configured".to_string(),
            ));
        }
        if self.host.is_empty() {
            return Err(TransferError::Configuration(
                "SSH host not configured".to_string(),
            ));
        }
        Ok(())
    }

    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl fmt::Debug for TransportConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransportConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("base_path", &self.base_path)
            .finish()
    }
}

/// Kind of a remote directory entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    Directory,
    File,
    Other,
}

/// One entry of a remote directory listing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteEntry {
    pub name: String,
    pub kind: EntryKind,
    pub size: Option<u64>,
    /// Seconds since the Unix epoch
    pub mtime: Option<u64>,
}

impl RemoteEntry {
    pub fn directory(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: EntryKind::Directory,
            size: None,
            mtime: None,
        }
    }

    pub fn file(name: impl Into<String>, size: Option<u64>, mtime: Option<u64>) -> Self {
        Self {
            name: name.into(),
            kind: EntryKind::File,
            size,
            mtime,
        }
    }

    pub fn is_directory(&self) -> bool {
        self.kind == EntryKind::Directory
    }

    pub fn is_file(&self) -> bool {
        self.kind == EntryKind::File
    }
}

/// Remote file metadata
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RemoteStat {
    pub size: Option<u64>,
    pub mtime: Option<u64>,
    pub is_directory: bool,
}

/// A recorded video file inside a creator folder
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VideoFile {
    pub name: String,
    /// Absolute remote path
    pub path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date: Option<DateTime<Utc>>,
}

impl VideoFile {
    pub fn from_entry(folder_path: &str, entry: &RemoteEntry) -> Self {
        Self {
            name: entry.name.clone(),
            path: join_remote(folder_path, &entry.name),
            size: entry.size,
            date: entry
                .mtime
                .and_then(|secs| i64::try_from(secs).ok())
                .and_then(|secs| Utc.timestamp_opt(secs, 0).single()),
        }
    }
}

/// One remote top-level folder and its recordings, newest first
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Creator {
    pub name: String,
    pub folder_name: String,
    pub files: Vec<VideoFile>,
}

impl Creator {
    pub fn new(folder_name: impl Into<String>, files: Vec<VideoFile>) -> Self {
        let folder_name = folder_name.into();
        Self {
            name: creator_name(&folder_name).to_string(),
            folder_name,
            files,
        }
    }
}

/// Creator display name: the folder name up to the first `-`
pub fn creator_name(folder_name: &str) -> &str {
    match folder_name.split('-').next() {
        Some(prefix) if !prefix.is_empty() => prefix,
        _ => folder_name,
    }
}

/// Join a remote directory and an entry name with exactly one `/`
pub fn join_remote(dir: &str, name: &str) -> String {
    if dir.is_empty() {
        return name.to_string();
    }
    format!("{}/{}", dir.trim_end_matches('/'), name)
}
