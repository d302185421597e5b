// In-memory remote host for driving the transfer core without a network
#![allow(dead_code)]

use async_trait::async_trait;
use common::errors::TransferError;
use common::models::{RemoteEntry, RemoteStat, TransportConfig};
use common::sftp::{Connector, RemoteFile, RemoteSession};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub const MIB: u64 = 1024 * 1024;
pub const GIB: u64 = 1024 * MIB;

pub fn transport() -> TransportConfig {
    TransportConfig::new("media.example", "root", "secret", "/data")
}

/// Everything the fake observed, shared with the test
#[derive(Default)]
pub struct Activity {
    pub connects: AtomicUsize,
    pub session_closes: AtomicUsize,
    pub file_opens: AtomicUsize,
    pub file_closes: AtomicUsize,
    pub reads: AtomicUsize,
    pub appended: Mutex<Vec<(String, Vec<u8>)>>,
}

impl Activity {
    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    pub fn session_closes(&self) -> usize {
        self.session_closes.load(Ordering::SeqCst)
    }

    pub fn file_opens(&self) -> usize {
        self.file_opens.load(Ordering::SeqCst)
    }

    pub fn file_closes(&self) -> usize {
        self.file_closes.load(Ordering::SeqCst)
    }

    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }
}

/// A remote regular file. Content is synthetic unless given explicitly.
#[derive(Clone)]
pub struct FakeFile {
    len: u64,
    declared: Option<u64>,
    mtime: Option<u64>,
    content: Option<Arc<Vec<u8>>>,
    stall_from: Option<u64>,
    fail_from: Option<u64>,
    delay_per_read: Option<Duration>,
}

impl FakeFile {
    pub fn sized(len: u64) -> Self {
        Self {
            len,
            declared: Some(len),
            mtime: None,
            content: None,
            stall_from: None,
            fail_from: None,
            delay_per_read: None,
        }
    }

    pub fn with_content(content: &[u8]) -> Self {
        Self {
            content: Some(Arc::new(content.to_vec())),
            ..Self::sized(content.len() as u64)
        }
    }

    /// Size reported by stat, independent of the bytes actually readable
    pub fn declared(mut self, declared: Option<u64>) -> Self {
        self.declared = declared;
        self
    }

    pub fn mtime(mut self, mtime: u64) -> Self {
        self.mtime = Some(mtime);
        self
    }

    /// Reads at or past `offset` never complete
    pub fn stall_from(mut self, offset: u64) -> Self {
        self.stall_from = Some(offset);
        self
    }

    /// Reads at or past `offset` fail with a connection error
    pub fn fail_from(mut self, offset: u64) -> Self {
        self.fail_from = Some(offset);
        self
    }

    /// Every read takes `delay` before answering
    pub fn delay_per_read(mut self, delay: Duration) -> Self {
        self.delay_per_read = Some(delay);
        self
    }

    fn stat(&self) -> RemoteStat {
        RemoteStat {
            size: self.declared,
            mtime: self.mtime,
            is_directory: false,
        }
    }

    fn bytes(&self, offset: u64, len: usize) -> Vec<u8> {
        if offset >= self.len {
            return Vec::new();
        }
        let n = std::cmp::min(len as u64, self.len - offset) as usize;
        match &self.content {
            Some(content) => content[offset as usize..offset as usize + n].to_vec(),
            None => (0..n as u64).map(|i| synthetic_byte(offset + i)).collect(),
        }
    }
}

pub fn synthetic_byte(offset: u64) -> u8 {
    (offset % 251) as u8
}

/// Builder for the fake host
#[derive(Default)]
pub struct FakeRemote {
    listings: HashMap<String, Vec<RemoteEntry>>,
    failing_dirs: HashSet<String>,
    stalling_dirs: HashSet<String>,
    files: HashMap<String, FakeFile>,
    connect_failures: usize,
    connect_error: Option<TransferError>,
    activity: Arc<Activity>,
}

impl FakeRemote {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_listing(mut self, path: &str, entries: Vec<RemoteEntry>) -> Self {
        self.listings.insert(path.to_string(), entries);
        self
    }

    pub fn with_failing_dir(mut self, path: &str) -> Self {
        self.failing_dirs.insert(path.to_string());
        self
    }

    pub fn with_stalling_dir(mut self, path: &str) -> Self {
        self.stalling_dirs.insert(path.to_string());
        self
    }

    pub fn with_file(mut self, path: &str, file: FakeFile) -> Self {
        self.files.insert(path.to_string(), file);
        self
    }

    /// The first `count` connects fail with `error`
    pub fn failing_connects(mut self, count: usize, error: TransferError) -> Self {
        self.connect_failures = count;
        self.connect_error = Some(error);
        self
    }

    pub fn activity(&self) -> Arc<Activity> {
        self.activity.clone()
    }

    pub fn connector(self) -> Arc<FakeConnector> {
        Arc::new(FakeConnector {
            remote: Arc::new(self),
        })
    }
}

pub struct FakeConnector {
    remote: Arc<FakeRemote>,
}

#[async_trait]
impl Connector for FakeConnector {
    async fn connect(
        &self,
        _config: &TransportConfig,
    ) -> Result<Box<dyn RemoteSession>, TransferError> {
        let attempt = self.remote.activity.connects.fetch_add(1, Ordering::SeqCst);
        if attempt < self.remote.connect_failures {
            if let Some(error) = &self.remote.connect_error {
                return Err(error.clone());
            }
        }

        Ok(Box::new(FakeSession {
            remote: self.remote.clone(),
        }))
    }
}

struct FakeSession {
    remote: Arc<FakeRemote>,
}

#[async_trait]
impl RemoteSession for FakeSession {
    async fn read_dir(&mut self, path: &str) -> Result<Vec<RemoteEntry>, TransferError> {
        if self.remote.stalling_dirs.contains(path) {
            std::future::pending::<()>().await;
        }
        if self.remote.failing_dirs.contains(path) {
            return Err(TransferError::Connection(format!("readdir failed on {}", path)));
        }
        self.remote
            .listings
            .get(path)
            .cloned()
            .ok_or_else(|| TransferError::NotFound(path.to_string()))
    }

    async fn stat(&mut self, path: &str) -> Result<RemoteStat, TransferError> {
        if let Some(file) = self.remote.files.get(path) {
            return Ok(file.stat());
        }
        if self.remote.listings.contains_key(path) {
            return Ok(RemoteStat {
                is_directory: true,
                ..RemoteStat::default()
            });
        }
        Err(TransferError::NotFound(path.to_string()))
    }

    async fn open(&mut self, path: &str) -> Result<Box<dyn RemoteFile>, TransferError> {
        let file = self
            .remote
            .files
            .get(path)
            .cloned()
            .ok_or_else(|| TransferError::NotFound(path.to_string()))?;
        self.remote.activity.file_opens.fetch_add(1, Ordering::SeqCst);

        Ok(Box::new(FakeHandle {
            file,
            activity: self.remote.activity.clone(),
        }))
    }

    async fn append(&mut self, path: &str, data: &[u8]) -> Result<(), TransferError> {
        self.remote
            .activity
            .appended
            .lock()
            .unwrap()
            .push((path.to_string(), data.to_vec()));
        Ok(())
    }

    async fn close(&mut self) -> Result<(), TransferError> {
        self.remote
            .activity
            .session_closes
            .fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

struct FakeHandle {
    file: FakeFile,
    activity: Arc<Activity>,
}

#[async_trait]
impl RemoteFile for FakeHandle {
    async fn fstat(&mut self) -> Result<RemoteStat, TransferError> {
        Ok(self.file.stat())
    }

    async fn read_at(&mut self, offset: u64, len: usize) -> Result<Vec<u8>, TransferError> {
        self.activity.reads.fetch_add(1, Ordering::SeqCst);

        if let Some(delay) = self.file.delay_per_read {
            tokio::time::sleep(delay).await;
        }

        if matches!(self.file.stall_from, Some(stall) if offset >= stall) {
            std::future::pending::<()>().await;
        }
        if matches!(self.file.fail_from, Some(fail) if offset >= fail) {
            return Err(TransferError::Connection(format!(
                "connection reset at {}",
                offset
            )));
        }
        Ok(self.file.bytes(offset, len))
    }

    async fn close(&mut self) -> Result<(), TransferError> {
        self.activity.file_closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
