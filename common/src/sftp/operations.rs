// Blocking SFTP operations over libssh2
// Always called from a blocking thread, never from the async executor.

use crate::errors::TransferError;
use crate::models::{EntryKind, RemoteEntry, RemoteStat};
use ssh2::{ErrorCode, File, FileStat, OpenFlags, OpenType, Sftp};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;
use tracing::{debug, error};

// libssh2 codes
const LIBSSH2_ERROR_TIMEOUT: i32 = -9;
const LIBSSH2_FX_NO_SUCH_FILE: i32 = 2;
const LIBSSH2_FX_PERMISSION_DENIED: i32 = 3;

/// Classify a libssh2 error raised while working on `path`
pub(crate) fn map_ssh_error(e: ssh2::Error, operation: &'static str, path: &str) -> TransferError {
    match e.code() {
        ErrorCode::SFTP(LIBSSH2_FX_NO_SUCH_FILE) | ErrorCode::SFTP(LIBSSH2_FX_PERMISSION_DENIED) => {
            TransferError::NotFound(format!("{}: {}", path, e))
        }
        ErrorCode::Session(LIBSSH2_ERROR_TIMEOUT) => TransferError::Connection(format!(
            "{} on {} timed out in libssh2: {}",
            operation, path, e
        )),
        _ => TransferError::Connection(format!("{} failed on {}: {}", operation, path, e)),
    }
}

/// Stat/open failures: any SFTP status means the path is unusable, session errors are transport
fn map_path_error(e: ssh2::Error, operation: &'static str, path: &str) -> TransferError {
    match e.code() {
        ErrorCode::SFTP(_) => TransferError::NotFound(format!("{}: {}", path, e)),
        ErrorCode::Session(_) => map_ssh_error(e, operation, path),
    }
}

pub(crate) fn stat_from(stat: &FileStat) -> RemoteStat {
    RemoteStat {
        size: stat.size,
        mtime: stat.mtime,
        is_directory: stat.is_dir(),
    }
}

/// List a directory, skipping `.` and `..`
pub(crate) fn list_dir(sftp: &Sftp, path: &str) -> Result<Vec<RemoteEntry>, TransferError> {
    let entries = sftp.readdir(Path::new(path)).map_err(|e| {
        error!(error = %e, path = %path, "readdir failed");
        map_ssh_error(e, "readdir", path)
    })?;

    let mut result = Vec::with_capacity(entries.len());
    for (pathbuf, stat) in entries {
        let name = pathbuf
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();

        if name.is_empty() || name == "." || name == ".." {
            continue;
        }

        let kind = if stat.is_dir() {
            EntryKind::Directory
        } else if stat.is_file() {
            EntryKind::File
        } else {
            EntryKind::Other
        };

        result.push(RemoteEntry {
            name,
            kind,
            size: stat.size,
            mtime: stat.mtime,
        });
    }

    debug!(path = %path, count = result.len(), "Directory listed");
    Ok(result)
}

pub(crate) fn stat(sftp: &Sftp, path: &str) -> Result<RemoteStat, TransferError> {
    sftp.stat(Path::new(path))
        .map(|stat| stat_from(&stat))
        .map_err(|e| map_path_error(e, "stat", path))
}

pub(crate) fn open(sftp: &Sftp, path: &str) -> Result<File, TransferError> {
    sftp.open(Path::new(path))
        .map_err(|e| map_path_error(e, "open", path))
}

/// Fill up to `len` bytes from `offset`; stops early only at end of file
///
/// `position` tracks the handle's file pointer. libssh2 drops its read-ahead on
/// every seek, so sequential reads must not seek.
pub(crate) fn read_at(
    file: &mut File,
    path: &str,
    position: &mut u64,
    offset: u64,
    len: usize,
) -> Result<Vec<u8>, TransferError> {
    if *position != offset {
        file.seek(SeekFrom::Start(offset))
            .map_err(|e| TransferError::Connection(format!("seek failed on {}: {}", path, e)))?;
        *position = offset;
    }

    let mut buffer = vec![0u8; len];
    let mut filled = 0;
    while filled < len {
        let n = file.read(&mut buffer[filled..]).map_err(|e| {
            TransferError::Connection(format!("read failed on {} at {}: {}", path, offset, e))
        })?;
        if n == 0 {
            break;
        }
        filled += n;
        *position += n as u64;
    }

    buffer.truncate(filled);
    Ok(buffer)
}

pub(crate) fn append(sftp: &Sftp, path: &str, data: &[u8]) -> Result<(), TransferError> {
    let mut file = sftp
        .open_mode(
            Path::new(path),
            OpenFlags::WRITE | OpenFlags::APPEND | OpenFlags::CREATE,
            0o644,
            OpenType::File,
        )
        .map_err(|e| map_ssh_error(e, "open for append", path))?;

    // Some servers ignore the APPEND flag, so write at the current end explicitly
    let end = file
        .stat()
        .map_err(|e| map_ssh_error(e, "fstat", path))?
        .size
        .unwrap_or(0);
    file.seek(SeekFrom::Start(end))
        .map_err(|e| TransferError::Connection(format!("seek failed on {}: {}", path, e)))?;

    file.write_all(data)
        .map_err(|e| TransferError::Connection(format!("write failed on {}: {}", path, e)))?;
    file.close()
        .map_err(|e| map_ssh_error(e, "close", path))?;

    Ok(())
}
