// Directory enumeration: creator folders and their recordings

use crate::errors::TransferError;
use crate::models::{join_remote, Creator, RemoteEntry, VideoFile};
use crate::sftp::RemoteSession;
use std::cmp::Ordering;
use tracing::{debug, info, instrument, warn};

/// Recording and playback container extensions, lowercase
pub const VIDEO_EXTENSIONS: &[&str] = &["ts", "mp4", "avi", "mov", "mkv", "flv", "webm"];

/// Whether a file name carries one of the known video extensions
///
/// Matching is exact and case-sensitive: `show.TS` is not a video.
pub fn is_video_file(name: &str) -> bool {
    match name.rsplit_once('.') {
        Some((stem, extension)) if !stem.is_empty() => VIDEO_EXTENSIONS.contains(&extension),
        _ => false,
    }
}

/// Newest first. A missing date is older than any date; ties keep listing order.
pub fn compare_newest_first(a: &VideoFile, b: &VideoFile) -> Ordering {
    match (&a.date, &b.date) {
        (Some(a), Some(b)) => b.cmp(a),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

pub fn sort_newest_first(files: &mut [VideoFile]) {
    // stable
    files.sort_by(compare_newest_first);
}

/// Keep the video files of one folder listing, newest first
pub fn video_files(folder_path: &str, entries: &[RemoteEntry]) -> Vec<VideoFile> {
    let mut files: Vec<VideoFile> = entries
        .iter()
        .filter(|entry| entry.is_file() && is_video_file(&entry.name))
        .map(|entry| VideoFile::from_entry(folder_path, entry))
        .collect();
    sort_newest_first(&mut files);
    files
}

/// Enumerate every creator folder under `base_path`
///
/// Folders are visited one at a time in remote listing order. Failing to list
/// a single folder yields that creator with no files; failing to list the base
/// path fails the call.
#[instrument(skip(session))]
pub async fn list_creators(
    session: &mut dyn RemoteSession,
    base_path: &str,
) -> Result<Vec<Creator>, TransferError> {
    let entries = session.read_dir(base_path).await?;
    let folders: Vec<&RemoteEntry> = entries.iter().filter(|e| e.is_directory()).collect();

    if folders.is_empty() {
        info!(base_path = %base_path, "No creator folders found");
        return Ok(Vec::new());
    }

    debug!(base_path = %base_path, folders = folders.len(), "Listing creator folders");

    let mut creators = Vec::with_capacity(folders.len());
    for folder in folders {
        let folder_path = join_remote(base_path, &folder.name);

        let files = match session.read_dir(&folder_path).await {
            Ok(entries) => video_files(&folder_path, &entries),
            Err(e) => {
                warn!(folder = %folder_path, error = %e, "Failed to list creator folder, continuing");
                Vec::new()
            }
        };

        creators.push(Creator::new(folder.name.clone(), files));
    }

    info!(base_path = %base_path, creators = creators.len(), "Creator listing complete");
    Ok(creators)
}
