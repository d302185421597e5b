// SSH host key trust and password authentication

use crate::errors::TransferError;
use crate::sftp::operations::map_ssh_error;
use crate::sftp::HostKeyPolicy;
use ssh2::{ErrorCode, Session};
use tracing::{debug, error, info, warn};

// libssh2 codes for credentials the server rejected
const LIBSSH2_ERROR_PASSWORD_EXPIRED: i32 = -15;
const LIBSSH2_ERROR_AUTHENTICATION_FAILED: i32 = -18;

/// Render a digest as lowercase colon-separated hex
pub fn format_fingerprint(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect::<Vec<_>>()
        .join(":")
}

fn normalize_fingerprint(fingerprint: &str) -> String {
    fingerprint
        .chars()
        .filter(|c| *c != ':')
        .collect::<String>()
        .to_ascii_lowercase()
}

/// Check the presented host key against the configured policy
pub fn verify_host_key(sess: &Session, policy: &HostKeyPolicy) -> Result<(), TransferError> {
    let presented = sess
        .host_key_hash(ssh2::HashType::Sha256)
        .map(format_fingerprint);
    let key_type = sess.host_key().map(|(_, key_type)| key_type);

    match policy {
        HostKeyPolicy::AcceptAny => {
            warn!(
                host_key_type = ?key_type,
                fingerprint = presented.as_deref().unwrap_or("unavailable"),
                "Accepting host key without verification"
            );
            Ok(())
        }
        HostKeyPolicy::Sha256Fingerprint(expected) => {
            let Some(presented) = presented else {
                error!("Server presented no host key");
                return Err(TransferError::Authentication(
                    "Server presented no host key".to_string(),
                ));
            };

            if normalize_fingerprint(&presented) != normalize_fingerprint(expected) {
                error!(fingerprint = %presented, "Host key fingerprint mismatch");
                return Err(TransferError::Authentication(format!(
                    "Host key fingerprint mismatch: got {}",
                    presented
                )));
            }

            info!(host_key_type = ?key_type, fingerprint = %presented, "Host key verified");
            Ok(())
        }
    }
}

/// Authenticate SSH session with a static password
pub fn authenticate_password(
    sess: &Session,
    username: &str,
    password: &str,
) -> Result<(), TransferError> {
    debug!(username = %username, "Authenticating with password");

    sess.userauth_password(username, password).map_err(|e| {
        error!(error = %e, username = %username, "Password authentication failed");
        map_auth_error(e, username)
    })?;

    if !sess.authenticated() {
        error!("Authentication failed - session not authenticated");
        return Err(TransferError::Authentication(
            "Authentication failed".to_string(),
        ));
    }

    Ok(())
}

/// Rejected credentials are permanent; transport failures during the exchange stay retryable
pub(crate) fn map_auth_error(e: ssh2::Error, username: &str) -> TransferError {
    match e.code() {
        ErrorCode::Session(LIBSSH2_ERROR_AUTHENTICATION_FAILED)
        | ErrorCode::Session(LIBSSH2_ERROR_PASSWORD_EXPIRED) => TransferError::Authentication(
            format!("Password authentication failed for user {}: {}", username, e),
        ),
        _ => map_ssh_error(e, "userauth_password", username),
    }
}
