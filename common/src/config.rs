// Configuration management with layered configuration (defaults, file, env)

use crate::models::TransportConfig;
use crate::retry::ExponentialBackoff;
use crate::sftp::HostKeyPolicy;
use crate::transfer::TransferLimits;
use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

const MIB: u64 = 1024 * 1024;
const GIB: u64 = 1024 * MIB;

/// Main settings structure containing all configuration options
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    pub environment: RuntimeEnvironment,
    pub server: ServerConfig,
    pub sftp: SftpConfig,
    pub transfer: TransferConfig,
    pub recorder: RecorderConfig,
    pub observability: ObservabilityConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuntimeEnvironment {
    Development,
    Production,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Clone, Serialize, Deserialize)]
pub struct SftpConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    #[serde(default)]
    pub password: String,
    pub base_path: String,
    #[serde(default)]
    pub host_key: HostKeyConfig,
}

impl std::fmt::Debug for SftpConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SftpConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password_set", &!self.password.is_empty())
            .field("base_path", &self.base_path)
            .field("host_key", &self.host_key)
            .finish()
    }
}

/// Host key trust policy
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HostKeyConfig {
    /// `accept_any` or `fingerprint`
    #[serde(default)]
    pub mode: HostKeyMode,
    /// Hex SHA-256 of the server host key, colons optional
    pub fingerprint: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HostKeyMode {
    #[default]
    AcceptAny,
    Fingerprint,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferConfig {
    pub connect_timeout_seconds: u64,
    pub listing_timeout_seconds: u64,
    pub probe_timeout_seconds: u64,
    pub operation_timeout_seconds: u64,
    pub chunk_timeout_seconds: u64,
    pub chunk_size_bytes: u64,
    pub max_file_size_bytes: u64,
    pub streaming_threshold_bytes: u64,
    pub listing_retry: RetryConfig,
    pub download_retry: RetryConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    #[serde(default)]
    pub jitter_factor: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecorderConfig {
    /// Remote path of the recorder's URL list
    pub url_config_path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    pub log_level: String,
    pub metrics_enabled: bool,
    pub tracing_endpoint: Option<String>,
}

impl Settings {
    /// Load configuration with layered precedence: defaults → file → env
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from_path("config")
    }

    /// Load configuration from a specific path
    pub fn load_from_path<P: AsRef<Path>>(config_dir: P) -> Result<Self, ConfigError> {
        let config_dir = config_dir.as_ref();

        let builder = Config::builder()
            // Start with built-in defaults
            .add_source(Config::try_from(&Settings::default())?)
            .add_source(File::from(config_dir.join("default.toml")).required(false))
            // Add local configuration (not committed to git)
            .add_source(File::from(config_dir.join("local.toml")).required(false))
            .add_source(
                Environment::with_prefix("APP")
                    .separator("__")
                    .try_parsing(true),
            )
            // Legacy deployment variables
            .set_override_option("sftp.host", std::env::var("SSH_HOST").ok())?
            .set_override_option("sftp.port", std::env::var("SSH_PORT").ok())?
            .set_override_option("sftp.username", std::env::var("SSH_USER").ok())?
            .set_override_option("sftp.password", std::env::var("SSH_PASSWORD").ok())?
            .set_override_option("sftp.base_path", std::env::var("SSH_BASE_PATH").ok())?;

        let config = builder.build()?;
        config.try_deserialize()
    }

    /// Validate configuration settings
    ///
    /// A missing SFTP password is not rejected here; each operation reports it.
    pub fn validate(&self) -> Result<(), String> {
        if self.server.port == 0 {
            return Err("Server port must be greater than 0".to_string());
        }

        if self.sftp.host.is_empty() {
            return Err("SFTP host cannot be empty".to_string());
        }
        if self.sftp.port == 0 {
            return Err("SFTP port must be greater than 0".to_string());
        }
        if self.sftp.base_path.is_empty() {
            return Err("SFTP base_path cannot be empty".to_string());
        }
        if self.sftp.host_key.mode == HostKeyMode::Fingerprint
            && self.sftp.host_key.fingerprint.is_none()
        {
            return Err("Host key fingerprint required when mode is 'fingerprint'".to_string());
        }

        if self.transfer.chunk_size_bytes == 0 {
            return Err("Transfer chunk_size_bytes must be greater than 0".to_string());
        }
        if self.transfer.streaming_threshold_bytes > self.transfer.max_file_size_bytes {
            return Err(
                "Transfer streaming_threshold_bytes cannot exceed max_file_size_bytes".to_string(),
            );
        }
        if self.transfer.listing_retry.max_attempts == 0
            || self.transfer.download_retry.max_attempts == 0
        {
            return Err("Retry max_attempts must be greater than 0".to_string());
        }

        if self.recorder.url_config_path.is_empty() {
            return Err("Recorder url_config_path cannot be empty".to_string());
        }

        Ok(())
    }

    /// Connection parameters handed to every transfer operation
    pub fn transport(&self) -> TransportConfig {
        TransportConfig {
            host: self.sftp.host.clone(),
            port: self.sftp.port,
            username: self.sftp.username.clone(),
            password: self.sftp.password.clone(),
            base_path: self.sftp.base_path.clone(),
        }
    }

    pub fn host_key_policy(&self) -> HostKeyPolicy {
        match (&self.sftp.host_key.mode, &self.sftp.host_key.fingerprint) {
            (HostKeyMode::Fingerprint, Some(fingerprint)) => {
                HostKeyPolicy::Sha256Fingerprint(fingerprint.clone())
            }
            _ => HostKeyPolicy::AcceptAny,
        }
    }

    pub fn is_development(&self) -> bool {
        self.environment == RuntimeEnvironment::Development
    }
}

impl TransferConfig {
    pub fn limits(&self) -> TransferLimits {
        TransferLimits {
            connect_timeout: Duration::from_secs(self.connect_timeout_seconds),
            listing_timeout: Duration::from_secs(self.listing_timeout_seconds),
            probe_timeout: Duration::from_secs(self.probe_timeout_seconds),
            operation_timeout: Duration::from_secs(self.operation_timeout_seconds),
            chunk_timeout: Duration::from_secs(self.chunk_timeout_seconds),
            chunk_size: self.chunk_size_bytes as usize,
            max_file_size: self.max_file_size_bytes,
            streaming_threshold: self.streaming_threshold_bytes,
            ..TransferLimits::default()
        }
    }
}

impl RetryConfig {
    pub fn strategy(&self) -> ExponentialBackoff {
        ExponentialBackoff::with_config(
            self.max_attempts,
            self.base_delay_ms,
            self.max_delay_ms,
            self.jitter_factor,
        )
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            environment: RuntimeEnvironment::Production,
            server: ServerConfig {
                host: "0.0.0.0".to_string(),
                port: 3000,
            },
            sftp: SftpConfig {
                host: "localhost".to_string(),
                port: 22,
                username: "root".to_string(),
                password: String::new(),
                base_path: "/home/DouyinLiveRecorder/downloads".to_string(),
                host_key: HostKeyConfig::default(),
            },
            transfer: TransferConfig {
                connect_timeout_seconds: 15,
                listing_timeout_seconds: 120,
                probe_timeout_seconds: 30,
                operation_timeout_seconds: 45 * 60,
                chunk_timeout_seconds: 60,
                chunk_size_bytes: MIB,
                max_file_size_bytes: 10 * GIB,
                streaming_threshold_bytes: 200 * MIB,
                listing_retry: RetryConfig {
                    max_attempts: 3,
                    base_delay_ms: 1000,
                    max_delay_ms: 3000,
                    jitter_factor: 0.0,
                },
                download_retry: RetryConfig {
                    max_attempts: 3,
                    base_delay_ms: 1000,
                    max_delay_ms: 5000,
                    jitter_factor: 0.0,
                },
            },
            recorder: RecorderConfig {
                url_config_path: "/home/DouyinLiveRecorder/config/URL_config.ini".to_string(),
            },
            observability: ObservabilityConfig {
                log_level: "info".to_string(),
                metrics_enabled: true,
                tracing_endpoint: None,
            },
        }
    }
}
