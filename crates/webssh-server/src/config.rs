//! Server configuration, read once from flags and the environment.

use std::{path::PathBuf, time::Duration};

use clap::Parser;
use webssh_session::SessionConfig;
use webssh_transport::UploadPolicy;

#[derive(Parser, Debug, Clone)]
#[command(name = "webssh", version, about = "Browser-based SSH client")]
pub struct Config {
    /// Interface to listen on.
    #[arg(long, env = "HOST", default_value = "localhost")]
    pub host: String,

    /// Port to listen on.
    #[arg(long, env = "PORT", default_value_t = 3000)]
    pub port: u16,

    /// Largest accepted upload in bytes.
    #[arg(long, env = "MAX_FILE_SIZE", default_value_t = 10_485_760)]
    pub max_file_size: u64,

    /// Staging directory for uploads.
    #[arg(long, env = "UPLOAD_DIR", default_value = "./uploads")]
    pub upload_dir: PathBuf,

    /// Staging directory for downloads, served under `/downloads`.
    #[arg(long, env = "DOWNLOAD_DIR", default_value = "./downloads")]
    pub download_dir: PathBuf,

    /// Accepted upload content types.
    #[arg(
        long,
        env = "ALLOWED_FILE_TYPES",
        value_delimiter = ',',
        default_value = "text/plain,text/html,application/javascript,application/json"
    )]
    pub allowed_file_types: Vec<String>,

    /// API key for the external suggestion service. Local hints only when unset.
    #[arg(long, env = "COMMAND_SUGGESTION_API_KEY", hide_env_values = true)]
    pub command_suggestion_api_key: Option<String>,

    /// Chat completion endpoint for suggestions.
    #[arg(
        long,
        env = "SUGGESTION_ENDPOINT",
        default_value = "https://api.x.ai/v1/chat/completions"
    )]
    pub suggestion_endpoint: String,

    /// Model requested from the suggestion endpoint.
    #[arg(long, env = "SUGGESTION_MODEL", default_value = "grok-3-latest")]
    pub suggestion_model: String,

    /// Seconds allowed for connect plus authentication.
    #[arg(long, env = "READY_TIMEOUT_SECS", default_value_t = 20)]
    pub ready_timeout_secs: u64,

    /// Seconds between SSH keepalives.
    #[arg(long, env = "KEEPALIVE_SECS", default_value_t = 30)]
    pub keepalive_secs: u64,

    /// Largest remote file the editor will open, in bytes.
    #[arg(long, env = "MAX_READ_BYTES", default_value_t = 10_485_760)]
    pub max_read_bytes: u64,
}

impl Config {
    #[must_use]
    pub fn session(&self) -> SessionConfig {
        SessionConfig {
            ready_timeout: Duration::from_secs(self.ready_timeout_secs),
            max_read_bytes: self.max_read_bytes,
            download_dir: self.download_dir.clone(),
            ..SessionConfig::default()
        }
    }

    #[must_use]
    pub fn uploads(&self) -> UploadPolicy {
        UploadPolicy {
            max_size: self.max_file_size,
            allowed_types: self
                .allowed_file_types
                .iter()
                .map(|t| t.trim().to_string())
                .filter(|t| !t.is_empty())
                .collect(),
            upload_dir: self.upload_dir.clone(),
        }
    }

    #[must_use]
    pub const fn keepalive(&self) -> Duration {
        Duration::from_secs(self.keepalive_secs)
    }

    #[must_use]
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
