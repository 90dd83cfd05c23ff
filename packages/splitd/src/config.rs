use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::codec::DEFAULT_MAX_LINE_BYTES;

// =============================================================================
// File config (figment-deserialized from defaults / config.toml / env vars)
// =============================================================================
//
//   config.toml:     [server]
//                    max_line_bytes = 1000000
//
//   env var:         SPLITD_SERVER__MAX_LINE_BYTES=1000000
//
//   SPLITD_SOCK_PATH is accepted as a shorthand for server.socket_path.

pub const SOCKET_NAME: &str = "splitd.sock";

/// Overrides `server.socket_path`; checked above the nested env vars.
pub const SOCKET_ENV: &str = "SPLITD_SOCK_PATH";

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct FileConfig {
    #[serde(default)]
    pub server: ServerFileConfig,
    #[serde(default)]
    pub storage: StorageFileConfig,
}

/// Lives under `[server]` in config.toml.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServerFileConfig {
    #[serde(default)]
    pub socket_path: Option<PathBuf>,
    #[serde(default = "default_max_line_bytes")]
    pub max_line_bytes: usize,
    #[serde(default = "default_housekeeping_ms")]
    pub housekeeping_ms: u64,
    #[serde(default = "default_event_queue")]
    pub event_queue: usize,
}

impl Default for ServerFileConfig {
    fn default() -> Self {
        Self {
            socket_path: None,
            max_line_bytes: default_max_line_bytes(),
            housekeeping_ms: default_housekeeping_ms(),
            event_queue: default_event_queue(),
        }
    }
}

/// Lives under `[storage]` in config.toml.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct StorageFileConfig {
    #[serde(default)]
    pub data_dir: Option<PathBuf>,
}

fn default_max_line_bytes() -> usize {
    DEFAULT_MAX_LINE_BYTES
}
fn default_housekeeping_ms() -> u64 {
    300
}
fn default_event_queue() -> usize {
    1024
}

/// Build a figment that layers: defaults → config.toml → SPLITD_* env vars →
/// SPLITD_SOCK_PATH → command-line overrides.
pub fn load_config(
    config_dir: &Path,
    socket: Option<&Path>,
    data_dir: Option<&Path>,
) -> figment::Figment {
    use figment::{
        Figment,
        providers::{Env, Format, Serialized, Toml},
    };

    let mut figment = Figment::from(Serialized::defaults(FileConfig::default()))
        .merge(Toml::file(config_dir.join("config.toml")))
        .merge(Env::prefixed("SPLITD_").split("__"))
        .merge(
            Env::raw()
                .only(&[SOCKET_ENV])
                .map(|_| "server.socket_path".into()),
        );
    if let Some(socket) = socket {
        figment = figment.merge(Serialized::default("server.socket_path", socket));
    }
    if let Some(data_dir) = data_dir {
        figment = figment.merge(Serialized::default("storage.data_dir", data_dir));
    }
    figment
}

/// Directory holding `config.toml` when `--config-dir` is not given.
pub fn default_config_dir() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("splitd")
}

fn default_socket_path() -> PathBuf {
    let runtime = dirs::runtime_dir().unwrap_or_else(|| {
        let user = std::env::var("USER").unwrap_or_else(|_| "splitd".to_string());
        std::env::temp_dir().join(format!("runtime-{user}"))
    });
    runtime.join(SOCKET_NAME)
}

// =============================================================================
// Runtime config (derived from FileConfig)
// =============================================================================

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub socket_path: PathBuf,
    /// Longest unterminated line a connection may buffer.
    pub max_line_bytes: usize,
    /// Period of the housekeeping tick.
    pub housekeeping: Duration,
    /// Capacity of the connection → server loop channel.
    pub event_queue: usize,
}

impl ServerConfig {
    pub fn from_file(fc: &ServerFileConfig) -> Self {
        Self {
            socket_path: fc.socket_path.clone().unwrap_or_else(default_socket_path),
            max_line_bytes: fc.max_line_bytes.max(1),
            housekeeping: Duration::from_millis(fc.housekeeping_ms.max(1)),
            event_queue: fc.event_queue.max(1),
        }
    }
}

#[derive(Clone, Debug)]
pub struct SplitdConfig {
    pub server: ServerConfig,
    /// Root of the per-game/category split directories.
    pub data_dir: PathBuf,
}

impl SplitdConfig {
    pub fn from_file(fc: &FileConfig) -> Self {
        Self {
            server: ServerConfig::from_file(&fc.server),
            data_dir: fc
                .storage
                .data_dir
                .clone()
                .unwrap_or_else(default_config_dir),
        }
    }
}
