use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::error::Error;
use crate::http::connection::{ConnectionSettings, DEFAULT_WRITE_BUFFER_SIZE};
use crate::server::tls::DEFAULT_HANDSHAKE_TIMEOUT;
use crate::stream::reader::{
    DEFAULT_BUFFER_SIZE, DEFAULT_EMPTY_READ_DELAY, DEFAULT_EMPTY_READ_RETRIES,
    DEFAULT_MAX_LINE_LENGTH, ReaderOptions,
};

pub const CONFIG_ENV: &str = "VIGIL_CONFIG";
pub const LISTEN_ENV: &str = "LISTEN";
pub const DEFAULT_CONFIG_PATH: &str = "vigil.yaml";
pub const DEFAULT_LISTEN_ADDR: &str = "127.0.0.1:8080";

/// Server configuration, normally read from YAML.
///
/// Every field has a default, so an empty document is a valid config:
///
/// ```yaml
/// listeners:
///   - address: 0.0.0.0:8443
///     tls:
///       cert_path: cert.pem
///       key_path: key.pem
/// limits:
///   read_limit: 1048576
/// compression:
///   encodings: [gzip]
/// method_override: form
/// ```
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct Config {
    pub listeners: Vec<ListenerConfig>,
    pub limits: LimitsConfig,
    pub reader: ReaderConfig,
    pub compression: CompressionConfig,
    pub method_override: MethodOverride,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ListenerConfig {
    pub address: String,
    #[serde(default)]
    pub tls: Option<TlsConfig>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TlsConfig {
    pub cert_path: PathBuf,
    pub key_path: PathBuf,
    #[serde(default = "default_handshake_timeout_secs")]
    pub handshake_timeout_secs: u64,
}

impl TlsConfig {
    pub fn handshake_timeout(&self) -> Duration {
        Duration::from_secs(self.handshake_timeout_secs)
    }
}

/// Per-request byte budgets. Absent means unlimited.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct LimitsConfig {
    pub read_limit: Option<u64>,
    pub write_limit: Option<u64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ReaderConfig {
    pub buffer_size: usize,
    pub empty_read_delay_ms: u64,
    pub empty_read_retries: u32,
    pub max_line_length: usize,
    pub write_buffer_size: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct CompressionConfig {
    /// Encodings in order of preference.
    pub encodings: Vec<String>,
    pub level: u32,
}

/// Where a request may ask for a different method than its request line.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MethodOverride {
    None,
    /// `X-HTTP-Method-Override` header.
    #[default]
    Header,
    /// `_method` field of a form-encoded body.
    Form,
}

fn default_handshake_timeout_secs() -> u64 {
    DEFAULT_HANDSHAKE_TIMEOUT.as_secs()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listeners: vec![ListenerConfig {
                address: DEFAULT_LISTEN_ADDR.to_string(),
                tls: None,
            }],
            limits: LimitsConfig::default(),
            reader: ReaderConfig::default(),
            compression: CompressionConfig::default(),
            method_override: MethodOverride::default(),
        }
    }
}

impl Default for ReaderConfig {
    fn default() -> Self {
        Self {
            buffer_size: DEFAULT_BUFFER_SIZE,
            empty_read_delay_ms: DEFAULT_EMPTY_READ_DELAY.as_millis() as u64,
            empty_read_retries: DEFAULT_EMPTY_READ_RETRIES,
            max_line_length: DEFAULT_MAX_LINE_LENGTH,
            write_buffer_size: DEFAULT_WRITE_BUFFER_SIZE,
        }
    }
}

impl Default for CompressionConfig {
    fn default() -> Self {
        Self {
            encodings: vec!["gzip".to_string(), "deflate".to_string()],
            level: crate::handler::compression::DEFAULT_LEVEL,
        }
    }
}

impl Config {
    /// Loads the file named by `VIGIL_CONFIG` (default `vigil.yaml`), then
    /// lets `LISTEN` override the first listener's address.
    ///
    /// A missing default file just means defaults; a missing file that was
    /// named explicitly is an error.
    pub fn load() -> crate::Result<Self> {
        let explicit = std::env::var(CONFIG_ENV).ok();
        let listen = std::env::var(LISTEN_ENV).ok();

        let mut cfg = match explicit {
            Some(path) => Self::from_file(Path::new(&path))?,
            None if Path::new(DEFAULT_CONFIG_PATH).exists() => {
                Self::from_file(Path::new(DEFAULT_CONFIG_PATH))?
            }
            None => Self::default(),
        };

        if let Some(address) = listen {
            cfg.override_listen_addr(address);
        }

        Ok(cfg)
    }

    pub fn from_file(path: &Path) -> crate::Result<Self> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("cannot read {}: {e}", path.display())))?;
        Self::from_yaml(&text)
    }

    pub fn from_yaml(text: &str) -> crate::Result<Self> {
        if text.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(text).map_err(|e| Error::Config(e.to_string()))
    }

    /// Points the first listener at `address`, adding one if there is none.
    pub fn override_listen_addr(&mut self, address: impl Into<String>) {
        let address = address.into();
        match self.listeners.first_mut() {
            Some(listener) => listener.address = address,
            None => self.listeners.push(ListenerConfig { address, tls: None }),
        }
    }

    pub fn connection_settings(&self) -> ConnectionSettings {
        ConnectionSettings::from(self)
    }
}

impl From<&Config> for ConnectionSettings {
    fn from(cfg: &Config) -> Self {
        Self {
            read_limit: cfg.limits.read_limit,
            write_limit: cfg.limits.write_limit,
            reader: ReaderOptions {
                buffer_size: cfg.reader.buffer_size,
                empty_read_delay: Duration::from_millis(cfg.reader.empty_read_delay_ms),
                empty_read_retries: cfg.reader.empty_read_retries,
                max_line_length: cfg.reader.max_line_length,
            },
            write_buffer_size: cfg.reader.write_buffer_size,
        }
    }
}
