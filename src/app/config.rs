use crate::listener::{ListenerConfig, Transport};
use crate::parser::{FormatVariant, SyslogFormat, UnknownFormat};
use crate::peer::DEFAULT_PEER_NAME;
use crate::pipeline::{DEFAULT_QUEUE_CAPACITY, IngestionPipeline, OverflowPolicy};
use clap::{Parser, ValueEnum};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_HOST: &str = "0.0.0.0";
pub const DEFAULT_FORMAT: &str = "RFC3164";
pub const DEFAULT_MAX_MESSAGE_SIZE: usize = crate::listener::DEFAULT_MAX_MESSAGE_SIZE;
/// Fits inside a typical container stop grace period with room for cleanup.
pub const DEFAULT_DRAIN_TIMEOUT_SECS: u64 = 4;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("cannot read config file {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    UnknownFormat(#[from] UnknownFormat),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

#[derive(Parser, Debug, Clone)]
#[command(name = "syslog-ingest", author, version, about, long_about = None)]
pub struct Cli {
    /// Path to the JSON service configuration
    #[arg(short = 'c', long = "config", env = "SYSLOG_INGEST_CONFIG")]
    pub config: PathBuf,

    /// Operational log level (RUST_LOG takes precedence)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: LogLevel,

    /// Operational log output format
    #[arg(long, env = "RUST_LOG_FORMAT", default_value = "text")]
    pub log_format: LogFormat,
}

impl Cli {
    pub fn try_from_args<I, T>(args: I) -> Result<Self, clap::Error>
    where
        I: IntoIterator<Item = T>,
        T: Into<std::ffi::OsString> + Clone,
    {
        Cli::try_parse_from(args)
    }
}

/// Service configuration loaded from the JSON file named on the command line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    #[serde(rename = "Host")]
    pub host: String,

    #[serde(rename = "Format")]
    pub format: String,

    #[serde(rename = "TCPPort", deserialize_with = "port_value::deserialize")]
    pub tcp_port: Option<i64>,

    #[serde(rename = "UDPPort", deserialize_with = "port_value::deserialize")]
    pub udp_port: Option<i64>,

    #[serde(rename = "TLSPort", deserialize_with = "port_value::deserialize")]
    pub tls_port: Option<i64>,

    #[serde(rename = "CertPath", deserialize_with = "optional_path::deserialize")]
    pub cert_path: Option<PathBuf>,

    #[serde(rename = "KeyPath", deserialize_with = "optional_path::deserialize")]
    pub key_path: Option<PathBuf>,

    #[serde(rename = "PeerName")]
    pub peer_name: String,

    #[serde(rename = "LogDir")]
    pub log_dir: PathBuf,

    #[serde(rename = "QueueCapacity")]
    pub queue_capacity: usize,

    #[serde(rename = "OverflowPolicy")]
    pub overflow_policy: OverflowPolicy,

    #[serde(rename = "MaxMessageSize")]
    pub max_message_size: usize,

    #[serde(rename = "DrainTimeoutSecs")]
    pub drain_timeout_secs: u64,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            format: DEFAULT_FORMAT.to_string(),
            tcp_port: None,
            udp_port: None,
            tls_port: None,
            cert_path: None,
            key_path: None,
            peer_name: DEFAULT_PEER_NAME.to_string(),
            log_dir: PathBuf::from("."),
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            overflow_policy: OverflowPolicy::default(),
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
            drain_timeout_secs: DEFAULT_DRAIN_TIMEOUT_SECS,
        }
    }
}

impl ServiceConfig {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&content)
    }

    pub fn from_json(content: &str) -> Result<Self, ConfigError> {
        let config: ServiceConfig = serde_json::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Checks that apply to the whole service. Port ranges and TLS material
    /// are checked per listener so one bad listener cannot stop the rest.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.host.trim().is_empty() {
            return Err(ConfigError::Invalid("Host cannot be empty".to_string()));
        }
        if self.max_message_size == 0 {
            return Err(ConfigError::Invalid(
                "MaxMessageSize must be greater than 0".to_string(),
            ));
        }
        self.format_variant()?;
        Ok(())
    }

    pub fn format_variant(&self) -> Result<FormatVariant, ConfigError> {
        Ok(self.format.parse()?)
    }

    /// One listener config per configured port, in TCP, UDP, TLS order.
    pub fn listener_configs(&self, format: &SyslogFormat) -> Vec<ListenerConfig> {
        [
            (Transport::Tcp, self.tcp_port),
            (Transport::Udp, self.udp_port),
            (Transport::Tls, self.tls_port),
        ]
        .into_iter()
        .filter_map(|(transport, port)| {
            let port = port?;
            let mut config = ListenerConfig::new(transport, self.host.clone(), port, format.clone())
                .with_fallback_peer(self.peer_name.clone())
                .with_max_message_size(self.max_message_size);
            config.cert_path = self.cert_path.clone();
            config.key_path = self.key_path.clone();
            Some(config)
        })
        .collect()
    }

    pub fn pipeline(&self) -> IngestionPipeline {
        IngestionPipeline::new(self.queue_capacity, self.overflow_policy)
    }

    pub fn drain_timeout(&self) -> Duration {
        Duration::from_secs(self.drain_timeout_secs)
    }
}

impl fmt::Display for ServiceConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let port = |p: Option<i64>| p.map_or_else(|| "-".to_string(), |p| p.to_string());
        write!(
            f,
            "host={} format={} tcp={} udp={} tls={} peer={} log_dir={} queue={}/{}",
            self.host,
            self.format,
            port(self.tcp_port),
            port(self.udp_port),
            port(self.tls_port),
            self.peer_name,
            self.log_dir.display(),
            self.queue_capacity,
            self.overflow_policy,
        )
    }
}

/// Ports may be written as JSON numbers or numeric strings. An empty string
/// or null leaves the listener unconfigured.
mod port_value {
    use serde::de::Error;
    use serde::{Deserialize, Deserializer};

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum PortValue {
        Number(i64),
        Text(String),
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
    where
        D: Deserializer<'de>,
    {
        match Option::<PortValue>::deserialize(deserializer)? {
            None => Ok(None),
            Some(PortValue::Number(port)) => Ok(Some(port)),
            Some(PortValue::Text(text)) if text.trim().is_empty() => Ok(None),
            Some(PortValue::Text(text)) => text
                .trim()
                .parse()
                .map(Some)
                .map_err(|_| D::Error::custom(format!("port must be numeric, got '{text}'"))),
        }
    }
}

mod optional_path {
    use serde::{Deserialize, Deserializer};
    use std::path::PathBuf;

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<PathBuf>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = Option::<String>::deserialize(deserializer)?;
        Ok(value
            .filter(|path| !path.trim().is_empty())
            .map(PathBuf::from))
    }
}
