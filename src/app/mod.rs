pub mod config;
pub mod logging_system;
pub mod service;
pub mod shutdown;

pub use config::{Cli, ConfigError, LogFormat, LogLevel, ServiceConfig};
pub use logging_system::setup_logging;
pub use service::{RunningService, ServiceError, ServiceManager, ServiceState, ServiceSummary};
pub use shutdown::shutdown_signal;

use anyhow::Context;
use clap::Parser;
use std::future::Future;
use std::process;
use tracing::{error, info};

pub struct App {
    service_manager: ServiceManager,
}

impl App {
    pub fn from_args<I, T>(args: I) -> anyhow::Result<Self>
    where
        I: IntoIterator<Item = T>,
        T: Into<std::ffi::OsString> + Clone,
    {
        let cli = Cli::try_from_args(args)?;
        Self::from_cli(&cli)
    }

    pub fn from_cli(cli: &Cli) -> anyhow::Result<Self> {
        let config = ServiceConfig::from_file(&cli.config)
            .with_context(|| format!("loading {}", cli.config.display()))?;
        Self::from_config(config)
    }

    pub fn from_config(config: ServiceConfig) -> anyhow::Result<Self> {
        info!(config = %config, "Configuration loaded");
        let service_manager = ServiceManager::new(config)?;
        Ok(Self { service_manager })
    }

    pub fn config(&self) -> &ServiceConfig {
        self.service_manager.config()
    }

    /// Run until SIGINT or SIGTERM, then drain.
    pub async fn run(self) -> anyhow::Result<ServiceSummary> {
        self.run_until(shutdown_signal()).await
    }

    pub async fn run_until<F>(self, signal: F) -> anyhow::Result<ServiceSummary>
    where
        F: Future<Output = ()>,
    {
        Ok(self.service_manager.run_until(signal).await?)
    }
}

pub fn get_version() -> &'static str {
    crate::VERSION
}

pub async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    setup_logging(cli.log_level, cli.log_format);
    info!("Starting syslog-ingest v{}", get_version());

    let app = match App::from_cli(&cli) {
        Ok(app) => app,
        Err(e) => {
            error!(error = %format!("{e:#}"), "Configuration error");
            process::exit(1);
        }
    };

    match app.run().await {
        Ok(summary) => {
            info!(
                entries_written = summary.entries_written,
                dropped = summary.pipeline.dropped,
                listener_failures = summary.listener_failures,
                path = %summary.log_path.display(),
                "syslog-ingest stopped"
            );
            Ok(())
        }
        Err(e) => {
            error!(error = %format!("{e:#}"), "Service error");
            process::exit(1);
        }
    }
}
