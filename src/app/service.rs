//! Service lifecycle: `Idle -> Listening -> Draining -> Stopped`.

use super::config::{ConfigError, ServiceConfig};
use crate::listener::{BoundListener, ListenerFailure, ListenerManager, Transport};
use crate::parser::FormatRegistry;
use crate::peer::{CommonNameResolver, PeerIdentityResolver};
use crate::pipeline::{PipelineSender, PipelineStats};
use crate::sink::{PersistenceError, PersistenceSink, SessionLogFile, SinkReport};
use chrono::Local;
use std::future::Future;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("persistence error: {0}")]
    Persistence(#[from] PersistenceError),

    #[error("no listener could be started ({failures} failed to start)")]
    NoActiveListeners { failures: usize },

    #[error("service already started")]
    AlreadyStarted,

    #[error("persistence sink task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceState {
    Idle,
    Listening,
    Draining,
    Stopped,
}

#[derive(Debug, Clone)]
pub struct ServiceSummary {
    pub log_path: PathBuf,
    pub entries_written: u64,
    pub pipeline: PipelineStats,
    pub listener_failures: usize,
}

pub struct ServiceManager {
    config: ServiceConfig,
    registry: FormatRegistry,
    resolver: Arc<dyn PeerIdentityResolver>,
    state: Arc<watch::Sender<ServiceState>>,
    started: bool,
}

impl ServiceManager {
    pub fn new(config: ServiceConfig) -> Result<Self, ServiceError> {
        config.validate()?;
        let (state, _) = watch::channel(ServiceState::Idle);
        Ok(Self {
            config,
            registry: FormatRegistry::standard(),
            resolver: Arc::new(CommonNameResolver::new()),
            state: Arc::new(state),
            started: false,
        })
    }

    pub fn with_resolver(mut self, resolver: Arc<dyn PeerIdentityResolver>) -> Self {
        self.resolver = resolver;
        self
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    pub fn state(&self) -> watch::Receiver<ServiceState> {
        self.state.subscribe()
    }

    /// Open the session log, start the sink, then boot every listener.
    ///
    /// Listener failures are collected, not fatal; the service only refuses
    /// to run when none of them started.
    pub async fn start(&mut self) -> Result<RunningService, ServiceError> {
        if self.started {
            return Err(ServiceError::AlreadyStarted);
        }
        self.started = true;

        let format = self
            .registry
            .resolve(&self.config.format)
            .map_err(ConfigError::from)?;
        let file = SessionLogFile::create(&self.config.log_dir, Local::now()).await?;
        info!(path = %file.path().display(), "Session log opened");

        let (sender, receiver) = self.config.pipeline().open();
        let sink = tokio::spawn(PersistenceSink::new(file).run(receiver));

        let listeners = ListenerManager::new(Arc::clone(&self.resolver), CancellationToken::new());
        let report = listeners
            .start(&self.config.listener_configs(&format), &sender)
            .await;

        let running = RunningService {
            listeners,
            sender,
            sink,
            sink_finished: false,
            bound: report.bound,
            failures: report.failures,
            state: Arc::clone(&self.state),
            drain_timeout: self.config.drain_timeout(),
        };

        if running.bound.is_empty() {
            let failures = running.failures.len();
            error!(failures, "No listener could be started");
            // Still drain so the session file is closed cleanly.
            running.stop().await?;
            return Err(ServiceError::NoActiveListeners { failures });
        }

        self.state.send_replace(ServiceState::Listening);
        info!(
            listeners = running.bound.len(),
            failed = running.failures.len(),
            config = %self.config,
            "Service listening"
        );
        Ok(running)
    }

    /// Start, run until `signal` resolves, then drain and stop.
    pub async fn run_until<F>(mut self, signal: F) -> Result<ServiceSummary, ServiceError>
    where
        F: Future<Output = ()>,
    {
        self.start().await?.run_until(signal).await
    }
}

/// A started service. Dropping it without [`run_until`](Self::run_until)
/// still cancels the listeners and closes the pipeline, so the sink task
/// drains and releases the session file.
pub struct RunningService {
    listeners: ListenerManager,
    sender: PipelineSender,
    sink: JoinHandle<Result<SinkReport, PersistenceError>>,
    sink_finished: bool,
    bound: Vec<BoundListener>,
    failures: Vec<ListenerFailure>,
    state: Arc<watch::Sender<ServiceState>>,
    drain_timeout: Duration,
}

impl RunningService {
    pub fn bound(&self) -> &[BoundListener] {
        &self.bound
    }

    pub fn failures(&self) -> &[ListenerFailure] {
        &self.failures
    }

    pub fn local_addr(&self, transport: Transport) -> Option<SocketAddr> {
        self.bound
            .iter()
            .find(|listener| listener.transport == transport)
            .map(|listener| listener.local_addr)
    }

    pub fn state(&self) -> watch::Receiver<ServiceState> {
        self.state.subscribe()
    }

    pub fn pipeline_stats(&self) -> PipelineStats {
        self.sender.stats()
    }

    /// Run until `signal` resolves or the sink fails, then drain and stop.
    pub async fn run_until<F>(mut self, signal: F) -> Result<ServiceSummary, ServiceError>
    where
        F: Future<Output = ()>,
    {
        let early = tokio::select! {
            () = signal => None,
            result = &mut self.sink => Some(result),
        };

        let Some(result) = early else {
            info!("Stop requested");
            let report = self.drain().await?;
            return Ok(self.summary(report));
        };

        // The sink only ends on its own after a write failure.
        self.sink_finished = true;
        self.state.send_replace(ServiceState::Draining);
        self.listeners.shutdown();
        self.sender.close();
        self.state.send_replace(ServiceState::Stopped);
        let report = result??;
        warn!(
            entries_written = report.entries_written,
            "Persistence sink stopped before a stop was requested"
        );
        Ok(self.summary(report))
    }

    /// Drain and stop without waiting for a signal.
    pub async fn stop(mut self) -> Result<ServiceSummary, ServiceError> {
        let report = self.drain().await?;
        Ok(self.summary(report))
    }

    /// Stop accepting, let open connections finish their current frame,
    /// close the pipeline, then wait for the sink to write what is queued.
    async fn drain(&mut self) -> Result<SinkReport, ServiceError> {
        self.state.send_replace(ServiceState::Draining);
        info!("Draining listeners");
        self.listeners.shutdown();
        if tokio::time::timeout(self.drain_timeout, self.listeners.wait())
            .await
            .is_err()
        {
            warn!(
                remaining = self.listeners.active_tasks(),
                timeout_secs = self.drain_timeout.as_secs(),
                "Drain timeout exceeded, closing pipeline with connections still open"
            );
        }

        self.sender.close();
        let result = (&mut self.sink).await;
        self.sink_finished = true;
        self.state.send_replace(ServiceState::Stopped);

        let report = result??;
        info!(
            entries_written = report.entries_written,
            path = %report.path.display(),
            "Service stopped"
        );
        Ok(report)
    }

    fn summary(&self, report: SinkReport) -> ServiceSummary {
        ServiceSummary {
            log_path: report.path,
            entries_written: report.entries_written,
            pipeline: self.sender.stats(),
            listener_failures: self.failures.len(),
        }
    }
}

impl Drop for RunningService {
    fn drop(&mut self) {
        if !self.sink_finished {
            self.listeners.shutdown();
            self.sender.close();
        }
    }
}
