use super::ingest::IngestContext;
use super::tcp::StreamListener;
use super::tls::load_server_config;
use super::udp::DatagramListener;
use super::{ListenerConfig, ListenerError, ListenerState, Transport};
use crate::peer::PeerIdentityResolver;
use crate::pipeline::PipelineSender;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{error, info};

/// A listener that reached `Accepting`.
#[derive(Debug, Clone)]
pub struct BoundListener {
    pub transport: Transport,
    pub local_addr: SocketAddr,
    state: watch::Receiver<ListenerState>,
}

impl BoundListener {
    pub fn state(&self) -> ListenerState {
        *self.state.borrow()
    }

    /// Wait until the listener has released its socket.
    pub async fn closed(&mut self) {
        // An error means the listener task is gone, which also means closed.
        let _ = self
            .state
            .wait_for(|state| *state == ListenerState::Closed)
            .await;
    }
}

#[derive(Debug)]
pub struct ListenerFailure {
    pub transport: Transport,
    pub error: ListenerError,
}

#[derive(Debug, Default)]
pub struct StartReport {
    pub bound: Vec<BoundListener>,
    pub failures: Vec<ListenerFailure>,
}

/// Starts the configured listeners and tracks every task they spawn.
///
/// Listener and connection tasks share one [`TaskTracker`], so waiting on
/// the manager after [`shutdown`](Self::shutdown) waits for in-flight
/// connections as well as the accept loops.
pub struct ListenerManager {
    resolver: Arc<dyn PeerIdentityResolver>,
    cancel: CancellationToken,
    tracker: TaskTracker,
}

impl ListenerManager {
    pub fn new(resolver: Arc<dyn PeerIdentityResolver>, cancel: CancellationToken) -> Self {
        Self {
            resolver,
            cancel,
            tracker: TaskTracker::new(),
        }
    }

    /// Start every listener. A listener that fails is logged and reported;
    /// the rest still start.
    pub async fn start(&self, configs: &[ListenerConfig], sender: &PipelineSender) -> StartReport {
        let mut report = StartReport::default();
        for config in configs {
            match self.start_listener(config, sender.clone()).await {
                Ok(bound) => report.bound.push(bound),
                Err(e) => {
                    error!(
                        transport = %config.transport,
                        address = %config.bind_address(),
                        error = %e,
                        "Listener failed to start"
                    );
                    report.failures.push(ListenerFailure {
                        transport: config.transport,
                        error: e,
                    });
                }
            }
        }
        report
    }

    async fn start_listener(&self, config: &ListenerConfig, sender: PipelineSender) -> Result<BoundListener, ListenerError> {
        let (state_tx, state_rx) = watch::channel(ListenerState::Configured);
        let port = config.validate_port()?;
        let ctx = IngestContext {
            format: config.format.clone(),
            sender,
            resolver: Arc::clone(&self.resolver),
            fallback_peer: config.fallback_peer.clone(),
            max_message_size: config.max_message_size,
        };

        let cancel = self.cancel.child_token();
        let local_addr = match config.transport {
            Transport::Udp => {
                let listener = DatagramListener::bind(config, port, ctx).await?;
                let local_addr = listener.local_addr();
                state_tx.send_replace(ListenerState::Bound);
                self.tracker.spawn(listener.run(cancel, state_tx));
                local_addr
            }
            Transport::Tcp | Transport::Tls => {
                let tls = match config.transport {
                    Transport::Tls => Some(Self::tls_config(config).await?),
                    _ => None,
                };
                let listener = StreamListener::bind(config, port, tls, ctx).await?;
                let local_addr = listener.local_addr();
                state_tx.send_replace(ListenerState::Bound);
                self.tracker
                    .spawn(listener.run(cancel, self.tracker.clone(), state_tx));
                local_addr
            }
        };

        info!(
            transport = %config.transport,
            address = %local_addr,
            format = %config.format.variant(),
            "Listener bound"
        );
        Ok(BoundListener {
            transport: config.transport,
            local_addr,
            state: state_rx,
        })
    }

    async fn tls_config(config: &ListenerConfig) -> Result<Arc<rustls::ServerConfig>, ListenerError> {
        match (&config.cert_path, &config.key_path) {
            (Some(cert), Some(key)) => load_server_config(cert, key).await,
            _ => Err(ListenerError::CertificateLoad(
                "TLS listener requires both CertPath and KeyPath".to_string(),
            )),
        }
    }

    /// Stop accepting: accept loops exit, open connections drain.
    pub fn shutdown(&self) {
        self.cancel.cancel();
        self.tracker.close();
    }

    /// Wait for every listener and connection task to finish.
    /// Only completes after [`shutdown`](Self::shutdown).
    pub async fn wait(&self) {
        self.tracker.wait().await;
    }

    pub fn active_tasks(&self) -> usize {
        self.tracker.len()
    }
}
