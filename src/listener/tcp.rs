//! Stream listeners: plain TCP and TLS over TCP.
//!
//! One accept loop per listener; each accepted connection is read on its
//! own task. TLS connections complete the handshake and resolve their peer
//! identity before the first frame is read.

use super::ingest::{ConnectionMeta, IngestContext};
use super::{HandshakeError, ListenerConfig, ListenerError, ListenerState, Transport, is_connection_error};
use crate::domain::{IngestError, PeerIdentity};
use crate::parser::{Frame, ParseError, SyslogFrameCodec};
use futures::StreamExt;
use rustls::ServerConfig;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncRead;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tokio_rustls::TlsAcceptor;
use tokio_rustls::server::TlsStream;
use tokio_util::codec::FramedRead;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

pub struct StreamListener {
    listener: TcpListener,
    local_addr: SocketAddr,
    transport: Transport,
    acceptor: Option<TlsAcceptor>,
    ctx: IngestContext,
}

impl StreamListener {
    /// Bind the listening socket. `tls` must be set for TLS listeners.
    pub async fn bind(
        config: &ListenerConfig,
        port: u16,
        tls: Option<Arc<ServerConfig>>,
        ctx: IngestContext,
    ) -> Result<Self, ListenerError> {
        let address = config.bind_address();
        let listener = TcpListener::bind((config.bind_host.as_str(), port))
            .await
            .map_err(|source| ListenerError::Bind { address, source })?;
        let local_addr = listener.local_addr()?;

        Ok(Self {
            listener,
            local_addr,
            transport: config.transport,
            acceptor: tls.map(TlsAcceptor::from),
            ctx,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub async fn run(self, cancel: CancellationToken, tracker: TaskTracker, state: watch::Sender<ListenerState>) {
        let Self {
            listener,
            local_addr,
            transport,
            acceptor,
            ctx,
        } = self;
        state.send_replace(ListenerState::Accepting);
        info!(transport = %transport, address = %local_addr, "Listener accepting connections");

        loop {
            tokio::select! {
                () = cancel.cancelled() => break,
                accepted = listener.accept() => match accepted {
                    Ok((stream, client)) => {
                        if let Err(e) = stream.set_nodelay(true) {
                            debug!(client = %client, error = %e, "Failed to set TCP_NODELAY");
                        }
                        debug!(transport = %transport, client = %client, "Connection accepted");
                        let connection = Connection {
                            transport,
                            client,
                            ctx: ctx.clone(),
                            cancel: cancel.clone(),
                        };
                        let acceptor = acceptor.clone();
                        tracker.spawn(connection.handle(stream, acceptor));
                    }
                    Err(e) if is_connection_error(&e) => {
                        debug!(transport = %transport, error = %e, "Connection dropped before accept");
                    }
                    Err(e) => {
                        warn!(transport = %transport, error = %e, "Accept failed");
                        tokio::time::sleep(ACCEPT_BACKOFF).await;
                    }
                }
            }
        }

        drop(listener);
        state.send_replace(ListenerState::Closed);
        info!(transport = %transport, address = %local_addr, "Listener closed");
    }
}

struct Connection {
    transport: Transport,
    client: SocketAddr,
    ctx: IngestContext,
    cancel: CancellationToken,
}

impl Connection {
    async fn handle(self, stream: TcpStream, acceptor: Option<TlsAcceptor>) {
        let Some(acceptor) = acceptor else {
            let meta = self.meta(self.ctx.fallback_peer.clone());
            self.read_frames(stream, &meta).await;
            return;
        };

        let tls = tokio::select! {
            () = self.cancel.cancelled() => return,
            result = self.handshake(&acceptor, stream) => match result {
                Ok(tls) => tls,
                Err(e) => {
                    let err = IngestError::from(e);
                    warn!(
                        component = err.component(),
                        transport = %self.transport,
                        error = %err,
                        "Dropping connection"
                    );
                    return;
                }
            }
        };

        // Resolved once; every entry on this connection carries it.
        let certificates = tls.get_ref().1.peer_certificates().unwrap_or(&[]);
        let peer = self.ctx.resolver.resolve(certificates, &self.ctx.fallback_peer);
        info!(
            client = %self.client,
            peer = %peer,
            client_certificate = !certificates.is_empty(),
            "TLS peer identified"
        );
        let meta = self.meta(peer);
        self.read_frames(tls, &meta).await;
    }

    async fn handshake(&self, acceptor: &TlsAcceptor, stream: TcpStream) -> Result<TlsStream<TcpStream>, HandshakeError> {
        let client = self.client.to_string();
        match tokio::time::timeout(HANDSHAKE_TIMEOUT, acceptor.accept(stream)).await {
            Ok(Ok(tls)) => Ok(tls),
            Ok(Err(source)) => Err(HandshakeError::Failed { client, source }),
            Err(_) => Err(HandshakeError::TimedOut { client }),
        }
    }

    fn meta(&self, peer: PeerIdentity) -> ConnectionMeta {
        ConnectionMeta {
            peer,
            client: self.client.to_string(),
            transport: self.transport,
        }
    }

    /// Read frames until EOF, a read error, or cancellation.
    ///
    /// On cancellation the connection is allowed to finish the frame it is
    /// in and whatever is already buffered before it is closed.
    async fn read_frames<S>(&self, stream: S, meta: &ConnectionMeta)
    where
        S: AsyncRead + Unpin,
    {
        let codec = self.ctx.format.codec(self.ctx.max_message_size);
        let mut framed = FramedRead::new(stream, codec);
        let mut draining = false;

        loop {
            tokio::select! {
                biased;
                () = self.cancel.cancelled(), if !draining => {
                    draining = true;
                }
                frame = framed.next() => match frame {
                    Some(Ok(Frame::Message(message))) => {
                        if !self.ctx.ingest(meta, &message).await {
                            break;
                        }
                    }
                    Some(Ok(Frame::Oversized { size })) => {
                        let error = ParseError::TooLarge {
                            size,
                            limit: self.ctx.max_message_size,
                        };
                        self.ctx.reject(meta, &error);
                    }
                    Some(Ok(Frame::Malformed { size })) => {
                        let error = ParseError::Malformed(format!(
                            "invalid octet-count header, {size} bytes discarded"
                        ));
                        self.ctx.reject(meta, &error);
                    }
                    Some(Err(e)) => {
                        if !is_connection_error(&e) {
                            warn!(transport = %self.transport, client = %self.client, error = %e, "Read failed, closing connection");
                        }
                        break;
                    }
                    None => break,
                }
            }

            if draining && at_frame_boundary(&framed) {
                break;
            }
        }
        debug!(transport = %self.transport, client = %self.client, draining, "Connection closed");
    }
}

fn at_frame_boundary<S>(framed: &FramedRead<S, SyslogFrameCodec>) -> bool {
    !framed.decoder().is_mid_frame() && framed.read_buffer().is_empty()
}
