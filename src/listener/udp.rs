//! UDP listener. Each datagram is one complete message; there is no
//! connection state and every entry carries the fallback peer identity.

use super::ingest::{ConnectionMeta, IngestContext};
use super::{ListenerConfig, ListenerError, ListenerState, Transport};
use crate::parser::ParseError;
use std::net::SocketAddr;
use tokio::net::UdpSocket;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

const MAX_DATAGRAM: usize = 65_536;

pub struct DatagramListener {
    socket: UdpSocket,
    local_addr: SocketAddr,
    ctx: IngestContext,
}

impl DatagramListener {
    pub async fn bind(config: &ListenerConfig, port: u16, ctx: IngestContext) -> Result<Self, ListenerError> {
        let address = config.bind_address();
        let socket = UdpSocket::bind((config.bind_host.as_str(), port))
            .await
            .map_err(|source| ListenerError::Bind { address, source })?;
        let local_addr = socket.local_addr()?;
        Ok(Self {
            socket,
            local_addr,
            ctx,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub async fn run(self, cancel: CancellationToken, state: watch::Sender<ListenerState>) {
        let limit = self.ctx.max_message_size;
        // One spare byte so a datagram over the limit is detectable.
        let mut buf = vec![0u8; (limit + 1).min(MAX_DATAGRAM)];
        state.send_replace(ListenerState::Accepting);
        info!(transport = %Transport::Udp, address = %self.local_addr, "Listener receiving datagrams");

        loop {
            tokio::select! {
                () = cancel.cancelled() => break,
                received = self.socket.recv_from(&mut buf) => match received {
                    Ok((len, client)) => {
                        let meta = ConnectionMeta {
                            peer: self.ctx.fallback_peer.clone(),
                            client: client.to_string(),
                            transport: Transport::Udp,
                        };
                        if len > limit {
                            self.ctx.reject(&meta, &ParseError::TooLarge { size: len, limit });
                            continue;
                        }
                        if !self.ctx.ingest_datagram(&meta, &buf[..len]).await {
                            break;
                        }
                    }
                    Err(e) => {
                        // ICMP errors from earlier sends surface here on some
                        // platforms; the socket itself is still usable.
                        debug!(transport = %Transport::Udp, error = %e, "Receive failed");
                    }
                }
            }
        }

        state.send_replace(ListenerState::Closed);
        info!(transport = %Transport::Udp, address = %self.local_addr, "Listener closed");
    }
}
