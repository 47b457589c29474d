//! UDP discovery responder.
//!
//! Clients find the daemon by broadcasting a datagram that contains the
//! shared discovery token to the control port. The responder answers each
//! matching probe with `IP:<address>:<port>\r\n`, where `<address>` is the
//! local IPv4 address that routes back to the sender and `<port>` is the TCP
//! control port. Anything else is ignored.

use std::io;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};

use secrecy::{ExposeSecret, SecretString};
use tokio::net::UdpSocket;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::errors::TdError;
use crate::observability::metrics;

/// Largest probe the responder reads; longer datagrams are truncated.
const MAX_PROBE_SIZE: usize = 2048;

/// Answers discovery probes.
#[derive(Debug)]
pub struct DiscoveryResponder {
    socket: UdpSocket,
    local_addr: SocketAddr,
    token: SecretString,
    control_port: u16,
}

impl DiscoveryResponder {
    /// Binds the discovery socket with broadcast enabled.
    ///
    /// # Errors
    ///
    /// Returns `TdError::Bind` when the socket cannot be bound, or
    /// `TdError::Io` when broadcast cannot be enabled.
    pub async fn bind(
        address: SocketAddr,
        token: SecretString,
        control_port: u16,
    ) -> Result<Self, TdError> {
        let socket = UdpSocket::bind(address)
            .await
            .map_err(|source| TdError::Bind { address, source })?;
        socket.set_broadcast(true)?;
        let local_addr = socket.local_addr()?;

        Ok(Self {
            socket,
            local_addr,
            token,
            control_port,
        })
    }

    #[must_use]
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Answers probes until `cancel_token` is cancelled.
    #[instrument(skip_all, name = "td.discovery", fields(local_addr = %self.local_addr))]
    pub async fn run(self, cancel_token: CancellationToken) {
        info!(
            target: "td.discovery",
            local_addr = %self.local_addr,
            control_port = self.control_port,
            "Discovery responder started"
        );

        let mut buf = vec![0u8; MAX_PROBE_SIZE];
        loop {
            let received = tokio::select! {
                () = cancel_token.cancelled() => break,
                received = self.socket.recv_from(&mut buf) => received,
            };

            match received {
                Ok((len, sender)) => {
                    let payload = buf.get(..len).unwrap_or_default();
                    self.handle_probe(payload, sender).await;
                }
                Err(e) => {
                    // ICMP errors from earlier replies surface here on some
                    // platforms; they don't affect later probes.
                    debug!(
                        target: "td.discovery",
                        error = %e,
                        "Discovery receive failed"
                    );
                }
            }
        }

        info!(target: "td.discovery", "Discovery responder stopped");
    }

    async fn handle_probe(&self, payload: &[u8], sender: SocketAddr) {
        if !contains_token(payload, self.token.expose_secret()) {
            return;
        }
        if sender.ip().is_loopback() && !self.local_addr.ip().is_loopback() {
            debug!(
                target: "td.discovery",
                sender = %sender,
                "Ignoring loopback probe"
            );
            return;
        }

        let address = match self.reply_address(sender).await {
            Ok(address) => address,
            Err(e) => {
                warn!(
                    target: "td.discovery",
                    sender = %sender,
                    error = %e,
                    "Cannot determine local address for probe"
                );
                return;
            }
        };

        let reply = format_reply(address, self.control_port);
        match self.socket.send_to(reply.as_bytes(), sender).await {
            Ok(_) => {
                metrics::record_discovery_reply();
                debug!(
                    target: "td.discovery",
                    sender = %sender,
                    address = %address,
                    "Discovery probe answered"
                );
            }
            Err(e) => {
                warn!(
                    target: "td.discovery",
                    sender = %sender,
                    error = %e,
                    "Failed to send discovery reply"
                );
            }
        }
    }

    /// Local IPv4 address that routes to `sender`.
    async fn reply_address(&self, sender: SocketAddr) -> io::Result<Ipv4Addr> {
        if let IpAddr::V4(bound) = self.local_addr.ip() {
            if !bound.is_unspecified() {
                return Ok(bound);
            }
        }
        local_address_for(sender).await
    }
}

/// Whether `payload` contains `token` anywhere.
#[must_use]
pub fn contains_token(payload: &[u8], token: &str) -> bool {
    let token = token.as_bytes();
    !token.is_empty() && payload.windows(token.len()).any(|window| window == token)
}

/// Discovery reply line.
#[must_use]
pub fn format_reply(address: Ipv4Addr, port: u16) -> String {
    format!("IP:{address}:{port}\r\n")
}

/// Asks the routing table which local IPv4 address reaches `peer` by
/// connecting an unbound UDP socket. No packet is sent.
async fn local_address_for(peer: SocketAddr) -> io::Result<Ipv4Addr> {
    let probe = UdpSocket::bind(SocketAddr::from((Ipv4Addr::UNSPECIFIED, 0))).await?;
    probe.connect(peer).await?;
    match probe.local_addr()?.ip() {
        IpAddr::V4(address) => Ok(address),
        IpAddr::V6(address) => Err(io::Error::new(
            io::ErrorKind::AddrNotAvailable,
            format!("no IPv4 route to {peer}, got {address}"),
        )),
    }
}
