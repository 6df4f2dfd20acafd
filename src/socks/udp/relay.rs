//! UDP ASSOCIATE relay
//!
//! One ephemeral UDP socket per association. Client datagrams arrive wrapped
//! in the SOCKS5 UDP header naming the true peer; the relay strips the
//! header and forwards the payload from the same socket. Peer replies are
//! re-wrapped with the peer as source address and sent back to the client
//! endpoint that first produced a valid datagram. The association lives
//! exactly as long as its controlling TCP connection.

use crate::error::SocksError;
use crate::socks::consts::*;
use crate::socks::types::TargetAddr;
use crate::socks::udp::packet::{encode_udp_packet, parse_udp_packet, UdpPacket};
use crate::socks::v5::build_reply;
use anyhow::{Context, Result};
use bytes::Bytes;
use std::collections::{HashMap, HashSet};
use std::net::{IpAddr, SocketAddr};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite};
use tokio::net::UdpSocket;
use tracing::{debug, info, warn};

/// Handle the UDP ASSOCIATE command on an authenticated control connection.
///
/// Binds the ephemeral socket on `local_ip` (the server side of the control
/// connection), reports it in the success reply, then relays datagrams until
/// the control connection closes. The control channel, not UDP activity,
/// governs teardown: dropping out of this function releases the socket and
/// every piece of peer state.
pub async fn handle_udp_associate<S>(
    mut control: S,
    client_addr: SocketAddr,
    local_ip: IpAddr,
) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    let socket = match UdpSocket::bind((local_ip, 0)).await {
        Ok(socket) => socket,
        Err(e) => {
            let _ = build_reply(&mut control, SOCKS5_REPLY_GENERAL_FAILURE, None).await;
            return Err(e).context("failed to bind udp relay socket");
        }
    };
    let bound_addr = socket
        .local_addr()
        .context("failed to read udp relay socket address")?;

    build_reply(&mut control, SOCKS5_REPLY_SUCCEEDED, Some(bound_addr)).await?;

    info!(
        "udp associate session for client {} bound on {}",
        client_addr, bound_addr
    );

    let mut relay = UdpRelay::new(socket, client_addr.ip());

    tokio::select! {
        _ = drain_control(&mut control) => {
            debug!("control connection closed, terminating udp association");
        }
        result = relay.run() => {
            result.context("udp relay failed")?;
        }
    }

    info!("udp associate session for client {} closed", client_addr);
    Ok(())
}

/// Drain the control connection until it closes or errors.
///
/// Nothing meaningful arrives on the control channel after the reply; it is
/// read only so EOF is observed promptly.
async fn drain_control<S>(control: &mut S)
where
    S: AsyncRead + Unpin,
{
    let mut buf = [0u8; 1024];
    loop {
        match control.read(&mut buf).await {
            Ok(0) | Err(_) => break,
            Ok(_) => continue,
        }
    }
}

/// Per-association relay state
struct UdpRelay {
    socket: UdpSocket,
    /// IP the controlling client connected from; only this IP may bind the
    /// reply channel
    client_ip: IpAddr,
    /// Client endpoint that first sent a valid datagram; all peer replies go
    /// here and nowhere else
    bound_client: Option<SocketAddr>,
    /// Remote peers we have forwarded to on behalf of the client
    peers: HashSet<SocketAddr>,
    /// Domain targets resolved once per association
    resolve_cache: HashMap<(String, u16), SocketAddr>,
}

impl UdpRelay {
    fn new(socket: UdpSocket, client_ip: IpAddr) -> Self {
        UdpRelay {
            socket,
            client_ip,
            bound_client: None,
            peers: HashSet::new(),
            resolve_cache: HashMap::new(),
        }
    }

    /// Receive and dispatch datagrams until the socket fails.
    ///
    /// Individual bad datagrams are dropped, never fatal.
    async fn run(&mut self) -> Result<(), SocksError> {
        let mut buf = vec![0u8; MAX_UDP_PACKET];
        loop {
            let (len, src) = self.socket.recv_from(&mut buf).await?;
            self.dispatch(&buf[..len], src).await;
        }
    }

    async fn dispatch(&mut self, datagram: &[u8], src: SocketAddr) {
        match self.bound_client {
            Some(client) if src == client => {
                self.forward_to_peer(datagram).await;
            }
            Some(_) if self.peers.contains(&src) => {
                self.forward_to_client(datagram, src).await;
            }
            Some(_) => {
                debug!("udp datagram from unrelated source {} dropped", src);
            }
            None => {
                // The first valid datagram from the control connection's IP
                // binds the reply channel
                if src.ip() != self.client_ip {
                    info!(
                        "udp datagram from {} dropped: client ip address not allowed",
                        src
                    );
                    return;
                }
                if parse_udp_packet(datagram).is_err() {
                    debug!("invalid udp datagram from unbound client {} dropped", src);
                    return;
                }
                debug!("udp session for client {} opened", src);
                self.bound_client = Some(src);
                self.forward_to_peer(datagram).await;
            }
        }
    }

    /// Client-to-peer leg: strip the header and send the raw payload
    async fn forward_to_peer(&mut self, datagram: &[u8]) {
        let packet = match parse_udp_packet(datagram) {
            Ok(packet) => packet,
            Err(e) => {
                debug!("invalid udp datagram from client dropped: {}", e);
                return;
            }
        };

        if packet.is_fragmented() {
            debug!("fragmented udp datagram dropped: fragmentation not supported");
            return;
        }

        let peer = match self.resolve_target(&packet.addr).await {
            Ok(peer) => peer,
            Err(e) => {
                warn!("failed to resolve udp target {}: {}", packet.addr, e);
                return;
            }
        };

        if let Err(e) = self.socket.send_to(&packet.data, peer).await {
            warn!("udp send to {} failed: {}", peer, e);
            return;
        }
        self.peers.insert(peer);
    }

    /// Peer-to-client leg: wrap the payload with the peer as source address
    async fn forward_to_client(&mut self, payload: &[u8], peer: SocketAddr) {
        let client = match self.bound_client {
            Some(client) => client,
            None => return,
        };

        let packet = UdpPacket::new(TargetAddr::from(peer), Bytes::copy_from_slice(payload));
        if let Err(e) = self
            .socket
            .send_to(&encode_udp_packet(&packet), client)
            .await
        {
            warn!("udp send to client {} failed: {}", client, e);
        }
    }

    async fn resolve_target(&mut self, target: &TargetAddr) -> Result<SocketAddr, SocksError> {
        match target {
            TargetAddr::Ip(addr) => Ok(*addr),
            TargetAddr::Domain(domain, port) => {
                let key = (domain.clone(), *port);
                if let Some(addr) = self.resolve_cache.get(&key) {
                    return Ok(*addr);
                }
                let addr = target.resolve().await?;
                self.resolve_cache.insert(key, addr);
                Ok(addr)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    async fn spawn_udp_echo() -> SocketAddr {
        let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let addr = socket.local_addr().unwrap();
        tokio::spawn(async move {
            let mut buf = [0u8; MAX_UDP_PACKET];
            while let Ok((len, from)) = socket.recv_from(&mut buf).await {
                let _ = socket.send_to(&buf[..len], from).await;
            }
        });
        addr
    }

    async fn spawn_relay() -> SocketAddr {
        let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let addr = socket.local_addr().unwrap();
        let mut relay = UdpRelay::new(socket, "127.0.0.1".parse().unwrap());
        tokio::spawn(async move { relay.run().await });
        addr
    }

    #[tokio::test]
    async fn test_udp_roundtrip_through_relay() {
        let echo_addr = spawn_udp_echo().await;
        let relay_addr = spawn_relay().await;

        let client = UdpSocket::bind("127.0.0.1:0").await.unwrap();

        let request = UdpPacket::new(TargetAddr::from(echo_addr), Bytes::from_static(b"ping"));
        client
            .send_to(&encode_udp_packet(&request), relay_addr)
            .await
            .unwrap();

        let mut buf = [0u8; MAX_UDP_PACKET];
        let (len, from) = tokio::time::timeout(Duration::from_secs(2), client.recv_from(&mut buf))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(from, relay_addr);

        let reply = parse_udp_packet(&buf[..len]).unwrap();
        assert_eq!(reply.addr, TargetAddr::from(echo_addr));
        assert_eq!(reply.data, Bytes::from_static(b"ping"));
    }

    #[tokio::test]
    async fn test_fragmented_datagram_dropped() {
        let echo_addr = spawn_udp_echo().await;
        let relay_addr = spawn_relay().await;

        let client = UdpSocket::bind("127.0.0.1:0").await.unwrap();

        // Valid datagram first so the client binds the reply channel
        let request = UdpPacket::new(TargetAddr::from(echo_addr), Bytes::from_static(b"one"));
        client
            .send_to(&encode_udp_packet(&request), relay_addr)
            .await
            .unwrap();

        let mut buf = [0u8; MAX_UDP_PACKET];
        client.recv_from(&mut buf).await.unwrap();

        // A fragmented one must vanish without a reply
        let mut fragged = encode_udp_packet(&UdpPacket::new(
            TargetAddr::from(echo_addr),
            Bytes::from_static(b"two"),
        ));
        fragged[2] = 1;
        client.send_to(&fragged, relay_addr).await.unwrap();

        let result =
            tokio::time::timeout(Duration::from_millis(200), client.recv_from(&mut buf)).await;
        assert!(result.is_err(), "fragmented datagram was relayed");
    }

    #[tokio::test]
    async fn test_unrelated_source_cannot_reach_client() {
        let echo_addr = spawn_udp_echo().await;
        let relay_addr = spawn_relay().await;

        let client = UdpSocket::bind("127.0.0.1:0").await.unwrap();

        let request = UdpPacket::new(TargetAddr::from(echo_addr), Bytes::from_static(b"hello"));
        client
            .send_to(&encode_udp_packet(&request), relay_addr)
            .await
            .unwrap();

        let mut buf = [0u8; MAX_UDP_PACKET];
        client.recv_from(&mut buf).await.unwrap();

        // A third party that never saw traffic from the relay sends raw junk;
        // it is neither the bound client nor a known peer
        let spoofer = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        spoofer.send_to(b"junk", relay_addr).await.unwrap();

        let result =
            tokio::time::timeout(Duration::from_millis(200), client.recv_from(&mut buf)).await;
        assert!(result.is_err(), "spoofed datagram reached the client");
    }

    #[tokio::test]
    async fn test_association_ends_with_control_connection() {
        let (mut client_side, server_side) = tokio::io::duplex(256);
        let client_addr: SocketAddr = "127.0.0.1:45000".parse().unwrap();

        let handle = tokio::spawn(async move {
            handle_udp_associate(server_side, client_addr, "127.0.0.1".parse().unwrap()).await
        });

        // Success reply announcing the bound socket
        let mut reply = [0u8; 10];
        tokio::io::AsyncReadExt::read_exact(&mut client_side, &mut reply)
            .await
            .unwrap();
        assert_eq!(reply[1], SOCKS5_REPLY_SUCCEEDED);

        // Closing the control connection tears the association down
        drop(client_side);
        let result = tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("association did not end with its control connection");
        assert!(result.unwrap().is_ok());
    }
}
