//! LAN server discovery: broadcast pings, collect pongs, age entries out.
//!
//! The cadence self-throttles: the more other clients we overhear searching,
//! the less often we broadcast ourselves, so a room full of copies of the
//! game does not flood the subnet. The pure bookkeeping lives in
//! [`ScannerCore`] (driven by millisecond timestamps, easy to test); the
//! socket wrapper feeds it.

use knights_protocol::discovery::{
    self, BROADCAST_PORT, ServerInfo, broadcast_interval_ms, entry_timeout_ms,
};
use std::io;
use std::net::{Ipv4Addr, SocketAddr, UdpSocket};
use std::time::Instant;

/// How long an overheard ping keeps counting towards the peer estimate.
const PEER_WINDOW_MS: u64 = 30_000;

/// One discovered server.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ServerEntry {
    pub addr: SocketAddr,
    pub info: ServerInfo,
    last_seen_ms: u64,
}

/// The socket-free discovery state machine.
#[derive(Default)]
pub struct ScannerCore {
    entries: Vec<ServerEntry>,
    peer_pings: Vec<(u64, SocketAddr)>,
    last_broadcast_ms: Option<u64>,
}

impl ScannerCore {
    /// The number of searching clients we believe are around, ourselves
    /// included.
    pub fn num_clients(&self, now_ms: u64) -> u32 {
        let mut addrs: Vec<SocketAddr> = self
            .peer_pings
            .iter()
            .filter(|(t, _)| now_ms.saturating_sub(*t) < PEER_WINDOW_MS)
            .map(|(_, addr)| *addr)
            .collect();
        addrs.sort();
        addrs.dedup();
        addrs.len() as u32 + 1
    }

    /// Whether it is time for the next broadcast. The first one goes out
    /// immediately.
    pub fn should_broadcast(&self, now_ms: u64) -> bool {
        match self.last_broadcast_ms {
            None => true,
            Some(last) => {
                now_ms.saturating_sub(last) > u64::from(broadcast_interval_ms(self.num_clients(now_ms)))
            }
        }
    }

    pub fn note_broadcast(&mut self, now_ms: u64) {
        self.last_broadcast_ms = Some(now_ms);
    }

    /// Feeds one received datagram: pongs refresh the server list, pings
    /// from other clients feed the throttle estimate. Garbage is dropped.
    pub fn handle_datagram(&mut self, now_ms: u64, from: SocketAddr, data: &[u8]) {
        if let Some(info) = discovery::parse_pong(data) {
            match self.entries.iter_mut().find(|e| e.addr == from) {
                Some(entry) => {
                    entry.info = info;
                    entry.last_seen_ms = now_ms;
                }
                None => self.entries.push(ServerEntry {
                    addr: from,
                    info,
                    last_seen_ms: now_ms,
                }),
            }
        } else if discovery::is_ping(data) {
            self.peer_pings.push((now_ms, from));
        }
    }

    /// Ages out stale server entries and forgotten peers.
    pub fn prune(&mut self, now_ms: u64) {
        let timeout = u64::from(entry_timeout_ms(self.num_clients(now_ms)));
        self.entries
            .retain(|e| now_ms.saturating_sub(e.last_seen_ms) <= timeout);
        self.peer_pings
            .retain(|(t, _)| now_ms.saturating_sub(*t) < PEER_WINDOW_MS);
    }

    pub fn entries(&self) -> &[ServerEntry] {
        &self.entries
    }
}

/// The live scanner, driving a non-blocking UDP socket.
pub struct ServerScanner {
    socket: UdpSocket,
    core: ScannerCore,
    started: Instant,
}

impl ServerScanner {
    pub fn new() -> io::Result<ServerScanner> {
        let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0))?;
        socket.set_nonblocking(true)?;
        socket.set_broadcast(true)?;
        Ok(ServerScanner {
            socket,
            core: ScannerCore::default(),
            started: Instant::now(),
        })
    }

    fn now_ms(&self) -> u64 {
        self.started.elapsed().as_millis() as u64
    }

    /// One heartbeat: maybe broadcast, drain the socket, age out entries.
    pub fn poll(&mut self) {
        let now = self.now_ms();
        if self.core.should_broadcast(now) {
            self.core.note_broadcast(now);
            let ping = discovery::encode_ping();
            // A failed broadcast is ignored; we try again next time.
            let _ = self
                .socket
                .send_to(&ping, (Ipv4Addr::BROADCAST, BROADCAST_PORT));
        }

        let mut buf = [0u8; 512];
        loop {
            match self.socket.recv_from(&mut buf) {
                Ok((len, from)) => self.core.handle_datagram(now, from, &buf[..len]),
                Err(err) if err.kind() == io::ErrorKind::WouldBlock => break,
                Err(err) => {
                    tracing::warn!(?err, "discovery receive failed");
                    break;
                }
            }
        }

        self.core.prune(now);
    }

    pub fn entries(&self) -> &[ServerEntry] {
        self.core.entries()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(last: u8) -> SocketAddr {
        SocketAddr::from(([192, 168, 0, last], BROADCAST_PORT))
    }

    fn pong(players: u16) -> Vec<u8> {
        discovery::encode_pong(&ServerInfo {
            num_players: players,
            host_name: "tower".into(),
            quest_key: "quest_gems".into(),
        })
    }

    #[test]
    fn lone_client_ages_servers_out_after_ten_seconds() {
        let mut core = ScannerCore::default();
        assert!(core.should_broadcast(0));
        core.note_broadcast(0);
        core.handle_datagram(10, addr(7), &pong(2));
        assert_eq!(core.entries().len(), 1);

        // Just inside the window the entry survives...
        core.prune(10_000);
        assert_eq!(core.entries().len(), 1);
        // ...thirty seconds with no pong and it is gone.
        core.prune(30_000);
        assert!(core.entries().is_empty());
    }

    #[test]
    fn fresh_pongs_keep_an_entry_alive() {
        let mut core = ScannerCore::default();
        core.handle_datagram(0, addr(7), &pong(2));
        core.handle_datagram(9_000, addr(7), &pong(3));
        core.prune(18_000);
        assert_eq!(core.entries().len(), 1);
        assert_eq!(core.entries()[0].info.num_players, 3);
    }

    #[test]
    fn overheard_peers_slow_the_cadence() {
        let mut core = ScannerCore::default();
        core.note_broadcast(0);
        // Alone: next broadcast after 3 s.
        assert!(!core.should_broadcast(2_000));
        assert!(core.should_broadcast(3_500));

        // Two other clients about: the interval is 3 s per client.
        core.handle_datagram(100, addr(10), &discovery::encode_ping());
        core.handle_datagram(200, addr(11), &discovery::encode_ping());
        assert_eq!(core.num_clients(1_000), 3);
        assert!(!core.should_broadcast(3_500));
        assert!(core.should_broadcast(9_500));
    }

    #[test]
    fn garbage_datagrams_are_ignored() {
        let mut core = ScannerCore::default();
        core.handle_datagram(0, addr(9), b"not a knights packet");
        assert!(core.entries().is_empty());
        assert_eq!(core.num_clients(0), 1);
    }
}
