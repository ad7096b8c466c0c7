//! The UDP broadcast protocol used for LAN game discovery.
//!
//! Clients broadcast a ping; every server on the subnet answers with a pong
//! carrying its player count, host name and current quest. Both directions are
//! tiny fixed-header datagrams, deliberately independent of the main stream
//! protocol so that old and new versions ignore each other cleanly.

use crate::DISCOVERY_VERSION;

/// The well-known UDP port for discovery traffic.
pub const BROADCAST_PORT: u16 = 16398;

const MAGIC: &[u8; 3] = b"KTS";
const PING_BYTE: u8 = 0x02;
const PONG_BYTE: u8 = 0x03;
/// Server type marker: a LAN game host.
const SERVER_TYPE_LAN: u8 = b'L';

/// A parsed discovery pong.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ServerInfo {
    pub num_players: u16,
    pub host_name: String,
    pub quest_key: String,
}

/// Builds the broadcast ping for our protocol version.
pub fn encode_ping() -> Vec<u8> {
    let mut msg = Vec::with_capacity(5);
    msg.extend_from_slice(MAGIC);
    msg.push(DISCOVERY_VERSION);
    msg.push(PING_BYTE);
    msg
}

/// Checks whether a datagram is a ping from a same-version client.
/// Pings from other versions are silently ignored.
pub fn is_ping(msg: &[u8]) -> bool {
    msg.len() == 5 && &msg[..3] == MAGIC && msg[3] == DISCOVERY_VERSION && msg[4] == PING_BYTE
}

/// Builds the pong a server answers a matching ping with.
pub fn encode_pong(info: &ServerInfo) -> Vec<u8> {
    let mut msg = Vec::with_capacity(8 + info.host_name.len() + info.quest_key.len());
    msg.extend_from_slice(MAGIC);
    msg.push(DISCOVERY_VERSION);
    msg.push(PONG_BYTE);
    msg.push(SERVER_TYPE_LAN);
    // Player count is the one big-endian field, kept that way for
    // compatibility with the historical datagram layout.
    msg.extend_from_slice(&info.num_players.to_be_bytes());
    msg.extend_from_slice(info.host_name.as_bytes());
    msg.push(0);
    msg.extend_from_slice(info.quest_key.as_bytes());
    msg.push(0);
    msg
}

/// Parses a pong datagram. Returns `None` for anything that is not a
/// well-formed same-version pong (garbage on the broadcast port is normal).
pub fn parse_pong(msg: &[u8]) -> Option<ServerInfo> {
    if msg.len() < 8 || &msg[..3] != MAGIC || msg[3] != DISCOVERY_VERSION || msg[4] != PONG_BYTE {
        return None;
    }
    if msg[5] != SERVER_TYPE_LAN {
        return None;
    }
    let num_players = u16::from_be_bytes([msg[6], msg[7]]);

    let rest = &msg[8..];
    let mut parts = rest.split(|&b| b == 0);
    let host_name = String::from_utf8(parts.next()?.to_vec()).ok()?;
    let quest_key = String::from_utf8(parts.next()?.to_vec()).ok()?;

    Some(ServerInfo {
        num_players,
        host_name,
        quest_key,
    })
}

/// How often a client should broadcast a ping, given how many other clients
/// it has recently overheard. Scaling by the peer count keeps the subnet from
/// being flooded when many copies of the game are searching at once.
pub fn broadcast_interval_ms(num_clients: u32) -> u32 {
    3000 * num_clients.max(1)
}

/// How long a discovered server entry stays visible without a fresh pong.
/// With `n` clients each broadcasting every interval, a server is expected to
/// answer roughly every `interval / n` milliseconds; three missed answers
/// plus a second of slack means the entry is gone.
pub fn entry_timeout_ms(num_clients: u32) -> u32 {
    let n = num_clients.max(1);
    3 * broadcast_interval_ms(n) / n + 1000
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ping_pong_round_trip() {
        assert!(is_ping(&encode_ping()));

        let info = ServerInfo {
            num_players: 3,
            host_name: "tower.local".into(),
            quest_key: "quest_gems".into(),
        };
        assert_eq!(parse_pong(&encode_pong(&info)), Some(info));
    }

    #[test]
    fn other_versions_are_ignored() {
        let mut ping = encode_ping();
        ping[3] = ping[3].wrapping_add(1);
        assert!(!is_ping(&ping));

        let mut pong = encode_pong(&ServerInfo {
            num_players: 1,
            host_name: "h".into(),
            quest_key: "q".into(),
        });
        pong[3] = pong[3].wrapping_add(1);
        assert_eq!(parse_pong(&pong), None);
    }

    #[test]
    fn garbage_is_ignored() {
        assert!(!is_ping(b"hello"));
        assert_eq!(parse_pong(b""), None);
        assert_eq!(parse_pong(b"KTS"), None);
    }

    #[test]
    fn single_peer_timeout_matches_cadence() {
        // One peer: broadcast every 3 s, entries live 10 s.
        assert_eq!(broadcast_interval_ms(1), 3000);
        assert_eq!(entry_timeout_ms(1), 10_000);
        // More peers: slower broadcasts, same effective server cadence.
        assert_eq!(broadcast_interval_ms(4), 12_000);
        assert_eq!(entry_timeout_ms(4), 10_000);
    }
}
