use std::time::Instant;

use discv5::Enr;
use libp2p::{Multiaddr, PeerId};
use serde::Serialize;

use crate::req_resp::messages::{meta_data::MetaData, status::Status};

/// Lifecycle of the transport connection to a peer. The store records
/// transitions without judging them; connection policy lives in the
/// handshake coordinator.
#[derive(Debug, Serialize, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Disconnecting,
}

/// Which side dialed on the most recent connection.
#[derive(Debug, Serialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Inbound,
    Outbound,
    Unknown,
}

/// Everything this node remembers about one peer.
///
/// `chain_state` is populated exactly while a completed status handshake is
/// live on the current connection. `bad_responses` only ever grows, and
/// crossing the configured threshold bans the peer for the rest of the
/// process.
#[derive(Clone, Debug)]
pub struct CachedPeer {
    pub peer_id: PeerId,

    pub state: ConnectionState,

    pub direction: Direction,

    /// Multiaddress the peer was last reached at, when one is known
    pub last_seen_p2p_address: Option<Multiaddr>,

    /// Node record discovery handed us for this peer, if any
    pub enr: Option<Enr>,

    /// Status from the peer's last completed handshake
    pub chain_state: Option<Status>,

    /// Subnet metadata the peer last served, refreshed via ping
    pub meta_data: Option<MetaData>,

    /// Malformed or failed exchanges attributed to this peer
    pub bad_responses: u32,

    /// When the peer last sent us anything
    pub last_seen: Instant,
}

impl CachedPeer {
    pub fn new(
        peer_id: PeerId,
        address: Option<Multiaddr>,
        state: ConnectionState,
        direction: Direction,
        enr: Option<Enr>,
    ) -> Self {
        CachedPeer {
            peer_id,
            state,
            direction,
            last_seen_p2p_address: address,
            enr,
            chain_state: None,
            meta_data: None,
            bad_responses: 0,
            last_seen: Instant::now(),
        }
    }

    pub fn update_last_seen(&mut self) {
        self.last_seen = Instant::now();
    }
}
