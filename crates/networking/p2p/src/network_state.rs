use std::{collections::HashMap, sync::Arc};

use discv5::Enr;
use libp2p::{Multiaddr, PeerId};
use parking_lot::RwLock;

use crate::{
    peer::{CachedPeer, ConnectionState, Direction},
    req_resp::messages::{
        meta_data::{AttnetsBits, MetaData},
        status::Status,
    },
};

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum PeerStoreError {
    #[error("unknown peer: {0}")]
    UnknownPeer(PeerId),
}

/// Shared view of every peer this node has heard of, plus the local metadata
/// served over the metadata protocol.
///
/// The table itself takes a coarse lock for insertion and removal; each peer
/// record sits behind its own lock, so updates to different peers never
/// contend.
pub struct NetworkState {
    peer_table: RwLock<HashMap<PeerId, Arc<RwLock<CachedPeer>>>>,
    local_meta_data: RwLock<MetaData>,
    bad_responses_threshold: u32,
}

impl NetworkState {
    pub fn new(bad_responses_threshold: u32) -> Self {
        NetworkState {
            peer_table: RwLock::new(HashMap::new()),
            local_meta_data: RwLock::new(MetaData::default()),
            bad_responses_threshold,
        }
    }

    /// Registers a peer, leaving an existing record's connection state alone.
    /// New records start out disconnected.
    pub fn add_peer(
        &self,
        peer_id: PeerId,
        address: Option<Multiaddr>,
        direction: Direction,
        enr: Option<Enr>,
    ) {
        let mut peer_table = self.peer_table.write();
        match peer_table.get(&peer_id) {
            Some(peer) => {
                let mut peer = peer.write();
                if let Some(address) = address {
                    peer.last_seen_p2p_address = Some(address);
                }
                peer.direction = direction;
                if let Some(enr) = enr {
                    peer.enr = Some(enr);
                }
            }
            None => {
                peer_table.insert(
                    peer_id,
                    Arc::new(RwLock::new(CachedPeer::new(
                        peer_id,
                        address,
                        ConnectionState::Disconnected,
                        direction,
                        enr,
                    ))),
                );
            }
        }
    }

    /// Registers or updates a peer, including its connection state.
    pub fn upsert_peer(
        &self,
        peer_id: PeerId,
        address: Option<Multiaddr>,
        state: ConnectionState,
        direction: Direction,
        enr: Option<Enr>,
    ) {
        self.add_peer(peer_id, address, direction, enr);
        self.set_connection_state(&peer_id, state);
    }

    /// State transitions carry no legality check; connection policy lives in
    /// the handshake coordinator. Unknown peers are ignored.
    pub fn set_connection_state(&self, peer_id: &PeerId, state: ConnectionState) {
        if let Some(peer) = self.peer(peer_id) {
            peer.write().state = state;
        }
    }

    pub fn connection_state(&self, peer_id: &PeerId) -> Result<ConnectionState, PeerStoreError> {
        self.with_peer(peer_id, |peer| peer.state)
    }

    pub fn set_meta_data(&self, peer_id: &PeerId, meta_data: MetaData) {
        if let Some(peer) = self.peer(peer_id) {
            peer.write().meta_data = Some(meta_data);
        }
    }

    pub fn meta_data(&self, peer_id: &PeerId) -> Result<Option<MetaData>, PeerStoreError> {
        self.with_peer(peer_id, |peer| peer.meta_data.clone())
    }

    pub fn set_chain_state(&self, peer_id: &PeerId, status: Status) {
        if let Some(peer) = self.peer(peer_id) {
            peer.write().chain_state = Some(status);
        }
    }

    pub fn chain_state(&self, peer_id: &PeerId) -> Result<Option<Status>, PeerStoreError> {
        self.with_peer(peer_id, |peer| peer.chain_state.clone())
    }

    pub fn clear_chain_state(&self, peer_id: &PeerId) {
        if let Some(peer) = self.peer(peer_id) {
            peer.write().chain_state = None;
        }
    }

    pub fn update_last_seen(&self, peer_id: &PeerId) {
        if let Some(peer) = self.peer(peer_id) {
            peer.write().update_last_seen();
        }
    }

    /// Bumps the peer's bad-response counter and returns the new count.
    pub fn increment_bad_responses(&self, peer_id: &PeerId) -> Result<u32, PeerStoreError> {
        self.with_peer(peer_id, |peer| {
            peer.bad_responses = peer.bad_responses.saturating_add(1);
            peer.bad_responses
        })
    }

    pub fn bad_responses(&self, peer_id: &PeerId) -> Result<u32, PeerStoreError> {
        self.with_peer(peer_id, |peer| peer.bad_responses)
    }

    /// A peer that crossed the bad-response threshold stays banned for the
    /// process lifetime. Unknown peers are not banned.
    pub fn is_banned(&self, peer_id: &PeerId) -> bool {
        self.bad_responses(peer_id)
            .is_ok_and(|count| count >= self.bad_responses_threshold)
    }

    /// Snapshot of every connected peer.
    pub fn active(&self) -> Vec<CachedPeer> {
        self.snapshot(|peer| peer.state == ConnectionState::Connected)
    }

    /// Snapshot of every known peer that is not connected.
    pub fn inactive(&self) -> Vec<CachedPeer> {
        self.snapshot(|peer| peer.state != ConnectionState::Connected)
    }

    /// Drops the record entirely; the peer no longer counts as known.
    pub fn forget(&self, peer_id: &PeerId) {
        self.peer_table.write().remove(peer_id);
    }

    pub fn peer_count(&self) -> usize {
        self.peer_table.read().len()
    }

    pub fn local_meta_data(&self) -> MetaData {
        self.local_meta_data.read().clone()
    }

    /// Replaces the local attestation subnets and bumps the metadata
    /// sequence number so peers notice the change on the next ping.
    pub fn update_local_attnets(&self, attnets: AttnetsBits) -> u64 {
        let mut meta_data = self.local_meta_data.write();
        meta_data.attnets = attnets;
        meta_data.seq_number += 1;
        meta_data.seq_number
    }

    fn peer(&self, peer_id: &PeerId) -> Option<Arc<RwLock<CachedPeer>>> {
        self.peer_table.read().get(peer_id).cloned()
    }

    fn with_peer<R>(
        &self,
        peer_id: &PeerId,
        f: impl FnOnce(&mut CachedPeer) -> R,
    ) -> Result<R, PeerStoreError> {
        match self.peer(peer_id) {
            Some(peer) => Ok(f(&mut peer.write())),
            None => Err(PeerStoreError::UnknownPeer(*peer_id)),
        }
    }

    fn snapshot(&self, keep: impl Fn(&CachedPeer) -> bool) -> Vec<CachedPeer> {
        self.peer_table
            .read()
            .values()
            .map(|peer| peer.read().clone())
            .filter(|peer| keep(peer))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_state() -> NetworkState {
        NetworkState::new(5)
    }

    #[test]
    fn lookups_on_unknown_peers_fail() {
        let state = test_state();
        let stranger = PeerId::random();

        assert_eq!(
            state.connection_state(&stranger),
            Err(PeerStoreError::UnknownPeer(stranger))
        );
        assert!(state.bad_responses(&stranger).is_err());
        assert!(!state.is_banned(&stranger));
    }

    #[test]
    fn added_peers_start_disconnected() {
        let state = test_state();
        let peer_id = PeerId::random();

        state.add_peer(peer_id, None, Direction::Outbound, None);

        assert_eq!(
            state.connection_state(&peer_id).unwrap(),
            ConnectionState::Disconnected
        );
        assert_eq!(state.chain_state(&peer_id).unwrap(), None);
        assert_eq!(state.bad_responses(&peer_id).unwrap(), 0);
    }

    #[test]
    fn re_adding_preserves_connection_state() {
        let state = test_state();
        let peer_id = PeerId::random();

        state.upsert_peer(peer_id, None, ConnectionState::Connecting, Direction::Inbound, None);
        state.add_peer(peer_id, None, Direction::Inbound, None);

        assert_eq!(
            state.connection_state(&peer_id).unwrap(),
            ConnectionState::Connecting
        );
    }

    #[test]
    fn active_and_inactive_partition_known_peers() {
        let state = test_state();
        let connected = PeerId::random();
        let idle = PeerId::random();
        let dialing = PeerId::random();

        state.upsert_peer(connected, None, ConnectionState::Connected, Direction::Inbound, None);
        state.add_peer(idle, None, Direction::Unknown, None);
        state.upsert_peer(dialing, None, ConnectionState::Connecting, Direction::Outbound, None);

        assert_eq!(state.active().len(), 1);
        assert_eq!(state.inactive().len(), 2);
        assert_eq!(state.active().len() + state.inactive().len(), state.peer_count());

        state.forget(&idle);
        assert_eq!(state.active().len() + state.inactive().len(), state.peer_count());
        assert_eq!(state.peer_count(), 2);
    }

    #[test]
    fn chain_state_tracks_the_handshake() {
        let state = test_state();
        let peer_id = PeerId::random();
        state.add_peer(peer_id, None, Direction::Outbound, None);

        state.set_chain_state(&peer_id, Status::default());
        assert!(state.chain_state(&peer_id).unwrap().is_some());

        state.clear_chain_state(&peer_id);
        assert_eq!(state.chain_state(&peer_id).unwrap(), None);
    }

    #[test]
    fn crossing_the_threshold_bans_the_peer() {
        let state = test_state();
        let peer_id = PeerId::random();
        state.add_peer(peer_id, None, Direction::Inbound, None);

        for expected in 1..=4u32 {
            assert_eq!(state.increment_bad_responses(&peer_id).unwrap(), expected);
            assert!(!state.is_banned(&peer_id));
        }
        assert_eq!(state.increment_bad_responses(&peer_id).unwrap(), 5);
        assert!(state.is_banned(&peer_id));
    }

    #[test]
    fn local_attnets_update_bumps_the_sequence_number() {
        let state = test_state();
        assert_eq!(state.local_meta_data().seq_number, 0);

        let mut attnets = state.local_meta_data().attnets;
        attnets.set(3, true).unwrap();
        assert_eq!(state.update_local_attnets(attnets.clone()), 1);
        assert_eq!(state.local_meta_data().attnets, attnets);
    }
}
