use std::sync::Arc;

use libp2p::{Multiaddr, PeerId};
use selkie_network_spec::NetworkSpec;
use selkie_p2p::{
    network_state::NetworkState,
    peer::{ConnectionState, Direction},
    req_resp::{
        messages::{goodbye::Goodbye, meta_data::MetaData, status::Status},
        protocol_id::SupportedProtocol,
    },
};
use tokio::{task::JoinSet, time::timeout};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::{
    chain::ChainHead,
    handshake::{self, HandshakeError},
    transport::{Substream, Transport},
};

/// Drives the status handshake for every connection and applies the
/// disconnect/reputation policy that falls out of it.
///
/// The networking layer invokes [`Self::on_new_connection`] and
/// [`Self::on_disconnect`] from its own tasks and hands every negotiated
/// inbound substream to [`Self::handle_inbound_stream`]. Both outbound dials
/// and inbound exchanges run as tasks owned by this service, each racing a
/// child of the root cancellation token, so [`Self::shutdown`] aborts and
/// joins all of them.
pub struct HandshakeService {
    spec: Arc<NetworkSpec>,
    chain: Arc<dyn ChainHead>,
    pub network_state: Arc<NetworkState>,
    transport: Arc<dyn Transport>,
    shutdown: CancellationToken,
    handshakes: tokio::sync::Mutex<JoinSet<()>>,
}

impl HandshakeService {
    pub fn new(
        spec: Arc<NetworkSpec>,
        chain: Arc<dyn ChainHead>,
        network_state: Arc<NetworkState>,
        transport: Arc<dyn Transport>,
    ) -> Arc<Self> {
        Arc::new(HandshakeService {
            spec,
            chain,
            network_state,
            transport,
            shutdown: CancellationToken::new(),
            handshakes: tokio::sync::Mutex::new(JoinSet::new()),
        })
    }

    /// Hook for the networking layer: a transport-level connection to
    /// `peer_id` was just established.
    ///
    /// The dialing side opens the status stream; for inbound connections the
    /// peer is registered and the handshake completes once its status
    /// request arrives.
    pub async fn on_new_connection(
        self: &Arc<Self>,
        peer_id: PeerId,
        address: Option<Multiaddr>,
        direction: Direction,
    ) {
        if self.network_state.is_banned(&peer_id) {
            warn!("refusing connection from banned peer {peer_id}");
            let _ = self.transport.disconnect(peer_id).await;
            return;
        }
        self.network_state.upsert_peer(
            peer_id,
            address,
            ConnectionState::Connecting,
            direction,
            None,
        );

        if direction == Direction::Outbound {
            let service = self.clone();
            let cancel = self.shutdown.child_token();
            self.handshakes.lock().await.spawn(async move {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        debug!("status handshake with {peer_id} aborted by shutdown");
                    }
                    _ = service.dial_status(peer_id) => {}
                }
            });
        }
    }

    /// Hook for the networking layer: the connection to `peer_id` is gone.
    pub fn on_disconnect(&self, peer_id: PeerId) {
        self.network_state
            .set_connection_state(&peer_id, ConnectionState::Disconnected);
        self.network_state.clear_chain_state(&peer_id);
    }

    /// Dispatches one inbound substream the networking layer negotiated for
    /// `protocol`.
    ///
    /// The exchange itself runs as a task owned by this service, under a
    /// child of the root cancellation token, so the caller is never blocked
    /// on the stream and shutdown aborts the exchange.
    pub async fn handle_inbound_stream(
        self: &Arc<Self>,
        peer_id: PeerId,
        protocol: SupportedProtocol,
        stream: Substream,
    ) {
        if self.shutdown.is_cancelled() {
            debug!("dropping inbound {protocol:?} stream from {peer_id}: shutting down");
            return;
        }
        let service = self.clone();
        let cancel = self.shutdown.child_token();
        self.handshakes.lock().await.spawn(async move {
            tokio::select! {
                _ = cancel.cancelled() => {
                    debug!("inbound {protocol:?} exchange with {peer_id} aborted by shutdown");
                }
                _ = service.serve_inbound_stream(peer_id, protocol, stream) => {}
            }
        });
    }

    async fn serve_inbound_stream(
        &self,
        peer_id: PeerId,
        protocol: SupportedProtocol,
        stream: Substream,
    ) {
        self.network_state.update_last_seen(&peer_id);
        match protocol {
            SupportedProtocol::Status => {
                if self.network_state.connection_state(&peer_id).is_err() {
                    self.network_state
                        .add_peer(peer_id, None, Direction::Inbound, None);
                }
                match handshake::handle_status_request(
                    stream,
                    self.chain.as_ref(),
                    self.spec.resp_timeout(),
                )
                .await
                {
                    Ok(remote_status) => {
                        self.network_state.set_chain_state(&peer_id, remote_status);
                        self.network_state
                            .set_connection_state(&peer_id, ConnectionState::Connected);
                        info!("completed status handshake with {peer_id}");
                    }
                    Err(err) => self.handle_handshake_failure(peer_id, err).await,
                }
            }
            SupportedProtocol::Ping => {
                let local_seq = self.network_state.local_meta_data().seq_number;
                match handshake::handle_ping_request(stream, local_seq, self.spec.resp_timeout())
                    .await
                {
                    Ok(remote_seq) => self.refresh_meta_data_if_stale(peer_id, remote_seq).await,
                    Err(err) => self.handle_handshake_failure(peer_id, err.into()).await,
                }
            }
            SupportedProtocol::Goodbye => {
                match handshake::handle_goodbye(stream, self.spec.resp_timeout()).await {
                    Ok(reason) => debug!("peer {peer_id} said goodbye: {reason:?}"),
                    Err(err) => debug!("malformed goodbye from {peer_id}: {err}"),
                }
                self.disconnect(peer_id).await;
            }
            SupportedProtocol::MetaData => {
                let local_meta_data = self.network_state.local_meta_data();
                if let Err(err) = handshake::handle_meta_data_request(stream, local_meta_data).await
                {
                    debug!("failed to serve metadata to {peer_id}: {err}");
                }
            }
        }
    }

    /// Sends our metadata sequence number to `peer_id` and refreshes its
    /// metadata if the peer advertises a sequence number we have not seen.
    pub async fn ping(&self, peer_id: PeerId) -> Result<(), HandshakeError> {
        let stream = self.open(peer_id, SupportedProtocol::Ping).await?;
        let local_seq = self.network_state.local_meta_data().seq_number;
        let remote_seq =
            handshake::request_ping(stream, local_seq, self.spec.resp_timeout()).await?;
        self.network_state.update_last_seen(&peer_id);
        self.refresh_meta_data_if_stale(peer_id, remote_seq).await;
        Ok(())
    }

    pub async fn request_meta_data(&self, peer_id: PeerId) -> Result<MetaData, HandshakeError> {
        let stream = self.open(peer_id, SupportedProtocol::MetaData).await?;
        Ok(handshake::request_meta_data(stream, self.spec.resp_timeout()).await?)
    }

    /// Cancels every in-flight handshake, says goodbye to connected peers and
    /// joins all tasks this service spawned.
    pub async fn shutdown(&self) {
        self.shutdown.cancel();
        for peer in self.network_state.active() {
            let _ = timeout(
                self.spec.resp_timeout(),
                self.send_goodbye_to(peer.peer_id, Goodbye::ClientShutdown),
            )
            .await;
            self.disconnect(peer.peer_id).await;
        }
        self.join_handshakes().await;
    }

    /// Waits until every spawned handshake task has finished.
    pub async fn join_handshakes(&self) {
        let mut handshakes = self.handshakes.lock().await;
        while handshakes.join_next().await.is_some() {}
    }

    async fn dial_status(&self, peer_id: PeerId) {
        match self.try_dial_status(peer_id).await {
            Ok(status) => {
                self.network_state.set_chain_state(&peer_id, status);
                self.network_state
                    .set_connection_state(&peer_id, ConnectionState::Connected);
                info!("completed status handshake with {peer_id}");
            }
            Err(err) => self.handle_handshake_failure(peer_id, err).await,
        }
    }

    async fn try_dial_status(&self, peer_id: PeerId) -> Result<Status, HandshakeError> {
        let stream = self.open(peer_id, SupportedProtocol::Status).await?;
        let status = handshake::request_status(
            stream,
            self.chain.build_status(),
            self.spec.resp_timeout(),
        )
        .await?;
        handshake::validate_status(self.chain.as_ref(), &status)?;
        Ok(status)
    }

    async fn handle_handshake_failure(&self, peer_id: PeerId, err: HandshakeError) {
        warn!("status handshake with {peer_id} failed: {err}");
        if err.is_reputation_fault() {
            let bad_responses = self
                .network_state
                .increment_bad_responses(&peer_id)
                .unwrap_or(0);
            if self.network_state.is_banned(&peer_id) {
                warn!("banning peer {peer_id} after {bad_responses} bad responses");
                let _ = self.send_goodbye_to(peer_id, Goodbye::Banned).await;
            }
        }
        self.disconnect(peer_id).await;
    }

    async fn refresh_meta_data_if_stale(&self, peer_id: PeerId, remote_seq: u64) {
        let cached_seq = self
            .network_state
            .meta_data(&peer_id)
            .ok()
            .flatten()
            .map(|meta_data| meta_data.seq_number);
        if cached_seq == Some(remote_seq) {
            return;
        }
        match self.request_meta_data(peer_id).await {
            Ok(meta_data) => {
                debug!("refreshed metadata for {peer_id} at seq {}", meta_data.seq_number);
                self.network_state.set_meta_data(&peer_id, meta_data);
            }
            Err(err) => warn!("failed to refresh metadata for {peer_id}: {err}"),
        }
    }

    async fn send_goodbye_to(&self, peer_id: PeerId, reason: Goodbye) -> Result<(), HandshakeError> {
        let stream = self.open(peer_id, SupportedProtocol::Goodbye).await?;
        handshake::send_goodbye(stream, reason).await?;
        Ok(())
    }

    async fn disconnect(&self, peer_id: PeerId) {
        self.network_state
            .set_connection_state(&peer_id, ConnectionState::Disconnecting);
        if let Err(err) = self.transport.disconnect(peer_id).await {
            debug!("transport failed to disconnect {peer_id}: {err}");
        }
        self.network_state
            .set_connection_state(&peer_id, ConnectionState::Disconnected);
        self.network_state.clear_chain_state(&peer_id);
    }

    async fn open(
        &self,
        peer_id: PeerId,
        protocol: SupportedProtocol,
    ) -> Result<Substream, HandshakeError> {
        self.transport
            .open_stream(peer_id, protocol)
            .await
            .map_err(HandshakeError::Transport)
    }
}
