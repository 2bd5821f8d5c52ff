use async_trait::async_trait;
use libp2p::PeerId;
use selkie_p2p::req_resp::protocol_id::SupportedProtocol;
use tokio::io::{AsyncRead, AsyncWrite};

pub trait SubstreamIo: AsyncRead + AsyncWrite + Send + Unpin {}

impl<T: AsyncRead + AsyncWrite + Send + Unpin> SubstreamIo for T {}

/// One negotiated stream, ready for a single request/response exchange.
pub type Substream = Box<dyn SubstreamIo>;

/// The networking layer as the handshake coordinator consumes it. The real
/// implementation wraps the swarm; tests wire services together in memory.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Opens a fresh outbound substream to `peer_id` negotiated for
    /// `protocol`.
    async fn open_stream(
        &self,
        peer_id: PeerId,
        protocol: SupportedProtocol,
    ) -> anyhow::Result<Substream>;

    /// Tears down the underlying connection to `peer_id`.
    async fn disconnect(&self, peer_id: PeerId) -> anyhow::Result<()>;
}
