use std::time::Duration;

use alloy_primitives::B256;
use futures::{SinkExt, StreamExt};
use selkie_p2p::req_resp::{
    codec::{InboundCodec, OutboundCodec, RespMessage},
    error::ReqRespError,
    messages::{
        RequestMessage, ResponseMessage, goodbye::Goodbye, meta_data::MetaData, ping::Ping,
        status::Status,
    },
    protocol_id::{ProtocolId, SupportedProtocol},
};
use tokio::{
    io::{AsyncRead, AsyncWrite},
    time::timeout,
};
use tokio_util::codec::Framed;

use crate::chain::ChainHead;

#[derive(Debug, thiserror::Error)]
pub enum HandshakeError {
    #[error(transparent)]
    Rpc(#[from] ReqRespError),

    #[error(
        "invalid finalized checkpoint: claimed {claimed} at epoch {epoch}, expected {expected}"
    )]
    InvalidFinalizedCheckpoint {
        epoch: u64,
        claimed: B256,
        expected: B256,
    },

    #[error("transport failure: {0}")]
    Transport(anyhow::Error),

    #[error("handshake cancelled")]
    Cancelled,
}

impl HandshakeError {
    /// Whether the failure counts against the peer's reputation. Speaking
    /// another fork or losing the connection is not misbehaviour; malformed
    /// payloads, bogus chain claims, timeouts and error codes are.
    pub fn is_reputation_fault(&self) -> bool {
        !matches!(
            self,
            HandshakeError::Rpc(ReqRespError::WrongForkDigestVersion)
                | HandshakeError::Transport(_)
                | HandshakeError::Cancelled
        )
    }
}

/// Judges the chain claims in a peer's status against the local chain.
pub fn validate_status(chain: &dyn ChainHead, status: &Status) -> Result<(), HandshakeError> {
    if status.fork_digest != chain.fork_digest() {
        return Err(ReqRespError::WrongForkDigestVersion.into());
    }
    if let Some(expected) = chain.finalized_root_at_epoch(status.finalized_epoch) {
        if expected != status.finalized_root {
            return Err(HandshakeError::InvalidFinalizedCheckpoint {
                epoch: status.finalized_epoch,
                claimed: status.finalized_root,
                expected,
            });
        }
    }
    Ok(())
}

async fn next_chunk<S: AsyncRead + AsyncWrite + Unpin>(
    framed: &mut Framed<S, OutboundCodec>,
    deadline: Duration,
) -> Result<RespMessage, ReqRespError> {
    match timeout(deadline, framed.next()).await? {
        Some(chunk) => chunk,
        None => Err(ReqRespError::IncompleteStream),
    }
}

async fn next_request<S: AsyncRead + AsyncWrite + Unpin>(
    framed: &mut Framed<S, InboundCodec>,
    deadline: Duration,
) -> Result<RequestMessage, ReqRespError> {
    match timeout(deadline, framed.next()).await? {
        Some(request) => request,
        None => Err(ReqRespError::IncompleteStream),
    }
}

/// Sends our status and waits for the peer's on the same stream.
pub async fn request_status<S: AsyncRead + AsyncWrite + Unpin>(
    stream: S,
    local_status: Status,
    deadline: Duration,
) -> Result<Status, ReqRespError> {
    let mut framed = Framed::new(
        stream,
        OutboundCodec::new(ProtocolId::new(SupportedProtocol::Status)),
    );
    framed.send(RequestMessage::Status(local_status)).await?;

    match next_chunk(&mut framed, deadline).await? {
        RespMessage::Response(response) => match *response {
            ResponseMessage::Status(status) => Ok(status),
            other => Err(ReqRespError::InvalidData(format!(
                "unexpected status response: {other:?}"
            ))),
        },
        RespMessage::Error(err) => Err(err),
    }
}

/// Receives a status request, answers it, and returns the peer's status.
///
/// A peer on another fork gets the canonical rejection chunk instead of a
/// status; a peer with an impossible finalized checkpoint gets an invalid
/// request chunk. Either way the error propagates so the caller can apply
/// the disconnect policy.
pub async fn handle_status_request<S: AsyncRead + AsyncWrite + Unpin>(
    stream: S,
    chain: &dyn ChainHead,
    deadline: Duration,
) -> Result<Status, HandshakeError> {
    let mut framed = Framed::new(
        stream,
        InboundCodec::new(ProtocolId::new(SupportedProtocol::Status)),
    );
    let remote_status = match next_request(&mut framed, deadline).await? {
        RequestMessage::Status(status) => status,
        other => {
            return Err(
                ReqRespError::InvalidData(format!("expected a status request, got {other:?}"))
                    .into(),
            );
        }
    };

    match validate_status(chain, &remote_status) {
        Ok(()) => {
            framed
                .send(RespMessage::Response(Box::new(ResponseMessage::Status(
                    chain.build_status(),
                ))))
                .await
                .map_err(HandshakeError::from)?;
            Ok(remote_status)
        }
        Err(err) => {
            let chunk = match &err {
                HandshakeError::Rpc(ReqRespError::WrongForkDigestVersion) => {
                    RespMessage::Error(ReqRespError::WrongForkDigestVersion)
                }
                other => RespMessage::Error(ReqRespError::InvalidData(other.to_string())),
            };
            // Best effort: the peer is getting disconnected either way.
            let _ = framed.send(chunk).await;
            Err(err)
        }
    }
}

/// Sends our metadata sequence number, returns the peer's.
pub async fn request_ping<S: AsyncRead + AsyncWrite + Unpin>(
    stream: S,
    sequence_number: u64,
    deadline: Duration,
) -> Result<u64, ReqRespError> {
    let mut framed = Framed::new(
        stream,
        OutboundCodec::new(ProtocolId::new(SupportedProtocol::Ping)),
    );
    framed
        .send(RequestMessage::Ping(Ping::new(sequence_number)))
        .await?;

    match next_chunk(&mut framed, deadline).await? {
        RespMessage::Response(response) => match *response {
            ResponseMessage::Ping(ping) => Ok(ping.sequence_number),
            other => Err(ReqRespError::InvalidData(format!(
                "unexpected ping response: {other:?}"
            ))),
        },
        RespMessage::Error(err) => Err(err),
    }
}

/// Answers a ping with our metadata sequence number, returns the peer's.
pub async fn handle_ping_request<S: AsyncRead + AsyncWrite + Unpin>(
    stream: S,
    local_sequence_number: u64,
    deadline: Duration,
) -> Result<u64, ReqRespError> {
    let mut framed = Framed::new(
        stream,
        InboundCodec::new(ProtocolId::new(SupportedProtocol::Ping)),
    );
    let remote = match next_request(&mut framed, deadline).await? {
        RequestMessage::Ping(ping) => ping,
        other => {
            return Err(ReqRespError::InvalidData(format!(
                "expected a ping request, got {other:?}"
            )));
        }
    };
    framed
        .send(RespMessage::Response(Box::new(ResponseMessage::Ping(
            Ping::new(local_sequence_number),
        ))))
        .await?;
    Ok(remote.sequence_number)
}

pub async fn request_meta_data<S: AsyncRead + AsyncWrite + Unpin>(
    stream: S,
    deadline: Duration,
) -> Result<MetaData, ReqRespError> {
    let mut framed = Framed::new(
        stream,
        OutboundCodec::new(ProtocolId::new(SupportedProtocol::MetaData)),
    );
    // A metadata request is the bare protocol negotiation, nothing is written.
    framed.send(RequestMessage::MetaData(MetaData::default())).await?;

    match next_chunk(&mut framed, deadline).await? {
        RespMessage::Response(response) => match *response {
            ResponseMessage::MetaData(meta_data) => Ok(meta_data),
            other => Err(ReqRespError::InvalidData(format!(
                "unexpected metadata response: {other:?}"
            ))),
        },
        RespMessage::Error(err) => Err(err),
    }
}

pub async fn handle_meta_data_request<S: AsyncRead + AsyncWrite + Unpin>(
    stream: S,
    local_meta_data: MetaData,
) -> Result<(), ReqRespError> {
    let mut framed = Framed::new(
        stream,
        InboundCodec::new(ProtocolId::new(SupportedProtocol::MetaData)),
    );
    framed
        .send(RespMessage::Response(Box::new(ResponseMessage::MetaData(
            local_meta_data,
        ))))
        .await
}

/// Goodbye is fire-and-forget; no response chunk follows.
pub async fn send_goodbye<S: AsyncRead + AsyncWrite + Unpin>(
    stream: S,
    reason: Goodbye,
) -> Result<(), ReqRespError> {
    let mut framed = Framed::new(
        stream,
        OutboundCodec::new(ProtocolId::new(SupportedProtocol::Goodbye)),
    );
    framed.send(RequestMessage::Goodbye(reason)).await
}

pub async fn handle_goodbye<S: AsyncRead + AsyncWrite + Unpin>(
    stream: S,
    deadline: Duration,
) -> Result<Goodbye, ReqRespError> {
    let mut framed = Framed::new(
        stream,
        InboundCodec::new(ProtocolId::new(SupportedProtocol::Goodbye)),
    );
    match next_request(&mut framed, deadline).await? {
        RequestMessage::Goodbye(reason) => Ok(reason),
        other => Err(ReqRespError::InvalidData(format!(
            "expected a goodbye, got {other:?}"
        ))),
    }
}
