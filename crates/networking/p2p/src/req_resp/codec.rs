use bytes::{BufMut, BytesMut};
use ssz::{Decode, Encode};
use tokio_util::codec::{Decoder, Encoder};
use tracing::trace;
use unsigned_varint::codec::Uvi;

use super::{
    error::ReqRespError,
    messages::{
        RequestMessage, ResponseMessage, goodbye::Goodbye, meta_data::MetaData, ping::Ping,
        status::Status,
    },
    protocol_id::{ProtocolId, SupportedProtocol},
};
use crate::constants::MAX_PAYLOAD_SIZE;

/// One chunk of a response stream.
#[derive(Debug)]
pub enum RespMessage {
    Response(Box<ResponseMessage>),
    Error(ReqRespError),
}

impl RespMessage {
    pub fn response_code(&self) -> ResponseCode {
        match self {
            RespMessage::Response(_) => ResponseCode::Success,
            RespMessage::Error(err) => match err {
                ReqRespError::InvalidData(_) | ReqRespError::WrongForkDigestVersion => {
                    ResponseCode::InvalidRequest
                }
                ReqRespError::Disconnected | ReqRespError::TimedOut(_) => {
                    ResponseCode::ResourceUnavailable
                }
                _ => ResponseCode::ServerError,
            },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseCode {
    Success,
    InvalidRequest,
    ServerError,
    ResourceUnavailable,
    ReservedCode(u8),
    ErroneousCode(u8),
}

impl From<u8> for ResponseCode {
    fn from(byte: u8) -> Self {
        match byte {
            0 => ResponseCode::Success,
            1 => ResponseCode::InvalidRequest,
            2 => ResponseCode::ServerError,
            3 => ResponseCode::ResourceUnavailable,
            4..=127 => ResponseCode::ReservedCode(byte),
            _ => ResponseCode::ErroneousCode(byte),
        }
    }
}

impl From<ResponseCode> for u8 {
    fn from(code: ResponseCode) -> u8 {
        match code {
            ResponseCode::Success => 0,
            ResponseCode::InvalidRequest => 1,
            ResponseCode::ServerError => 2,
            ResponseCode::ResourceUnavailable => 3,
            ResponseCode::ReservedCode(byte) => byte,
            ResponseCode::ErroneousCode(byte) => byte,
        }
    }
}

fn reject_oversized(size: usize) -> Result<(), ReqRespError> {
    if size > MAX_PAYLOAD_SIZE as usize {
        return Err(ReqRespError::OversizedMessage {
            size,
            max: MAX_PAYLOAD_SIZE as usize,
        });
    }
    Ok(())
}

/// Server half of a stream: decodes the remote's request and encodes the
/// response chunks we send back.
pub struct InboundCodec {
    protocol: ProtocolId,
    length_prefix: Uvi<usize>,
    length: Option<usize>,
}

impl InboundCodec {
    pub fn new(protocol: ProtocolId) -> Self {
        InboundCodec {
            protocol,
            length_prefix: Uvi::default(),
            length: None,
        }
    }
}

impl Encoder<RespMessage> for InboundCodec {
    type Error = ReqRespError;

    fn encode(&mut self, item: RespMessage, dst: &mut BytesMut) -> Result<(), Self::Error> {
        dst.put_u8(u8::from(item.response_code()));

        let bytes = match item {
            RespMessage::Response(message) => message.as_ssz_bytes(),
            RespMessage::Error(err) => err.to_string().into_bytes(),
        };
        reject_oversized(bytes.len())?;

        self.length_prefix.encode(bytes.len(), dst)?;
        dst.extend_from_slice(&bytes);
        Ok(())
    }
}

impl Decoder for InboundCodec {
    type Item = RequestMessage;
    type Error = ReqRespError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        // A metadata request is the bare protocol id, there is no body to
        // wait for.
        if self.protocol.protocol == SupportedProtocol::MetaData {
            return Ok(Some(RequestMessage::MetaData(MetaData::default())));
        }

        let length = match self.length {
            Some(length) => length,
            None => match self.length_prefix.decode(src)? {
                Some(length) => *self.length.insert(length),
                None => return Ok(None),
            },
        };
        reject_oversized(length)?;
        if src.len() < length {
            return Ok(None);
        }
        let body = src.split_to(length);
        self.length = None;

        let request = match self.protocol.protocol {
            SupportedProtocol::Status => RequestMessage::Status(Status::from_ssz_bytes(&body)?),
            SupportedProtocol::Goodbye => RequestMessage::Goodbye(Goodbye::from_ssz_bytes(&body)?),
            SupportedProtocol::Ping => RequestMessage::Ping(Ping::from_ssz_bytes(&body)?),
            SupportedProtocol::MetaData => unreachable!("metadata requests carry no body"),
        };
        trace!("decoded inbound {:?} request of {length} bytes", self.protocol.protocol);
        Ok(Some(request))
    }
}

/// Client half of a stream: encodes our request and decodes the response
/// chunks the remote sends back.
pub struct OutboundCodec {
    protocol: ProtocolId,
    length_prefix: Uvi<usize>,
    current_response_code: Option<ResponseCode>,
    length: Option<usize>,
}

impl OutboundCodec {
    pub fn new(protocol: ProtocolId) -> Self {
        OutboundCodec {
            protocol,
            length_prefix: Uvi::default(),
            current_response_code: None,
            length: None,
        }
    }
}

impl Encoder<RequestMessage> for OutboundCodec {
    type Error = ReqRespError;

    fn encode(&mut self, item: RequestMessage, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let bytes = match item {
            RequestMessage::MetaData(_) => return Ok(()),
            message => message.as_ssz_bytes(),
        };
        reject_oversized(bytes.len())?;

        self.length_prefix.encode(bytes.len(), dst)?;
        dst.extend_from_slice(&bytes);
        Ok(())
    }
}

impl Decoder for OutboundCodec {
    type Item = RespMessage;
    type Error = ReqRespError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        let response_code = match self.current_response_code {
            Some(code) => code,
            None => {
                if src.is_empty() {
                    return Ok(None);
                }
                *self
                    .current_response_code
                    .insert(ResponseCode::from(src.split_to(1)[0]))
            }
        };

        let length = match self.length {
            Some(length) => length,
            None => match self.length_prefix.decode(src)? {
                Some(length) => *self.length.insert(length),
                None => return Ok(None),
            },
        };
        reject_oversized(length)?;
        if src.len() < length {
            return Ok(None);
        }
        let body = src.split_to(length);
        self.current_response_code = None;
        self.length = None;

        if response_code != ResponseCode::Success {
            trace!(
                "received {response_code:?} chunk on {:?} stream",
                self.protocol.protocol
            );
            return Ok(Some(RespMessage::Error(ReqRespError::RawError(
                String::from_utf8_lossy(&body).into_owned(),
            ))));
        }

        let response = match self.protocol.protocol {
            SupportedProtocol::Status => ResponseMessage::Status(Status::from_ssz_bytes(&body)?),
            SupportedProtocol::Ping => ResponseMessage::Ping(Ping::from_ssz_bytes(&body)?),
            SupportedProtocol::MetaData => {
                ResponseMessage::MetaData(MetaData::from_ssz_bytes(&body)?)
            }
            SupportedProtocol::Goodbye => {
                return Ok(Some(RespMessage::Error(ReqRespError::InvalidData(
                    "goodbye has no response".to_string(),
                ))));
            }
        };
        Ok(Some(RespMessage::Response(Box::new(response))))
    }
}
