pub mod goodbye;
pub mod meta_data;
pub mod ping;
pub mod status;

use goodbye::Goodbye;
use meta_data::MetaData;
use ping::Ping;
use ssz_derive::{Decode, Encode};
use status::Status;

use crate::req_resp::protocol_id::SupportedProtocol;

#[derive(Debug, Clone, PartialEq, Eq, Encode, Decode)]
#[ssz(enum_behaviour = "transparent")]
pub enum RequestMessage {
    Status(Status),
    Goodbye(Goodbye),
    Ping(Ping),
    MetaData(MetaData),
}

impl RequestMessage {
    pub fn protocol(&self) -> SupportedProtocol {
        match self {
            RequestMessage::Status(_) => SupportedProtocol::Status,
            RequestMessage::Goodbye(_) => SupportedProtocol::Goodbye,
            RequestMessage::Ping(_) => SupportedProtocol::Ping,
            RequestMessage::MetaData(_) => SupportedProtocol::MetaData,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Encode, Decode)]
#[ssz(enum_behaviour = "transparent")]
pub enum ResponseMessage {
    Status(Status),
    Ping(Ping),
    MetaData(MetaData),
}
