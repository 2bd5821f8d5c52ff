pub const PROTOCOL_PREFIX: &str = "/eth2/beacon_chain/req";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SupportedProtocol {
    Status,
    Goodbye,
    Ping,
    MetaData,
}

impl SupportedProtocol {
    pub fn message_name(&self) -> &str {
        match self {
            SupportedProtocol::Status => "status",
            SupportedProtocol::Goodbye => "goodbye",
            SupportedProtocol::Ping => "ping",
            SupportedProtocol::MetaData => "metadata",
        }
    }

    pub fn schema_version(&self) -> &str {
        "1"
    }

    pub fn supported_protocols() -> Vec<ProtocolId> {
        vec![
            SupportedProtocol::Status,
            SupportedProtocol::Goodbye,
            SupportedProtocol::Ping,
            SupportedProtocol::MetaData,
        ]
        .into_iter()
        .map(ProtocolId::new)
        .collect()
    }
}

#[derive(Debug, Clone)]
pub struct ProtocolId {
    pub protocol_id: String,
    pub protocol: SupportedProtocol,
}

impl ProtocolId {
    pub fn new(protocol: SupportedProtocol) -> Self {
        // Protocol identification `/ProtocolPrefix/MessageName/SchemaVersion/Encoding`
        let protocol_id = format!(
            "{}/{}/{}/ssz",
            PROTOCOL_PREFIX,
            protocol.message_name(),
            protocol.schema_version()
        );
        ProtocolId {
            protocol_id,
            protocol,
        }
    }
}

impl AsRef<str> for ProtocolId {
    fn as_ref(&self) -> &str {
        &self.protocol_id
    }
}
