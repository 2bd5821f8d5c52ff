use ssz_derive::{Decode, Encode};

/// Carries the sender's current metadata sequence number; a receiver that
/// cached a different number knows to refresh the peer's metadata.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Encode, Decode)]
#[ssz(struct_behaviour = "transparent")]
pub struct Ping {
    pub sequence_number: u64,
}

impl Ping {
    pub fn new(sequence_number: u64) -> Self {
        Self { sequence_number }
    }
}
