use serde::{Deserialize, Serialize};
use ssz_derive::{Decode, Encode};
use ssz_types::{BitVector, typenum::U64};

pub type AttestationSubnetCount = U64;

/// Attestation subnets the node currently subscribes to.
pub type AttnetsBits = BitVector<AttestationSubnetCount>;

#[derive(Debug, Default, Clone, PartialEq, Eq, Encode, Decode, Serialize, Deserialize)]
pub struct MetaData {
    pub seq_number: u64,
    pub attnets: AttnetsBits,
}
