use alloy_primitives::B256;
use serde::{Deserialize, Serialize};
use ssz_derive::{Decode, Encode};
use ssz_types::{BitList, typenum::U2048};
use tree_hash::TreeHash as _;

use crate::{attestation_data::AttestationData, bls::BlsSignature};

pub type MaxValidatorsPerCommittee = U2048;

/// Which committee members contributed to an attestation.
pub type AggregationBits = BitList<MaxValidatorsPerCommittee>;

#[derive(Debug, PartialEq, Eq, Clone, Serialize, Deserialize, Encode, Decode)]
pub struct Attestation {
    pub aggregation_bits: AggregationBits,
    pub data: AttestationData,
    pub signature: BlsSignature,
}

impl Attestation {
    /// An attestation carrying two or more participation bits is an aggregate.
    pub fn is_aggregated(&self) -> bool {
        self.aggregation_bits.num_set_bits() >= 2
    }

    /// Fingerprint of the vote itself. Attestations with equal data share a
    /// root regardless of their aggregation bits.
    pub fn data_root(&self) -> B256 {
        self.data.tree_hash_root()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn attestation(len: usize, set: &[usize]) -> Attestation {
        let mut aggregation_bits = AggregationBits::with_capacity(len).unwrap();
        for index in set {
            aggregation_bits.set(*index, true).unwrap();
        }
        Attestation {
            aggregation_bits,
            data: AttestationData::default(),
            signature: BlsSignature::empty(),
        }
    }

    #[test]
    fn single_bit_is_unaggregated() {
        assert!(!attestation(8, &[3]).is_aggregated());
        assert!(attestation(8, &[3, 5]).is_aggregated());
    }

    #[test]
    fn data_root_ignores_aggregation_bits() {
        let first = attestation(8, &[0]);
        let second = attestation(8, &[1, 2]);
        assert_eq!(first.data_root(), second.data_root());

        let mut other = attestation(8, &[0]);
        other.data.slot = 7;
        assert_ne!(first.data_root(), other.data_root());
    }
}
