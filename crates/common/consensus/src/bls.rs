use alloy_primitives::FixedBytes;
use serde::{Deserialize, Serialize};
use ssz_derive::{Decode, Encode};

/// BLS12-381 signature bytes.
///
/// Verification and aggregation are delegated to the embedding client's
/// crypto backend through [`SignatureAggregator`]; this crate only moves the
/// bytes around.
#[derive(
    Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Encode, Decode,
)]
#[ssz(struct_behaviour = "transparent")]
pub struct BlsSignature(pub FixedBytes<96>);

impl BlsSignature {
    pub const fn empty() -> Self {
        BlsSignature(FixedBytes::ZERO)
    }
}

/// Combines signatures over the same message into a single aggregate.
pub trait SignatureAggregator: Send + Sync {
    fn aggregate(&self, signatures: &[BlsSignature]) -> anyhow::Result<BlsSignature>;
}
