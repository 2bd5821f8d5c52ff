use alloy_primitives::{B256, aliases::B32};
use ssz_derive::{Decode, Encode};
use tree_hash::TreeHash as _;
use tree_hash_derive::TreeHash;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Encode, Decode, TreeHash)]
pub struct ForkData {
    pub current_version: B32,
    pub genesis_validators_root: B256,
}

impl ForkData {
    /// First four bytes of the fork data root. Two peers agree on the active
    /// fork and network exactly when their digests are equal.
    pub fn compute_fork_digest(&self) -> B32 {
        B32::from_slice(&self.tree_hash_root()[..4])
    }
}
