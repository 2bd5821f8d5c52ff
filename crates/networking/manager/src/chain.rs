use std::collections::HashMap;

use alloy_primitives::{B256, aliases::B32};
use selkie_consensus::checkpoint::Checkpoint;
use selkie_network_spec::NetworkSpec;
use selkie_p2p::req_resp::messages::status::Status;

/// Read-only view of the local chain, enough to answer a status request and
/// to judge the chain claims a peer makes.
pub trait ChainHead: Send + Sync {
    fn head_slot(&self) -> u64;

    fn head_root(&self) -> B256;

    fn finalized_checkpoint(&self) -> Checkpoint;

    fn fork_digest(&self) -> B32;

    /// Root the local chain finalized at `epoch`, for epochs it has seen
    /// finalize. `None` means the epoch is ahead of local finality and the
    /// claim cannot be judged.
    fn finalized_root_at_epoch(&self, epoch: u64) -> Option<B256>;

    fn build_status(&self) -> Status {
        let finalized = self.finalized_checkpoint();
        Status {
            fork_digest: self.fork_digest(),
            finalized_root: finalized.root,
            finalized_epoch: finalized.epoch,
            head_root: self.head_root(),
            head_slot: self.head_slot(),
        }
    }
}

/// Fixed chain view for tests and interop setups.
pub struct MockChain {
    pub head_slot: u64,
    pub head_root: B256,
    pub finalized: Checkpoint,
    pub fork_digest: B32,
    pub finalized_roots: HashMap<u64, B256>,
}

impl MockChain {
    pub fn new(spec: &NetworkSpec) -> Self {
        MockChain {
            head_slot: 0,
            head_root: B256::ZERO,
            finalized: Checkpoint::default(),
            fork_digest: spec.fork_digest(),
            finalized_roots: HashMap::new(),
        }
    }
}

impl ChainHead for MockChain {
    fn head_slot(&self) -> u64 {
        self.head_slot
    }

    fn head_root(&self) -> B256 {
        self.head_root
    }

    fn finalized_checkpoint(&self) -> Checkpoint {
        self.finalized
    }

    fn fork_digest(&self) -> B32 {
        self.fork_digest
    }

    fn finalized_root_at_epoch(&self, epoch: u64) -> Option<B256> {
        if epoch == self.finalized.epoch {
            return Some(self.finalized.root);
        }
        self.finalized_roots.get(&epoch).copied()
    }
}
