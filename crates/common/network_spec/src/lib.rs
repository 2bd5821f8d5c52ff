use std::{fmt, time::Duration};

use alloy_primitives::{B256, aliases::B32, b256, fixed_bytes};
use selkie_consensus::{fork_data::ForkData, misc::compute_epoch_at_slot};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Network {
    Mainnet,
    Dev,
    Custom(String),
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Network::Mainnet => f.write_str("mainnet"),
            Network::Dev => f.write_str("dev"),
            Network::Custom(name) => f.write_str(name),
        }
    }
}

/// Parameters that pin a node to one network and one fork.
///
/// The value is built once at startup and passed explicitly to every
/// component that needs it; there is no process-wide instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkSpec {
    pub network: Network,
    pub fork_version: B32,
    pub genesis_validators_root: B256,
    pub seconds_per_slot: u64,
    pub slots_per_epoch: u64,
    /// Attestations older than this many slots behind head are expired.
    pub attestation_horizon_slots: u64,
    /// Bad responses at or above this count ban the peer for the process
    /// lifetime.
    pub bad_responses_threshold: u32,
    pub resp_timeout_secs: u64,
}

impl NetworkSpec {
    pub fn mainnet() -> Self {
        NetworkSpec {
            network: Network::Mainnet,
            fork_version: fixed_bytes!("0x05000000"),
            genesis_validators_root: b256!(
                "0x4b363db94e286120d76eb905340fdd4e54bfe9f06bf33ff6cf5ad27f511bfe95"
            ),
            seconds_per_slot: 12,
            slots_per_epoch: 32,
            attestation_horizon_slots: 32,
            bad_responses_threshold: 5,
            resp_timeout_secs: 10,
        }
    }

    pub fn dev() -> Self {
        NetworkSpec {
            network: Network::Dev,
            fork_version: fixed_bytes!("0x00000000"),
            genesis_validators_root: B256::ZERO,
            seconds_per_slot: 12,
            slots_per_epoch: 32,
            attestation_horizon_slots: 32,
            bad_responses_threshold: 5,
            resp_timeout_secs: 10,
        }
    }

    pub fn fork_digest(&self) -> B32 {
        ForkData {
            current_version: self.fork_version,
            genesis_validators_root: self.genesis_validators_root,
        }
        .compute_fork_digest()
    }

    pub fn resp_timeout(&self) -> Duration {
        Duration::from_secs(self.resp_timeout_secs)
    }

    pub fn epoch_at_slot(&self, slot: u64) -> u64 {
        compute_epoch_at_slot(slot, self.slots_per_epoch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn networks_disagree_on_fork_digest() {
        assert_ne!(NetworkSpec::mainnet().fork_digest(), NetworkSpec::dev().fork_digest());
    }

    #[test]
    fn dev_spec_defaults() {
        let spec = NetworkSpec::dev();
        assert_eq!(spec.network.to_string(), "dev");
        assert_eq!(spec.seconds_per_slot, 12);
        assert_eq!(spec.bad_responses_threshold, 5);
        assert_eq!(spec.resp_timeout(), Duration::from_secs(10));
        assert_eq!(spec.epoch_at_slot(64), 2);
    }
}
