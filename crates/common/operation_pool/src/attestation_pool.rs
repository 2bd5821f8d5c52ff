use std::{collections::HashMap, sync::Arc};

use alloy_primitives::B256;
use parking_lot::RwLock;
use selkie_consensus::{
    aggregation::{covers, merge},
    attestation::Attestation,
    bls::SignatureAggregator,
};
use tracing::debug;

use crate::error::AttestationPoolError;

type AttestationMap = HashMap<B256, Vec<Attestation>>;

/// Pool of attestations awaiting block inclusion, keyed by the root of their
/// attestation data.
///
/// Attestations move through three stores: `unaggregated` holds single votes
/// until a second vote for the same data arrives and the pair collapses into
/// an aggregate, `aggregated` holds aggregates the block producer may pack,
/// and `block` remembers aggregates already observed in a processed block.
pub struct AttestationPool {
    unaggregated: RwLock<AttestationMap>,
    aggregated: RwLock<AttestationMap>,
    block: RwLock<AttestationMap>,
    aggregator: Arc<dyn SignatureAggregator>,
    horizon_slots: u64,
}

impl AttestationPool {
    pub fn new(aggregator: Arc<dyn SignatureAggregator>, horizon_slots: u64) -> Self {
        AttestationPool {
            unaggregated: RwLock::new(HashMap::new()),
            aggregated: RwLock::new(HashMap::new()),
            block: RwLock::new(HashMap::new()),
            aggregator,
            horizon_slots,
        }
    }

    /// Inserts a single vote. A second vote for the same data is combined
    /// with the first and the pair is promoted to the aggregated store;
    /// re-inserting an equivalent vote is a no-op.
    pub fn insert_unaggregated(
        &self,
        attestation: Attestation,
    ) -> Result<(), AttestationPoolError> {
        if attestation.is_aggregated() {
            return Err(AttestationPoolError::NotUnaggregated);
        }
        let root = attestation.data_root();

        loop {
            let partner = self
                .unaggregated
                .read()
                .get(&root)
                .and_then(|attestations| attestations.first().cloned());

            match partner {
                None => {
                    let mut unaggregated = self.unaggregated.write();
                    match unaggregated.get_mut(&root) {
                        Some(attestations) if !attestations.is_empty() => {
                            // Another writer got here first, re-run against it.
                            continue;
                        }
                        Some(attestations) => {
                            attestations.push(attestation);
                            return Ok(());
                        }
                        None => {
                            unaggregated.insert(root, vec![attestation]);
                            return Ok(());
                        }
                    }
                }
                Some(existing) if existing.aggregation_bits == attestation.aggregation_bits => {
                    return Ok(());
                }
                Some(existing) => {
                    let aggregation_bits =
                        merge(&existing.aggregation_bits, &attestation.aggregation_bits)?;
                    // The combine runs on detached copies so no lock is held
                    // across the aggregator callback.
                    let signature = self
                        .aggregator
                        .aggregate(&[existing.signature, attestation.signature])
                        .map_err(AttestationPoolError::Aggregation)?;
                    let aggregate = Attestation {
                        aggregation_bits,
                        data: attestation.data.clone(),
                        signature,
                    };

                    // Both stores stay locked for the move, so an observer
                    // sees the vote pair or the aggregate, never neither.
                    let mut unaggregated = self.unaggregated.write();
                    let Some(attestations) = unaggregated.get_mut(&root) else {
                        continue;
                    };
                    if !attestations.contains(&existing) {
                        continue;
                    }
                    let mut aggregated = self.aggregated.write();
                    attestations.retain(|candidate| {
                        candidate != &existing && candidate != &attestation
                    });
                    if attestations.is_empty() {
                        unaggregated.remove(&root);
                    }
                    admit(aggregated.entry(root).or_default(), aggregate);
                    return Ok(());
                }
            }
        }
    }

    /// Inserts an aggregate. An input already covered by an existing entry is
    /// dropped; entries the input covers are replaced by it; overlapping but
    /// incomparable aggregates coexist.
    pub fn insert_aggregated(&self, attestation: Attestation) -> Result<(), AttestationPoolError> {
        if !attestation.is_aggregated() {
            return Err(AttestationPoolError::NotAggregated);
        }
        let root = attestation.data_root();
        let mut aggregated = self.aggregated.write();
        admit(aggregated.entry(root).or_default(), attestation);
        Ok(())
    }

    /// Inserts every aggregate in `attestations`, continuing past rejected
    /// entries. The first rejection, if any, is reported once the batch has
    /// been drained.
    pub fn insert_aggregated_batch(
        &self,
        attestations: Vec<Attestation>,
    ) -> Result<(), AttestationPoolError> {
        let mut first_error = None;
        for attestation in attestations {
            if let Err(err) = self.insert_aggregated(attestation) {
                debug!("attestation rejected by the pool: {err}");
                first_error.get_or_insert(err);
            }
        }
        match first_error {
            None => Ok(()),
            Some(err) => Err(err),
        }
    }

    /// Records an aggregate observed in a processed block. The matching entry
    /// in the aggregated store, if any, is kept until pruning.
    pub fn insert_block_attestation(
        &self,
        attestation: Attestation,
    ) -> Result<(), AttestationPoolError> {
        if !attestation.is_aggregated() {
            return Err(AttestationPoolError::NotAggregated);
        }
        let root = attestation.data_root();
        let mut block = self.block.write();
        admit(block.entry(root).or_default(), attestation);
        Ok(())
    }

    pub fn insert_block_attestations(
        &self,
        attestations: Vec<Attestation>,
    ) -> Result<(), AttestationPoolError> {
        let mut first_error = None;
        for attestation in attestations {
            if let Err(err) = self.insert_block_attestation(attestation) {
                debug!("block attestation rejected by the pool: {err}");
                first_error.get_or_insert(err);
            }
        }
        match first_error {
            None => Ok(()),
            Some(err) => Err(err),
        }
    }

    /// Owned snapshot of every aggregate available for block packing.
    pub fn aggregated_attestations(&self) -> Vec<Attestation> {
        self.aggregated
            .read()
            .values()
            .flat_map(|attestations| attestations.iter().cloned())
            .collect()
    }

    /// Owned snapshot of every pending single vote.
    pub fn unaggregated_attestations(&self) -> Vec<Attestation> {
        self.unaggregated
            .read()
            .values()
            .flat_map(|attestations| attestations.iter().cloned())
            .collect()
    }

    /// Owned snapshot of every aggregate seen in a block.
    pub fn block_attestations(&self) -> Vec<Attestation> {
        self.block
            .read()
            .values()
            .flat_map(|attestations| attestations.iter().cloned())
            .collect()
    }

    /// Whether the participation of `attestation` is already covered by an
    /// aggregate in the pool or in a processed block.
    pub fn has_aggregated_attestation(&self, attestation: &Attestation) -> bool {
        let root = attestation.data_root();
        let is_covered = |store: &AttestationMap| {
            store.get(&root).is_some_and(|attestations| {
                attestations.iter().any(|existing| {
                    covers(&existing.aggregation_bits, &attestation.aggregation_bits)
                        .unwrap_or(false)
                })
            })
        };
        is_covered(&self.aggregated.read()) || is_covered(&self.block.read())
    }

    /// Removes the exact aggregate, if present.
    pub fn delete_aggregated(&self, attestation: &Attestation) {
        delete_exact(&mut self.aggregated.write(), attestation);
    }

    /// Removes the exact single vote, if present.
    pub fn delete_unaggregated(&self, attestation: &Attestation) {
        delete_exact(&mut self.unaggregated.write(), attestation);
    }

    /// Drops every attestation voting for a slot before `slot`.
    pub fn prune_before(&self, slot: u64) {
        let mut removed = 0usize;
        for store in [&self.unaggregated, &self.aggregated, &self.block] {
            let mut store = store.write();
            store.retain(|_, attestations| {
                let before = attestations.len();
                attestations.retain(|attestation| attestation.data.slot >= slot);
                removed += before - attestations.len();
                !attestations.is_empty()
            });
        }
        if removed > 0 {
            debug!("pruned {removed} attestations older than slot {slot}");
        }
    }

    /// Expires everything older than the configured horizon behind `head_slot`.
    pub fn prune_expired(&self, head_slot: u64) {
        self.prune_before(head_slot.saturating_sub(self.horizon_slots));
    }

    pub fn aggregated_attestation_count(&self) -> usize {
        self.aggregated.read().values().map(Vec::len).sum()
    }

    pub fn unaggregated_attestation_count(&self) -> usize {
        self.unaggregated.read().values().map(Vec::len).sum()
    }
}

/// Superset-wins admission into one fingerprint's list: a covered input is
/// dropped, entries the input covers are evicted, everything else coexists.
/// Bitlists of mismatched length never cover each other.
fn admit(attestations: &mut Vec<Attestation>, attestation: Attestation) {
    for existing in attestations.iter() {
        if covers(&existing.aggregation_bits, &attestation.aggregation_bits).unwrap_or(false) {
            return;
        }
    }
    attestations.retain(|existing| {
        !covers(&attestation.aggregation_bits, &existing.aggregation_bits).unwrap_or(false)
    });
    attestations.push(attestation);
}

fn delete_exact(store: &mut AttestationMap, attestation: &Attestation) {
    let root = attestation.data_root();
    if let Some(attestations) = store.get_mut(&root) {
        attestations.retain(|existing| existing != attestation);
        if attestations.is_empty() {
            store.remove(&root);
        }
    }
}

#[cfg(test)]
mod tests {
    use alloy_primitives::FixedBytes;
    use selkie_consensus::{
        attestation::AggregationBits,
        attestation_data::AttestationData,
        bls::BlsSignature,
    };
    use selkie_network_spec::NetworkSpec;

    use super::*;

    /// Stand-in for the BLS backend: byte-wise XOR keeps combines observable
    /// without real cryptography.
    struct XorAggregator;

    impl SignatureAggregator for XorAggregator {
        fn aggregate(&self, signatures: &[BlsSignature]) -> anyhow::Result<BlsSignature> {
            let mut combined = [0u8; 96];
            for signature in signatures {
                for (byte, signature_byte) in combined.iter_mut().zip(signature.0.iter()) {
                    *byte ^= signature_byte;
                }
            }
            Ok(BlsSignature(FixedBytes::from(combined)))
        }
    }

    fn test_pool() -> AttestationPool {
        let spec = NetworkSpec::dev();
        AttestationPool::new(Arc::new(XorAggregator), spec.attestation_horizon_slots)
    }

    fn aggregation_bits(len: usize, set: &[usize]) -> AggregationBits {
        let mut bits = AggregationBits::with_capacity(len).unwrap();
        for index in set {
            bits.set(*index, true).unwrap();
        }
        bits
    }

    fn attestation(slot: u64, len: usize, set: &[usize]) -> Attestation {
        Attestation {
            aggregation_bits: aggregation_bits(len, set),
            data: AttestationData {
                slot,
                ..AttestationData::default()
            },
            signature: BlsSignature::empty(),
        }
    }

    fn signed(mut attestation: Attestation, fill: u8) -> Attestation {
        attestation.signature = BlsSignature(FixedBytes::repeat_byte(fill));
        attestation
    }

    #[test]
    fn aggregated_insert_rejects_single_votes() {
        let pool = test_pool();

        let err = pool.insert_aggregated(attestation(1, 8, &[0])).unwrap_err();
        assert_eq!(err.to_string(), "attestation is not aggregated");
        assert!(pool.aggregated_attestations().is_empty());
    }

    #[test]
    fn unaggregated_insert_rejects_aggregates() {
        let pool = test_pool();

        let err = pool
            .insert_unaggregated(attestation(1, 8, &[0, 1]))
            .unwrap_err();
        assert_eq!(err.to_string(), "attestation is not unaggregated");
        assert!(pool.unaggregated_attestations().is_empty());
    }

    #[test]
    fn aggregates_with_distinct_data_are_all_kept() {
        let pool = test_pool();

        for slot in 1..=3 {
            pool.insert_aggregated(attestation(slot, 8, &[0, 2, 3])).unwrap();
        }

        let mut returned = pool.aggregated_attestations();
        returned.sort_by_key(|attestation| attestation.data.slot);
        assert_eq!(
            returned,
            vec![
                attestation(1, 8, &[0, 2, 3]),
                attestation(2, 8, &[0, 2, 3]),
                attestation(3, 8, &[0, 2, 3]),
            ]
        );
        assert_eq!(pool.aggregated_attestation_count(), 3);
    }

    #[test]
    fn delete_aggregated_removes_exact_entries_only() {
        let pool = test_pool();

        for slot in 1..=3 {
            pool.insert_aggregated(attestation(slot, 8, &[0, 2, 3])).unwrap();
        }
        pool.delete_aggregated(&attestation(1, 8, &[0, 2, 3]));
        pool.delete_aggregated(&attestation(3, 8, &[0, 2, 3]));
        // Absent entries are a silent no-op.
        pool.delete_aggregated(&attestation(9, 8, &[0, 2, 3]));

        assert_eq!(pool.aggregated_attestations(), vec![attestation(2, 8, &[0, 2, 3])]);
    }

    #[test]
    fn covered_aggregate_is_dropped() {
        let pool = test_pool();

        pool.insert_aggregated(attestation(1, 8, &[3, 4, 5, 6])).unwrap();
        pool.insert_aggregated(attestation(1, 8, &[5, 6])).unwrap();

        assert_eq!(pool.aggregated_attestations(), vec![attestation(1, 8, &[3, 4, 5, 6])]);
        assert!(pool.has_aggregated_attestation(&attestation(1, 8, &[5, 6])));
    }

    #[test]
    fn superset_replaces_covered_aggregates() {
        let pool = test_pool();

        pool.insert_aggregated(attestation(1, 8, &[5, 6])).unwrap();
        pool.insert_aggregated(attestation(1, 8, &[3, 4, 5, 6])).unwrap();

        assert_eq!(pool.aggregated_attestations(), vec![attestation(1, 8, &[3, 4, 5, 6])]);
    }

    #[test]
    fn incomparable_aggregates_coexist() {
        let pool = test_pool();

        pool.insert_aggregated(attestation(1, 8, &[3, 4, 5, 6])).unwrap();
        pool.insert_aggregated(attestation(1, 8, &[0, 1, 2, 6])).unwrap();

        assert_eq!(pool.aggregated_attestation_count(), 2);
        assert!(pool.has_aggregated_attestation(&attestation(1, 8, &[6])));
        assert!(!pool.has_aggregated_attestation(&attestation(1, 8, &[0, 1, 2, 3, 4, 5, 6])));
    }

    #[test]
    fn equivalent_aggregates_are_never_duplicated() {
        let pool = test_pool();

        pool.insert_aggregated(attestation(1, 8, &[0, 1])).unwrap();
        pool.insert_aggregated(attestation(1, 8, &[0, 1])).unwrap();

        assert_eq!(pool.aggregated_attestation_count(), 1);
    }

    #[test]
    fn has_aggregated_attestation_table() {
        struct Case {
            name: &'static str,
            existing: Vec<Attestation>,
            input: Attestation,
            want: bool,
        }

        let cases = [
            Case {
                name: "empty pool",
                existing: vec![],
                input: attestation(1, 8, &[0, 1, 2, 3]),
                want: false,
            },
            Case {
                name: "exact match",
                existing: vec![attestation(1, 8, &[0, 1, 2, 3])],
                input: attestation(1, 8, &[0, 1, 2, 3]),
                want: true,
            },
            Case {
                name: "subset of one entry",
                existing: vec![attestation(1, 8, &[0, 1, 2, 3])],
                input: attestation(1, 8, &[1, 2, 3]),
                want: true,
            },
            Case {
                name: "superset of every entry",
                existing: vec![attestation(1, 8, &[1, 2, 3])],
                input: attestation(1, 8, &[0, 1, 2, 3]),
                want: false,
            },
            Case {
                name: "subset of one of two overlapping entries",
                existing: vec![
                    attestation(1, 8, &[3, 4, 5, 6]),
                    attestation(1, 8, &[0, 1, 2, 6]),
                ],
                input: attestation(1, 8, &[5, 6]),
                want: true,
            },
            Case {
                name: "superset of two overlapping entries",
                existing: vec![
                    attestation(1, 8, &[3, 4, 5, 6]),
                    attestation(1, 8, &[0, 1, 2, 6]),
                ],
                input: attestation(1, 8, &[0, 1, 2, 3, 4, 5, 6]),
                want: false,
            },
            Case {
                name: "different attestation data",
                existing: vec![
                    attestation(2, 8, &[3, 4, 5, 6]),
                    attestation(3, 8, &[0, 1, 2, 6]),
                ],
                input: attestation(1, 8, &[3, 4]),
                want: false,
            },
        ];

        for case in cases {
            let pool = test_pool();
            pool.insert_aggregated_batch(case.existing.clone()).unwrap();
            assert_eq!(
                pool.has_aggregated_attestation(&case.input),
                case.want,
                "aggregated store: {}",
                case.name
            );

            // Aggregates seen in blocks answer the same way.
            let pool = test_pool();
            pool.insert_block_attestations(case.existing.clone()).unwrap();
            assert_eq!(
                pool.has_aggregated_attestation(&case.input),
                case.want,
                "block store: {}",
                case.name
            );
        }
    }

    #[test]
    fn batch_insert_continues_past_rejected_entries() {
        let pool = test_pool();

        let err = pool
            .insert_aggregated_batch(vec![
                attestation(1, 8, &[0, 1]),
                attestation(2, 8, &[4]),
                attestation(3, 8, &[2, 3]),
            ])
            .unwrap_err();

        assert_eq!(err.to_string(), "attestation is not aggregated");
        assert_eq!(pool.aggregated_attestation_count(), 2);
    }

    #[test]
    fn second_single_vote_promotes_an_aggregate() {
        let pool = test_pool();

        pool.insert_unaggregated(signed(attestation(1, 8, &[2]), 0x01)).unwrap();
        pool.insert_unaggregated(signed(attestation(1, 8, &[5]), 0x02)).unwrap();

        assert!(pool.unaggregated_attestations().is_empty());
        let aggregated = pool.aggregated_attestations();
        assert_eq!(aggregated.len(), 1);
        assert_eq!(aggregated[0].aggregation_bits, aggregation_bits(8, &[2, 5]));
        // XOR of the two test signatures.
        assert_eq!(aggregated[0].signature, BlsSignature(FixedBytes::repeat_byte(0x03)));
    }

    #[test]
    fn equivalent_single_vote_is_a_no_op() {
        let pool = test_pool();

        pool.insert_unaggregated(attestation(1, 8, &[2])).unwrap();
        pool.insert_unaggregated(attestation(1, 8, &[2])).unwrap();

        assert_eq!(pool.unaggregated_attestation_count(), 1);
        assert!(pool.aggregated_attestations().is_empty());
    }

    #[test]
    fn single_votes_for_distinct_data_do_not_combine() {
        let pool = test_pool();

        pool.insert_unaggregated(attestation(1, 8, &[2])).unwrap();
        pool.insert_unaggregated(attestation(2, 8, &[5])).unwrap();

        assert_eq!(pool.unaggregated_attestation_count(), 2);
        assert!(pool.aggregated_attestations().is_empty());
    }

    #[test]
    fn delete_unaggregated_is_inverse_of_insert() {
        let pool = test_pool();

        pool.insert_unaggregated(attestation(1, 8, &[2])).unwrap();
        pool.delete_unaggregated(&attestation(1, 8, &[2]));

        assert!(pool.unaggregated_attestations().is_empty());
    }

    #[test]
    fn delete_aggregated_then_query_is_false() {
        let pool = test_pool();

        pool.insert_aggregated(attestation(1, 8, &[0, 1])).unwrap();
        pool.delete_aggregated(&attestation(1, 8, &[0, 1]));

        assert!(!pool.has_aggregated_attestation(&attestation(1, 8, &[0, 1])));
    }

    #[test]
    fn prune_drops_old_slots_across_all_stores() {
        let pool = test_pool();

        pool.insert_unaggregated(attestation(10, 8, &[0])).unwrap();
        pool.insert_aggregated(attestation(11, 8, &[0, 1])).unwrap();
        pool.insert_aggregated(attestation(90, 8, &[0, 1])).unwrap();
        pool.insert_block_attestation(attestation(12, 8, &[2, 3])).unwrap();

        pool.prune_expired(90 + NetworkSpec::dev().attestation_horizon_slots);

        assert!(pool.unaggregated_attestations().is_empty());
        assert_eq!(pool.aggregated_attestations(), vec![attestation(90, 8, &[0, 1])]);
        assert!(pool.block_attestations().is_empty());
    }

    #[test]
    fn promotion_is_atomic_to_observers() {
        for round in 0..100u64 {
            let pool = Arc::new(test_pool());
            let slot = round + 1;

            std::thread::scope(|scope| {
                let writer_pool = pool.clone();
                scope.spawn(move || {
                    writer_pool.insert_unaggregated(attestation(slot, 8, &[0])).unwrap();
                    writer_pool.insert_unaggregated(attestation(slot, 8, &[1])).unwrap();
                });

                let reader_pool = pool.clone();
                scope.spawn(move || {
                    for _ in 0..100 {
                        let unaggregated = reader_pool.unaggregated_attestation_count();
                        let aggregated = reader_pool.aggregated_attestation_count();
                        // The pair and its aggregate are never visible at
                        // once, and votes never vanish mid-promotion.
                        assert!(!(unaggregated > 0 && aggregated > 0));
                        if aggregated > 0 {
                            break;
                        }
                    }
                });
            });

            assert_eq!(pool.unaggregated_attestation_count(), 0);
            assert_eq!(pool.aggregated_attestation_count(), 1);
        }
    }

    #[test]
    fn concurrent_writers_preserve_admission_invariants() {
        let pool = Arc::new(test_pool());

        std::thread::scope(|scope| {
            for worker in 0..4u64 {
                let pool = pool.clone();
                scope.spawn(move || {
                    for step in 0..50usize {
                        let slot = worker * 8 + (step % 8) as u64;
                        pool.insert_aggregated(attestation(
                            slot,
                            16,
                            &[step % 14, step % 14 + 1, step % 7],
                        ))
                        .unwrap();
                    }
                });
            }

            let pool = pool.clone();
            scope.spawn(move || {
                for _ in 0..200 {
                    for snapshot in pool.aggregated_attestations() {
                        assert!(snapshot.is_aggregated());
                    }
                }
            });
        });

        // No entry may cover another entry with the same data.
        let snapshot = pool.aggregated_attestations();
        for left in &snapshot {
            for right in &snapshot {
                if left != right && left.data == right.data {
                    assert!(!covers(&left.aggregation_bits, &right.aggregation_bits).unwrap());
                }
            }
        }
    }
}
