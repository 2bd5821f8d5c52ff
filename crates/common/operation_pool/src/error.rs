use selkie_consensus::aggregation::BitsError;

#[derive(Debug, thiserror::Error)]
pub enum AttestationPoolError {
    #[error("attestation is not unaggregated")]
    NotUnaggregated,

    #[error("attestation is not aggregated")]
    NotAggregated,

    #[error(transparent)]
    Bits(#[from] BitsError),

    #[error("failed to aggregate signatures: {0}")]
    Aggregation(anyhow::Error),
}
