pub mod attestation_pool;
pub mod error;

pub use attestation_pool::AttestationPool;
pub use error::AttestationPoolError;
