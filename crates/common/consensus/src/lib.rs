pub mod aggregation;
pub mod attestation;
pub mod attestation_data;
pub mod bls;
pub mod checkpoint;
pub mod fork_data;
pub mod misc;
