//! Relational operations over participation bitlists.
//!
//! These are the admission predicates of the attestation pool, so they stay
//! word-wise over the underlying byte storage rather than iterating bits.

use ssz_types::{BitList, typenum::Unsigned};

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum BitsError {
    #[error("bitlist length mismatch: {left} != {right}")]
    LengthMismatch { left: usize, right: usize },
}

fn check_len<N: Unsigned>(a: &BitList<N>, b: &BitList<N>) -> Result<(), BitsError> {
    if a.len() != b.len() {
        return Err(BitsError::LengthMismatch {
            left: a.len(),
            right: b.len(),
        });
    }
    Ok(())
}

/// True when every participation bit set in `other` is also set in `bits`.
pub fn covers<N: Unsigned + Clone>(
    bits: &BitList<N>,
    other: &BitList<N>,
) -> Result<bool, BitsError> {
    check_len(bits, other)?;
    Ok(other.difference(bits).is_zero())
}

/// True when the two bitlists share at least one set bit.
pub fn overlaps<N: Unsigned + Clone>(a: &BitList<N>, b: &BitList<N>) -> Result<bool, BitsError> {
    check_len(a, b)?;
    Ok(!a.intersection(b).is_zero())
}

/// Union of two equal-length bitlists.
pub fn merge<N: Unsigned + Clone>(
    a: &BitList<N>,
    b: &BitList<N>,
) -> Result<BitList<N>, BitsError> {
    check_len(a, b)?;
    Ok(a.union(b))
}
