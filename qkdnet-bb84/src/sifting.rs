//! Basis reconciliation and QBER estimation.

use serde::{Deserialize, Serialize};

use crate::bits::{Basis, Bit};
use crate::error::{ensure_len, Bb84Error, Bb84Result};

/// Everything the public discussion between Alice and Bob reveals.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SiftResult {
    pub matching_bases: Vec<bool>,
    /// Original positions of the retained bits, ascending.
    pub positions: Vec<usize>,
    pub sifted_alice: Vec<Bit>,
    pub sifted_bob: Vec<Bit>,
    pub errors: usize,
    /// `errors / sifted length`, or `0.0` when no basis matched.
    pub qber: f64,
}

impl SiftResult {
    pub fn sifted_len(&self) -> usize {
        self.sifted_alice.len()
    }
}

/// Keep the positions where both parties used the same basis and measure how
/// often their bits disagree there.
///
/// The whole sifted set is disclosed for the estimate. An empty sifted set
/// yields `qber == 0.0` rather than a division fault.
pub fn sift(
    alice_bases: &[Basis],
    bob_bases: &[Basis],
    alice_bits: &[Bit],
    bob_bits: &[Bit],
) -> Bb84Result<SiftResult> {
    let n = alice_bases.len();
    ensure_len("bob_bases", bob_bases, n)?;
    ensure_len("alice_bits", alice_bits, n)?;
    ensure_len("bob_bits", bob_bits, n)?;

    let matching_bases: Vec<bool> = alice_bases
        .iter()
        .zip(bob_bases)
        .map(|(alice, bob)| alice == bob)
        .collect();

    let positions: Vec<usize> = matching_bases
        .iter()
        .enumerate()
        .filter_map(|(idx, matched)| matched.then_some(idx))
        .collect();
    let sifted_alice: Vec<Bit> = positions.iter().map(|&idx| alice_bits[idx]).collect();
    let sifted_bob: Vec<Bit> = positions.iter().map(|&idx| bob_bits[idx]).collect();
    let errors = count_mismatches(&sifted_alice, &sifted_bob);
    assert_eq!(sifted_alice.len(), sifted_bob.len());

    Ok(SiftResult {
        qber: error_rate(errors, sifted_alice.len()),
        matching_bases,
        positions,
        sifted_alice,
        sifted_bob,
        errors,
    })
}

/// Fraction of differing positions between two equal-length bitstrings.
pub fn qber_between(expected: &[Bit], observed: &[Bit]) -> Bb84Result<f64> {
    if expected.len() != observed.len() {
        return Err(Bb84Error::InvalidParameter(format!(
            "key lengths must match ({} vs {})",
            expected.len(),
            observed.len()
        )));
    }
    Ok(error_rate(
        count_mismatches(expected, observed),
        expected.len(),
    ))
}

fn count_mismatches(left: &[Bit], right: &[Bit]) -> usize {
    left.iter().zip(right).filter(|(a, b)| a != b).count()
}

fn error_rate(errors: usize, total: usize) -> f64 {
    if total == 0 {
        0.0
    } else {
        errors as f64 / total as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const R: Basis = Basis::Rectilinear;
    const D: Basis = Basis::Diagonal;

    #[test]
    fn keeps_matching_positions_in_order() {
        let result = sift(
            &[R, D, D, R, D],
            &[R, R, D, D, D],
            &[1, 0, 1, 1, 0],
            &[1, 1, 0, 0, 0],
        )
        .unwrap();
        assert_eq!(result.matching_bases, vec![true, false, true, false, true]);
        assert_eq!(result.positions, vec![0, 2, 4]);
        assert_eq!(result.sifted_alice, vec![1, 1, 0]);
        assert_eq!(result.sifted_bob, vec![1, 0, 0]);
        assert_eq!(result.errors, 1);
        assert!((result.qber - 1.0 / 3.0).abs() < 1e-12);
    }

    #[test]
    fn empty_sift_reports_zero_qber() {
        let result = sift(&[R, R], &[D, D], &[0, 1], &[1, 0]).unwrap();
        assert_eq!(result.sifted_len(), 0);
        assert_eq!(result.qber, 0.0);
    }

    #[test]
    fn rejects_mismatched_inputs() {
        assert!(matches!(
            sift(&[R, R], &[R], &[0, 1], &[0, 1]),
            Err(Bb84Error::InvalidParameter(_))
        ));
        assert!(matches!(
            sift(&[R], &[R], &[0], &[0, 1]),
            Err(Bb84Error::InvalidParameter(_))
        ));
    }

    #[test]
    fn qber_between_counts_differences() {
        assert_eq!(qber_between(&[0, 1, 1, 0], &[0, 1, 0, 1]).unwrap(), 0.5);
        assert_eq!(qber_between(&[], &[]).unwrap(), 0.0);
        assert!(qber_between(&[0], &[0, 1]).is_err());
    }
}
