//! OPENQASM 2.0 description of a BB84 preparation and measurement.

use crate::bits::{Basis, Bit};
use crate::error::{ensure_len, Bb84Error, Bb84Result};

/// Build the circuit that prepares Alice's qubits and measures them in Bob's
/// bases. Qubit `i` is read into classical bit `i`.
pub fn bb84_qasm(alice_bits: &[Bit], alice_bases: &[Basis], bob_bases: &[Basis]) -> Bb84Result<String> {
    let n = alice_bits.len();
    if n == 0 {
        return Err(Bb84Error::InvalidParameter(
            "circuit needs at least one qubit".into(),
        ));
    }
    ensure_len("alice_bases", alice_bases, n)?;
    ensure_len("bob_bases", bob_bases, n)?;

    let mut qasm = format!(
        "OPENQASM 2.0;\ninclude \"qelib1.inc\";\n\nqreg q[{n}];\ncreg c[{n}];\n\n"
    );
    for (i, (bit, basis)) in alice_bits.iter().zip(alice_bases).enumerate() {
        if *bit == 1 {
            qasm.push_str(&format!("x q[{i}];\n"));
        }
        if *basis == Basis::Diagonal {
            qasm.push_str(&format!("h q[{i}];\n"));
        }
    }
    qasm.push_str("\n// Quantum channel transmission\n");
    qasm.push_str("// (In real implementation, qubits would be transmitted)\n\n");
    for (i, basis) in bob_bases.iter().enumerate() {
        if *basis == Basis::Diagonal {
            qasm.push_str(&format!("h q[{i}];\n"));
        }
    }
    for i in 0..n {
        qasm.push_str(&format!("measure q[{i}] -> c[{i}];\n"));
    }
    Ok(qasm)
}

#[cfg(test)]
mod tests {
    use super::*;
    use Basis::{Diagonal as D, Rectilinear as R};

    #[test]
    fn emits_preparation_then_measurement() {
        let qasm = bb84_qasm(&[1, 0], &[D, R], &[R, D]).unwrap();
        let expected = "OPENQASM 2.0;\ninclude \"qelib1.inc\";\n\nqreg q[2];\ncreg c[2];\n\n\
x q[0];\nh q[0];\n\n// Quantum channel transmission\n\
// (In real implementation, qubits would be transmitted)\n\n\
h q[1];\nmeasure q[0] -> c[0];\nmeasure q[1] -> c[1];\n";
        assert_eq!(qasm, expected);
    }

    #[test]
    fn rejects_empty_and_mismatched() {
        assert!(bb84_qasm(&[], &[], &[]).is_err());
        assert!(bb84_qasm(&[0, 1], &[R], &[R, R]).is_err());
    }
}
