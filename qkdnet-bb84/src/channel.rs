//! Quantum channel emulation with an optional intercept-resend attacker.

use serde::{Deserialize, Serialize};

use crate::bits::{Basis, Bit, BitSource, Qubit};
use crate::error::{ensure_len, Bb84Result};

/// Intercept-resend attacker sitting on the quantum channel.
///
/// Eve's interception bases are drawn up front so a run can be replayed from
/// its recorded plan. Her measurement outcomes collapse on the channel's own
/// randomness.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Eavesdropper {
    bases: Vec<Basis>,
}

impl Eavesdropper {
    /// Draw `n` interception bases from Eve's stream.
    pub fn new(source: &mut BitSource, n: usize) -> Self {
        Self {
            bases: source.next_bases(n),
        }
    }

    /// Replay a recorded interception plan.
    pub fn with_bases(bases: Vec<Basis>) -> Self {
        Self { bases }
    }

    pub fn bases(&self) -> &[Basis] {
        &self.bases
    }

    /// Measure the qubit at `position` and resend what Eve learned.
    ///
    /// Same basis as Alice: the original qubit goes on undisturbed. Conjugate
    /// basis: Eve's outcome is random and she resends it in her own basis.
    pub fn intercept(&self, position: usize, qubit: Qubit, collapse: &mut BitSource) -> Qubit {
        let basis = self.bases[position];
        let observed = qubit.measure(basis, collapse);
        Qubit::new(observed, basis)
    }
}

/// Bob's view of the channel plus diagnostics the sifter never sees.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelOutput {
    pub bob_bits: Vec<Bit>,
    pub intercepted: Vec<bool>,
    pub eve_bases: Option<Vec<Basis>>,
}

impl ChannelOutput {
    pub fn interceptions(&self) -> usize {
        self.intercepted.iter().filter(|hit| **hit).count()
    }
}

/// Noiseless quantum channel.
///
/// `collapse` supplies every random measurement outcome on the channel: Eve's
/// conjugate-basis interceptions and Bob's conjugate-basis detections.
#[derive(Debug)]
pub struct ChannelSimulator<'a> {
    collapse: &'a mut BitSource,
}

impl<'a> ChannelSimulator<'a> {
    pub fn new(collapse: &'a mut BitSource) -> Self {
        Self { collapse }
    }

    pub fn transmit(
        &mut self,
        alice_bits: &[Bit],
        alice_bases: &[Basis],
        bob_bases: &[Basis],
        eve: Option<&Eavesdropper>,
    ) -> Bb84Result<ChannelOutput> {
        let n = alice_bits.len();
        ensure_len("alice_bases", alice_bases, n)?;
        ensure_len("bob_bases", bob_bases, n)?;
        if let Some(eve) = eve {
            ensure_len("eve_bases", eve.bases(), n)?;
        }

        let mut bob_bits = Vec::with_capacity(n);
        let mut intercepted = Vec::with_capacity(n);
        for position in 0..n {
            let mut qubit = Qubit::new(alice_bits[position], alice_bases[position]);
            if let Some(eve) = eve {
                qubit = eve.intercept(position, qubit, &mut *self.collapse);
            }
            intercepted.push(eve.is_some());
            bob_bits.push(qubit.measure(bob_bases[position], &mut *self.collapse));
        }

        Ok(ChannelOutput {
            bob_bits,
            intercepted,
            eve_bases: eve.map(|eve| eve.bases().to_vec()),
        })
    }
}
