//! One BB84 execution from preparation to the key decision.

use serde::{Deserialize, Serialize};
use sha3::{Digest, Sha3_256};
use tracing::{info, warn};

use crate::bits::{Basis, Bit, BitSource, RoleStreams};
use crate::channel::{ChannelSimulator, Eavesdropper};
use crate::error::{ensure_len, Bb84Error, Bb84Result};
use crate::key::{KeyDecision, KeyExtractor, KeyStatus, QBER_THRESHOLD};
use crate::sifting::{self, SiftResult};

/// Protocol state machine. Transitions only move forward; going back means
/// starting a new run.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "phase", content = "status")]
pub enum ProtocolPhase {
    Idle,
    Preparing,
    Transmitting,
    Sifting,
    KeyDecided(KeyStatus),
    Messaging,
}

impl ProtocolPhase {
    pub fn can_advance_to(self, next: ProtocolPhase) -> bool {
        use ProtocolPhase::*;
        matches!(
            (self, next),
            (Idle, Preparing)
                | (Preparing, Transmitting)
                | (Transmitting, Sifting)
                | (Sifting, KeyDecided(_))
                | (KeyDecided(KeyStatus::Secure), Messaging)
                | (Messaging, Messaging)
        )
    }
}

/// Records every phase a run passes through.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhaseTracker {
    history: Vec<ProtocolPhase>,
}

impl Default for PhaseTracker {
    fn default() -> Self {
        Self {
            history: vec![ProtocolPhase::Idle],
        }
    }
}

impl PhaseTracker {
    pub fn current(&self) -> ProtocolPhase {
        self.history
            .last()
            .copied()
            .unwrap_or(ProtocolPhase::Idle)
    }

    pub fn history(&self) -> &[ProtocolPhase] {
        &self.history
    }

    pub(crate) fn advance(&mut self, next: ProtocolPhase) {
        let current = self.current();
        assert!(
            current.can_advance_to(next),
            "illegal protocol transition {current:?} -> {next:?}"
        );
        if !(current == ProtocolPhase::Messaging && next == ProtocolPhase::Messaging) {
            self.history.push(next);
        }
    }
}

/// Every random choice of a run that is made before transmission.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProtocolInputs {
    pub alice_bits: Vec<Bit>,
    pub alice_bases: Vec<Basis>,
    pub bob_bases: Vec<Basis>,
    /// Present iff the quantum channel is intercepted.
    pub eve_bases: Option<Vec<Basis>>,
}

impl ProtocolInputs {
    pub fn draw(key_length: u32, eve_enabled: bool, streams: &mut RoleStreams) -> Bb84Result<Self> {
        let n = validate_key_length(key_length)?;
        Ok(Self {
            alice_bits: streams.alice.next_bits(n),
            alice_bases: streams.alice.next_bases(n),
            bob_bases: streams.bob.next_bases(n),
            eve_bases: eve_enabled.then(|| streams.eve.next_bases(n)),
        })
    }

    pub fn len(&self) -> usize {
        self.alice_bits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.alice_bits.is_empty()
    }

    fn validate(&self) -> Bb84Result<()> {
        let n = self.len();
        if n == 0 {
            return Err(Bb84Error::InvalidParameter(
                "key length must be a positive integer".into(),
            ));
        }
        if let Some(bad) = self.alice_bits.iter().find(|bit| **bit > 1) {
            return Err(Bb84Error::InvalidParameter(format!(
                "alice bits must be 0 or 1, got {bad}"
            )));
        }
        ensure_len("alice_bases", &self.alice_bases, n)?;
        ensure_len("bob_bases", &self.bob_bases, n)?;
        if let Some(eve_bases) = &self.eve_bases {
            ensure_len("eve_bases", eve_bases, n)?;
        }
        Ok(())
    }
}

fn validate_key_length(key_length: u32) -> Bb84Result<usize> {
    if key_length == 0 {
        return Err(Bb84Error::InvalidParameter(
            "key length must be a positive integer".into(),
        ));
    }
    Ok(key_length as usize)
}

/// Per-position trace entry.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransmissionRecord {
    pub position: usize,
    pub alice_bit: Bit,
    pub alice_basis: Basis,
    pub bob_basis: Basis,
    pub bob_bit: Bit,
    pub intercepted: bool,
    pub eve_basis: Option<Basis>,
    pub bases_match: bool,
}

/// Summary counters for dashboards and logs.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct RunStats {
    pub raw_key_length: usize,
    pub sifted_length: usize,
    pub final_key_length: usize,
    pub errors: usize,
    pub interceptions: usize,
    pub qber: f64,
    pub qber_threshold: f64,
    /// Sifted bits per transmitted qubit.
    pub efficiency: f64,
}

/// A completed, immutable protocol run.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ProtocolRun {
    seed: Option<u64>,
    inputs: ProtocolInputs,
    records: Vec<TransmissionRecord>,
    sift: SiftResult,
    decision: KeyDecision,
    phases: PhaseTracker,
}

/// Run BB84 over `key_length` qubits with randomness drawn from `streams`.
///
/// Deterministic for a given stream state; `key_length == 0` is rejected.
pub fn run_protocol(
    key_length: u32,
    eve_enabled: bool,
    streams: &mut RoleStreams,
) -> Bb84Result<ProtocolRun> {
    let inputs = ProtocolInputs::draw(key_length, eve_enabled, streams)?;
    let mut run = ProtocolRun::execute(inputs, &mut streams.channel)?;
    run.seed = Some(streams.seed());
    Ok(run)
}

impl ProtocolRun {
    /// Re-execute recorded inputs. The same inputs and the same `collapse`
    /// stream state reproduce the sifted key and QBER exactly.
    pub fn replay(inputs: ProtocolInputs, collapse: &mut BitSource) -> Bb84Result<Self> {
        Self::execute(inputs, collapse)
    }

    fn execute(inputs: ProtocolInputs, collapse: &mut BitSource) -> Bb84Result<Self> {
        inputs.validate()?;
        let mut phases = PhaseTracker::default();

        phases.advance(ProtocolPhase::Preparing);
        let eve = inputs.eve_bases.clone().map(Eavesdropper::with_bases);

        phases.advance(ProtocolPhase::Transmitting);
        let output = ChannelSimulator::new(collapse).transmit(
            &inputs.alice_bits,
            &inputs.alice_bases,
            &inputs.bob_bases,
            eve.as_ref(),
        )?;

        phases.advance(ProtocolPhase::Sifting);
        let sift = sifting::sift(
            &inputs.alice_bases,
            &inputs.bob_bases,
            &inputs.alice_bits,
            &output.bob_bits,
        )?;

        let decision = KeyExtractor::default().decide(&sift.sifted_alice, sift.qber);
        phases.advance(ProtocolPhase::KeyDecided(decision.status));

        let records = (0..inputs.len())
            .map(|position| TransmissionRecord {
                position,
                alice_bit: inputs.alice_bits[position],
                alice_basis: inputs.alice_bases[position],
                bob_basis: inputs.bob_bases[position],
                bob_bit: output.bob_bits[position],
                intercepted: output.intercepted[position],
                eve_basis: inputs.eve_bases.as_ref().map(|bases| bases[position]),
                bases_match: sift.matching_bases[position],
            })
            .collect();

        let run = Self {
            seed: None,
            inputs,
            records,
            sift,
            decision,
            phases,
        };
        match run.status() {
            KeyStatus::Secure => info!(
                qubits = run.records.len(),
                sifted = run.sift.sifted_len(),
                qber = run.qber(),
                "bb84 run produced a secure key"
            ),
            KeyStatus::Compromised => warn!(
                qubits = run.records.len(),
                sifted = run.sift.sifted_len(),
                qber = run.qber(),
                threshold = QBER_THRESHOLD,
                "bb84 run compromised; key discarded"
            ),
        }
        Ok(run)
    }

    /// Master seed of the streams the run was drawn from, when known.
    pub fn seed(&self) -> Option<u64> {
        self.seed
    }

    pub fn inputs(&self) -> &ProtocolInputs {
        &self.inputs
    }

    pub fn records(&self) -> &[TransmissionRecord] {
        &self.records
    }

    pub fn sift(&self) -> &SiftResult {
        &self.sift
    }

    pub fn decision(&self) -> &KeyDecision {
        &self.decision
    }

    pub fn phases(&self) -> &PhaseTracker {
        &self.phases
    }

    pub fn key_length(&self) -> usize {
        self.records.len()
    }

    pub fn bob_bits(&self) -> Vec<Bit> {
        self.records.iter().map(|record| record.bob_bit).collect()
    }

    pub fn sifted_key(&self) -> &[Bit] {
        &self.sift.sifted_alice
    }

    pub fn qber(&self) -> f64 {
        self.sift.qber
    }

    pub fn status(&self) -> KeyStatus {
        self.decision.status
    }

    pub fn final_key(&self) -> &[Bit] {
        &self.decision.final_key
    }

    /// SHA3-256 of the final key, hex encoded. Safe to log.
    pub fn key_fingerprint(&self) -> Option<String> {
        if self.decision.final_key.is_empty() {
            return None;
        }
        let digest = Sha3_256::digest(&self.decision.final_key);
        Some(hex::encode(digest))
    }

    pub fn stats(&self) -> RunStats {
        let raw = self.records.len();
        let sifted = self.sift.sifted_len();
        RunStats {
            raw_key_length: raw,
            sifted_length: sifted,
            final_key_length: self.decision.final_key.len(),
            errors: self.sift.errors,
            interceptions: self.records.iter().filter(|r| r.intercepted).count(),
            qber: self.sift.qber,
            qber_threshold: self.decision.threshold,
            efficiency: sifted as f64 / raw as f64,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_length_is_rejected() {
        let mut streams = RoleStreams::new(1);
        assert!(matches!(
            run_protocol(0, false, &mut streams),
            Err(Bb84Error::InvalidParameter(_))
        ));
    }

    #[test]
    fn honest_run_is_secure_with_zero_qber() {
        let mut streams = RoleStreams::new(5);
        let run = run_protocol(16, false, &mut streams).unwrap();
        assert_eq!(run.qber(), 0.0);
        assert_eq!(run.status(), KeyStatus::Secure);
        assert_eq!(run.final_key(), run.sifted_key());
        assert_eq!(run.key_length(), 16);
        assert_eq!(run.seed(), Some(5));
    }

    #[test]
    fn phase_trace_ends_with_decision() {
        let mut streams = RoleStreams::new(6);
        let run = run_protocol(32, false, &mut streams).unwrap();
        assert_eq!(
            run.phases().history(),
            &[
                ProtocolPhase::Idle,
                ProtocolPhase::Preparing,
                ProtocolPhase::Transmitting,
                ProtocolPhase::Sifting,
                ProtocolPhase::KeyDecided(KeyStatus::Secure),
            ]
        );
    }

    #[test]
    fn transitions_only_move_forward() {
        use ProtocolPhase::*;
        assert!(Idle.can_advance_to(Preparing));
        assert!(KeyDecided(KeyStatus::Secure).can_advance_to(Messaging));
        assert!(Messaging.can_advance_to(Messaging));
        assert!(!KeyDecided(KeyStatus::Compromised).can_advance_to(Messaging));
        assert!(!Sifting.can_advance_to(Transmitting));
        assert!(!Idle.can_advance_to(Sifting));
    }

    #[test]
    #[should_panic(expected = "illegal protocol transition")]
    fn tracker_refuses_regression() {
        let mut tracker = PhaseTracker::default();
        tracker.advance(ProtocolPhase::Preparing);
        tracker.advance(ProtocolPhase::Idle);
    }

    #[test]
    fn replay_reproduces_key_and_qber() {
        let mut streams = RoleStreams::new(77);
        let run = run_protocol(256, true, &mut streams).unwrap();

        let mut collapse = RoleStreams::new(77).channel;
        let replayed = ProtocolRun::replay(run.inputs().clone(), &mut collapse).unwrap();
        assert_eq!(replayed.sifted_key(), run.sifted_key());
        assert_eq!(replayed.qber(), run.qber());
        assert_eq!(replayed.records(), run.records());
    }

    #[test]
    fn replay_rejects_inconsistent_inputs() {
        let inputs = ProtocolInputs {
            alice_bits: vec![0, 1],
            alice_bases: vec![Basis::Rectilinear, Basis::Diagonal],
            bob_bases: vec![Basis::Rectilinear],
            eve_bases: None,
        };
        let err = ProtocolRun::replay(inputs, &mut BitSource::new(1)).unwrap_err();
        assert!(matches!(err, Bb84Error::InvalidParameter(_)));
    }

    #[test]
    fn records_mirror_inputs() {
        let mut streams = RoleStreams::new(8);
        let run = run_protocol(64, true, &mut streams).unwrap();
        let eve_bases = run.inputs().eve_bases.clone().unwrap();
        for record in run.records() {
            assert_eq!(record.alice_bit, run.inputs().alice_bits[record.position]);
            assert_eq!(record.eve_basis, Some(eve_bases[record.position]));
            assert!(record.intercepted);
            assert_eq!(
                record.bases_match,
                record.alice_basis == record.bob_basis
            );
        }
    }

    #[test]
    fn stats_and_fingerprint() {
        let mut streams = RoleStreams::new(9);
        let run = run_protocol(128, false, &mut streams).unwrap();
        let stats = run.stats();
        assert_eq!(stats.raw_key_length, 128);
        assert_eq!(stats.sifted_length, run.sifted_key().len());
        assert_eq!(stats.interceptions, 0);
        assert_eq!(stats.qber_threshold, QBER_THRESHOLD);
        let fingerprint = run.key_fingerprint().unwrap();
        assert_eq!(fingerprint.len(), 64);
    }
}
