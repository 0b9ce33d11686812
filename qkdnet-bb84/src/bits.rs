//! Bits, bases, qubits and the seeded random streams that drive a run.

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha20Rng;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A classical bit, always `0` or `1`.
pub type Bit = u8;

/// Measurement / preparation frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum Basis {
    /// `|0⟩` / `|1⟩`, encoded as `0`.
    Rectilinear,
    /// `|+⟩` / `|-⟩`, encoded as `1`.
    Diagonal,
}

impl Basis {
    pub fn from_bit(bit: Bit) -> Self {
        if bit & 1 == 0 {
            Basis::Rectilinear
        } else {
            Basis::Diagonal
        }
    }

    pub fn as_bit(self) -> Bit {
        match self {
            Basis::Rectilinear => 0,
            Basis::Diagonal => 1,
        }
    }

    pub fn symbol(self) -> char {
        match self {
            Basis::Rectilinear => '+',
            Basis::Diagonal => 'x',
        }
    }
}

impl From<Basis> for u8 {
    fn from(basis: Basis) -> Self {
        basis.as_bit()
    }
}

impl TryFrom<u8> for Basis {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Basis::Rectilinear),
            1 => Ok(Basis::Diagonal),
            other => Err(format!("basis must be 0 or 1, got {other}")),
        }
    }
}

impl fmt::Display for Basis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Basis::Rectilinear => f.write_str("rectilinear"),
            Basis::Diagonal => f.write_str("diagonal"),
        }
    }
}

/// Classical encoding of a single BB84 qubit.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Qubit {
    pub bit: Bit,
    pub basis: Basis,
}

impl Qubit {
    pub fn new(bit: Bit, basis: Basis) -> Self {
        Self { bit: bit & 1, basis }
    }

    /// Ket label of the prepared state: `0`, `1`, `+` or `-`.
    pub fn state_label(&self) -> char {
        match (self.basis, self.bit) {
            (Basis::Rectilinear, 0) => '0',
            (Basis::Rectilinear, _) => '1',
            (Basis::Diagonal, 0) => '+',
            (Basis::Diagonal, _) => '-',
        }
    }

    /// Measure in `basis`. A matching frame returns the encoded bit, a
    /// conjugate frame collapses to a uniformly random outcome drawn from
    /// `collapse`.
    pub fn measure(&self, basis: Basis, collapse: &mut BitSource) -> Bit {
        if basis == self.basis {
            self.bit
        } else {
            collapse.next_bit()
        }
    }
}

/// Logical owner of a random stream.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Alice,
    Bob,
    Eve,
    /// Detector randomness when Bob measures in the conjugate basis.
    Channel,
    /// Bit flips injected on the classical ciphertext channel.
    Classical,
}

impl Role {
    fn stream_id(self) -> u64 {
        match self {
            Role::Alice => 1,
            Role::Bob => 2,
            Role::Eve => 3,
            Role::Channel => 4,
            Role::Classical => 5,
        }
    }
}

/// Uniform generator of bits and bases backed by a seedable ChaCha20 stream.
///
/// Not a cryptographic key source; it only has to be uniform and replayable.
#[derive(Clone, Debug)]
pub struct BitSource {
    rng: ChaCha20Rng,
}

impl BitSource {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: ChaCha20Rng::seed_from_u64(seed),
        }
    }

    /// Stream for `role`, independent from the other roles derived from the
    /// same seed.
    pub fn for_role(seed: u64, role: Role) -> Self {
        let mut rng = ChaCha20Rng::seed_from_u64(seed);
        rng.set_stream(role.stream_id());
        Self { rng }
    }

    pub fn from_entropy() -> Self {
        Self {
            rng: ChaCha20Rng::from_entropy(),
        }
    }

    pub fn next_bit(&mut self) -> Bit {
        self.rng.gen::<bool>() as Bit
    }

    pub fn next_bits(&mut self, n: usize) -> Vec<Bit> {
        (0..n).map(|_| self.next_bit()).collect()
    }

    pub fn next_basis(&mut self) -> Basis {
        Basis::from_bit(self.next_bit())
    }

    pub fn next_bases(&mut self, n: usize) -> Vec<Basis> {
        (0..n).map(|_| self.next_basis()).collect()
    }

    /// Child stream seeded from this one; advances `self` by one draw.
    pub fn fork(&mut self) -> BitSource {
        BitSource::new(self.rng.gen::<u64>())
    }

    /// Bernoulli trial with success probability `probability` (clamped to `[0, 1]`).
    pub fn flip(&mut self, probability: f64) -> bool {
        self.rng.gen_bool(probability.clamp(0.0, 1.0))
    }
}

/// The full set of per-role streams for one protocol run.
#[derive(Clone, Debug)]
pub struct RoleStreams {
    seed: u64,
    pub alice: BitSource,
    pub bob: BitSource,
    pub eve: BitSource,
    pub channel: BitSource,
    pub classical: BitSource,
}

impl RoleStreams {
    pub fn new(seed: u64) -> Self {
        Self {
            seed,
            alice: BitSource::for_role(seed, Role::Alice),
            bob: BitSource::for_role(seed, Role::Bob),
            eve: BitSource::for_role(seed, Role::Eve),
            channel: BitSource::for_role(seed, Role::Channel),
            classical: BitSource::for_role(seed, Role::Classical),
        }
    }

    /// Draw a fresh master seed from the OS so concurrent runs never share state.
    pub fn from_entropy() -> Self {
        let seed = ChaCha20Rng::from_entropy().gen::<u64>();
        Self::new(seed)
    }

    /// Master seed; feeding it back into [`RoleStreams::new`] replays the run.
    pub fn seed(&self) -> u64 {
        self.seed
    }

    pub fn source(&mut self, role: Role) -> &mut BitSource {
        match role {
            Role::Alice => &mut self.alice,
            Role::Bob => &mut self.bob,
            Role::Eve => &mut self.eve,
            Role::Channel => &mut self.channel,
            Role::Classical => &mut self.classical,
        }
    }
}
