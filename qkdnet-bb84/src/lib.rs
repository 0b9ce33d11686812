//! BB84 quantum key distribution simulated at the classical bit/basis level.
//!
//! A run draws Alice's bits and bases, Bob's bases and optionally an
//! intercept-resend plan for Eve from independent ChaCha streams, pushes the
//! qubits through the channel model, sifts on matching bases and decides on
//! the QBER whether the sifted key is secure. Secure keys feed a one-time-pad
//! messaging session over a classical channel that Eve may tamper with
//! separately.
//!
//! ```
//! use qkdnet_bb84::{Bb84Simulator, KeyStatus};
//!
//! let mut sim = Bb84Simulator::new(7);
//! let run = sim.run_protocol(64, false).unwrap();
//! assert_eq!(run.status(), KeyStatus::Secure);
//! assert_eq!(run.qber(), 0.0);
//!
//! let message = sim.send_message("hello").unwrap();
//! assert_eq!(message.received_plaintext, "hello");
//! ```

pub mod bits;
pub mod channel;
pub mod error;
pub mod export;
pub mod key;
pub mod messaging;
pub mod otp;
pub mod protocol;
pub mod qasm;
pub mod sifting;
pub mod simulator;

pub use bits::{Basis, Bit, BitSource, Qubit, Role, RoleStreams};
pub use channel::{ChannelOutput, ChannelSimulator, Eavesdropper};
pub use error::{Bb84Error, Bb84Result};
pub use export::RunArtifact;
pub use key::{KeyDecision, KeyExtractor, KeyStatus, QBER_THRESHOLD};
pub use messaging::{
    ClassicalChannel, MessageId, MessageStatus, MessagingSession, SecureMessage,
    CIPHERTEXT_CORRUPTION_RATE,
};
pub use otp::{Encryption, KeyMaterial};
pub use protocol::{
    run_protocol, PhaseTracker, ProtocolInputs, ProtocolPhase, ProtocolRun, RunStats,
    TransmissionRecord,
};
pub use qasm::bb84_qasm;
pub use sifting::{qber_between, sift, SiftResult};
pub use simulator::Bb84Simulator;
