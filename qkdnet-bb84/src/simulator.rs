//! Stateful engine holding the current run and its messaging session.

use tracing::{info, warn};

use crate::bits::RoleStreams;
use crate::error::{Bb84Error, Bb84Result};
use crate::messaging::{ClassicalChannel, MessagingSession, SecureMessage};
use crate::protocol::{self, PhaseTracker, ProtocolPhase, ProtocolRun};

/// Drives successive protocol runs from one set of role streams.
///
/// Starting a run discards the previous run together with its key cursor and
/// message history. A failed call leaves the engine unchanged.
#[derive(Debug)]
pub struct Bb84Simulator {
    streams: RoleStreams,
    classical_eve: bool,
    run: Option<ProtocolRun>,
    session: Option<MessagingSession>,
    /// Why the current run has no session, when it has none.
    no_session_reason: Option<String>,
    phases: PhaseTracker,
}

impl Bb84Simulator {
    pub fn new(seed: u64) -> Self {
        Self::with_streams(RoleStreams::new(seed))
    }

    pub fn from_entropy() -> Self {
        Self::with_streams(RoleStreams::from_entropy())
    }

    pub fn with_streams(streams: RoleStreams) -> Self {
        Self {
            streams,
            classical_eve: false,
            run: None,
            session: None,
            no_session_reason: None,
            phases: PhaseTracker::default(),
        }
    }

    pub fn seed(&self) -> u64 {
        self.streams.seed()
    }

    /// Toggle tampering on the classical ciphertext channel. Independent of
    /// quantum-channel interception.
    pub fn set_classical_eavesdropper(&mut self, active: bool) {
        self.classical_eve = active;
        if let Some(session) = self.session.as_mut() {
            session.channel_mut().set_eve_active(active);
        }
    }

    pub fn classical_eavesdropper(&self) -> bool {
        self.classical_eve
    }

    pub fn run_protocol(&mut self, key_length: u32, eve_enabled: bool) -> Bb84Result<&ProtocolRun> {
        let run = protocol::run_protocol(key_length, eve_enabled, &mut self.streams)?;
        let channel = ClassicalChannel::new(self.streams.classical.fork(), self.classical_eve);
        let (session, no_session_reason) = match MessagingSession::open(&run, channel) {
            Ok(session) => (Some(session), None),
            Err(err) => {
                if run.status().is_secure() {
                    warn!(error = %err, "secure run produced no usable key");
                }
                let reason = match err {
                    Bb84Error::NoSecureKey(reason) | Bb84Error::InvalidParameter(reason) => reason,
                };
                (None, Some(reason))
            }
        };
        if self.run.is_some() {
            info!(
                discarded_messages = self.history().len(),
                "new run replaces previous key"
            );
        }
        self.phases = run.phases().clone();
        self.session = session;
        self.no_session_reason = no_session_reason;
        Ok(&*self.run.insert(run))
    }

    pub fn current_run(&self) -> Option<&ProtocolRun> {
        self.run.as_ref()
    }

    pub fn session(&self) -> Option<&MessagingSession> {
        self.session.as_ref()
    }

    pub fn phase(&self) -> ProtocolPhase {
        self.phases.current()
    }

    pub fn phases(&self) -> &PhaseTracker {
        &self.phases
    }

    /// Encrypt and send `plaintext` with the current run's key.
    pub fn send_message(&mut self, plaintext: &str) -> Bb84Result<SecureMessage> {
        let session = match (self.run.as_ref(), self.session.as_mut()) {
            (Some(_), Some(session)) => session,
            (Some(_), None) => {
                return Err(Bb84Error::NoSecureKey(
                    self.no_session_reason
                        .clone()
                        .unwrap_or_else(|| "current run has no usable key".into()),
                ))
            }
            (None, _) => {
                return Err(Bb84Error::NoSecureKey(
                    "no protocol run has been executed".into(),
                ))
            }
        };
        let message = session.send_message(plaintext)?;
        self.phases.advance(ProtocolPhase::Messaging);
        Ok(message)
    }

    pub fn history(&self) -> &[SecureMessage] {
        self.session
            .as_ref()
            .map(MessagingSession::history)
            .unwrap_or(&[])
    }
}
