//! Secure messaging over the classical channel with the distilled key.

use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{info, warn};

use crate::bits::{Bit, BitSource};
use crate::error::{Bb84Error, Bb84Result};
use crate::otp::{self, KeyMaterial};
use crate::protocol::ProtocolRun;

/// Per-bit flip probability when Eve tampers with the ciphertext channel.
pub const CIPHERTEXT_CORRUPTION_RATE: f64 = 0.1;

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct MessageId(pub u64);

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "msg-{}", self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageStatus {
    Sending,
    Delivered,
    Compromised,
}

/// Final record of one message, kept in the session history.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecureMessage {
    pub id: MessageId,
    pub plaintext: String,
    /// Ciphertext as Alice sent it.
    pub ciphertext: Vec<Bit>,
    /// Ciphertext as Bob received it.
    pub delivered_ciphertext: Vec<Bit>,
    pub received_plaintext: String,
    /// `(start, end)` cursor positions in the key material.
    pub key_range_used: (usize, usize),
    pub key_wraps: usize,
    pub flipped_bits: usize,
    pub status: MessageStatus,
}

impl SecureMessage {
    fn settle(&mut self, status: MessageStatus) {
        assert_eq!(
            self.status,
            MessageStatus::Sending,
            "message status transitions exactly once"
        );
        self.status = status;
    }
}

/// Classical ciphertext channel, optionally tampered with by Eve.
#[derive(Clone, Debug)]
pub struct ClassicalChannel {
    noise: BitSource,
    eve_active: bool,
}

impl ClassicalChannel {
    pub fn new(noise: BitSource, eve_active: bool) -> Self {
        Self { noise, eve_active }
    }

    pub fn eve_active(&self) -> bool {
        self.eve_active
    }

    pub fn set_eve_active(&mut self, active: bool) {
        self.eve_active = active;
    }

    /// Deliver `ciphertext`, returning the received bits and how many flipped.
    pub fn deliver(&mut self, ciphertext: &[Bit]) -> (Vec<Bit>, usize) {
        if !self.eve_active {
            return (ciphertext.to_vec(), 0);
        }
        let mut flipped = 0;
        let received = ciphertext
            .iter()
            .map(|bit| {
                if self.noise.flip(CIPHERTEXT_CORRUPTION_RATE) {
                    flipped += 1;
                    bit ^ 1
                } else {
                    *bit
                }
            })
            .collect();
        (received, flipped)
    }
}

/// Messaging state bound to one secure run.
///
/// Alice and Bob share a single [`KeyMaterial`], so the cursor advances once
/// per message and both sides observe the same position. Calls must be
/// serialized by the owner; `&mut self` enforces this within one thread.
#[derive(Clone, Debug)]
pub struct MessagingSession {
    key: KeyMaterial,
    channel: ClassicalChannel,
    history: Vec<SecureMessage>,
    next_id: u64,
}

impl MessagingSession {
    /// Open a session on a run's key. Fails with `NoSecureKey` when the run
    /// was compromised or sifted no bits at all.
    pub fn open(run: &ProtocolRun, channel: ClassicalChannel) -> Bb84Result<Self> {
        if !run.status().is_secure() {
            return Err(Bb84Error::NoSecureKey(format!(
                "run status is {} (qber {:.3})",
                run.status(),
                run.qber()
            )));
        }
        let key = KeyMaterial::new(run.final_key().to_vec())?;
        Ok(Self::with_key(key, channel))
    }

    pub fn with_key(key: KeyMaterial, channel: ClassicalChannel) -> Self {
        Self {
            key,
            channel,
            history: Vec::new(),
            next_id: 1,
        }
    }

    pub fn key(&self) -> &KeyMaterial {
        &self.key
    }

    pub fn channel_mut(&mut self) -> &mut ClassicalChannel {
        &mut self.channel
    }

    pub fn history(&self) -> &[SecureMessage] {
        &self.history
    }

    /// Encrypt, transmit and decrypt one message.
    pub fn send_message(&mut self, plaintext: &str) -> Bb84Result<SecureMessage> {
        if plaintext.trim().is_empty() {
            return Err(Bb84Error::InvalidParameter("message is empty".into()));
        }
        let id = MessageId(self.next_id);
        let encryption = otp::encrypt(plaintext, &mut self.key);
        let mut message = SecureMessage {
            id,
            plaintext: plaintext.to_owned(),
            ciphertext: encryption.ciphertext.clone(),
            delivered_ciphertext: Vec::new(),
            received_plaintext: String::new(),
            key_range_used: (encryption.start_cursor, encryption.end_cursor),
            key_wraps: encryption.key_wraps,
            flipped_bits: 0,
            status: MessageStatus::Sending,
        };

        let (delivered, flipped) = self.channel.deliver(&encryption.ciphertext);
        message.received_plaintext = otp::decrypt(&delivered, encryption.start_cursor, &self.key);
        message.delivered_ciphertext = delivered;
        message.flipped_bits = flipped;
        if flipped > 0 {
            warn!(%id, flipped, "ciphertext corrupted on the classical channel");
            message.settle(MessageStatus::Compromised);
        } else {
            info!(%id, bits = message.ciphertext.len(), "message delivered");
            message.settle(MessageStatus::Delivered);
        }

        self.next_id += 1;
        self.history.push(message.clone());
        Ok(message)
    }
}
