//! One-time-pad stream cipher over the shared key bitstream.
//!
//! The pad is reused by wrapping the cursor once the key is exhausted. That
//! is a real weakness and it is reproduced on purpose; every wrap is surfaced
//! through [`Encryption::key_wraps`] and a `tracing` warning so stricter
//! callers can refuse wrapped ciphertexts.

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::bits::Bit;
use crate::error::{Bb84Error, Bb84Result};

/// Shared key bits plus the read cursor both parties advance together.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyMaterial {
    bits: Vec<Bit>,
    cursor: usize,
}

impl KeyMaterial {
    pub fn new(bits: Vec<Bit>) -> Bb84Result<Self> {
        Self::with_cursor(bits, 0)
    }

    pub fn with_cursor(bits: Vec<Bit>, cursor: usize) -> Bb84Result<Self> {
        if bits.is_empty() {
            return Err(Bb84Error::NoSecureKey("key material is empty".into()));
        }
        if let Some(bad) = bits.iter().find(|bit| **bit > 1) {
            return Err(Bb84Error::InvalidParameter(format!(
                "key bits must be 0 or 1, got {bad}"
            )));
        }
        let cursor = cursor % bits.len();
        Ok(Self { bits, cursor })
    }

    pub fn bits(&self) -> &[Bit] {
        &self.bits
    }

    pub fn len(&self) -> usize {
        self.bits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bits.is_empty()
    }

    /// Next key position to be consumed, always `< len()`.
    pub fn cursor(&self) -> usize {
        self.cursor
    }

    /// Bits left before the cursor wraps back to the start.
    pub fn remaining_before_wrap(&self) -> usize {
        self.bits.len() - self.cursor
    }

    /// Move the cursor `count` positions and return how many times it wrapped.
    fn advance(&mut self, count: usize) -> usize {
        let len = self.bits.len();
        let wraps = wraps_for(self.cursor, count, len);
        self.cursor = (self.cursor + count) % len;
        wraps
    }
}

/// A single encryption and the key span it consumed.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Encryption {
    pub ciphertext: Vec<Bit>,
    pub start_cursor: usize,
    pub end_cursor: usize,
    /// How often the cursor ran off the end of the key during this message.
    pub key_wraps: usize,
}

/// Times a read of `count` bits starting at `start` crosses the end of a
/// `len`-bit key.
fn wraps_for(start: usize, count: usize, len: usize) -> usize {
    if count == 0 {
        0
    } else {
        (start + count - 1) / len - start / len
    }
}

/// Expand text into its UTF-8 bytes, 8 bits each, most significant first.
pub fn text_to_bits(text: &str) -> Vec<Bit> {
    text.as_bytes()
        .iter()
        .flat_map(|byte| (0..8).rev().map(move |shift| (byte >> shift) & 1))
        .collect()
}

/// Regroup bits into bytes; a trailing fragment shorter than 8 bits is dropped.
pub fn bits_to_bytes(bits: &[Bit]) -> Vec<u8> {
    bits.chunks_exact(8)
        .map(|chunk| chunk.iter().fold(0u8, |acc, bit| (acc << 1) | (bit & 1)))
        .collect()
}

pub fn encrypt(plaintext: &str, key: &mut KeyMaterial) -> Encryption {
    let start_cursor = key.cursor();
    let ciphertext = xor_stream(&text_to_bits(plaintext), start_cursor, key);
    let key_wraps = key.advance(ciphertext.len());
    if key_wraps > 0 {
        warn!(
            key_len = key.len(),
            start_cursor,
            key_wraps,
            "one-time pad exhausted; reusing key material"
        );
    }
    Encryption {
        end_cursor: key.cursor(),
        ciphertext,
        start_cursor,
        key_wraps,
    }
}

/// XOR `ciphertext` back into plaintext bits along the same cursor path.
pub fn decrypt_bits(ciphertext: &[Bit], start_cursor: usize, key: &KeyMaterial) -> Vec<Bit> {
    xor_stream(ciphertext, start_cursor, key)
}

/// Decrypt and decode as UTF-8. Bytes that no longer form valid UTF-8 (for
/// example after channel corruption) decode to U+FFFD.
pub fn decrypt(ciphertext: &[Bit], start_cursor: usize, key: &KeyMaterial) -> String {
    let bytes = bits_to_bytes(&decrypt_bits(ciphertext, start_cursor, key));
    String::from_utf8_lossy(&bytes).into_owned()
}

fn xor_stream(bits: &[Bit], start_cursor: usize, key: &KeyMaterial) -> Vec<Bit> {
    let start = start_cursor % key.len();
    bits.iter()
        .zip(key.bits.iter().cycle().skip(start))
        .map(|(bit, pad)| (bit & 1) ^ pad)
        .collect()
}
