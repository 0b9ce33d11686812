//! JSON artifact describing one completed run.

use serde::{Deserialize, Serialize};

use crate::bits::{Basis, Bit};
use crate::error::{ensure_len, Bb84Error, Bb84Result};
use crate::key::KeyStatus;
use crate::protocol::ProtocolRun;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunArtifact {
    pub alice_bits: Vec<Bit>,
    pub alice_bases: Vec<Basis>,
    pub bob_bases: Vec<Basis>,
    pub bob_bits: Vec<Bit>,
    pub matching_bases: Vec<bool>,
    pub sifted_key: Vec<Bit>,
    pub qber: f64,
    pub status: KeyStatus,
}

impl RunArtifact {
    pub fn from_run(run: &ProtocolRun) -> Self {
        let inputs = run.inputs();
        Self {
            alice_bits: inputs.alice_bits.clone(),
            alice_bases: inputs.alice_bases.clone(),
            bob_bases: inputs.bob_bases.clone(),
            bob_bits: run.bob_bits(),
            matching_bases: run.sift().matching_bases.clone(),
            sifted_key: run.sifted_key().to_vec(),
            qber: run.qber(),
            status: run.status(),
        }
    }

    /// Declared length `n`, taken from `aliceBits`.
    pub fn len(&self) -> usize {
        self.alice_bits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.alice_bits.is_empty()
    }

    /// Structural checks: shared array length, sifted length equal to the
    /// number of matching positions, qber within `[0, 1]`.
    pub fn validate(&self) -> Bb84Result<()> {
        let n = self.len();
        ensure_len("aliceBases", &self.alice_bases, n)?;
        ensure_len("bobBases", &self.bob_bases, n)?;
        ensure_len("bobBits", &self.bob_bits, n)?;
        ensure_len("matchingBases", &self.matching_bases, n)?;
        let matches = self.matching_bases.iter().filter(|m| **m).count();
        ensure_len("siftedKey", &self.sifted_key, matches)?;
        if !(0.0..=1.0).contains(&self.qber) {
            return Err(Bb84Error::InvalidParameter(format!(
                "qber {} outside [0, 1]",
                self.qber
            )));
        }
        Ok(())
    }

    pub fn to_json(&self) -> Bb84Result<String> {
        serde_json::to_string_pretty(self)
            .map_err(|err| Bb84Error::InvalidParameter(format!("artifact encoding failed: {err}")))
    }

    /// Parse and validate an artifact.
    pub fn from_json(raw: &str) -> Bb84Result<Self> {
        let artifact: Self = serde_json::from_str(raw)
            .map_err(|err| Bb84Error::InvalidParameter(format!("malformed artifact: {err}")))?;
        artifact.validate()?;
        Ok(artifact)
    }
}

impl From<&ProtocolRun> for RunArtifact {
    fn from(run: &ProtocolRun) -> Self {
        Self::from_run(run)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bits::RoleStreams;
    use crate::protocol::run_protocol;

    #[test]
    fn uses_camel_case_keys() {
        let run = run_protocol(8, false, &mut RoleStreams::new(3)).unwrap();
        let json = RunArtifact::from_run(&run).to_json().unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        for key in [
            "aliceBits",
            "aliceBases",
            "bobBases",
            "bobBits",
            "matchingBases",
            "siftedKey",
            "qber",
            "status",
        ] {
            assert!(value.get(key).is_some(), "missing {key}");
        }
        assert_eq!(value["status"], "secure");
        assert!(value["aliceBases"][0].is_u64());
    }

    #[test]
    fn validate_catches_sifted_length() {
        let run = run_protocol(32, false, &mut RoleStreams::new(4)).unwrap();
        let mut artifact = RunArtifact::from_run(&run);
        artifact.validate().unwrap();
        artifact.sifted_key.push(0);
        assert!(matches!(
            artifact.validate(),
            Err(Bb84Error::InvalidParameter(_))
        ));
    }

    #[test]
    fn from_json_rejects_garbage() {
        assert!(RunArtifact::from_json("{\"aliceBits\": [0]}").is_err());
        assert!(RunArtifact::from_json("not json").is_err());
    }
}
