use crate::objects::ParticipantId;

use serde::{Deserialize, Serialize};

/// The index of the genesis zkey. Its width fixes the zero-padding of every
/// subsequent contribution index.
pub const GENESIS_ZKEY_INDEX: &str = "00000";

/// The literal index token of the ceremony-closing contribution.
pub const FINAL_ZKEY_INDEX: &str = "final";

/// Returns the zero-padded zkey index for the given 1-based contribution
/// number.
///
/// The width matches the genesis index; numbers wider than the genesis
/// index print in full.
pub fn format_zkey_index(progress: u64) -> String {
    format!("{:0width$}", progress, width = GENESIS_ZKEY_INDEX.len())
}

/// The name, version and commit hash of the tool that verified a
/// contribution, recorded for provenance.
#[derive(Debug, Clone, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerificationSoftware {
    pub name: String,
    pub version: String,
    pub commit_hash: String,
}

/// The public random beacon bound to the final contribution of a circuit.
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Beacon {
    pub value: String,
    /// The SHA-256 hash of `value`, hex-encoded.
    pub hash: String,
}

/// Filenames, storage paths and hashes of a contribution's artifacts.
///
/// The verification-key and verifier-contract fields are attached by the
/// finalizer to the final contribution of each circuit only.
#[derive(Debug, Clone, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContributionFiles {
    pub last_zkey_filename: String,
    pub last_zkey_storage_path: String,
    pub verification_transcript_filename: String,
    pub verification_transcript_storage_path: String,
    /// Pending retrieval from the worker; recorded as the empty string
    /// until the transcript hash is reported.
    pub transcript_blake2b_hash: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub verification_key_filename: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub verification_key_storage_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub verification_key_blake2b_hash: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub verifier_contract_filename: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub verifier_contract_storage_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub verifier_contract_blake2b_hash: Option<String>,
}

#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Contribution {
    pub participant_id: ParticipantId,
    /// Time the contributor spent computing, in milliseconds.
    pub contribution_computation_time: u64,
    /// Time the verification tool ran on the worker, in milliseconds.
    pub verification_computation_time: u64,
    /// The zero-padded sequence index of the contribution, or `"final"`.
    pub zkey_index: String,
    pub files: ContributionFiles,
    pub verification_software: VerificationSoftware,
    pub valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub beacon: Option<Beacon>,
    /// The timestamp of the last update to this document, in milliseconds.
    pub last_updated: u64,
}

impl Contribution {
    /// Returns `true` if this is the ceremony-closing contribution of its
    /// circuit.
    pub fn is_final(&self) -> bool {
        self.zkey_index == FINAL_ZKEY_INDEX
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use proptest::prelude::*;

    #[test]
    fn test_format_zkey_index_pads_to_genesis_width() {
        assert_eq!("00001", format_zkey_index(1));
        assert_eq!("00042", format_zkey_index(42));
        assert_eq!("99999", format_zkey_index(99999));
    }

    #[test]
    fn test_format_zkey_index_overflows_width_in_full() {
        assert_eq!("123456", format_zkey_index(123456));
    }

    proptest! {
        #[test]
        fn test_format_zkey_index_round_trips(n in 0u64..10_000_000) {
            let index = format_zkey_index(n);
            prop_assert!(index.len() >= GENESIS_ZKEY_INDEX.len());
            prop_assert_eq!(n, index.parse::<u64>().unwrap());
        }
    }

    #[test]
    fn test_contribution_wire_field_names() {
        let contribution = Contribution {
            participant_id: "alice".to_string(),
            contribution_computation_time: 100,
            verification_computation_time: 200,
            zkey_index: format_zkey_index(1),
            files: ContributionFiles::default(),
            verification_software: VerificationSoftware::default(),
            valid: true,
            beacon: None,
            last_updated: 300,
        };
        let json = serde_json::to_value(&contribution).unwrap();
        assert_eq!("00001", json["zkeyIndex"]);
        assert!(json.get("participantId").is_some());
        assert!(json.get("verificationSoftware").is_some());
        assert!(json.get("beacon").is_none());
    }
}
