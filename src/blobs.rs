use crate::CoordinatorError;

use async_trait::async_trait;
use std::{collections::HashMap, path::Path, sync::Mutex};
use tracing::trace;

/// Object storage for large ceremony artifacts, accessed by bucket and
/// path key.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Downloads the object at the given key into the given local file.
    async fn download(&self, bucket: &str, key: &str, destination: &Path) -> Result<(), CoordinatorError>;

    /// Deletes the object at the given key.
    async fn delete(&self, bucket: &str, key: &str) -> Result<(), CoordinatorError>;
}

/// Returns the storage path of a zkey with the given index token
/// (`"00042"`, `"final"`, ...).
pub fn zkey_storage_path(circuit_prefix: &str, index: &str) -> String {
    format!(
        "circuits/{}/contributions/{}",
        circuit_prefix,
        zkey_filename(circuit_prefix, index)
    )
}

/// Returns the filename of a zkey with the given index token.
pub fn zkey_filename(circuit_prefix: &str, index: &str) -> String {
    format!("{}_{}.zkey", circuit_prefix, index)
}

/// Returns the filename of the verification transcript for the given
/// contribution index and participant.
pub fn transcript_filename(circuit_prefix: &str, index: &str, participant_id: &str) -> String {
    format!(
        "{}_{}_{}_verification_transcript.log",
        circuit_prefix, index, participant_id
    )
}

/// Returns the filename of the finalization verification transcript.
pub fn final_transcript_filename(circuit_prefix: &str, participant_id: &str) -> String {
    format!("{}_{}_final_verification_transcript.log", circuit_prefix, participant_id)
}

/// Returns the storage path of a verification transcript.
pub fn transcript_storage_path(circuit_prefix: &str, filename: &str) -> String {
    format!("circuits/{}/transcripts/{}", circuit_prefix, filename)
}

/// Returns the filename of the verification key of a circuit.
pub fn verification_key_filename(circuit_prefix: &str) -> String {
    format!("{}_vkey.json", circuit_prefix)
}

/// Returns the storage path of the verification key of a circuit.
pub fn verification_key_storage_path(circuit_prefix: &str) -> String {
    format!("circuits/{}/{}", circuit_prefix, verification_key_filename(circuit_prefix))
}

/// Returns the filename of the on-chain verifier contract of a circuit.
pub fn verifier_contract_filename(circuit_prefix: &str) -> String {
    format!("{}_verifier.sol", circuit_prefix)
}

/// Returns the storage path of the on-chain verifier contract of a circuit.
pub fn verifier_contract_storage_path(circuit_prefix: &str) -> String {
    format!("circuits/{}/{}", circuit_prefix, verifier_contract_filename(circuit_prefix))
}

/// An in-memory blob store for development and testing.
#[derive(Default)]
pub struct MemoryBlobStore {
    objects: Mutex<HashMap<(String, String), Vec<u8>>>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds an object, standing in for an upload performed by a
    /// contributor or a worker.
    pub fn put(&self, bucket: &str, key: &str, bytes: Vec<u8>) {
        let mut objects = self.objects.lock().unwrap();
        objects.insert((bucket.to_string(), key.to_string()), bytes);
    }

    /// Returns `true` if an object exists at the given key.
    pub fn contains(&self, bucket: &str, key: &str) -> bool {
        let objects = self.objects.lock().unwrap();
        objects.contains_key(&(bucket.to_string(), key.to_string()))
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn download(&self, bucket: &str, key: &str, destination: &Path) -> Result<(), CoordinatorError> {
        let bytes = {
            let objects = self.objects.lock().unwrap();
            match objects.get(&(bucket.to_string(), key.to_string())) {
                Some(bytes) => bytes.clone(),
                None => {
                    return Err(CoordinatorError::DocumentMissing(format!("{}/{}", bucket, key)));
                }
            }
        };
        trace!("Downloading {}/{} to {:?}", bucket, key, destination);
        tokio::fs::write(destination, bytes).await?;
        Ok(())
    }

    async fn delete(&self, bucket: &str, key: &str) -> Result<(), CoordinatorError> {
        let mut objects = self.objects.lock().unwrap();
        objects.remove(&(bucket.to_string(), key.to_string()));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zkey_path_layout() {
        assert_eq!("multiplier2_00001.zkey", zkey_filename("multiplier2", "00001"));
        assert_eq!(
            "circuits/multiplier2/contributions/multiplier2_final.zkey",
            zkey_storage_path("multiplier2", "final")
        );
    }

    #[test]
    fn test_transcript_path_layout() {
        let filename = transcript_filename("multiplier2", "00003", "alice");
        assert_eq!("multiplier2_00003_alice_verification_transcript.log", filename);
        assert_eq!(
            "circuits/multiplier2/transcripts/multiplier2_00003_alice_verification_transcript.log",
            transcript_storage_path("multiplier2", &filename)
        );
    }

    #[test]
    fn test_final_transcript_filename_omits_index() {
        assert_eq!(
            "multiplier2_coordinator_final_verification_transcript.log",
            final_transcript_filename("multiplier2", "coordinator")
        );
    }

    #[test]
    fn test_finalization_artifact_paths() {
        assert_eq!(
            "circuits/multiplier2/multiplier2_vkey.json",
            verification_key_storage_path("multiplier2")
        );
        assert_eq!(
            "circuits/multiplier2/multiplier2_verifier.sol",
            verifier_contract_storage_path("multiplier2")
        );
    }

    #[tokio::test]
    async fn test_download_and_delete_round_trip() {
        let blobs = MemoryBlobStore::new();
        blobs.put("bucket", "a/b.zkey", b"zkey bytes".to_vec());

        let dir = tempfile::tempdir().unwrap();
        let destination = dir.path().join("b.zkey");
        blobs.download("bucket", "a/b.zkey", &destination).await.unwrap();
        assert_eq!(b"zkey bytes".to_vec(), std::fs::read(&destination).unwrap());

        blobs.delete("bucket", "a/b.zkey").await.unwrap();
        assert!(!blobs.contains("bucket", "a/b.zkey"));
        assert!(blobs.download("bucket", "a/b.zkey", &destination).await.is_err());
    }
}
