use crate::{
    blobs::{self, BlobStore},
    clock::Clock,
    objects::{Beacon, ParticipantStatus},
    storage::{fetch_ceremony, fetch_circuit, fetch_participant, Locator, Object, Store, WriteBatch},
    CoordinatorError,
};

use blake2::{Blake2b512, Digest};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use std::sync::Arc;
use tracing::info;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FinalizeCircuitRequest {
    pub ceremony_id: String,
    pub circuit_id: String,
    pub bucket_name: String,
    /// The public random beacon closing the ceremony.
    pub beacon: String,
}

/// Returns the Blake2b-512 hash of the given bytes, hex-encoded.
pub fn blake2b512_hex(bytes: &[u8]) -> String {
    let mut hasher = Blake2b512::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

/// Returns the SHA-256 hash of the given bytes, hex-encoded.
pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

/// Binds the ceremony-closing beacon to a circuit's final contribution and
/// records the hashes of the final verification key and on-chain verifier
/// contract.
pub struct Finalizer {
    store: Arc<dyn Store>,
    blobs: Arc<dyn BlobStore>,
    clock: Arc<dyn Clock>,
}

impl Finalizer {
    pub fn new(store: Arc<dyn Store>, blobs: Arc<dyn BlobStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, blobs, clock }
    }

    ///
    /// Finalizes the given circuit: downloads the verification-key and
    /// verifier-contract artifacts, hashes them, and updates the circuit's
    /// final contribution document with the artifact metadata and the
    /// beacon record.
    ///
    /// The final contribution document is the only contribution document
    /// ever mutated after its reference is attached.
    ///
    pub async fn finalize(&self, request: FinalizeCircuitRequest) -> Result<(), CoordinatorError> {
        if request.ceremony_id.is_empty() {
            return Err(CoordinatorError::MissingInput("ceremonyId"));
        }
        if request.circuit_id.is_empty() {
            return Err(CoordinatorError::MissingInput("circuitId"));
        }
        if request.bucket_name.is_empty() {
            return Err(CoordinatorError::MissingInput("bucketName"));
        }
        if request.beacon.is_empty() {
            return Err(CoordinatorError::MissingInput("beacon"));
        }

        let ceremony = fetch_ceremony(self.store.as_ref(), &request.ceremony_id).await?;
        if !ceremony.is_closed() {
            return Err(CoordinatorError::CeremonyNotClosed(request.ceremony_id.clone()));
        }
        let circuit = fetch_circuit(self.store.as_ref(), &request.ceremony_id, &request.circuit_id).await?;
        let coordinator =
            fetch_participant(self.store.as_ref(), &request.ceremony_id, &ceremony.coordinator_id).await?;
        if coordinator.status != ParticipantStatus::Finalizing {
            return Err(CoordinatorError::ParticipantNotFinalizing(ceremony.coordinator_id.clone()));
        }

        let (contribution_id, stored_contribution) = self
            .store
            .list_contributions(&request.ceremony_id, &request.circuit_id)
            .await?
            .into_iter()
            .find(|(_, contribution)| contribution.is_final())
            .ok_or_else(|| CoordinatorError::FinalContributionMissing(request.circuit_id.clone()))?;
        let mut contribution = stored_contribution.clone();

        let verification_key_filename = blobs::verification_key_filename(&circuit.prefix);
        let verification_key_storage_path = blobs::verification_key_storage_path(&circuit.prefix);
        let verifier_contract_filename = blobs::verifier_contract_filename(&circuit.prefix);
        let verifier_contract_storage_path = blobs::verifier_contract_storage_path(&circuit.prefix);

        // Downloaded artifacts live only long enough to be hashed.
        let scratch = tempfile::tempdir()?;
        let verification_key_file = scratch.path().join(&verification_key_filename);
        let verifier_contract_file = scratch.path().join(&verifier_contract_filename);
        self.blobs
            .download(&request.bucket_name, &verification_key_storage_path, &verification_key_file)
            .await?;
        self.blobs
            .download(
                &request.bucket_name,
                &verifier_contract_storage_path,
                &verifier_contract_file,
            )
            .await?;
        let verification_key_hash = blake2b512_hex(&tokio::fs::read(&verification_key_file).await?);
        let verifier_contract_hash = blake2b512_hex(&tokio::fs::read(&verifier_contract_file).await?);
        scratch.close()?;

        contribution.files.verification_key_filename = Some(verification_key_filename);
        contribution.files.verification_key_storage_path = Some(verification_key_storage_path);
        contribution.files.verification_key_blake2b_hash = Some(verification_key_hash);
        contribution.files.verifier_contract_filename = Some(verifier_contract_filename);
        contribution.files.verifier_contract_storage_path = Some(verifier_contract_storage_path);
        contribution.files.verifier_contract_blake2b_hash = Some(verifier_contract_hash);
        contribution.beacon = Some(Beacon {
            value: request.beacon.clone(),
            hash: sha256_hex(request.beacon.as_bytes()),
        });
        contribution.last_updated = self.clock.now_millis();

        info!(
            "Finalized circuit {} with beacon {}",
            request.circuit_id, request.beacon
        );

        let mut batch = WriteBatch::new();
        batch.update(
            Locator::Contribution(request.ceremony_id.clone(), request.circuit_id.clone(), contribution_id),
            Object::Contribution(stored_contribution),
            Object::Contribution(contribution),
        );
        self.store.commit(batch).await
    }
}
