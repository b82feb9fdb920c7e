use crate::{
    blobs::{self, BlobStore},
    clock::Clock,
    environment::Environment,
    objects::{
        format_zkey_index,
        Circuit,
        CircuitFiles,
        Contribution,
        ContributionFiles,
        FINAL_ZKEY_INDEX,
    },
    storage::{
        fetch_ceremony,
        fetch_circuit,
        fetch_participant,
        Locator,
        Object,
        Store,
        WriteBatch,
        COMMIT_RETRY_LIMIT,
    },
    workers::{CommandStatus, WorkerPool, WorkerStatus},
    CoordinatorError,
};

use serde::{Deserialize, Serialize};
use std::{sync::Arc, time::Instant};
use tracing::{debug, info, warn};

/// The success marker the verification tool prints for a sound zkey. The
/// contribution is valid iff the worker output contains this exact
/// substring; no other interpretation is permitted.
const ZKEY_VERIFICATION_SUCCESS: &str = "ZKey Ok!";

/// The scratch directory of the worker where artifacts are staged.
const WORKER_SCRATCH_DIR: &str = "/var/tmp";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyContributionRequest {
    pub ceremony_id: String,
    pub circuit_id: String,
    /// The current contributor, or the coordinator when finalizing.
    pub contributor_or_coordinator_identifier: String,
    pub bucket_name: String,
}

///
/// Returns the ordered command script that verifies a candidate zkey on a
/// worker: download the candidate from the blob store, run the
/// verification tool against the genesis zkey and the Powers-of-Tau
/// artifact streaming output to a local transcript, upload the transcript,
/// and delete the local files.
///
/// The genesis zkey and Powers-of-Tau artifact are staged in the worker
/// scratch directory when the worker is provisioned.
///
pub fn verification_command(
    bucket: &str,
    files: &CircuitFiles,
    zkey_filename: &str,
    zkey_storage_path: &str,
    transcript_filename: &str,
    transcript_storage_path: &str,
) -> Vec<String> {
    vec![
        format!(
            "aws s3 cp s3://{}/{} {}/{}",
            bucket, zkey_storage_path, WORKER_SCRATCH_DIR, zkey_filename
        ),
        format!(
            "snarkjs zkvi {}/{} {}/{} {}/{} > {}/{}",
            WORKER_SCRATCH_DIR,
            files.initial_zkey_filename,
            WORKER_SCRATCH_DIR,
            files.pot_filename,
            WORKER_SCRATCH_DIR,
            zkey_filename,
            WORKER_SCRATCH_DIR,
            transcript_filename
        ),
        format!(
            "aws s3 cp {}/{} s3://{}/{}",
            WORKER_SCRATCH_DIR, transcript_filename, bucket, transcript_storage_path
        ),
        format!(
            "rm {}/{} {}/{}",
            WORKER_SCRATCH_DIR, zkey_filename, WORKER_SCRATCH_DIR, transcript_filename
        ),
    ]
}

/// Orchestrates verification of one uploaded contribution: drives the
/// circuit's worker through the verification script, classifies the
/// contribution valid or invalid, and records the outcome together with
/// updated rolling timing statistics in one atomic batch.
pub struct ContributionVerifier {
    environment: Environment,
    store: Arc<dyn Store>,
    blobs: Arc<dyn BlobStore>,
    workers: Arc<dyn WorkerPool>,
    clock: Arc<dyn Clock>,
}

impl ContributionVerifier {
    pub fn new(
        environment: Environment,
        store: Arc<dyn Store>,
        blobs: Arc<dyn BlobStore>,
        workers: Arc<dyn WorkerPool>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            environment,
            store,
            blobs,
            workers,
            clock,
        }
    }

    ///
    /// Verifies the contribution most recently uploaded for the given
    /// circuit.
    ///
    /// The caller must be the circuit's current contributor, or the
    /// ceremony coordinator while the ceremony is closed (the finalization
    /// path). Worker failures classify the contribution as invalid rather
    /// than failing the call; the worker is stopped on every exit path.
    ///
    pub async fn verify(&self, request: VerifyContributionRequest) -> Result<(), CoordinatorError> {
        let handler_started = self.clock.now_millis();

        let software = self.environment.verification_software()?;
        if request.ceremony_id.is_empty() {
            return Err(CoordinatorError::MissingInput("ceremonyId"));
        }
        if request.circuit_id.is_empty() {
            return Err(CoordinatorError::MissingInput("circuitId"));
        }
        if request.contributor_or_coordinator_identifier.is_empty() {
            return Err(CoordinatorError::MissingInput("contributorOrCoordinatorIdentifier"));
        }
        if request.bucket_name.is_empty() {
            return Err(CoordinatorError::MissingInput("bucketName"));
        }

        let participant_id = request.contributor_or_coordinator_identifier.as_str();
        let ceremony = fetch_ceremony(self.store.as_ref(), &request.ceremony_id).await?;
        let circuit = fetch_circuit(self.store.as_ref(), &request.ceremony_id, &request.circuit_id).await?;
        let participant = fetch_participant(self.store.as_ref(), &request.ceremony_id, participant_id).await?;

        let is_finalizing = ceremony.is_closed() && ceremony.is_coordinator(participant_id);
        let is_contributing = participant.is_contributing();
        if !is_finalizing && !is_contributing {
            return Err(CoordinatorError::ParticipantNotContributing(participant_id.to_string()));
        }

        let zkey_index = match is_finalizing {
            true => FINAL_ZKEY_INDEX.to_string(),
            false => format_zkey_index(circuit.waiting_queue.completed_contributions + 1),
        };
        let zkey_filename = blobs::zkey_filename(&circuit.prefix, &zkey_index);
        let zkey_storage_path = blobs::zkey_storage_path(&circuit.prefix, &zkey_index);
        let transcript_filename = match is_finalizing {
            true => blobs::final_transcript_filename(&circuit.prefix, participant_id),
            false => blobs::transcript_filename(&circuit.prefix, &zkey_index, participant_id),
        };
        let transcript_storage_path = blobs::transcript_storage_path(&circuit.prefix, &transcript_filename);

        info!(
            "Verifying contribution {} to circuit {} by {}",
            zkey_index, request.circuit_id, participant_id
        );

        let verification_started = self.clock.now_millis();
        let outcome = self
            .run_worker(
                &circuit,
                &request.bucket_name,
                &zkey_filename,
                &zkey_storage_path,
                &transcript_filename,
                &transcript_storage_path,
            )
            .await;
        // The worker is stopped no matter how verification went; its
        // identifier is persisted on the circuit, so nothing leaks even if
        // this fails too.
        if let Err(error) = self.workers.stop(&circuit.instance_id).await {
            warn!("Failed to stop worker {}: {}", circuit.instance_id, error);
        }
        let verification_computation_time = self.clock.now_millis().saturating_sub(verification_started);

        let valid = match outcome {
            Ok(output) => output.contains(ZKEY_VERIFICATION_SUCCESS),
            Err(error) => {
                warn!(
                    "Worker verification errored for circuit {}: {}",
                    request.circuit_id, error
                );
                false
            }
        };
        info!(
            "Contribution {} to circuit {} is {}",
            zkey_index,
            request.circuit_id,
            match valid {
                true => "valid",
                false => "invalid",
            }
        );

        let contribution_locator = Locator::Contribution(
            request.ceremony_id.clone(),
            request.circuit_id.clone(),
            self.store.fresh_id(),
        );

        let mut contribution_computation_time = 0;
        let contribution = if valid {
            // Give the uploaded transcript a moment to propagate before the
            // document referencing it becomes visible.
            tokio::time::sleep(self.environment.parameters().transcript_settle_delay).await;

            let record = participant.pending_contribution()?;
            contribution_computation_time = record.computation_time.unwrap_or_default();

            Contribution {
                participant_id: participant_id.to_string(),
                contribution_computation_time,
                verification_computation_time,
                zkey_index: zkey_index.clone(),
                files: ContributionFiles {
                    last_zkey_filename: zkey_filename,
                    last_zkey_storage_path: zkey_storage_path,
                    verification_transcript_filename: transcript_filename,
                    verification_transcript_storage_path: transcript_storage_path,
                    // Pending retrieval from the worker API.
                    transcript_blake2b_hash: String::new(),
                    ..Default::default()
                },
                verification_software: software,
                valid: true,
                beacon: None,
                last_updated: self.clock.now_millis(),
            }
        } else {
            // The candidate zkey is dead weight; free the space before
            // recording the failure.
            self.blobs.delete(&request.bucket_name, &zkey_storage_path).await?;

            Contribution {
                participant_id: participant_id.to_string(),
                contribution_computation_time: 0,
                verification_computation_time,
                zkey_index: zkey_index.clone(),
                files: ContributionFiles::default(),
                verification_software: software,
                valid: false,
                beacon: None,
                last_updated: self.clock.now_millis(),
            }
        };

        // The queue may have moved while the worker ran, so the counter and
        // timing update is applied to a fresh read of the circuit, and the
        // batch is retried if another writer lands in between.
        let full_contribution_time = participant
            .verification_started_at
            .saturating_sub(participant.contribution_started_at);
        let mut attempts = 0;
        loop {
            let mut batch = WriteBatch::new();
            batch.create(contribution_locator.clone(), Object::Contribution(contribution.clone()));

            if !is_finalizing {
                let stored_circuit =
                    fetch_circuit(self.store.as_ref(), &request.ceremony_id, &request.circuit_id).await?;
                let mut circuit = stored_circuit.clone();
                if valid {
                    let verify_cloud_function_time = self.clock.now_millis().saturating_sub(handler_started);
                    circuit.avg_timings.absorb(
                        contribution_computation_time,
                        full_contribution_time,
                        verify_cloud_function_time,
                    );
                    circuit.waiting_queue.completed_contributions += 1;
                } else {
                    circuit.waiting_queue.failed_contributions += 1;
                }
                circuit.last_updated = self.clock.now_millis();
                batch.update(
                    Locator::Circuit(request.ceremony_id.clone(), request.circuit_id.clone()),
                    Object::Circuit(stored_circuit),
                    Object::Circuit(circuit),
                );
            }

            match self.store.commit(batch).await {
                Err(error) if error.is_transient() && attempts < COMMIT_RETRY_LIMIT => {
                    attempts += 1;
                    debug!(
                        "Retrying the verification batch for circuit {} ({})",
                        request.circuit_id, error
                    );
                }
                outcome => return outcome,
            }
        }
    }

    ///
    /// Drives the circuit's worker through one verification: start, probe
    /// readiness, execute the verification script, poll to completion, and
    /// retrieve the combined output.
    ///
    /// The readiness probe is bounded by the startup deadline; a worker
    /// still not probing as running when it expires only logs, and the
    /// command is attempted anyway.
    ///
    async fn run_worker(
        &self,
        circuit: &Circuit,
        bucket: &str,
        zkey_filename: &str,
        zkey_storage_path: &str,
        transcript_filename: &str,
        transcript_storage_path: &str,
    ) -> Result<String, CoordinatorError> {
        let parameters = self.environment.parameters();
        let instance_id = circuit.instance_id.as_str();

        self.workers.start(instance_id).await?;
        debug!("Started worker {} for circuit {}", instance_id, circuit.prefix);

        let deadline = Instant::now() + parameters.worker_startup_deadline;
        loop {
            match self.workers.status(instance_id).await? {
                WorkerStatus::Running => break,
                status => {
                    if Instant::now() >= deadline {
                        warn!(
                            "Worker {} still probes as {:?} after the startup deadline",
                            instance_id, status
                        );
                        break;
                    }
                }
            }
            tokio::time::sleep(parameters.worker_status_poll_interval).await;
        }

        let commands = verification_command(
            bucket,
            &circuit.files,
            zkey_filename,
            zkey_storage_path,
            transcript_filename,
            transcript_storage_path,
        );
        let command_id = self.workers.run_command(instance_id, &commands).await?;
        debug!("Dispatched command {} to worker {}", command_id, instance_id);

        let deadline = Instant::now() + parameters.verification_deadline;
        loop {
            tokio::time::sleep(parameters.command_poll_interval).await;
            match self.workers.command_status(instance_id, &command_id).await? {
                CommandStatus::Succeeded => break,
                CommandStatus::Failed => {
                    return Err(CoordinatorError::CommandFailed(
                        command_id,
                        instance_id.to_string(),
                    ));
                }
                CommandStatus::InProgress => {
                    if Instant::now() >= deadline {
                        return Err(CoordinatorError::CommandTimedOut(
                            command_id,
                            instance_id.to_string(),
                        ));
                    }
                }
            }
        }

        self.workers.fetch_output(instance_id, &command_id).await
    }
}
