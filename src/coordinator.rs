use crate::{
    blobs::BlobStore,
    clock::Clock,
    environment::Environment,
    finalizer::{FinalizeCircuitRequest, Finalizer},
    objects::{ContributionStep, Participant, ParticipantStatus},
    refresher::Refresher,
    storage::{
        fetch_circuit_by_position,
        fetch_participant,
        DocumentEvent,
        Locator,
        Object,
        Store,
        WriteBatch,
        COMMIT_RETRY_LIMIT,
    },
    verifier::{ContributionVerifier, VerifyContributionRequest},
    workers::WorkerPool,
    CoordinatorError,
};

use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, error, info, trace, warn};

/// The coordination event derived from a participant document transition.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum CoordinationEvent {
    /// The participant became ready for their first circuit.
    ReadyForFirst,
    /// The participant became ready for the next circuit in sequence.
    ReadyForNext,
    /// The participant became ready again on the same circuit after a timeout.
    ResumingAfterTimeout,
    /// The participant finished a contribution on their current circuit.
    JustCompletedContribution,
    /// The participant finished the whole ceremony.
    JustCompletedEverything,
}

///
/// Classifies a participant document transition into a coordination event,
/// from the before/after snapshots alone.
///
/// Transitions that are not coordination events return `None` and are
/// ignored by the queue coordinator.
///
pub fn classify(before: &Participant, after: &Participant) -> Option<CoordinationEvent> {
    if after.status == ParticipantStatus::Done && before.status != ParticipantStatus::Done {
        return Some(CoordinationEvent::JustCompletedEverything);
    }

    if before.status == ParticipantStatus::Contributing
        && before.contribution_step == ContributionStep::Verifying
        && after.status == ParticipantStatus::Contributed
        && after.contribution_step == ContributionStep::Completed
        && after.contribution_progress == before.contribution_progress
    {
        return Some(CoordinationEvent::JustCompletedContribution);
    }

    if after.status == ParticipantStatus::Ready {
        if before.contribution_progress == 0 {
            return Some(CoordinationEvent::ReadyForFirst);
        }
        if after.contribution_progress == before.contribution_progress + 1 {
            return Some(CoordinationEvent::ReadyForNext);
        }
        if after.contribution_progress == before.contribution_progress {
            return Some(CoordinationEvent::ResumingAfterTimeout);
        }
    }

    None
}

/// Reacts to participant document transitions by promoting contributors
/// through per-circuit waiting queues.
///
/// Every mutation reads the circuit and participant inside the handler and
/// commits one atomic batch whose updates are compare-and-swapped against
/// the snapshots that were read. A coordinator that loses the race to a
/// concurrent writer on the same circuit re-reads and retries, so queue
/// states form a linearizable sequence.
pub struct QueueCoordinator {
    store: Arc<dyn Store>,
    clock: Arc<dyn Clock>,
}

impl QueueCoordinator {
    pub fn new(store: Arc<dyn Store>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    ///
    /// Handles an observed update to the participant document of
    /// `participant_id`, with before/after snapshots.
    ///
    /// Replaying the same before/after pair produces no net change.
    ///
    pub async fn handle_participant_update(
        &self,
        ceremony_id: &str,
        participant_id: &str,
        before: &Participant,
        after: &Participant,
    ) -> Result<(), CoordinatorError> {
        let event = match classify(before, after) {
            Some(event) => event,
            None => {
                trace!(
                    "Ignoring non-coordination transition for participant {}",
                    participant_id
                );
                return Ok(());
            }
        };

        debug!("Participant {} raised {:?}", participant_id, event);

        let mut attempts = 0;
        loop {
            let outcome = match event {
                CoordinationEvent::ReadyForFirst
                | CoordinationEvent::ReadyForNext
                | CoordinationEvent::ResumingAfterTimeout => {
                    // The 1-indexed progress addresses the circuit at the
                    // previous sequence position.
                    let position = after.contribution_progress.saturating_sub(1);
                    self.coordinate_single(ceremony_id, position, participant_id, after)
                        .await
                }
                CoordinationEvent::JustCompletedContribution | CoordinationEvent::JustCompletedEverything => {
                    let position = before.contribution_progress.saturating_sub(1);
                    self.coordinate_multi(ceremony_id, position, participant_id).await
                }
            };

            // A conflicting writer won the batch; re-read and retry.
            match outcome {
                Err(error) if error.is_transient() && attempts < COMMIT_RETRY_LIMIT => {
                    attempts += 1;
                    debug!(
                        "Retrying coordination for participant {} ({})",
                        participant_id, error
                    );
                }
                outcome => return outcome,
            }
        }
    }

    ///
    /// Seats the given ready participant on the circuit at the given
    /// sequence position: as current contributor if the slot is free or
    /// already theirs, in the waiting queue otherwise.
    ///
    async fn coordinate_single(
        &self,
        ceremony_id: &str,
        sequence_position: u64,
        participant_id: &str,
        after: &Participant,
    ) -> Result<(), CoordinatorError> {
        let (circuit_id, stored_circuit) =
            fetch_circuit_by_position(self.store.as_ref(), ceremony_id, sequence_position).await?;
        let stored = fetch_participant(self.store.as_ref(), ceremony_id, participant_id).await?;
        let mut circuit = stored_circuit.clone();
        let mut participant = stored.clone();
        let now = self.clock.now_millis();

        if circuit.waiting_queue.is_empty() {
            // Scenario A: the queue is empty, the participant takes the slot.
            circuit.waiting_queue.current_contributor = participant_id.to_string();
            circuit.waiting_queue.push(participant_id);
            participant.status = ParticipantStatus::Contributing;
            participant.contribution_step = ContributionStep::Downloading;
            participant.contribution_started_at = now;
            info!(
                "Participant {} becomes the current contributor of circuit {}",
                participant_id, circuit_id
            );
        } else if circuit.waiting_queue.current_contributor == participant_id
            && after.status == ParticipantStatus::Ready
        {
            // Scenario A': the participant resumes the slot they already
            // hold; the original start time is preserved.
            participant.status = ParticipantStatus::Contributing;
            participant.contribution_step = ContributionStep::Downloading;
            info!(
                "Participant {} resumes contributing to circuit {}",
                participant_id, circuit_id
            );
        } else {
            // Scenario B: someone else holds the slot, the participant waits.
            circuit.waiting_queue.push(participant_id);
            participant.status = ParticipantStatus::Waiting;
            participant.contribution_started_at = 0;
            info!(
                "Participant {} joins the waiting queue of circuit {} at position {}",
                participant_id,
                circuit_id,
                circuit.waiting_queue.contributors.len()
            );
        }

        // A replayed trigger reproduces the stored state; committing would
        // only churn timestamps.
        let participant_unchanged = participant.status == stored.status
            && participant.contribution_step == stored.contribution_step
            && participant.contribution_started_at == stored.contribution_started_at;
        if circuit.waiting_queue == stored_circuit.waiting_queue && participant_unchanged {
            trace!("Coordination is a no-op for participant {}", participant_id);
            return Ok(());
        }

        participant.last_updated = now;
        circuit.last_updated = now;

        let mut batch = WriteBatch::new();
        batch.update(
            Locator::Participant(ceremony_id.to_string(), participant_id.to_string()),
            Object::Participant(stored),
            Object::Participant(participant),
        );
        batch.update(
            Locator::Circuit(ceremony_id.to_string(), circuit_id),
            Object::Circuit(stored_circuit),
            Object::Circuit(circuit),
        );
        self.store.commit(batch).await
    }

    ///
    /// Removes the participant who just finished the circuit at the given
    /// sequence position from the head of its queue, and promotes the next
    /// waiting participant, if any, to current contributor.
    ///
    async fn coordinate_multi(
        &self,
        ceremony_id: &str,
        sequence_position: u64,
        participant_id: &str,
    ) -> Result<(), CoordinatorError> {
        let (circuit_id, stored_circuit) =
            fetch_circuit_by_position(self.store.as_ref(), ceremony_id, sequence_position).await?;
        let mut circuit = stored_circuit.clone();
        let now = self.clock.now_millis();

        if circuit.waiting_queue.head().map(String::as_str) != Some(participant_id) {
            return Err(CoordinatorError::QueueHeadMismatch(participant_id.to_string()));
        }

        let mut batch = WriteBatch::new();
        match circuit.waiting_queue.advance().cloned() {
            Some(next_id) => {
                circuit.waiting_queue.current_contributor = next_id.clone();

                let stored_next = fetch_participant(self.store.as_ref(), ceremony_id, &next_id).await?;
                let mut next = stored_next.clone();
                next.status = ParticipantStatus::Contributing;
                next.contribution_step = ContributionStep::Downloading;
                next.contribution_started_at = now;
                next.last_updated = now;
                batch.update(
                    Locator::Participant(ceremony_id.to_string(), next_id.clone()),
                    Object::Participant(stored_next),
                    Object::Participant(next),
                );
                info!(
                    "Participant {} is promoted to current contributor of circuit {}",
                    next_id, circuit_id
                );
            }
            None => {
                circuit.waiting_queue.current_contributor.clear();
                debug!("Circuit {} waiting queue is now empty", circuit_id);
            }
        }

        circuit.last_updated = now;
        batch.update(
            Locator::Circuit(ceremony_id.to_string(), circuit_id),
            Object::Circuit(stored_circuit),
            Object::Circuit(circuit),
        );
        self.store.commit(batch).await
    }
}

/// A core structure for operating a Phase 2 ceremony.
///
/// Owns the collaborators, wires the four subsystems, and dispatches store
/// change events to the trigger handlers. There is no call graph between
/// handlers; causation flows through the store.
pub struct Coordinator {
    environment: Environment,
    store: Arc<dyn Store>,
    queue: QueueCoordinator,
    verifier: ContributionVerifier,
    refresher: Refresher,
    finalizer: Finalizer,
}

impl Coordinator {
    ///
    /// Creates a new instance of the `Coordinator` over the given
    /// collaborators.
    ///
    /// The coordinator is forbidden from caching ceremony state; all reads
    /// and writes go through the store.
    ///
    pub fn new(
        environment: Environment,
        store: Arc<dyn Store>,
        blobs: Arc<dyn BlobStore>,
        workers: Arc<dyn WorkerPool>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            environment: environment.clone(),
            store: store.clone(),
            queue: QueueCoordinator::new(store.clone(), clock.clone()),
            verifier: ContributionVerifier::new(
                environment,
                store.clone(),
                blobs.clone(),
                workers,
                clock.clone(),
            ),
            refresher: Refresher::new(store.clone(), clock.clone()),
            finalizer: Finalizer::new(store, blobs, clock),
        }
    }

    /// Returns the parameters and settings of this coordinator.
    pub fn environment(&self) -> &Environment {
        &self.environment
    }

    /// Verifies an uploaded contribution; see `ContributionVerifier`.
    pub async fn verify_contribution(&self, request: VerifyContributionRequest) -> Result<(), CoordinatorError> {
        self.verifier.verify(request).await
    }

    /// Binds the ceremony-closing beacon to a circuit; see `Finalizer`.
    pub async fn finalize_circuit(&self, request: FinalizeCircuitRequest) -> Result<(), CoordinatorError> {
        self.finalizer.finalize(request).await
    }

    ///
    /// Dispatches one store change event to the matching trigger handler.
    ///
    /// Handler errors are logged and swallowed: a failed invocation must
    /// not take down its peers, and the store is unchanged because every
    /// handler commits in one batch.
    ///
    pub async fn dispatch_event(&self, event: DocumentEvent) {
        match event {
            DocumentEvent::Updated {
                locator: Locator::Participant(ceremony_id, participant_id),
                before: Object::Participant(before),
                after: Object::Participant(after),
            } => {
                if let Err(error) = self
                    .queue
                    .handle_participant_update(&ceremony_id, &participant_id, &before, &after)
                    .await
                {
                    error!(
                        "Queue coordination failed for participant {}: {}",
                        participant_id, error
                    );
                }
            }
            DocumentEvent::Created {
                locator: Locator::Contribution(ceremony_id, circuit_id, contribution_id),
                after: Object::Contribution(contribution),
            } => {
                if let Err(error) = self
                    .refresher
                    .handle_contribution_created(&ceremony_id, &circuit_id, &contribution_id, &contribution)
                    .await
                {
                    error!(
                        "Refresh failed for contribution {} of circuit {}: {}",
                        contribution_id, circuit_id, error
                    );
                }
            }
            _ => {}
        }
    }

    ///
    /// Consumes store change events until the subscription closes,
    /// dispatching each to its trigger handler.
    ///
    pub async fn serve_triggers(&self, mut events: mpsc::UnboundedReceiver<DocumentEvent>) {
        info!("Listening for store change events");
        while let Some(event) = events.recv().await {
            self.dispatch_event(event).await;
        }
        warn!("Store change subscription closed");
    }

    ///
    /// Returns a human-readable report of the ceremony's queues and
    /// counters.
    ///
    pub async fn status_report(&self, ceremony_id: &str) -> Result<String, CoordinatorError> {
        let circuits = self.store.list_circuits(ceremony_id).await?;

        let mut report = format!("Ceremony {}\n", ceremony_id);
        for (circuit_id, circuit) in circuits {
            report += &format!(
                "    circuit {} (position {}): {} waiting, current contributor {:?}, {} completed, {} failed\n",
                circuit_id,
                circuit.sequence_position,
                circuit.waiting_queue.contributors.len(),
                circuit.waiting_queue.current_contributor,
                circuit.waiting_queue.completed_contributions,
                circuit.waiting_queue.failed_contributions
            );
        }
        Ok(report)
    }
}
