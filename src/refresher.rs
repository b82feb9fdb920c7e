use crate::{
    clock::Clock,
    objects::{Contribution, ContributionStep, ParticipantStatus},
    storage::{fetch_participant, Locator, Object, Store, WriteBatch, COMMIT_RETRY_LIMIT},
    CoordinatorError,
};

use std::sync::Arc;
use tracing::{debug, info};

/// Reacts to the creation of a contribution document: attaches the document
/// reference to the participant's pending contribution record and advances
/// the participant to the next circuit or to the terminal done state.
pub struct Refresher {
    store: Arc<dyn Store>,
    clock: Arc<dyn Clock>,
}

impl Refresher {
    pub fn new(store: Arc<dyn Store>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    ///
    /// Handles the creation of the contribution document `contribution_id`
    /// under the given ceremony and circuit.
    ///
    /// A finalizing participant keeps their status; everyone else advances
    /// to `CONTRIBUTED`, or to `DONE` past the last circuit.
    ///
    pub async fn handle_contribution_created(
        &self,
        ceremony_id: &str,
        circuit_id: &str,
        contribution_id: &str,
        contribution: &Contribution,
    ) -> Result<(), CoordinatorError> {
        let circuits = self.store.list_circuits(ceremony_id).await?;

        let mut attempts = 0;
        loop {
            let stored =
                fetch_participant(self.store.as_ref(), ceremony_id, &contribution.participant_id).await?;
            let mut participant = stored.clone();

            let record = participant.pending_contribution_mut()?;
            record.doc = Some(contribution_id.to_string());
            debug!(
                "Attached contribution document {} to participant {}",
                contribution_id, contribution.participant_id
            );

            if participant.status != ParticipantStatus::Finalizing {
                let finished_everything = participant.contribution_progress + 1 > circuits.len() as u64;
                participant.status = match finished_everything {
                    true => ParticipantStatus::Done,
                    false => ParticipantStatus::Contributed,
                };
                participant.contribution_step = ContributionStep::Completed;
                participant.temp_contribution_data = None;
                info!(
                    "Participant {} advanced to {:?} after circuit {}",
                    contribution.participant_id, participant.status, circuit_id
                );
            }

            participant.last_updated = self.clock.now_millis();

            let mut batch = WriteBatch::new();
            batch.update(
                Locator::Participant(ceremony_id.to_string(), contribution.participant_id.clone()),
                Object::Participant(stored),
                Object::Participant(participant),
            );
            match self.store.commit(batch).await {
                Err(error) if error.is_transient() && attempts < COMMIT_RETRY_LIMIT => {
                    attempts += 1;
                    debug!(
                        "Retrying the refresh for participant {} ({})",
                        contribution.participant_id, error
                    );
                }
                outcome => return outcome,
            }
        }
    }
}
