use crate::{objects::ContributionId, CoordinatorError};

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ParticipantStatus {
    Waiting,
    Ready,
    Contributing,
    Contributed,
    Done,
    Finalizing,
    Timedout,
}

/// The step a contributing participant is currently performing.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ContributionStep {
    Downloading,
    Computing,
    Uploading,
    Verifying,
    Completed,
}

/// One entry in a participant's contribution history.
///
/// The contributor fills in `hash` and `computation_time` while uploading;
/// the refresher attaches `doc` once the contribution document exists. At
/// the moment the verifier runs, exactly one entry has a hash and a
/// computation time but no document reference.
#[derive(Debug, Clone, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContributionRecord {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hash: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub computation_time: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub doc: Option<ContributionId>,
}

impl ContributionRecord {
    /// Returns `true` if the entry awaits its contribution document reference.
    pub fn is_pending(&self) -> bool {
        self.hash.is_some() && self.computation_time.is_some() && self.doc.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Participant {
    pub status: ParticipantStatus,
    pub contribution_step: ContributionStep,
    /// The 1-indexed circuit the participant is working on, or 0 before the
    /// first coordination.
    pub contribution_progress: u64,
    pub contributions: Vec<ContributionRecord>,
    /// The timestamp the participant acquired the contribution slot, or 0
    /// while waiting.
    pub contribution_started_at: u64,
    /// The timestamp the participant entered the verification step.
    pub verification_started_at: u64,
    /// Opaque resumable-upload state, cleared by the refresher.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temp_contribution_data: Option<serde_json::Value>,
    /// The timestamp of the last update to this document, in milliseconds.
    pub last_updated: u64,
}

impl Participant {
    /// Returns `true` if the participant currently holds a contribution slot.
    pub fn is_contributing(&self) -> bool {
        self.status == ParticipantStatus::Contributing
    }

    /// Returns the unique contribution record that has a hash and a
    /// computation time but no document reference.
    ///
    /// Zero or more than one such entry is a precondition failure rather
    /// than something to guess around.
    pub fn pending_contribution(&self) -> Result<&ContributionRecord, CoordinatorError> {
        let mut pending = self.contributions.iter().filter(|record| record.is_pending());
        match (pending.next(), pending.next()) {
            (Some(record), None) => Ok(record),
            (None, _) => Err(CoordinatorError::PendingContributionAmbiguous(0)),
            _ => {
                let count = self.contributions.iter().filter(|r| r.is_pending()).count();
                Err(CoordinatorError::PendingContributionAmbiguous(count))
            }
        }
    }

    /// Returns the unique pending contribution record, mutably.
    pub fn pending_contribution_mut(&mut self) -> Result<&mut ContributionRecord, CoordinatorError> {
        let count = self.contributions.iter().filter(|record| record.is_pending()).count();
        if count != 1 {
            return Err(CoordinatorError::PendingContributionAmbiguous(count));
        }
        Ok(self
            .contributions
            .iter_mut()
            .find(|record| record.is_pending())
            .expect("counted one pending record"))
    }
}
