use crate::objects::ParticipantId;

use serde::{Deserialize, Serialize};

/// The lifecycle state of a ceremony.
///
/// A ceremony is created externally in `SCHEDULED`, opens for contributions,
/// transitions to `CLOSED` when the contribution window ends, and is moved to
/// `FINALIZED` by the finalization handler.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CeremonyState {
    Scheduled,
    Opened,
    Paused,
    Closed,
    Finalized,
}

#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Ceremony {
    /// The lifecycle state of the ceremony.
    pub state: CeremonyState,
    /// The storage prefix shared by all of the ceremony's artifacts.
    pub prefix: String,
    /// The human-readable title of the ceremony.
    pub title: String,
    /// The identifier of the ceremony coordinator.
    pub coordinator_id: ParticipantId,
    /// The timestamp of the last update to this document, in milliseconds.
    pub last_updated: u64,
}

impl Ceremony {
    /// Returns `true` if the contribution window of the ceremony has ended.
    pub fn is_closed(&self) -> bool {
        self.state == CeremonyState::Closed
    }

    /// Returns `true` if the given participant is the ceremony coordinator.
    pub fn is_coordinator(&self, participant_id: &str) -> bool {
        self.coordinator_id == participant_id
    }
}
