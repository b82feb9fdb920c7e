use crate::objects::ParticipantId;

use serde::{Deserialize, Serialize};

/// The per-circuit ordered list of participants awaiting or holding the
/// contribution slot.
///
/// The head of `contributors` is the current contributor whenever
/// `current_contributor` is non-empty. Mutated only by the queue coordinator
/// and the contribution verifier, always inside one atomic batch.
#[derive(Debug, Clone, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WaitingQueue {
    /// The ordered sequence of participant ids; the head is the current contributor.
    pub contributors: Vec<ParticipantId>,
    /// The id of the participant currently holding the contribution slot,
    /// or the empty string if the slot is free.
    pub current_contributor: String,
    /// The number of valid contributions recorded for the circuit.
    pub completed_contributions: u64,
    /// The number of invalid contributions recorded for the circuit.
    pub failed_contributions: u64,
}

impl WaitingQueue {
    /// Returns `true` if no participant holds or awaits the contribution slot.
    pub fn is_empty(&self) -> bool {
        self.current_contributor.is_empty() && self.contributors.is_empty()
    }

    /// Returns the participant at the head of the queue, if any.
    pub fn head(&self) -> Option<&ParticipantId> {
        self.contributors.first()
    }

    /// Appends the given participant to the queue, unless already present.
    ///
    /// The duplicate guard keeps replays of the same trigger from growing
    /// the queue.
    pub fn push(&mut self, participant_id: &str) {
        if !self.contributors.iter().any(|id| id == participant_id) {
            self.contributors.push(participant_id.to_string());
        }
    }

    /// Removes the head of the queue and returns the new head, if any.
    pub fn advance(&mut self) -> Option<&ParticipantId> {
        if !self.contributors.is_empty() {
            self.contributors.remove(0);
        }
        self.contributors.first()
    }
}

/// Rolling mean timings for the circuit, in milliseconds.
///
/// Updated only on valid contributions, with the smoothing rule
/// `new = prev > 0 ? (prev + sample) / 2 : sample`. This is an exponential
/// moving average with weight 0.5 after initialization, not an arithmetic
/// mean; existing ceremonies report timings computed this way.
#[derive(Debug, Clone, Copy, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AvgTimings {
    /// Time spent by contributors computing their contribution.
    pub contribution_computation: u64,
    /// Wall-clock time of a full contribution, download through upload.
    pub full_contribution: u64,
    /// Wall-clock time of the verification handler.
    pub verify_cloud_function: u64,
}

impl AvgTimings {
    /// Absorbs the timing samples of one valid contribution.
    pub fn absorb(&mut self, contribution_computation: u64, full_contribution: u64, verify_cloud_function: u64) {
        self.contribution_computation = rolling_mean(self.contribution_computation, contribution_computation);
        self.full_contribution = rolling_mean(self.full_contribution, full_contribution);
        self.verify_cloud_function = rolling_mean(self.verify_cloud_function, verify_cloud_function);
    }
}

fn rolling_mean(prev: u64, sample: u64) -> u64 {
    match prev > 0 {
        true => (prev + sample) / 2,
        false => sample,
    }
}

/// The storage locations of the immutable artifacts the verification tool
/// runs against.
#[derive(Debug, Clone, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CircuitFiles {
    /// The filename of the genesis zkey, index 0, produced from Powers of Tau.
    pub initial_zkey_filename: String,
    /// The storage path of the genesis zkey.
    pub initial_zkey_storage_path: String,
    /// The filename of the Powers of Tau artifact.
    pub pot_filename: String,
    /// The storage path of the Powers of Tau artifact.
    pub pot_storage_path: String,
}

#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Circuit {
    /// The storage prefix shared by all of the circuit's artifacts.
    pub prefix: String,
    /// The 0-based position of the circuit in the ceremony's contribution order.
    pub sequence_position: u64,
    pub waiting_queue: WaitingQueue,
    pub avg_timings: AvgTimings,
    pub files: CircuitFiles,
    /// The identifier of the isolated compute worker assigned to the circuit.
    pub instance_id: String,
    /// The timestamp of the last update to this document, in milliseconds.
    pub last_updated: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rolling_mean_initializes_with_first_sample() {
        assert_eq!(100, rolling_mean(0, 100));
    }

    #[test]
    fn test_rolling_mean_halves_after_initialization() {
        assert_eq!(200, rolling_mean(100, 300));
        assert_eq!(350, rolling_mean(200, 500));
    }

    #[test]
    fn test_absorb_sequence() {
        let mut timings = AvgTimings::default();
        for sample in [100, 300, 500] {
            timings.absorb(sample, sample, sample);
        }
        assert_eq!(350, timings.contribution_computation);
        assert_eq!(350, timings.full_contribution);
        assert_eq!(350, timings.verify_cloud_function);
    }

    #[test]
    fn test_queue_push_is_idempotent() {
        let mut queue = WaitingQueue::default();
        queue.push("alice");
        queue.push("alice");
        assert_eq!(vec!["alice".to_string()], queue.contributors);
    }

    #[test]
    fn test_queue_advance_promotes_next_contributor() {
        let mut queue = WaitingQueue {
            contributors: vec!["alice".to_string(), "bob".to_string()],
            current_contributor: "alice".to_string(),
            ..Default::default()
        };
        assert_eq!(Some(&"bob".to_string()), queue.advance());
        assert_eq!(vec!["bob".to_string()], queue.contributors);
    }

    #[test]
    fn test_queue_wire_field_names() {
        let queue = WaitingQueue::default();
        let json = serde_json::to_value(&queue).unwrap();
        assert!(json.get("currentContributor").is_some());
        assert!(json.get("completedContributions").is_some());
        assert!(json.get("failedContributions").is_some());
    }
}
