use crate::{
    objects::{Ceremony, CeremonyId, Circuit, CircuitId, Contribution, ContributionId, Participant, ParticipantId},
    CoordinatorError,
};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

/// A data structure representing all possible document paths in the store.
///
/// The hierarchical layout is part of the wire contract:
/// `ceremonies/{ceremonyId}/{circuits|participants}/{id}` and
/// `ceremonies/{ceremonyId}/circuits/{circuitId}/contributions/{id}`.
#[derive(Debug, Clone, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub enum Locator {
    Ceremony(CeremonyId),
    Circuit(CeremonyId, CircuitId),
    Participant(CeremonyId, ParticipantId),
    Contribution(CeremonyId, CircuitId, ContributionId),
}

impl Locator {
    /// Returns the document path string corresponding to this locator.
    pub fn to_path(&self) -> String {
        match self {
            Locator::Ceremony(ceremony_id) => format!("ceremonies/{}", ceremony_id),
            Locator::Circuit(ceremony_id, circuit_id) => {
                format!("ceremonies/{}/circuits/{}", ceremony_id, circuit_id)
            }
            Locator::Participant(ceremony_id, participant_id) => {
                format!("ceremonies/{}/participants/{}", ceremony_id, participant_id)
            }
            Locator::Contribution(ceremony_id, circuit_id, contribution_id) => format!(
                "ceremonies/{}/circuits/{}/contributions/{}",
                ceremony_id, circuit_id, contribution_id
            ),
        }
    }

    /// Returns the id of the ceremony this document belongs to.
    pub fn ceremony_id(&self) -> &str {
        match self {
            Locator::Ceremony(ceremony_id)
            | Locator::Circuit(ceremony_id, _)
            | Locator::Participant(ceremony_id, _)
            | Locator::Contribution(ceremony_id, _, _) => ceremony_id,
        }
    }
}

/// A data structure representing all possible document types in the store.
#[derive(Debug, Clone, PartialEq)]
pub enum Object {
    Ceremony(Ceremony),
    Circuit(Circuit),
    Participant(Participant),
    Contribution(Contribution),
}

impl Object {
    pub fn into_ceremony(self, locator: &Locator) -> Result<Ceremony, CoordinatorError> {
        match self {
            Object::Ceremony(ceremony) => Ok(ceremony),
            _ => Err(CoordinatorError::DocumentKindMismatch(locator.to_path())),
        }
    }

    pub fn into_circuit(self, locator: &Locator) -> Result<Circuit, CoordinatorError> {
        match self {
            Object::Circuit(circuit) => Ok(circuit),
            _ => Err(CoordinatorError::DocumentKindMismatch(locator.to_path())),
        }
    }

    pub fn into_participant(self, locator: &Locator) -> Result<Participant, CoordinatorError> {
        match self {
            Object::Participant(participant) => Ok(participant),
            _ => Err(CoordinatorError::DocumentKindMismatch(locator.to_path())),
        }
    }

    pub fn into_contribution(self, locator: &Locator) -> Result<Contribution, CoordinatorError> {
        match self {
            Object::Contribution(contribution) => Ok(contribution),
            _ => Err(CoordinatorError::DocumentKindMismatch(locator.to_path())),
        }
    }
}

/// How many times a handler retries a batch after losing a write race to a
/// concurrent handler.
pub const COMMIT_RETRY_LIMIT: usize = 5;

/// One write in an atomic batch.
#[derive(Debug, Clone)]
pub enum Write {
    Create(Locator, Object),
    /// Replaces the document at the locator, provided it still equals the
    /// snapshot the handler read. A mismatch fails the whole batch with
    /// `StorageConflict`, so read-modify-write sequences serialize.
    Update {
        locator: Locator,
        expected: Object,
        object: Object,
    },
    Delete(Locator),
}

/// An ordered set of writes committed atomically: either every write is
/// applied or none is.
#[derive(Debug, Clone, Default)]
pub struct WriteBatch {
    writes: Vec<Write>,
}

impl WriteBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create(&mut self, locator: Locator, object: Object) {
        self.writes.push(Write::Create(locator, object));
    }

    /// Stages a compare-and-swap of the document at `locator` from the
    /// `expected` snapshot to `object`.
    pub fn update(&mut self, locator: Locator, expected: Object, object: Object) {
        self.writes.push(Write::Update {
            locator,
            expected,
            object,
        });
    }

    pub fn delete(&mut self, locator: Locator) {
        self.writes.push(Write::Delete(locator));
    }

    pub fn is_empty(&self) -> bool {
        self.writes.is_empty()
    }

    pub fn len(&self) -> usize {
        self.writes.len()
    }

    pub(crate) fn into_writes(self) -> Vec<Write> {
        self.writes
    }
}

/// A change notification delivered to trigger subscribers, carrying the
/// before/after document snapshots.
#[derive(Debug, Clone)]
pub enum DocumentEvent {
    Created {
        locator: Locator,
        after: Object,
    },
    Updated {
        locator: Locator,
        before: Object,
        after: Object,
    },
}

/// A standard model for the transactional document database backing the
/// ceremony. Single source of truth; every handler reads and commits
/// through this trait.
#[async_trait]
pub trait Store: Send + Sync {
    /// Returns `true` if a document exists at the given locator.
    async fn exists(&self, locator: &Locator) -> Result<bool, CoordinatorError>;

    /// Returns the document at the given locator, if it exists.
    async fn get(&self, locator: &Locator) -> Result<Object, CoordinatorError>;

    /// Returns all circuits of the given ceremony, with their ids.
    async fn list_circuits(&self, ceremony_id: &str) -> Result<Vec<(CircuitId, Circuit)>, CoordinatorError>;

    /// Returns all contribution documents of the given circuit, with their ids.
    async fn list_contributions(
        &self,
        ceremony_id: &str,
        circuit_id: &str,
    ) -> Result<Vec<(ContributionId, Contribution)>, CoordinatorError>;

    /// Atomically applies the given batch of writes. Every update is
    /// validated against its expected snapshot first; a concurrent write
    /// since the handler's read fails the whole batch with
    /// `StorageConflict` and applies nothing.
    async fn commit(&self, batch: WriteBatch) -> Result<(), CoordinatorError>;

    /// Returns a fresh document id for a new contribution document.
    fn fresh_id(&self) -> ContributionId;

    /// Subscribes to document change events emitted by committed batches.
    fn subscribe(&self) -> mpsc::UnboundedReceiver<DocumentEvent>;
}

/// Returns the ceremony with the given id.
pub async fn fetch_ceremony(store: &dyn Store, ceremony_id: &str) -> Result<Ceremony, CoordinatorError> {
    let locator = Locator::Ceremony(ceremony_id.to_string());
    match store.get(&locator).await {
        Ok(object) => object.into_ceremony(&locator),
        Err(CoordinatorError::DocumentMissing(_)) => Err(CoordinatorError::CeremonyMissing(ceremony_id.to_string())),
        Err(error) => Err(error),
    }
}

/// Returns the circuit with the given id.
pub async fn fetch_circuit(
    store: &dyn Store,
    ceremony_id: &str,
    circuit_id: &str,
) -> Result<Circuit, CoordinatorError> {
    let locator = Locator::Circuit(ceremony_id.to_string(), circuit_id.to_string());
    match store.get(&locator).await {
        Ok(object) => object.into_circuit(&locator),
        Err(CoordinatorError::DocumentMissing(_)) => Err(CoordinatorError::CircuitMissing(circuit_id.to_string())),
        Err(error) => Err(error),
    }
}

/// Returns the participant with the given id.
pub async fn fetch_participant(
    store: &dyn Store,
    ceremony_id: &str,
    participant_id: &str,
) -> Result<Participant, CoordinatorError> {
    let locator = Locator::Participant(ceremony_id.to_string(), participant_id.to_string());
    match store.get(&locator).await {
        Ok(object) => object.into_participant(&locator),
        Err(CoordinatorError::DocumentMissing(_)) => {
            Err(CoordinatorError::ParticipantMissing(participant_id.to_string()))
        }
        Err(error) => Err(error),
    }
}

/// Returns the circuit of the given ceremony at the given 0-based sequence
/// position, with its id.
pub async fn fetch_circuit_by_position(
    store: &dyn Store,
    ceremony_id: &str,
    sequence_position: u64,
) -> Result<(CircuitId, Circuit), CoordinatorError> {
    store
        .list_circuits(ceremony_id)
        .await?
        .into_iter()
        .find(|(_, circuit)| circuit.sequence_position == sequence_position)
        .ok_or(CoordinatorError::CircuitPositionMissing(sequence_position))
}
