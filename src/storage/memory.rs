use crate::{
    objects::{CircuitId, Contribution, ContributionId},
    storage::{DocumentEvent, Locator, Object, Store, Write, WriteBatch},
    CoordinatorError,
};

use async_trait::async_trait;
use std::{
    collections::BTreeMap,
    sync::{
        atomic::{AtomicU64, Ordering},
        Mutex,
    },
};
use tokio::sync::mpsc;
use tracing::trace;

/// An in-memory store for development and testing.
///
/// A single lock serializes batch commits, so concurrent handlers observe a
/// linearizable sequence of document states, matching the atomicity the
/// production store provides per batch.
#[derive(Default)]
pub struct MemoryStore {
    documents: Mutex<BTreeMap<String, (Locator, Object)>>,
    subscribers: Mutex<Vec<mpsc::UnboundedSender<DocumentEvent>>>,
    next_id: AtomicU64,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn publish(&self, events: Vec<DocumentEvent>) {
        let mut subscribers = self.subscribers.lock().unwrap();
        subscribers.retain(|sender| {
            events
                .iter()
                .all(|event| sender.send(event.clone()).is_ok())
        });
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn exists(&self, locator: &Locator) -> Result<bool, CoordinatorError> {
        let documents = self.documents.lock().unwrap();
        Ok(documents.contains_key(&locator.to_path()))
    }

    async fn get(&self, locator: &Locator) -> Result<Object, CoordinatorError> {
        let documents = self.documents.lock().unwrap();
        match documents.get(&locator.to_path()) {
            Some((_, object)) => Ok(object.clone()),
            None => Err(CoordinatorError::DocumentMissing(locator.to_path())),
        }
    }

    async fn list_circuits(&self, ceremony_id: &str) -> Result<Vec<(CircuitId, crate::objects::Circuit)>, CoordinatorError> {
        let documents = self.documents.lock().unwrap();
        let mut circuits = Vec::new();
        for (locator, object) in documents.values() {
            if let (Locator::Circuit(owner, circuit_id), Object::Circuit(circuit)) = (locator, object) {
                if owner == ceremony_id {
                    circuits.push((circuit_id.clone(), circuit.clone()));
                }
            }
        }
        circuits.sort_by_key(|(_, circuit)| circuit.sequence_position);
        Ok(circuits)
    }

    async fn list_contributions(
        &self,
        ceremony_id: &str,
        circuit_id: &str,
    ) -> Result<Vec<(ContributionId, Contribution)>, CoordinatorError> {
        let documents = self.documents.lock().unwrap();
        let mut contributions = Vec::new();
        for (locator, object) in documents.values() {
            if let (Locator::Contribution(owner, circuit, contribution_id), Object::Contribution(contribution)) =
                (locator, object)
            {
                if owner == ceremony_id && circuit == circuit_id {
                    contributions.push((contribution_id.clone(), contribution.clone()));
                }
            }
        }
        Ok(contributions)
    }

    async fn commit(&self, batch: WriteBatch) -> Result<(), CoordinatorError> {
        let writes = batch.into_writes();
        let mut documents = self.documents.lock().unwrap();

        // Validate every write against the current state before mutating,
        // so a failed batch leaves the store untouched. Updates must still
        // match the snapshot the handler read; a concurrent writer since
        // that read fails the batch as a conflict for the handler to retry.
        for write in &writes {
            match write {
                Write::Create(locator, _) => {
                    if documents.contains_key(&locator.to_path()) {
                        return Err(CoordinatorError::DocumentAlreadyExists(locator.to_path()));
                    }
                }
                Write::Update { locator, expected, .. } => match documents.get(&locator.to_path()) {
                    Some((_, current)) => {
                        if current != expected {
                            return Err(CoordinatorError::StorageConflict(locator.to_path()));
                        }
                    }
                    None => return Err(CoordinatorError::DocumentMissing(locator.to_path())),
                },
                Write::Delete(_) => {}
            }
        }

        let mut events = Vec::with_capacity(writes.len());
        for write in writes {
            match write {
                Write::Create(locator, object) => {
                    trace!("Creating document at {}", locator.to_path());
                    documents.insert(locator.to_path(), (locator.clone(), object.clone()));
                    events.push(DocumentEvent::Created { locator, after: object });
                }
                Write::Update { locator, object, .. } => {
                    trace!("Updating document at {}", locator.to_path());
                    let (_, before) = documents
                        .insert(locator.to_path(), (locator.clone(), object.clone()))
                        .expect("validated above");
                    events.push(DocumentEvent::Updated {
                        locator,
                        before,
                        after: object,
                    });
                }
                Write::Delete(locator) => {
                    trace!("Deleting document at {}", locator.to_path());
                    documents.remove(&locator.to_path());
                }
            }
        }
        drop(documents);

        self.publish(events);
        Ok(())
    }

    fn fresh_id(&self) -> ContributionId {
        let n = self.next_id.fetch_add(1, Ordering::SeqCst);
        format!("contribution-{:08}", n)
    }

    fn subscribe(&self) -> mpsc::UnboundedReceiver<DocumentEvent> {
        let (sender, receiver) = mpsc::unbounded_channel();
        self.subscribers.lock().unwrap().push(sender);
        receiver
    }
}
