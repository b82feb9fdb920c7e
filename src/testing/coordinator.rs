use crate::{
    blobs::MemoryBlobStore,
    clock::Clock,
    environment::{Environment, Parameters},
    logger::initialize_logger,
    objects::{
        Ceremony,
        CeremonyState,
        Circuit,
        CircuitFiles,
        ContributionRecord,
        ContributionStep,
        Participant,
        ParticipantStatus,
    },
    storage::{
        fetch_circuit,
        fetch_participant,
        DocumentEvent,
        Locator,
        MemoryStore,
        Object,
        Store,
        WriteBatch,
    },
    testing::worker::ScriptedWorkerPool,
    Coordinator,
};

use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};
use tokio::sync::{mpsc, Mutex};

pub const TEST_CEREMONY_ID: &str = "test-ceremony";
pub const TEST_BUCKET: &str = "test-ceremony-bucket";
pub const TEST_COORDINATOR_ID: &str = "test-coordinator";

/// A deterministic clock driven by the test.
pub struct ManualClock(AtomicU64);

impl ManualClock {
    pub fn new(start: u64) -> Self {
        Self(AtomicU64::new(start))
    }

    pub fn advance(&self, millis: u64) {
        self.0.fetch_add(millis, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_millis(&self) -> u64 {
        self.0.load(Ordering::SeqCst)
    }
}

/// A fully wired coordinator over in-memory collaborators, with the store
/// event subscription pumped on demand.
pub struct TestCoordinator {
    pub coordinator: Arc<Coordinator>,
    pub store: Arc<MemoryStore>,
    pub blobs: Arc<MemoryBlobStore>,
    pub workers: Arc<ScriptedWorkerPool>,
    pub clock: Arc<ManualClock>,
    events: Mutex<mpsc::UnboundedReceiver<DocumentEvent>>,
}

impl TestCoordinator {
    pub fn new() -> Self {
        let environment = Environment::Testing(Parameters::testing());
        initialize_logger(&environment);

        let store = Arc::new(MemoryStore::new());
        let events = Mutex::new(store.subscribe());
        let blobs = Arc::new(MemoryBlobStore::new());
        let workers = Arc::new(ScriptedWorkerPool::new());
        let clock = Arc::new(ManualClock::new(1_000_000));

        let coordinator = Arc::new(Coordinator::new(
            environment,
            store.clone(),
            blobs.clone(),
            workers.clone(),
            clock.clone(),
        ));

        Self {
            coordinator,
            store,
            blobs,
            workers,
            clock,
            events,
        }
    }

    ///
    /// Dispatches buffered store change events until the system goes quiet,
    /// standing in for the platform's trigger delivery.
    ///
    pub async fn settle(&self) {
        loop {
            let event = self.events.lock().await.try_recv();
            match event {
                Ok(event) => self.coordinator.dispatch_event(event).await,
                Err(_) => break,
            }
        }
    }

    pub async fn seed_ceremony(&self, state: CeremonyState) {
        let mut batch = WriteBatch::new();
        batch.create(
            Locator::Ceremony(TEST_CEREMONY_ID.to_string()),
            Object::Ceremony(Ceremony {
                state,
                prefix: "test_ceremony".to_string(),
                title: "Test ceremony".to_string(),
                coordinator_id: TEST_COORDINATOR_ID.to_string(),
                last_updated: self.clock.now_millis(),
            }),
        );
        self.store.commit(batch).await.unwrap();
    }

    pub async fn seed_circuit(&self, circuit_id: &str, prefix: &str, sequence_position: u64) {
        let mut batch = WriteBatch::new();
        batch.create(
            Locator::Circuit(TEST_CEREMONY_ID.to_string(), circuit_id.to_string()),
            Object::Circuit(Circuit {
                prefix: prefix.to_string(),
                sequence_position,
                waiting_queue: Default::default(),
                avg_timings: Default::default(),
                files: CircuitFiles {
                    initial_zkey_filename: format!("{}_00000.zkey", prefix),
                    initial_zkey_storage_path: format!("circuits/{}/contributions/{}_00000.zkey", prefix, prefix),
                    pot_filename: "powersOfTau28_hez_final_02.ptau".to_string(),
                    pot_storage_path: "pot/powersOfTau28_hez_final_02.ptau".to_string(),
                },
                instance_id: format!("vm-{}", circuit_id),
                last_updated: self.clock.now_millis(),
            }),
        );
        self.store.commit(batch).await.unwrap();
    }

    pub async fn seed_participant(&self, participant_id: &str, participant: Participant) {
        let mut batch = WriteBatch::new();
        batch.create(
            Locator::Participant(TEST_CEREMONY_ID.to_string(), participant_id.to_string()),
            Object::Participant(participant),
        );
        self.store.commit(batch).await.unwrap();
    }

    /// Applies the given mutation to a participant document, as the
    /// contributor-facing surfaces would.
    pub async fn update_participant<F>(&self, participant_id: &str, mutate: F)
    where
        F: FnOnce(&mut Participant),
    {
        let stored = self.participant(participant_id).await;
        let mut participant = stored.clone();
        mutate(&mut participant);
        participant.last_updated = self.clock.now_millis();

        let mut batch = WriteBatch::new();
        batch.update(
            Locator::Participant(TEST_CEREMONY_ID.to_string(), participant_id.to_string()),
            Object::Participant(stored),
            Object::Participant(participant),
        );
        self.store.commit(batch).await.unwrap();
    }

    /// Applies the given mutation to a circuit document.
    pub async fn update_circuit<F>(&self, circuit_id: &str, mutate: F)
    where
        F: FnOnce(&mut Circuit),
    {
        let stored = self.circuit(circuit_id).await;
        let mut circuit = stored.clone();
        mutate(&mut circuit);

        let mut batch = WriteBatch::new();
        batch.update(
            Locator::Circuit(TEST_CEREMONY_ID.to_string(), circuit_id.to_string()),
            Object::Circuit(stored),
            Object::Circuit(circuit),
        );
        self.store.commit(batch).await.unwrap();
    }

    pub async fn participant(&self, participant_id: &str) -> Participant {
        fetch_participant(self.store.as_ref(), TEST_CEREMONY_ID, participant_id)
            .await
            .unwrap()
    }

    pub async fn circuit(&self, circuit_id: &str) -> Circuit {
        fetch_circuit(self.store.as_ref(), TEST_CEREMONY_ID, circuit_id)
            .await
            .unwrap()
    }
}

/// A participant document as it looks right after joining a ceremony.
pub fn fresh_participant() -> Participant {
    Participant {
        status: ParticipantStatus::Waiting,
        contribution_step: ContributionStep::Downloading,
        contribution_progress: 0,
        contributions: Vec::new(),
        contribution_started_at: 0,
        verification_started_at: 0,
        temp_contribution_data: None,
        last_updated: 0,
    }
}

/// A contribution record as the contributor leaves it after uploading:
/// hash and computation time set, document reference not yet attached.
pub fn uploaded_record(computation_time: u64) -> ContributionRecord {
    ContributionRecord {
        hash: Some("b4a2f3c1".to_string()),
        computation_time: Some(computation_time),
        doc: None,
    }
}
