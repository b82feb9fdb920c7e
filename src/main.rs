use phase2_coordinator::{
    apis,
    authentication::Dummy,
    blobs::MemoryBlobStore,
    clock::SystemClock,
    environment::{Environment, Parameters},
    logger::initialize_logger,
    storage::MemoryStore,
    workers::LocalWorkerPool,
    Coordinator,
    Store,
};

use std::sync::Arc;
use tokio::task;
use tracing::*;

#[tokio::main]
pub async fn main() -> anyhow::Result<()> {
    // Set the environment.
    let environment = Environment::Development(Parameters::development());
    initialize_logger(&environment);

    // Wire the collaborators.
    let store = Arc::new(MemoryStore::new());
    let events = store.subscribe();
    let blobs = Arc::new(MemoryBlobStore::new());
    let workers = Arc::new(LocalWorkerPool::new());
    let clock = Arc::new(SystemClock);

    // Instantiate the coordinator.
    let coordinator = Arc::new(Coordinator::new(environment, store, blobs, workers, clock));

    // Initialize the trigger dispatch loop.
    let operator = coordinator.clone();
    let triggers = task::spawn(async move {
        operator.serve_triggers(events).await;
    });

    // Launch the RPC server.
    debug!("Launching the RPC server");
    apis::server(coordinator, Arc::new(Dummy)).launch().await?;

    triggers.await.expect("The trigger dispatch handle has panicked");

    Ok(())
}
