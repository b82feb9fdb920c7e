pub mod memory;
pub mod store;

pub use memory::MemoryStore;
pub use store::{
    fetch_ceremony,
    fetch_circuit,
    fetch_circuit_by_position,
    fetch_participant,
    DocumentEvent,
    Locator,
    Object,
    Store,
    Write,
    WriteBatch,
    COMMIT_RETRY_LIMIT,
};
