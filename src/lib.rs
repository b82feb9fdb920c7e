#[macro_use]
extern crate rocket;
#[macro_use]
extern crate serde_json;

pub mod apis;
pub mod authentication;
pub mod blobs;
pub mod clock;
pub mod coordinator;
pub mod environment;
pub mod errors;
pub mod finalizer;
pub mod logger;
pub mod objects;
pub mod refresher;
pub mod storage;
pub mod verifier;
pub mod workers;

pub use coordinator::*;
pub use errors::CoordinatorError;
pub use objects::Participant;
pub use storage::Store;

#[cfg(test)]
mod testing;
