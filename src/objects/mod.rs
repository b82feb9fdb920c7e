pub mod ceremony;
pub mod circuit;
pub mod contribution;
pub mod participant;

pub use ceremony::{Ceremony, CeremonyState};
pub use circuit::{AvgTimings, Circuit, CircuitFiles, WaitingQueue};
pub use contribution::{
    format_zkey_index,
    Beacon,
    Contribution,
    ContributionFiles,
    VerificationSoftware,
    FINAL_ZKEY_INDEX,
    GENESIS_ZKEY_INDEX,
};
pub use participant::{ContributionRecord, ContributionStep, Participant, ParticipantStatus};

pub type CeremonyId = String;
pub type CircuitId = String;
pub type ContributionId = String;
pub type ParticipantId = String;
