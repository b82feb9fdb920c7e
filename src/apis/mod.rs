pub mod finalize_circuit_post;
pub mod ping_get;
pub mod verify_contribution_post;

use crate::{authentication::Authenticator, Coordinator, CoordinatorError};

use rocket::{http::Status, Build, Rocket};
use std::sync::Arc;

/// Returns all RPC routes of the coordinator.
pub fn routes() -> Vec<rocket::Route> {
    routes![
        ping_get::ping_get,
        verify_contribution_post::verify_contribution_post,
        finalize_circuit_post::finalize_circuit_post
    ]
}

/// Assembles the RPC server over the given coordinator and authenticator.
pub fn server(coordinator: Arc<Coordinator>, authenticator: Arc<dyn Authenticator>) -> Rocket<Build> {
    rocket::build()
        .manage(coordinator)
        .manage(authenticator)
        .mount("/", routes())
}

/// Maps a coordinator error to the HTTP status surfaced to the caller.
pub(crate) fn error_status(error: &CoordinatorError) -> Status {
    match error {
        CoordinatorError::MissingInput(_) | CoordinatorError::MissingVerificationSoftware(_) => Status::BadRequest,
        CoordinatorError::MissingAuthentication | CoordinatorError::UnauthorizedRole(_) => Status::Unauthorized,
        CoordinatorError::CeremonyMissing(_)
        | CoordinatorError::CircuitMissing(_)
        | CoordinatorError::CircuitPositionMissing(_)
        | CoordinatorError::ContributionMissing(_)
        | CoordinatorError::DocumentMissing(_)
        | CoordinatorError::FinalContributionMissing(_)
        | CoordinatorError::ParticipantMissing(_) => Status::NotFound,
        CoordinatorError::CeremonyNotClosed(_)
        | CoordinatorError::ParticipantNotContributing(_)
        | CoordinatorError::ParticipantNotFinalizing(_)
        | CoordinatorError::PendingContributionAmbiguous(_)
        | CoordinatorError::QueueHeadMismatch(_) => Status::PreconditionFailed,
        _ => Status::InternalServerError,
    }
}
