use crate::{
    apis::error_status,
    authentication::{Principal, Role},
    verifier::VerifyContributionRequest,
    Coordinator,
};

use rocket::{http::Status, serde::json::Json, State};
use std::sync::Arc;
use tracing::error;

///
/// Verifies an uploaded contribution.
///
/// A caller with the `participant` role may only verify their own
/// contribution; a `coordinator` may verify any, which also carries the
/// finalization path.
///
#[post("/v1/contributions/verify", format = "json", data = "<request>")]
pub async fn verify_contribution_post(
    coordinator: &State<Arc<Coordinator>>,
    principal: Principal,
    request: Json<VerifyContributionRequest>,
) -> Result<String, Status> {
    let request = request.into_inner();

    if principal.role == Role::Participant
        && principal.identifier != request.contributor_or_coordinator_identifier
    {
        error!(
            "Participant {} may not verify a contribution by {}",
            principal.identifier, request.contributor_or_coordinator_identifier
        );
        return Err(Status::Forbidden);
    }

    match coordinator.verify_contribution(request).await {
        Ok(()) => Ok(json!({ "status": "ok" }).to_string()),
        Err(error) => {
            error!("Unable to verify the contribution: {}", error);
            Err(error_status(&error))
        }
    }
}
