use crate::{
    apis::error_status,
    authentication::{Principal, Role},
    finalizer::FinalizeCircuitRequest,
    Coordinator,
};

use rocket::{http::Status, serde::json::Json, State};
use std::sync::Arc;
use tracing::error;

/// Binds the ceremony-closing beacon to a circuit. Coordinator only.
#[post("/v1/circuits/finalize", format = "json", data = "<request>")]
pub async fn finalize_circuit_post(
    coordinator: &State<Arc<Coordinator>>,
    principal: Principal,
    request: Json<FinalizeCircuitRequest>,
) -> Result<String, Status> {
    if principal.role != Role::Coordinator {
        error!("Participant {} may not finalize a circuit", principal.identifier);
        return Err(Status::Forbidden);
    }

    match coordinator.finalize_circuit(request.into_inner()).await {
        Ok(()) => Ok(json!({ "status": "ok" }).to_string()),
        Err(error) => {
            error!("Unable to finalize the circuit: {}", error);
            Err(error_status(&error))
        }
    }
}
