use crate::CoordinatorError;

use rocket::{
    http::Status,
    request::{FromRequest, Outcome, Request},
};
use std::{fmt, sync::Arc};
use tracing::warn;

/// The role claim carried by an authenticated caller.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum Role {
    Participant,
    Coordinator,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Participant => write!(f, "participant"),
            Role::Coordinator => write!(f, "coordinator"),
        }
    }
}

/// The authenticated caller of an RPC endpoint.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Principal {
    pub identifier: String,
    pub role: Role,
}

/// A core structure for authentication of RPC callers.
pub trait Authenticator: Send + Sync {
    /// Returns the name of the authentication scheme.
    fn name(&self) -> String;

    /// Returns `true` if the authentication scheme is safe for use in production.
    fn is_secure(&self) -> bool;

    /// Resolves the given bearer token to a principal, and returns an
    /// error if the token is invalid.
    fn authenticate(&self, bearer_token: &str) -> Result<Principal, CoordinatorError>;
}

/// An insecure authenticator for development and testing, resolving tokens
/// of the form `<identifier>:<role>`.
pub struct Dummy;

impl Authenticator for Dummy {
    fn name(&self) -> String {
        "dummy".to_string()
    }

    fn is_secure(&self) -> bool {
        false
    }

    fn authenticate(&self, bearer_token: &str) -> Result<Principal, CoordinatorError> {
        let (identifier, role) = bearer_token
            .split_once(':')
            .ok_or(CoordinatorError::MissingAuthentication)?;
        let role = match role {
            "participant" => Role::Participant,
            "coordinator" => Role::Coordinator,
            other => return Err(CoordinatorError::UnauthorizedRole(other.to_string())),
        };
        Ok(Principal {
            identifier: identifier.to_string(),
            role,
        })
    }
}

#[rocket::async_trait]
impl<'r> FromRequest<'r> for Principal {
    type Error = ();

    async fn from_request(request: &'r Request<'_>) -> Outcome<Self, Self::Error> {
        let authenticator = match request.rocket().state::<Arc<dyn Authenticator>>() {
            Some(authenticator) => authenticator,
            None => return Outcome::Error((Status::InternalServerError, ())),
        };

        let token = request
            .headers()
            .get_one("Authorization")
            .and_then(|header| header.strip_prefix("Bearer "));
        match token {
            Some(token) => match authenticator.authenticate(token) {
                Ok(principal) => Outcome::Success(principal),
                Err(error) => {
                    warn!("Rejecting bearer token: {}", error);
                    Outcome::Error((Status::Unauthorized, ()))
                }
            },
            None => Outcome::Error((Status::Unauthorized, ())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dummy_resolves_roles() {
        let principal = Dummy.authenticate("alice:participant").unwrap();
        assert_eq!("alice", principal.identifier);
        assert_eq!(Role::Participant, principal.role);

        let principal = Dummy.authenticate("carol:coordinator").unwrap();
        assert_eq!(Role::Coordinator, principal.role);
    }

    #[test]
    fn test_dummy_rejects_unknown_role() {
        assert!(Dummy.authenticate("mallory:admin").is_err());
        assert!(Dummy.authenticate("no-role").is_err());
    }

    #[test]
    fn test_dummy_is_not_secure() {
        assert!(!Dummy.is_secure());
    }
}
