use crate::{objects::VerificationSoftware, CoordinatorError};

use std::time::Duration;
use tracing::Level;

/// The environment variable carrying the verification software name.
pub const VERIFICATION_SOFTWARE_NAME: &str = "CUSTOM_CONTRIBUTION_VERIFICATION_SOFTWARE_NAME";
/// The environment variable carrying the verification software version.
pub const VERIFICATION_SOFTWARE_VERSION: &str = "CUSTOM_CONTRIBUTION_VERIFICATION_SOFTWARE_VERSION";
/// The environment variable carrying the verification software commit hash.
pub const VERIFICATION_SOFTWARE_COMMIT_HASH: &str = "CUSTOM_CONTRIBUTION_VERIFICATION_SOFTWARE_COMMIT_HASH";

/// The parameters and settings of the coordinator.
#[derive(Debug, Clone)]
pub struct Parameters {
    /// How long to wait for a started worker to probe as running.
    pub worker_startup_deadline: Duration,
    /// Interval between worker readiness probes.
    pub worker_status_poll_interval: Duration,
    /// Overall deadline for one verification run on the worker.
    pub verification_deadline: Duration,
    /// Interval between command completion polls.
    pub command_poll_interval: Duration,
    /// How long to wait for the uploaded transcript to propagate before
    /// recording the contribution.
    pub transcript_settle_delay: Duration,
    /// The verification software identity, when not read from the process
    /// environment.
    pub verification_software: Option<VerificationSoftware>,
    /// The logging verbosity of the coordinator.
    pub verbosity: Level,
}

impl Parameters {
    pub fn production() -> Self {
        Self {
            worker_startup_deadline: Duration::from_secs(200),
            worker_status_poll_interval: Duration::from_secs(5),
            verification_deadline: Duration::from_secs(3600),
            command_poll_interval: Duration::from_secs(5),
            transcript_settle_delay: Duration::from_secs(3),
            verification_software: None,
            verbosity: Level::INFO,
        }
    }

    pub fn development() -> Self {
        Self {
            worker_startup_deadline: Duration::from_secs(10),
            worker_status_poll_interval: Duration::from_millis(500),
            verification_deadline: Duration::from_secs(600),
            command_poll_interval: Duration::from_millis(500),
            transcript_settle_delay: Duration::from_millis(100),
            verification_software: None,
            verbosity: Level::DEBUG,
        }
    }

    pub fn testing() -> Self {
        Self {
            worker_startup_deadline: Duration::from_millis(50),
            worker_status_poll_interval: Duration::from_millis(1),
            verification_deadline: Duration::from_millis(250),
            command_poll_interval: Duration::from_millis(1),
            transcript_settle_delay: Duration::ZERO,
            verification_software: Some(VerificationSoftware {
                name: "snarkjs".to_string(),
                version: "0.7.0".to_string(),
                commit_hash: "0000000000000000000000000000000000000000".to_string(),
            }),
            verbosity: Level::TRACE,
        }
    }
}

#[derive(Debug, Clone)]
pub enum Environment {
    Testing(Parameters),
    Development(Parameters),
    Production(Parameters),
}

impl Environment {
    /// Returns the parameter settings of the coordinator.
    pub fn parameters(&self) -> &Parameters {
        match self {
            Environment::Testing(parameters) => parameters,
            Environment::Development(parameters) => parameters,
            Environment::Production(parameters) => parameters,
        }
    }

    /// Returns the verbosity of the coordinator.
    pub fn verbosity(&self) -> Level {
        self.parameters().verbosity
    }

    ///
    /// Returns the identity of the verification software, preferring the
    /// configured value and falling back to the process environment.
    ///
    /// Absence of any of the three variables is fatal to the verifier.
    ///
    pub fn verification_software(&self) -> Result<VerificationSoftware, CoordinatorError> {
        if let Some(software) = &self.parameters().verification_software {
            return Ok(software.clone());
        }
        Ok(VerificationSoftware {
            name: require_env(VERIFICATION_SOFTWARE_NAME)?,
            version: require_env(VERIFICATION_SOFTWARE_VERSION)?,
            commit_hash: require_env(VERIFICATION_SOFTWARE_COMMIT_HASH)?,
        })
    }
}

fn require_env(name: &'static str) -> Result<String, CoordinatorError> {
    std::env::var(name).map_err(|_| CoordinatorError::MissingVerificationSoftware(name))
}

#[cfg(test)]
mod tests {
    use super::*;

    use serial_test::serial;

    #[test]
    #[serial]
    fn test_verification_software_from_process_environment() {
        let environment = Environment::Production(Parameters::production());

        std::env::remove_var(VERIFICATION_SOFTWARE_NAME);
        std::env::remove_var(VERIFICATION_SOFTWARE_VERSION);
        std::env::remove_var(VERIFICATION_SOFTWARE_COMMIT_HASH);
        assert!(matches!(
            environment.verification_software(),
            Err(CoordinatorError::MissingVerificationSoftware(VERIFICATION_SOFTWARE_NAME))
        ));

        std::env::set_var(VERIFICATION_SOFTWARE_NAME, "snarkjs");
        std::env::set_var(VERIFICATION_SOFTWARE_VERSION, "0.7.0");
        assert!(matches!(
            environment.verification_software(),
            Err(CoordinatorError::MissingVerificationSoftware(
                VERIFICATION_SOFTWARE_COMMIT_HASH
            ))
        ));

        std::env::set_var(VERIFICATION_SOFTWARE_COMMIT_HASH, "abc123");
        let software = environment.verification_software().unwrap();
        assert_eq!("snarkjs", software.name);
        assert_eq!("0.7.0", software.version);
        assert_eq!("abc123", software.commit_hash);

        std::env::remove_var(VERIFICATION_SOFTWARE_NAME);
        std::env::remove_var(VERIFICATION_SOFTWARE_VERSION);
        std::env::remove_var(VERIFICATION_SOFTWARE_COMMIT_HASH);
    }

    #[test]
    fn test_testing_parameters_carry_software_identity() {
        let environment = Environment::Testing(Parameters::testing());
        assert!(environment.verification_software().is_ok());
    }
}
