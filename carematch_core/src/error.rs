//! Error types for the carematch_core library.

use std::io;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Kind of stored entity, used to label lookup and uniqueness failures
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Entity {
    Patient,
    Program,
}

impl std::fmt::Display for Entity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Entity::Patient => f.write_str("patient"),
            Entity::Program => f.write_str("program"),
        }
    }
}

/// Core error type for carematch_core operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Identifier does not resolve to a stored entity
    #[error("{entity} not found: {id}")]
    NotFound { entity: Entity, id: String },

    /// A natural key (national id, program name) is already taken
    #[error("{entity} already exists: {key}")]
    DuplicateKey { entity: Entity, key: String },

    /// The (patient, program) pair is already in the ledger
    #[error("patient {patient_id} is already enrolled in program {program_id}")]
    AlreadyEnrolled {
        patient_id: String,
        program_id: String,
    },

    /// Patient falls outside the program's target age group
    #[error("patient {patient_id} is not eligible for program {program_id}: {reason}")]
    NotEligible {
        patient_id: String,
        program_id: String,
        reason: String,
    },

    /// Input rejected before reaching the store
    #[error("Validation error: {0}")]
    Validation(String),

    /// Backing storage could not be reached or locked
    #[error("Storage unavailable: {0}")]
    Unavailable(String),

    /// IO error occurred
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// CSV error
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// TOML parsing error
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    /// Configuration validation error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl Error {
    pub(crate) fn patient_not_found(id: impl Into<String>) -> Self {
        Error::NotFound {
            entity: Entity::Patient,
            id: id.into(),
        }
    }

    pub(crate) fn program_not_found(id: impl Into<String>) -> Self {
        Error::NotFound {
            entity: Entity::Program,
            id: id.into(),
        }
    }
}
