//! Error taxonomy of the data layer.
//!
//! Read resolvers fold most of these into degraded results; mutations return
//! them to the caller. `DataError` is `Clone` because one coalesced load hands
//! the same outcome to every waiter.

use thiserror::Error;

use crate::api::ApiError;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum DataError {
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: String },

    #[error("Rate limited after {attempts} attempts")]
    RateLimited { attempts: u32 },

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("{0}")]
    Validation(#[from] ValidationError),

    #[error("Timed out after {budget_ms}ms: {operation}")]
    Timeout { operation: String, budget_ms: u64 },

    #[error("Upstream error: {0}")]
    Upstream(String),

    #[error("Unexpected record shape: {0}")]
    Schema(String),
}

impl DataError {
    pub fn not_found(entity: &'static str, id: impl Into<String>) -> Self {
        DataError::NotFound {
            entity,
            id: id.into(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, DataError::NotFound { .. })
    }
}

impl From<ApiError> for DataError {
    fn from(e: ApiError) -> Self {
        match e {
            ApiError::RateLimited => DataError::RateLimited { attempts: 1 },
            ApiError::NetworkError(msg) => DataError::Transport(msg),
            ApiError::NotFound(msg) => DataError::Upstream(format!("not found: {}", msg)),
            other => DataError::Upstream(other.to_string()),
        }
    }
}

/// Caller-supplied data failed a precondition. Never retried.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    #[error("Missing required field: {0}")]
    MissingField(&'static str),

    #[error("Cannot change status from {from} to {to}")]
    InvalidStatusTransition { from: String, to: String },

    #[error("Event is full ({capacity} of {capacity} places taken)")]
    CapacityExceeded { capacity: u32 },

    #[error("Contact is already registered for this event")]
    AlreadyRegistered,

    #[error("Contact is not registered for this event")]
    NotRegistered,

    #[error("Registration is closed for this event")]
    RegistrationClosed,

    #[error("This program requires a team")]
    TeamRequired,

    #[error("Contact is already a member of this team")]
    DuplicateMember,

    #[error("Team is full ({max} active members)")]
    TeamFull { max: u32 },

    #[error("Contact already participates in this cohort")]
    DuplicateParticipation,

    #[error("Not enough points: {available} available, reward costs {cost}")]
    InsufficientPoints { available: i64, cost: i64 },

    #[error("Reward is not available")]
    RewardUnavailable,

    #[error("End date is before start date")]
    InvalidDateRange,

    #[error("An open partnership already exists for this institution and program")]
    DuplicatePartnership,

    #[error("{0}")]
    Invalid(String),
}
