use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use partyrock_collab::{DatabaseError, RockerError, SessionError, SongError};
use thiserror::Error;

pub type ServerResult<T> = Result<T, ServerError>;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("{resource}:{identifier} not found")]
    NotFound {
        resource: &'static str,
        identifier: &'static str,
    },
    #[error("{resource} with {field} of value {value} already exists")]
    Conflict {
        resource: &'static str,
        field: &'static str,
        value: String,
    },
    /// A domain rule refused the request
    #[error("{0}")]
    Refused(String),
    #[error("{0}")]
    Forbidden(String),
    #[error("{0}")]
    Missing(String),
    #[error("Storage operation timed out")]
    StorageTimeout,
    #[error("Unknown internal error: {0}")]
    Unknown(String),
}

impl ServerError {
    fn as_status_code(&self) -> StatusCode {
        match self {
            Self::NotFound { .. } | Self::Missing(_) => StatusCode::NOT_FOUND,
            Self::Conflict { .. } | Self::Refused(_) => StatusCode::CONFLICT,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::StorageTimeout => StatusCode::GATEWAY_TIMEOUT,
            Self::Unknown(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        (self.as_status_code(), self.to_string()).into_response()
    }
}

impl From<DatabaseError> for ServerError {
    fn from(value: DatabaseError) -> Self {
        match value {
            DatabaseError::NotFound {
                resource,
                identifier,
            } => Self::NotFound {
                resource,
                identifier,
            },
            DatabaseError::Conflict {
                resource,
                field,
                value,
            } => Self::Conflict {
                resource,
                field,
                value,
            },
            DatabaseError::Timeout => Self::StorageTimeout,
            e => Self::Unknown(e.to_string()),
        }
    }
}

impl From<SessionError> for ServerError {
    fn from(value: SessionError) -> Self {
        match value {
            SessionError::SessionNotFound
            | SessionError::RockerNotFound
            | SessionError::SongNotFound
            | SessionError::EntryNotFound
            | SessionError::NotMember => Self::Missing(value.to_string()),
            SessionError::AlreadyOwnsSession
            | SessionError::AlreadyMember
            | SessionError::AlreadyInAnotherSession
            | SessionError::EmptyQueue => Self::Refused(value.to_string()),
            SessionError::NotOwner => Self::Forbidden(value.to_string()),
            SessionError::Database(e) => e.into(),
        }
    }
}

impl From<RockerError> for ServerError {
    fn from(value: RockerError) -> Self {
        match value {
            RockerError::NotFound => Self::Missing(value.to_string()),
            RockerError::CurrentlyInSession => Self::Refused(value.to_string()),
            RockerError::Database(e) => e.into(),
        }
    }
}

impl From<SongError> for ServerError {
    fn from(value: SongError) -> Self {
        match value {
            SongError::NotFound => Self::Missing(value.to_string()),
            SongError::Database(e) => e.into(),
        }
    }
}
