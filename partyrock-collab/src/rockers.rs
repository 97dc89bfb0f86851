use thiserror::Error;

use crate::{with_deadline, CollabContext, DatabaseError, NewPartyRocker, PartyRockerData, PrimaryKey};

/// The registry of party rockers. Identity only, no credentials; token
/// transport is a boundary concern handled elsewhere.
pub struct RockerRegistry {
    context: CollabContext,
}

#[derive(Debug, Error)]
pub enum RockerError {
    #[error("Party rocker does not exist")]
    NotFound,
    #[error("Party rocker is currently in a session")]
    CurrentlyInSession,
    #[error(transparent)]
    Database(#[from] DatabaseError),
}

impl RockerRegistry {
    pub fn new(context: &CollabContext) -> Self {
        Self {
            context: context.clone(),
        }
    }

    pub async fn create_rocker(&self, display_name: String) -> Result<PartyRockerData, RockerError> {
        let rocker = with_deadline(
            self.context
                .database
                .create_rocker(NewPartyRocker { display_name }),
        )
        .await?;

        Ok(rocker)
    }

    pub async fn rocker_by_id(&self, rocker_id: PrimaryKey) -> Result<PartyRockerData, RockerError> {
        with_deadline(self.context.database.rocker_by_id(rocker_id))
            .await
            .map_err(not_found)
    }

    /// Deletes a rocker, refusing while they are part of a session
    pub async fn delete_rocker(&self, rocker_id: PrimaryKey) -> Result<(), RockerError> {
        if self.context.membership.contains_key(&rocker_id) {
            return Err(RockerError::CurrentlyInSession);
        }

        with_deadline(self.context.database.delete_rocker(rocker_id))
            .await
            .map_err(not_found)
    }
}

fn not_found(error: DatabaseError) -> RockerError {
    match error {
        DatabaseError::NotFound { .. } => RockerError::NotFound,
        e => RockerError::Database(e),
    }
}
