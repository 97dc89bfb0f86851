use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

mod data;
pub use data::*;

mod memory;
pub use memory::*;

mod pg;
pub use pg::*;

pub type Result<T> = std::result::Result<T, DatabaseError>;
pub type SharedDatabase = Arc<dyn Database>;

/// How long a single storage operation may take before it is abandoned.
pub const STORAGE_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Error)]
pub enum DatabaseError {
    /// An unknown or internal error happened with the database
    #[error(transparent)]
    Internal(Box<dyn std::error::Error + Send + Sync>),
    /// A resource already exists
    #[error("{resource} with {field} of value {value} already exists")]
    Conflict {
        /// The resource in question
        resource: &'static str,
        /// The field that is conflicting
        field: &'static str,
        /// The conflicting value
        value: String,
    },
    /// A resource in the database doesn't exist
    #[error("{resource}:{identifier} doesn't exist")]
    NotFound {
        resource: &'static str,
        identifier: &'static str,
    },
    /// A storage operation did not complete within [STORAGE_TIMEOUT]
    #[error("storage operation timed out")]
    Timeout,
}

/// Runs a storage operation with a bounded deadline, so callers surface
/// [DatabaseError::Timeout] instead of hanging on a stuck backend.
pub async fn with_deadline<T, F>(operation: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    tokio::time::timeout(STORAGE_TIMEOUT, operation)
        .await
        .map_err(|_| DatabaseError::Timeout)?
}

/// Helper trait to reduce boilerplate
pub trait IntoDatabaseError {
    fn not_found_or(self, resource: &'static str, identifier: &'static str) -> DatabaseError;
    fn any(self) -> DatabaseError;
}

/// Helper trait to reduce boilerplate
pub trait DatabaseResult {
    /// Turns the Result into a conflict error if it's Ok()
    fn conflict_or_ok(self, resource: &'static str, field: &'static str, value: &str)
        -> Result<()>;
}

impl<T> DatabaseResult for Result<T> {
    fn conflict_or_ok(
        self,
        resource: &'static str,
        field: &'static str,
        value: &str,
    ) -> Result<()> {
        match self {
            Ok(_) => Err(DatabaseError::Conflict {
                resource,
                field,
                value: value.to_string(),
            }),
            Err(e) => match e {
                DatabaseError::NotFound {
                    resource: _,
                    identifier: _,
                } => Ok(()),
                e => Err(e),
            },
        }
    }
}

/// Represents a type that can store and fetch partyrock data
#[async_trait]
pub trait Database: Send + Sync + 'static {
    async fn create_rocker(&self, new_rocker: NewPartyRocker) -> Result<PartyRockerData>;
    async fn rocker_by_id(&self, rocker_id: PrimaryKey) -> Result<PartyRockerData>;
    async fn delete_rocker(&self, rocker_id: PrimaryKey) -> Result<()>;

    async fn create_song(&self, new_song: NewSong) -> Result<SongData>;
    async fn song_by_id(&self, song_id: PrimaryKey) -> Result<SongData>;
    async fn list_songs(&self) -> Result<Vec<SongData>>;

    async fn create_session(&self, new_session: NewSession) -> Result<ListeningSessionData>;
    async fn session_by_id(&self, session_id: PrimaryKey) -> Result<ListeningSessionData>;
    async fn list_sessions(&self) -> Result<Vec<ListeningSessionData>>;
    /// Deletes the session along with its memberships and queue entries
    /// in one atomic unit.
    async fn delete_session(&self, session_id: PrimaryKey) -> Result<()>;

    async fn create_member(&self, session_id: PrimaryKey, rocker_id: PrimaryKey) -> Result<()>;
    async fn delete_member(&self, session_id: PrimaryKey, rocker_id: PrimaryKey) -> Result<()>;

    /// Inserts the entry at its position, shifting later entries down.
    async fn create_queue_entry(&self, new_entry: NewQueueEntry) -> Result<QueueEntryData>;
    /// Deletes the entry and closes the position gap it leaves behind.
    async fn delete_queue_entry(&self, entry_id: PrimaryKey) -> Result<()>;
    async fn list_queue_entries(&self, session_id: PrimaryKey) -> Result<Vec<QueueEntryData>>;
    /// Persists recomputed scores and positions for a session's queue.
    async fn update_queue_positions(
        &self,
        session_id: PrimaryKey,
        updates: &[QueuePositionUpdate],
    ) -> Result<()>;
}

#[derive(Debug)]
pub struct NewPartyRocker {
    pub display_name: String,
}

#[derive(Debug)]
pub struct NewSong {
    pub title: String,
    pub artist: Option<String>,
}

#[derive(Debug)]
pub struct NewSession {
    /// The owner of the new session, added as its first member
    pub owner_id: PrimaryKey,
}

#[derive(Debug)]
pub struct NewQueueEntry {
    pub session_id: PrimaryKey,
    pub song_id: PrimaryKey,
    pub score: i64,
    pub position: i32,
}

#[derive(Debug, Clone, Copy)]
pub struct QueuePositionUpdate {
    pub entry_id: PrimaryKey,
    pub score: i64,
    pub position: i32,
}

#[cfg(test)]
mod test {
    use std::future::pending;

    use super::*;

    #[tokio::test(start_paused = true)]
    async fn deadline_turns_a_stall_into_a_timeout() {
        let result: Result<()> = with_deadline(pending()).await;
        assert!(matches!(result, Err(DatabaseError::Timeout)));
    }
}
