use chrono::{DateTime, Utc};

/// The type used for primary keys in the database.
pub type PrimaryKey = i32;

/// A participant in listening sessions
#[derive(Debug, Clone)]
pub struct PartyRockerData {
    pub id: PrimaryKey,
    pub display_name: String,
}

/// A song in the catalog
#[derive(Debug, Clone)]
pub struct SongData {
    pub id: PrimaryKey,
    pub title: String,
    pub artist: Option<String>,
}

/// A listening session
#[derive(Debug, Clone)]
pub struct ListeningSessionData {
    pub id: PrimaryKey,
    pub created_at: DateTime<Utc>,
    /// The rocker in control of the session. Always present in `members`.
    pub owner_id: PrimaryKey,
    pub members: Vec<PartyRockerData>,
}

/// A single entry in a session's queue
#[derive(Debug, Clone)]
pub struct QueueEntryData {
    pub id: PrimaryKey,
    pub session_id: PrimaryKey,
    pub song: SongData,
    /// Ordering key. Higher scores play sooner.
    pub score: i64,
    /// Rank within the session's queue, starting at zero.
    pub position: i32,
}
