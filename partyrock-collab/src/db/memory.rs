use std::sync::atomic::{AtomicI32, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;

use super::{
    Database, DatabaseError, ListeningSessionData, NewPartyRocker, NewQueueEntry, NewSession,
    NewSong, PartyRockerData, PrimaryKey, QueueEntryData, QueuePositionUpdate, Result, SongData,
};

/// An in-memory database implementation for partyrock.
///
/// Used by tests, and as the storage backend when no database url is
/// configured. Mutations on a single session are serialized by the session's
/// write lock, so the maps here only need to be safe for concurrent access.
#[derive(Default)]
pub struct MemoryDatabase {
    id_counter: AtomicI32,

    rockers: DashMap<PrimaryKey, PartyRockerData>,
    songs: DashMap<PrimaryKey, SongData>,
    sessions: DashMap<PrimaryKey, StoredSession>,
    members: DashMap<PrimaryKey, Vec<PrimaryKey>>,
    entries: DashMap<PrimaryKey, StoredEntry>,
}

#[derive(Debug, Clone)]
struct StoredSession {
    owner_id: PrimaryKey,
    created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
struct StoredEntry {
    session_id: PrimaryKey,
    song_id: PrimaryKey,
    score: i64,
    position: i32,
}

impl MemoryDatabase {
    pub fn new() -> Self {
        Self::default()
    }

    fn next_id(&self) -> PrimaryKey {
        self.id_counter.fetch_add(1, Ordering::SeqCst) + 1
    }

    fn not_found(resource: &'static str) -> DatabaseError {
        DatabaseError::NotFound {
            resource,
            identifier: "id",
        }
    }

    fn session_data(&self, session_id: PrimaryKey) -> Result<ListeningSessionData> {
        let session = self
            .sessions
            .get(&session_id)
            .map(|s| s.clone())
            .ok_or(Self::not_found("listening session"))?;

        let member_ids = self
            .members
            .get(&session_id)
            .map(|m| m.clone())
            .unwrap_or_default();

        let members = member_ids
            .into_iter()
            .filter_map(|id| self.rockers.get(&id).map(|r| r.clone()))
            .collect();

        Ok(ListeningSessionData {
            id: session_id,
            created_at: session.created_at,
            owner_id: session.owner_id,
            members,
        })
    }
}

#[async_trait]
impl Database for MemoryDatabase {
    async fn create_rocker(&self, new_rocker: NewPartyRocker) -> Result<PartyRockerData> {
        let rocker = PartyRockerData {
            id: self.next_id(),
            display_name: new_rocker.display_name,
        };

        self.rockers.insert(rocker.id, rocker.clone());
        Ok(rocker)
    }

    async fn rocker_by_id(&self, rocker_id: PrimaryKey) -> Result<PartyRockerData> {
        self.rockers
            .get(&rocker_id)
            .map(|r| r.clone())
            .ok_or(Self::not_found("party rocker"))
    }

    async fn delete_rocker(&self, rocker_id: PrimaryKey) -> Result<()> {
        self.rockers
            .remove(&rocker_id)
            .map(|_| ())
            .ok_or(Self::not_found("party rocker"))
    }

    async fn create_song(&self, new_song: NewSong) -> Result<SongData> {
        let song = SongData {
            id: self.next_id(),
            title: new_song.title,
            artist: new_song.artist,
        };

        self.songs.insert(song.id, song.clone());
        Ok(song)
    }

    async fn song_by_id(&self, song_id: PrimaryKey) -> Result<SongData> {
        self.songs
            .get(&song_id)
            .map(|s| s.clone())
            .ok_or(Self::not_found("song"))
    }

    async fn list_songs(&self) -> Result<Vec<SongData>> {
        let mut songs: Vec<_> = self.songs.iter().map(|s| s.clone()).collect();
        songs.sort_by_key(|s| s.id);
        Ok(songs)
    }

    async fn create_session(&self, new_session: NewSession) -> Result<ListeningSessionData> {
        let owner = self.rocker_by_id(new_session.owner_id).await?;

        let session = StoredSession {
            owner_id: owner.id,
            created_at: Utc::now(),
        };

        let session_id = self.next_id();
        self.sessions.insert(session_id, session.clone());
        self.members.insert(session_id, vec![owner.id]);

        Ok(ListeningSessionData {
            id: session_id,
            created_at: session.created_at,
            owner_id: owner.id,
            members: vec![owner],
        })
    }

    async fn session_by_id(&self, session_id: PrimaryKey) -> Result<ListeningSessionData> {
        self.session_data(session_id)
    }

    async fn list_sessions(&self) -> Result<Vec<ListeningSessionData>> {
        let ids: Vec<_> = self.sessions.iter().map(|s| *s.key()).collect();

        let mut sessions: Vec<_> = ids
            .into_iter()
            .filter_map(|id| self.session_data(id).ok())
            .collect();

        sessions.sort_by_key(|s| s.id);
        Ok(sessions)
    }

    async fn delete_session(&self, session_id: PrimaryKey) -> Result<()> {
        self.sessions
            .remove(&session_id)
            .ok_or(Self::not_found("listening session"))?;

        // Explicit cascade: entries and memberships go with the session
        self.members.remove(&session_id);
        self.entries.retain(|_, e| e.session_id != session_id);

        Ok(())
    }

    async fn create_member(&self, session_id: PrimaryKey, rocker_id: PrimaryKey) -> Result<()> {
        if !self.sessions.contains_key(&session_id) {
            return Err(Self::not_found("listening session"));
        }

        let mut members = self.members.entry(session_id).or_default();

        if members.contains(&rocker_id) {
            return Err(DatabaseError::Conflict {
                resource: "session member",
                field: "rocker:session",
                value: format!("{}:{}", rocker_id, session_id),
            });
        }

        members.push(rocker_id);
        Ok(())
    }

    async fn delete_member(&self, session_id: PrimaryKey, rocker_id: PrimaryKey) -> Result<()> {
        let mut members = self
            .members
            .get_mut(&session_id)
            .ok_or(Self::not_found("listening session"))?;

        let before = members.len();
        members.retain(|id| *id != rocker_id);

        if members.len() == before {
            return Err(DatabaseError::NotFound {
                resource: "session member",
                identifier: "session_id:rocker_id",
            });
        }

        Ok(())
    }

    async fn create_queue_entry(&self, new_entry: NewQueueEntry) -> Result<QueueEntryData> {
        let song = self.song_by_id(new_entry.song_id).await?;

        if !self.sessions.contains_key(&new_entry.session_id) {
            return Err(Self::not_found("listening session"));
        }

        // Shift later entries down to make room
        self.entries.alter_all(|_, mut e| {
            if e.session_id == new_entry.session_id && e.position >= new_entry.position {
                e.position += 1;
            }
            e
        });

        let entry_id = self.next_id();

        self.entries.insert(
            entry_id,
            StoredEntry {
                session_id: new_entry.session_id,
                song_id: new_entry.song_id,
                score: new_entry.score,
                position: new_entry.position,
            },
        );

        Ok(QueueEntryData {
            id: entry_id,
            session_id: new_entry.session_id,
            song,
            score: new_entry.score,
            position: new_entry.position,
        })
    }

    async fn delete_queue_entry(&self, entry_id: PrimaryKey) -> Result<()> {
        let (_, removed) = self
            .entries
            .remove(&entry_id)
            .ok_or(Self::not_found("queue entry"))?;

        // Close the position gap the entry leaves behind
        self.entries.alter_all(|_, mut e| {
            if e.session_id == removed.session_id && e.position > removed.position {
                e.position -= 1;
            }
            e
        });

        Ok(())
    }

    async fn list_queue_entries(&self, session_id: PrimaryKey) -> Result<Vec<QueueEntryData>> {
        let mut entries: Vec<_> = self
            .entries
            .iter()
            .filter(|e| e.session_id == session_id)
            .filter_map(|e| {
                self.songs.get(&e.song_id).map(|song| QueueEntryData {
                    id: *e.key(),
                    session_id,
                    song: song.clone(),
                    score: e.score,
                    position: e.position,
                })
            })
            .collect();

        entries.sort_by_key(|e| e.position);
        Ok(entries)
    }

    async fn update_queue_positions(
        &self,
        session_id: PrimaryKey,
        updates: &[QueuePositionUpdate],
    ) -> Result<()> {
        for update in updates {
            if let Some(mut entry) = self.entries.get_mut(&update.entry_id) {
                if entry.session_id == session_id {
                    entry.score = update.score;
                    entry.position = update.position;
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[tokio::test]
    async fn session_delete_cascades() {
        let db = MemoryDatabase::new();

        let owner = db
            .create_rocker(NewPartyRocker {
                display_name: "ada".to_string(),
            })
            .await
            .unwrap();

        let song = db
            .create_song(NewSong {
                title: "strawberries".to_string(),
                artist: None,
            })
            .await
            .unwrap();

        let session = db
            .create_session(NewSession { owner_id: owner.id })
            .await
            .unwrap();

        db.create_queue_entry(NewQueueEntry {
            session_id: session.id,
            song_id: song.id,
            score: 1,
            position: 0,
        })
        .await
        .unwrap();

        db.delete_session(session.id).await.unwrap();

        assert!(matches!(
            db.session_by_id(session.id).await,
            Err(DatabaseError::NotFound { .. })
        ));
        assert!(db
            .list_queue_entries(session.id)
            .await
            .unwrap()
            .is_empty());

        // A second delete observes the session as gone
        assert!(matches!(
            db.delete_session(session.id).await,
            Err(DatabaseError::NotFound { .. })
        ));
    }
}
