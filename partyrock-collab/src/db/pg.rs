use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{postgres::PgPoolOptions, query, Error as SqlxError, PgPool, Row};

use super::{
    Database, DatabaseError, DatabaseResult, IntoDatabaseError, ListeningSessionData,
    NewPartyRocker, NewQueueEntry, NewSession, NewSong, PartyRockerData, PrimaryKey,
    QueueEntryData, QueuePositionUpdate, Result, SongData,
};

/// A postgres database implementation for partyrock
pub struct PgDatabase {
    pool: PgPool,
}

impl PgDatabase {
    pub async fn new(url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect(url)
            .await
            .map_err(|e| DatabaseError::Internal(Box::new(e)))?;

        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .map_err(|e| DatabaseError::Internal(Box::new(e)))?;

        Ok(Self { pool })
    }

    async fn session_members(&self, session_id: PrimaryKey) -> Result<Vec<PartyRockerData>> {
        let member_rows = query(
            "
            SELECT party_rockers.id, party_rockers.display_name
            FROM session_members
                INNER JOIN party_rockers ON session_members.rocker_id = party_rockers.id
            WHERE session_id = $1
            ORDER BY session_members.id",
        )
        .bind(session_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| e.any())?;

        let members = member_rows
            .into_iter()
            .map(|r| PartyRockerData {
                id: r.get("id"),
                display_name: r.get("display_name"),
            })
            .collect();

        Ok(members)
    }
}

#[async_trait]
impl Database for PgDatabase {
    async fn create_rocker(&self, new_rocker: NewPartyRocker) -> Result<PartyRockerData> {
        let row = query("INSERT INTO party_rockers (display_name) VALUES ($1) RETURNING id")
            .bind(&new_rocker.display_name)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| e.any())?;

        Ok(PartyRockerData {
            id: row.get("id"),
            display_name: new_rocker.display_name,
        })
    }

    async fn rocker_by_id(&self, rocker_id: PrimaryKey) -> Result<PartyRockerData> {
        let row = query("SELECT id, display_name FROM party_rockers WHERE id = $1")
            .bind(rocker_id)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| e.not_found_or("party rocker", "id"))?;

        Ok(PartyRockerData {
            id: row.get("id"),
            display_name: row.get("display_name"),
        })
    }

    async fn delete_rocker(&self, rocker_id: PrimaryKey) -> Result<()> {
        // Ensure rocker exists
        let _ = self.rocker_by_id(rocker_id).await?;

        query("DELETE FROM party_rockers WHERE id = $1")
            .bind(rocker_id)
            .execute(&self.pool)
            .await
            .map_err(|e| e.any())
            .map(|_| ())
    }

    async fn create_song(&self, new_song: NewSong) -> Result<SongData> {
        let row = query("INSERT INTO songs (title, artist) VALUES ($1, $2) RETURNING id")
            .bind(&new_song.title)
            .bind(&new_song.artist)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| e.any())?;

        Ok(SongData {
            id: row.get("id"),
            title: new_song.title,
            artist: new_song.artist,
        })
    }

    async fn song_by_id(&self, song_id: PrimaryKey) -> Result<SongData> {
        let row = query("SELECT id, title, artist FROM songs WHERE id = $1")
            .bind(song_id)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| e.not_found_or("song", "id"))?;

        Ok(SongData {
            id: row.get("id"),
            title: row.get("title"),
            artist: row.get("artist"),
        })
    }

    async fn list_songs(&self) -> Result<Vec<SongData>> {
        let rows = query("SELECT id, title, artist FROM songs ORDER BY id")
            .fetch_all(&self.pool)
            .await
            .map_err(|e| e.any())?;

        Ok(rows
            .into_iter()
            .map(|r| SongData {
                id: r.get("id"),
                title: r.get("title"),
                artist: r.get("artist"),
            })
            .collect())
    }

    async fn create_session(&self, new_session: NewSession) -> Result<ListeningSessionData> {
        let owner = self.rocker_by_id(new_session.owner_id).await?;

        let mut tx = self.pool.begin().await.map_err(|e| e.any())?;

        let row = query(
            "INSERT INTO listening_sessions (owner_id, created_at)
             VALUES ($1, now())
             RETURNING id, created_at",
        )
        .bind(owner.id)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| e.any())?;

        let session_id: PrimaryKey = row.get("id");
        let created_at: DateTime<Utc> = row.get("created_at");

        // The owner is always a member of their own session
        query("INSERT INTO session_members (session_id, rocker_id) VALUES ($1, $2)")
            .bind(session_id)
            .bind(owner.id)
            .execute(&mut *tx)
            .await
            .map_err(|e| e.any())?;

        tx.commit().await.map_err(|e| e.any())?;

        Ok(ListeningSessionData {
            id: session_id,
            created_at,
            owner_id: owner.id,
            members: vec![owner],
        })
    }

    async fn session_by_id(&self, session_id: PrimaryKey) -> Result<ListeningSessionData> {
        let row = query("SELECT id, owner_id, created_at FROM listening_sessions WHERE id = $1")
            .bind(session_id)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| e.not_found_or("listening session", "id"))?;

        let members = self.session_members(session_id).await?;

        Ok(ListeningSessionData {
            id: row.get("id"),
            created_at: row.get("created_at"),
            owner_id: row.get("owner_id"),
            members,
        })
    }

    async fn list_sessions(&self) -> Result<Vec<ListeningSessionData>> {
        let mut sessions: Vec<_> = query("SELECT id, owner_id, created_at FROM listening_sessions")
            .fetch_all(&self.pool)
            .await
            .map_err(|e| e.any())?
            .into_iter()
            .map(|row| ListeningSessionData {
                id: row.get("id"),
                created_at: row.get("created_at"),
                owner_id: row.get("owner_id"),
                members: vec![],
            })
            .collect();

        for session in sessions.iter_mut() {
            session.members = self.session_members(session.id).await?
        }

        Ok(sessions)
    }

    async fn delete_session(&self, session_id: PrimaryKey) -> Result<()> {
        // Ensure session exists
        let _ = self.session_by_id(session_id).await?;

        // Explicit cascade: entries and memberships go with the session
        let mut tx = self.pool.begin().await.map_err(|e| e.any())?;

        query("DELETE FROM queue_entries WHERE session_id = $1")
            .bind(session_id)
            .execute(&mut *tx)
            .await
            .map_err(|e| e.any())?;

        query("DELETE FROM session_members WHERE session_id = $1")
            .bind(session_id)
            .execute(&mut *tx)
            .await
            .map_err(|e| e.any())?;

        query("DELETE FROM listening_sessions WHERE id = $1")
            .bind(session_id)
            .execute(&mut *tx)
            .await
            .map_err(|e| e.any())?;

        tx.commit().await.map_err(|e| e.any())
    }

    async fn create_member(&self, session_id: PrimaryKey, rocker_id: PrimaryKey) -> Result<()> {
        // Ensure the rocker isn't a member of this session already
        query("SELECT id FROM session_members WHERE rocker_id = $1 AND session_id = $2")
            .bind(rocker_id)
            .bind(session_id)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| e.not_found_or("", ""))
            .map(|_| ())
            .conflict_or_ok(
                "session member",
                "rocker:session",
                format!("{}:{}", rocker_id, session_id).as_str(),
            )?;

        query("INSERT INTO session_members (session_id, rocker_id) VALUES ($1, $2)")
            .bind(session_id)
            .bind(rocker_id)
            .execute(&self.pool)
            .await
            .map_err(|e| e.any())
            .map(|_| ())
    }

    async fn delete_member(&self, session_id: PrimaryKey, rocker_id: PrimaryKey) -> Result<()> {
        let member = query("SELECT id FROM session_members WHERE session_id = $1 AND rocker_id = $2")
            .bind(session_id)
            .bind(rocker_id)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| e.not_found_or("session member", "session_id:rocker_id"))?;

        query("DELETE FROM session_members WHERE id = $1")
            .bind(member.get::<PrimaryKey, _>("id"))
            .execute(&self.pool)
            .await
            .map_err(|e| e.any())
            .map(|_| ())
    }

    async fn create_queue_entry(&self, new_entry: NewQueueEntry) -> Result<QueueEntryData> {
        let song = self.song_by_id(new_entry.song_id).await?;

        let mut tx = self.pool.begin().await.map_err(|e| e.any())?;

        query(
            "UPDATE queue_entries SET position = position + 1
             WHERE session_id = $1 AND position >= $2",
        )
        .bind(new_entry.session_id)
        .bind(new_entry.position)
        .execute(&mut *tx)
        .await
        .map_err(|e| e.any())?;

        let row = query(
            "INSERT INTO queue_entries (session_id, song_id, score, position)
             VALUES ($1, $2, $3, $4)
             RETURNING id",
        )
        .bind(new_entry.session_id)
        .bind(new_entry.song_id)
        .bind(new_entry.score)
        .bind(new_entry.position)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| e.any())?;

        tx.commit().await.map_err(|e| e.any())?;

        Ok(QueueEntryData {
            id: row.get("id"),
            session_id: new_entry.session_id,
            song,
            score: new_entry.score,
            position: new_entry.position,
        })
    }

    async fn delete_queue_entry(&self, entry_id: PrimaryKey) -> Result<()> {
        let mut tx = self.pool.begin().await.map_err(|e| e.any())?;

        let row = query("SELECT session_id, position FROM queue_entries WHERE id = $1")
            .bind(entry_id)
            .fetch_one(&mut *tx)
            .await
            .map_err(|e| e.not_found_or("queue entry", "id"))?;

        let session_id: PrimaryKey = row.get("session_id");
        let position: i32 = row.get("position");

        query("DELETE FROM queue_entries WHERE id = $1")
            .bind(entry_id)
            .execute(&mut *tx)
            .await
            .map_err(|e| e.any())?;

        query(
            "UPDATE queue_entries SET position = position - 1
             WHERE session_id = $1 AND position > $2",
        )
        .bind(session_id)
        .bind(position)
        .execute(&mut *tx)
        .await
        .map_err(|e| e.any())?;

        tx.commit().await.map_err(|e| e.any())
    }

    async fn list_queue_entries(&self, session_id: PrimaryKey) -> Result<Vec<QueueEntryData>> {
        let rows = query(
            "
            SELECT
                queue_entries.id,
                queue_entries.score,
                queue_entries.position,
                songs.id AS song_id,
                songs.title,
                songs.artist
            FROM queue_entries
                INNER JOIN songs ON queue_entries.song_id = songs.id
            WHERE session_id = $1
            ORDER BY position",
        )
        .bind(session_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| e.any())?;

        Ok(rows
            .into_iter()
            .map(|r| QueueEntryData {
                id: r.get("id"),
                session_id,
                song: SongData {
                    id: r.get("song_id"),
                    title: r.get("title"),
                    artist: r.get("artist"),
                },
                score: r.get("score"),
                position: r.get("position"),
            })
            .collect())
    }

    async fn update_queue_positions(
        &self,
        session_id: PrimaryKey,
        updates: &[QueuePositionUpdate],
    ) -> Result<()> {
        let mut tx = self.pool.begin().await.map_err(|e| e.any())?;

        for update in updates {
            query(
                "UPDATE queue_entries SET score = $1, position = $2
                 WHERE id = $3 AND session_id = $4",
            )
            .bind(update.score)
            .bind(update.position)
            .bind(update.entry_id)
            .bind(session_id)
            .execute(&mut *tx)
            .await
            .map_err(|e| e.any())?;
        }

        tx.commit().await.map_err(|e| e.any())
    }
}

impl IntoDatabaseError for SqlxError {
    fn any(self) -> DatabaseError {
        DatabaseError::Internal(Box::new(self))
    }

    fn not_found_or(self, resource: &'static str, identifier: &'static str) -> DatabaseError {
        match self {
            SqlxError::RowNotFound => DatabaseError::NotFound {
                resource,
                identifier,
            },
            e => Self::any(e),
        }
    }
}
