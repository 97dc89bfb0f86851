mod session;

use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use log::info;
use thiserror::Error;

pub use session::*;

use crate::{
    events::CollabEvent, with_deadline, CollabContext, DatabaseError, NewSession, PartyRockerData,
    PrimaryKey,
};

/// Placeholder mapping for a membership slot reserved while the session row
/// is still being created. Real session ids start at 1.
const RESERVED_SESSION: SessionId = 0;

/// Creates, closes, and tracks listening sessions, and manages who is a
/// member of which one. Ownership and membership share a single write path,
/// so the owner-is-always-a-member invariant holds everywhere.
pub struct SessionManager {
    context: CollabContext,
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Listening session does not exist")]
    SessionNotFound,
    #[error("Party rocker does not exist")]
    RockerNotFound,
    #[error("Song does not exist")]
    SongNotFound,
    #[error("Rocker already owns an active session")]
    AlreadyOwnsSession,
    #[error("Rocker is already a member of this session")]
    AlreadyMember,
    #[error("Rocker is already a member of another session")]
    AlreadyInAnotherSession,
    #[error("Only the session owner can do that")]
    NotOwner,
    #[error("Rocker is not a member of this session")]
    NotMember,
    #[error("Queue entry does not exist")]
    EntryNotFound,
    #[error("The queue is empty")]
    EmptyQueue,
    #[error(transparent)]
    Database(#[from] DatabaseError),
}

impl SessionManager {
    pub fn new(context: &CollabContext) -> Self {
        Self {
            context: context.clone(),
        }
    }

    /// Restores persisted sessions and their queues on init
    pub async fn restore(&self) -> Result<(), DatabaseError> {
        let sessions = with_deadline(self.context.database.list_sessions()).await?;

        for data in sessions {
            let entries =
                with_deadline(self.context.database.list_queue_entries(data.id)).await?;

            for member in &data.members {
                self.context.membership.insert(member.id, data.id);
            }

            let session = Arc::new(ListeningSession::new(&self.context, data.clone(), entries));
            self.context.sessions.insert(data.id, session);
        }

        Ok(())
    }

    /// Creates a new session with the owner as its first member
    pub async fn create_session(
        &self,
        owner_id: PrimaryKey,
    ) -> Result<Arc<ListeningSession>, SessionError> {
        let already_owns = self
            .context
            .sessions
            .iter()
            .any(|s| s.owner_id() == owner_id);

        if already_owns {
            return Err(SessionError::AlreadyOwnsSession);
        }

        // A rocker can only be in one session at a time. Reserving the slot
        // atomically means a concurrent join or create cannot slip past the
        // check while the session row is persisted.
        match self.context.membership.entry(owner_id) {
            Entry::Occupied(_) => return Err(SessionError::AlreadyInAnotherSession),
            Entry::Vacant(slot) => {
                slot.insert(RESERVED_SESSION);
            }
        }

        let created = with_deadline(self.context.database.create_session(NewSession { owner_id }))
            .await
            .map_err(|e| match e {
                DatabaseError::NotFound {
                    resource: "party rocker",
                    ..
                } => SessionError::RockerNotFound,
                e => e.into(),
            });

        let data = match created {
            Ok(data) => data,
            Err(e) => {
                // Nothing was persisted, release the reservation
                self.context.membership.remove(&owner_id);
                return Err(e);
            }
        };

        let owner = data
            .members
            .first()
            .cloned()
            .expect("new session has its owner as a member");

        let session = Arc::new(ListeningSession::new(&self.context, data.clone(), vec![]));

        self.context.sessions.insert(data.id, session.clone());
        self.context.membership.insert(owner_id, data.id);

        info!("{} opened session {}", owner.display_name, data.id);

        self.context.emit(CollabEvent::SessionCreated {
            session_id: data.id,
            owner,
        });

        Ok(session)
    }

    /// Closes a session, cascading deletion of its memberships and queue.
    /// Terminal, and idempotent under concurrent double invocation: the
    /// second caller observes the session as already gone.
    pub async fn close_session(
        &self,
        session_id: SessionId,
        requester_id: PrimaryKey,
    ) -> Result<(), SessionError> {
        let session = self.session_by_id(session_id)?;

        if session.owner_id() != requester_id {
            return Err(SessionError::NotOwner);
        }

        let _guard = session.write_lock().await;

        // A concurrent close may have won while waiting for the lock
        if !self.context.sessions.contains_key(&session_id) {
            return Err(SessionError::SessionNotFound);
        }

        // Persist the cascade before touching memory, so a storage failure
        // leaves the session fully intact and the close can be retried
        match with_deadline(self.context.database.delete_session(session_id)).await {
            Ok(()) => {}
            // Already gone from storage, tear down our state anyway
            Err(DatabaseError::NotFound { .. }) => {}
            Err(e) => return Err(e.into()),
        }

        self.context.sessions.remove(&session_id);

        for member in session.data().members {
            self.context.membership.remove(&member.id);
        }

        info!("Session {} closed", session_id);
        self.context.emit(CollabEvent::SessionClosed { session_id });

        Ok(())
    }

    pub fn session_by_id(
        &self,
        session_id: SessionId,
    ) -> Result<Arc<ListeningSession>, SessionError> {
        self.context
            .sessions
            .get(&session_id)
            .map(|s| s.clone())
            .ok_or(SessionError::SessionNotFound)
    }

    /// Get all active sessions
    pub fn list_all(&self) -> Vec<Arc<ListeningSession>> {
        self.context.sessions.iter().map(|s| s.clone()).collect()
    }

    /// Adds a rocker to a session
    pub async fn join(
        &self,
        session_id: SessionId,
        rocker_id: PrimaryKey,
    ) -> Result<(), SessionError> {
        let session = self.session_by_id(session_id)?;
        let _guard = session.write_lock().await;

        // The session may have closed while waiting for the lock
        if !self.context.sessions.contains_key(&session_id) {
            return Err(SessionError::SessionNotFound);
        }

        if session.is_member(rocker_id) {
            return Err(SessionError::AlreadyMember);
        }

        // Reserve the rocker's membership slot atomically, so a concurrent
        // join into another session cannot pass the check at the same time
        match self.context.membership.entry(rocker_id) {
            Entry::Occupied(_) => return Err(SessionError::AlreadyInAnotherSession),
            Entry::Vacant(slot) => {
                slot.insert(session_id);
            }
        }

        let rocker = match self.persist_member(session_id, rocker_id).await {
            Ok(rocker) => rocker,
            Err(e) => {
                // Nothing was persisted, release the reservation
                self.context.membership.remove(&rocker_id);
                return Err(e);
            }
        };

        session.add_member(rocker);

        Ok(())
    }

    async fn persist_member(
        &self,
        session_id: SessionId,
        rocker_id: PrimaryKey,
    ) -> Result<PartyRockerData, SessionError> {
        let rocker = with_deadline(self.context.database.rocker_by_id(rocker_id))
            .await
            .map_err(|e| match e {
                DatabaseError::NotFound {
                    resource: "party rocker",
                    ..
                } => SessionError::RockerNotFound,
                e => e.into(),
            })?;

        with_deadline(self.context.database.create_member(session_id, rocker_id)).await?;

        Ok(rocker)
    }

    /// Removes a rocker from a session. When the owner leaves, the session
    /// closes with them.
    pub async fn leave(
        &self,
        session_id: SessionId,
        rocker_id: PrimaryKey,
    ) -> Result<(), SessionError> {
        let session = self.session_by_id(session_id)?;

        if session.owner_id() == rocker_id {
            return self.close_session(session_id, rocker_id).await;
        }

        let _guard = session.write_lock().await;

        if !self.context.sessions.contains_key(&session_id) {
            return Err(SessionError::SessionNotFound);
        }

        session.member_by_rocker_id(rocker_id)?;

        with_deadline(self.context.database.delete_member(session_id, rocker_id)).await?;

        session.remove_member(rocker_id);
        self.context.membership.remove(&rocker_id);

        Ok(())
    }
}

#[cfg(test)]
mod test {
    use std::sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    };
    use std::time::Duration;

    use async_trait::async_trait;
    use tokio::time::sleep;

    use crate::{
        Database, DatabaseError, ListeningSessionData, MemoryDatabase, NewPartyRocker,
        NewQueueEntry, NewSession, NewSong, PartyRock, PartyRockerData, PrimaryKey,
        QueueEntryData, QueuePositionUpdate, Result as DbResult, SongData, STORAGE_TIMEOUT,
    };

    use super::SessionError;

    fn setup() -> PartyRock {
        PartyRock::new(Arc::new(MemoryDatabase::new()))
    }

    /// Wraps [MemoryDatabase] to act like a misbehaving storage backend
    struct UnreliableDatabase {
        inner: MemoryDatabase,
        member_insert_delay: Duration,
        failing_session_deletes: AtomicBool,
    }

    impl UnreliableDatabase {
        fn new() -> Self {
            Self::with_member_insert_delay(Duration::ZERO)
        }

        fn with_member_insert_delay(delay: Duration) -> Self {
            Self {
                inner: MemoryDatabase::new(),
                member_insert_delay: delay,
                failing_session_deletes: AtomicBool::new(false),
            }
        }

        fn fail_session_deletes(&self, fail: bool) {
            self.failing_session_deletes.store(fail, Ordering::SeqCst);
        }
    }

    #[async_trait]
    impl Database for UnreliableDatabase {
        async fn create_rocker(&self, new_rocker: NewPartyRocker) -> DbResult<PartyRockerData> {
            self.inner.create_rocker(new_rocker).await
        }

        async fn rocker_by_id(&self, rocker_id: PrimaryKey) -> DbResult<PartyRockerData> {
            self.inner.rocker_by_id(rocker_id).await
        }

        async fn delete_rocker(&self, rocker_id: PrimaryKey) -> DbResult<()> {
            self.inner.delete_rocker(rocker_id).await
        }

        async fn create_song(&self, new_song: NewSong) -> DbResult<SongData> {
            self.inner.create_song(new_song).await
        }

        async fn song_by_id(&self, song_id: PrimaryKey) -> DbResult<SongData> {
            self.inner.song_by_id(song_id).await
        }

        async fn list_songs(&self) -> DbResult<Vec<SongData>> {
            self.inner.list_songs().await
        }

        async fn create_session(&self, new_session: NewSession) -> DbResult<ListeningSessionData> {
            self.inner.create_session(new_session).await
        }

        async fn session_by_id(&self, session_id: PrimaryKey) -> DbResult<ListeningSessionData> {
            self.inner.session_by_id(session_id).await
        }

        async fn list_sessions(&self) -> DbResult<Vec<ListeningSessionData>> {
            self.inner.list_sessions().await
        }

        async fn delete_session(&self, session_id: PrimaryKey) -> DbResult<()> {
            if self.failing_session_deletes.load(Ordering::SeqCst) {
                return Err(DatabaseError::Internal("storage offline".into()));
            }

            self.inner.delete_session(session_id).await
        }

        async fn create_member(&self, session_id: PrimaryKey, rocker_id: PrimaryKey) -> DbResult<()> {
            sleep(self.member_insert_delay).await;
            self.inner.create_member(session_id, rocker_id).await
        }

        async fn delete_member(&self, session_id: PrimaryKey, rocker_id: PrimaryKey) -> DbResult<()> {
            self.inner.delete_member(session_id, rocker_id).await
        }

        async fn create_queue_entry(&self, new_entry: NewQueueEntry) -> DbResult<QueueEntryData> {
            self.inner.create_queue_entry(new_entry).await
        }

        async fn delete_queue_entry(&self, entry_id: PrimaryKey) -> DbResult<()> {
            self.inner.delete_queue_entry(entry_id).await
        }

        async fn list_queue_entries(&self, session_id: PrimaryKey) -> DbResult<Vec<QueueEntryData>> {
            self.inner.list_queue_entries(session_id).await
        }

        async fn update_queue_positions(
            &self,
            session_id: PrimaryKey,
            updates: &[QueuePositionUpdate],
        ) -> DbResult<()> {
            self.inner.update_queue_positions(session_id, updates).await
        }
    }

    async fn rocker(collab: &PartyRock, name: &str) -> PartyRockerData {
        collab
            .rockers
            .create_rocker(name.to_string())
            .await
            .expect("rocker is created")
    }

    async fn song(collab: &PartyRock, title: &str) -> SongData {
        collab
            .songs
            .add_song(title.to_string(), None)
            .await
            .expect("song is created")
    }

    #[tokio::test]
    async fn owner_is_always_a_member() {
        let collab = setup();
        let ada = rocker(&collab, "ada").await;

        let session = collab.sessions.create_session(ada.id).await.unwrap();
        let data = session.data();

        assert_eq!(data.owner_id, ada.id);
        assert_eq!(data.members.len(), 1);
        assert_eq!(data.members[0].id, ada.id);
    }

    #[tokio::test]
    async fn a_rocker_is_in_at_most_one_session() {
        let collab = setup();
        let ada = rocker(&collab, "ada").await;
        let grace = rocker(&collab, "grace").await;

        let first = collab.sessions.create_session(ada.id).await.unwrap();
        collab.sessions.join(first.id(), grace.id).await.unwrap();

        assert!(matches!(
            collab.sessions.create_session(ada.id).await,
            Err(SessionError::AlreadyOwnsSession)
        ));
        assert!(matches!(
            collab.sessions.create_session(grace.id).await,
            Err(SessionError::AlreadyInAnotherSession)
        ));
        assert!(matches!(
            collab.sessions.join(first.id(), grace.id).await,
            Err(SessionError::AlreadyMember)
        ));

        // Leaving frees grace up again
        collab.sessions.leave(first.id(), grace.id).await.unwrap();
        collab.sessions.create_session(grace.id).await.unwrap();
    }

    #[tokio::test]
    async fn leaving_without_membership_fails() {
        let collab = setup();
        let ada = rocker(&collab, "ada").await;
        let grace = rocker(&collab, "grace").await;

        let session = collab.sessions.create_session(ada.id).await.unwrap();

        assert!(matches!(
            collab.sessions.leave(session.id(), grace.id).await,
            Err(SessionError::NotMember)
        ));
    }

    #[tokio::test]
    async fn owner_leaving_closes_the_session() {
        let collab = setup();
        let ada = rocker(&collab, "ada").await;
        let grace = rocker(&collab, "grace").await;

        let session = collab.sessions.create_session(ada.id).await.unwrap();
        collab.sessions.join(session.id(), grace.id).await.unwrap();

        collab.sessions.leave(session.id(), ada.id).await.unwrap();

        assert!(matches!(
            collab.sessions.session_by_id(session.id()),
            Err(SessionError::SessionNotFound)
        ));

        // Grace's membership went with the session
        collab.sessions.create_session(grace.id).await.unwrap();
    }

    #[tokio::test]
    async fn closing_requires_ownership_and_is_terminal() {
        let collab = setup();
        let ada = rocker(&collab, "ada").await;
        let grace = rocker(&collab, "grace").await;

        let session = collab.sessions.create_session(ada.id).await.unwrap();
        collab.sessions.join(session.id(), grace.id).await.unwrap();

        assert!(matches!(
            collab.sessions.close_session(session.id(), grace.id).await,
            Err(SessionError::NotOwner)
        ));

        collab
            .sessions
            .close_session(session.id(), ada.id)
            .await
            .unwrap();

        assert!(matches!(
            collab.sessions.close_session(session.id(), ada.id).await,
            Err(SessionError::SessionNotFound)
        ));
    }

    #[tokio::test]
    async fn higher_scores_play_first() {
        let collab = setup();
        let ada = rocker(&collab, "ada").await;
        let x = song(&collab, "strawberries").await;
        let y = song(&collab, "bananas").await;

        let session = collab.sessions.create_session(ada.id).await.unwrap();

        session.enqueue(x.id, 5).await.unwrap();
        session.enqueue(y.id, 10).await.unwrap();

        let titles: Vec<_> = session
            .queue_entries()
            .into_iter()
            .map(|e| e.song.title)
            .collect();
        assert_eq!(titles, vec!["bananas", "strawberries"]);

        let next = session.dequeue_next().await.unwrap();
        assert_eq!(next.song.title, "bananas");

        let remaining = session.queue_entries();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].song.title, "strawberries");
        assert_eq!(remaining[0].position, 0);
    }

    #[tokio::test]
    async fn dequeueing_an_empty_queue_fails() {
        let collab = setup();
        let ada = rocker(&collab, "ada").await;

        let session = collab.sessions.create_session(ada.id).await.unwrap();

        assert!(matches!(
            session.dequeue_next().await,
            Err(SessionError::EmptyQueue)
        ));
    }

    #[tokio::test]
    async fn rescoring_moves_an_entry() {
        let collab = setup();
        let ada = rocker(&collab, "ada").await;
        let x = song(&collab, "strawberries").await;
        let y = song(&collab, "bananas").await;

        let session = collab.sessions.create_session(ada.id).await.unwrap();

        let low = session.enqueue(x.id, 1).await.unwrap();
        session.enqueue(y.id, 5).await.unwrap();

        session.rescore(low.id, 20).await.unwrap();

        let titles: Vec<_> = session
            .queue_entries()
            .into_iter()
            .map(|e| e.song.title)
            .collect();
        assert_eq!(titles, vec!["strawberries", "bananas"]);

        assert!(matches!(
            session.rescore(9999, 1).await,
            Err(SessionError::EntryNotFound)
        ));
    }

    #[tokio::test]
    async fn removed_entries_close_position_gaps() {
        let collab = setup();
        let ada = rocker(&collab, "ada").await;

        let session = collab.sessions.create_session(ada.id).await.unwrap();

        let mut ids = vec![];
        for (i, title) in ["a", "b", "c"].iter().enumerate() {
            let song = song(&collab, title).await;
            let entry = session.enqueue(song.id, 10 - i as i64).await.unwrap();
            ids.push(entry.id);
        }

        session.remove_entry(ids[1]).await.unwrap();

        let positions: Vec<_> = session.queue_entries().iter().map(|e| e.position).collect();
        assert_eq!(positions, vec![0, 1]);
        assert_eq!(session.queue_len(), 2);
    }

    #[tokio::test]
    async fn concurrent_enqueues_keep_positions_contiguous() {
        let collab = Arc::new(setup());
        let ada = rocker(&collab, "ada").await;

        let session = collab.sessions.create_session(ada.id).await.unwrap();

        let mut handles = vec![];

        for i in 0..8i64 {
            let track = song(&collab, &format!("song-{}", i)).await;
            let session = session.clone();

            handles.push(tokio::spawn(async move {
                session.enqueue(track.id, i % 3).await.unwrap();
            }));
        }

        for handle in handles {
            handle.await.unwrap();
        }

        let positions: Vec<_> = session.queue_entries().iter().map(|e| e.position).collect();
        assert_eq!(positions, (0..8).collect::<Vec<i32>>());
    }

    #[tokio::test]
    async fn closed_sessions_reject_queue_operations() {
        let collab = setup();
        let ada = rocker(&collab, "ada").await;
        let track = song(&collab, "strawberries").await;

        let session = collab.sessions.create_session(ada.id).await.unwrap();
        collab
            .sessions
            .close_session(session.id(), ada.id)
            .await
            .unwrap();

        assert!(matches!(
            session.enqueue(track.id, 1).await,
            Err(SessionError::SessionNotFound)
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_joins_cannot_span_two_sessions() {
        let db = UnreliableDatabase::with_member_insert_delay(Duration::from_millis(200));
        let collab = Arc::new(PartyRock::new(Arc::new(db)));

        let ada = rocker(&collab, "ada").await;
        let grace = rocker(&collab, "grace").await;
        let lin = rocker(&collab, "lin").await;

        let first = collab.sessions.create_session(ada.id).await.unwrap();
        let second = collab.sessions.create_session(grace.id).await.unwrap();

        let into_first = tokio::spawn({
            let collab = collab.clone();
            let session_id = first.id();
            async move { collab.sessions.join(session_id, lin.id).await }
        });

        let into_second = tokio::spawn({
            let collab = collab.clone();
            let session_id = second.id();
            async move { collab.sessions.join(session_id, lin.id).await }
        });

        let results = [into_first.await.unwrap(), into_second.await.unwrap()];

        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
        assert!(results
            .iter()
            .any(|r| matches!(r, Err(SessionError::AlreadyInAnotherSession))));

        let memberships = [first.is_member(lin.id), second.is_member(lin.id)];
        assert_eq!(memberships.into_iter().filter(|m| *m).count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn stalled_storage_surfaces_a_timeout() {
        let db = UnreliableDatabase::with_member_insert_delay(STORAGE_TIMEOUT * 4);
        let collab = PartyRock::new(Arc::new(db));

        let ada = rocker(&collab, "ada").await;
        let grace = rocker(&collab, "grace").await;

        let session = collab.sessions.create_session(ada.id).await.unwrap();

        assert!(matches!(
            collab.sessions.join(session.id(), grace.id).await,
            Err(SessionError::Database(DatabaseError::Timeout))
        ));

        // The failed join released grace again
        assert!(!session.is_member(grace.id));
        collab.sessions.create_session(grace.id).await.unwrap();
    }

    #[tokio::test]
    async fn failed_close_leaves_nothing_stranded() {
        let db = Arc::new(UnreliableDatabase::new());
        let collab = PartyRock::new(db.clone());

        let ada = rocker(&collab, "ada").await;
        let grace = rocker(&collab, "grace").await;

        let session = collab.sessions.create_session(ada.id).await.unwrap();
        collab.sessions.join(session.id(), grace.id).await.unwrap();

        db.fail_session_deletes(true);

        assert!(matches!(
            collab.sessions.close_session(session.id(), ada.id).await,
            Err(SessionError::Database(_))
        ));

        // The session stays intact until storage confirms the close
        collab.sessions.session_by_id(session.id()).unwrap();
        assert!(session.is_member(grace.id));

        // Once storage recovers the close goes through and frees everyone
        db.fail_session_deletes(false);
        collab
            .sessions
            .close_session(session.id(), ada.id)
            .await
            .unwrap();

        collab.sessions.create_session(grace.id).await.unwrap();
    }
}
