use log::info;
use parking_lot::Mutex;
use tokio::sync::{Mutex as AsyncMutex, MutexGuard};

use crate::{
    events::CollabEvent, updates_for, with_deadline, CollabContext, DatabaseError,
    ListeningSessionData, NewQueueEntry, PartyRockerData, PrimaryKey, QueueEntry, QueueEntryData,
    QueueEntryId, ScoredQueue,
};

use super::SessionError;

pub type SessionId = PrimaryKey;

/// A listening session, with a host, party rockers, and a scored queue.
pub struct ListeningSession {
    context: CollabContext,
    data: Mutex<ListeningSessionData>,
    queue: ScoredQueue,
    /// Serializes mutating operations on this session, including their
    /// persistence steps. Held across awaits, so it cannot be parking_lot.
    write: AsyncMutex<()>,
}

impl ListeningSession {
    pub fn new(
        context: &CollabContext,
        data: ListeningSessionData,
        persisted_entries: Vec<QueueEntryData>,
    ) -> Self {
        Self {
            context: context.clone(),
            queue: ScoredQueue::restore(persisted_entries),
            data: data.into(),
            write: Default::default(),
        }
    }

    pub fn id(&self) -> SessionId {
        self.data.lock().id
    }

    pub fn owner_id(&self) -> PrimaryKey {
        self.data.lock().owner_id
    }

    pub fn data(&self) -> ListeningSessionData {
        self.data.lock().clone()
    }

    /// The queue length is always derived from the entries, never stored
    pub fn queue_len(&self) -> usize {
        self.queue.len()
    }

    /// A consistent snapshot of the queue in play order
    pub fn queue_entries(&self) -> Vec<QueueEntry> {
        self.queue.entries()
    }

    pub fn is_member(&self, rocker_id: PrimaryKey) -> bool {
        self.data.lock().members.iter().any(|m| m.id == rocker_id)
    }

    /// Returns the member if it exists in the session
    pub fn member_by_rocker_id(&self, rocker_id: PrimaryKey) -> Result<PartyRockerData, SessionError> {
        self.data
            .lock()
            .members
            .iter()
            .find(|m| m.id == rocker_id)
            .cloned()
            .ok_or(SessionError::NotMember)
    }

    /// Submits a song to the queue. The entry's position follows from its
    /// score, with equal scores ordering after earlier submissions.
    pub async fn enqueue(&self, song_id: PrimaryKey, score: i64) -> Result<QueueEntry, SessionError> {
        let _guard = self.write.lock().await;
        self.ensure_open()?;

        let position = self.queue.insertion_position(score);

        let persisted = with_deadline(self.context.database.create_queue_entry(NewQueueEntry {
            session_id: self.id(),
            song_id,
            score,
            position,
        }))
        .await
        .map_err(|e| match e {
            DatabaseError::NotFound { resource: "song", .. } => SessionError::SongNotFound,
            e => e.into(),
        })?;

        let entry = QueueEntry {
            id: persisted.id,
            song: persisted.song,
            score,
            position,
        };

        self.queue.push(entry.clone());
        self.emit_queue_update();

        Ok(entry)
    }

    /// Removes and returns the entry that plays next
    pub async fn dequeue_next(&self) -> Result<QueueEntry, SessionError> {
        let _guard = self.write.lock().await;
        self.ensure_open()?;

        let entry = self.queue.front().ok_or(SessionError::EmptyQueue)?;

        with_deadline(self.context.database.delete_queue_entry(entry.id)).await?;
        self.queue.remove(entry.id);

        self.context.emit(CollabEvent::QueueAdvanced {
            session_id: self.id(),
            entry: entry.clone(),
        });
        self.emit_queue_update();

        Ok(entry)
    }

    /// Gives an entry a new score, re-sorting the queue. The original
    /// submission order still breaks ties.
    pub async fn rescore(&self, entry_id: QueueEntryId, new_score: i64) -> Result<(), SessionError> {
        let _guard = self.write.lock().await;
        self.ensure_open()?;

        let plan = self
            .queue
            .plan_rescore(entry_id, new_score)
            .ok_or(SessionError::EntryNotFound)?;

        with_deadline(
            self.context
                .database
                .update_queue_positions(self.id(), &updates_for(&plan)),
        )
        .await?;

        self.queue.replace(plan);
        self.emit_queue_update();

        Ok(())
    }

    /// Removes an entry without playing it
    pub async fn remove_entry(&self, entry_id: QueueEntryId) -> Result<(), SessionError> {
        let _guard = self.write.lock().await;
        self.ensure_open()?;

        let entry = self.queue.get(entry_id).ok_or(SessionError::EntryNotFound)?;

        with_deadline(self.context.database.delete_queue_entry(entry.id)).await?;
        self.queue.remove(entry.id);
        self.emit_queue_update();

        Ok(())
    }

    /// Registers an added member to the session
    pub(super) fn add_member(&self, new_member: PartyRockerData) {
        self.data.lock().members.push(new_member.clone());

        info!(
            "{} joined session {}",
            new_member.display_name,
            self.id()
        );

        self.context.emit(CollabEvent::RockerJoined {
            session_id: self.id(),
            new_member,
        });
    }

    /// Registers a removed member
    pub(super) fn remove_member(&self, rocker_id: PrimaryKey) {
        self.data.lock().members.retain(|m| m.id != rocker_id);

        info!("Rocker {} left session {}", rocker_id, self.id());

        self.context.emit(CollabEvent::RockerLeft {
            session_id: self.id(),
            rocker_id,
        });
    }

    /// Acquires the per-session writer lock
    pub(super) async fn write_lock(&self) -> MutexGuard<'_, ()> {
        self.write.lock().await
    }

    /// The session may have been closed while this operation waited for the
    /// writer lock, in which case it is no longer in the registry.
    fn ensure_open(&self) -> Result<(), SessionError> {
        if self.context.sessions.contains_key(&self.id()) {
            Ok(())
        } else {
            Err(SessionError::SessionNotFound)
        }
    }

    fn emit_queue_update(&self) {
        self.context.emit(CollabEvent::QueueUpdate {
            session_id: self.id(),
            entries: self.queue.entries(),
        });
    }
}
