use crossbeam::channel::{Receiver, Sender};

use crate::{PartyRockerData, PrimaryKey, QueueEntry};

pub type EventSender = Sender<CollabEvent>;
pub type EventReceiver = Receiver<CollabEvent>;

/// Events emitted by the collab system
#[derive(Debug, Clone)]
pub enum CollabEvent {
    /// A new listening session was created
    SessionCreated {
        session_id: PrimaryKey,
        owner: PartyRockerData,
    },
    /// A listening session was closed. Terminal, the id will not come back.
    SessionClosed { session_id: PrimaryKey },
    /// A rocker became a member of a session
    RockerJoined {
        session_id: PrimaryKey,
        new_member: PartyRockerData,
    },
    /// A rocker left a session
    RockerLeft {
        session_id: PrimaryKey,
        rocker_id: PrimaryKey,
    },
    /// A session's queue was modified
    QueueUpdate {
        session_id: PrimaryKey,
        entries: Vec<QueueEntry>,
    },
    /// The top entry of a session's queue was dequeued for playback
    QueueAdvanced {
        session_id: PrimaryKey,
        entry: QueueEntry,
    },
}
