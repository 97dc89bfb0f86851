mod db;
mod events;
mod queues;
mod rockers;
mod sessions;
mod songs;

use std::sync::Arc;

use crossbeam::channel::unbounded;
use dashmap::DashMap;

pub use db::*;
pub use events::*;
pub use queues::*;
pub use rockers::*;
pub use sessions::*;
pub use songs::*;

/// The partyrock collab system, facilitating listening sessions, their
/// members, and their queues.
pub struct PartyRock {
    pub sessions: SessionManager,
    pub rockers: RockerRegistry,
    pub songs: SongCatalog,

    event_receiver: EventReceiver,
}

/// A type passed to various components of the collab system, to access
/// state, emit events, and reach storage.
#[derive(Clone)]
pub struct CollabContext {
    pub database: SharedDatabase,

    /// All active sessions. A session missing here is closed, terminally.
    pub sessions: Arc<DashMap<SessionId, Arc<ListeningSession>>>,
    /// Which session each rocker is currently in, if any. This is what
    /// enforces the one-session-per-rocker rule.
    pub membership: Arc<DashMap<PrimaryKey, SessionId>>,

    event_sender: EventSender,
}

impl PartyRock {
    pub fn new(database: SharedDatabase) -> Self {
        let (event_sender, event_receiver) = unbounded();

        let context = CollabContext {
            database,
            sessions: Default::default(),
            membership: Default::default(),
            event_sender,
        };

        Self {
            sessions: SessionManager::new(&context),
            rockers: RockerRegistry::new(&context),
            songs: SongCatalog::new(&context),
            event_receiver,
        }
    }

    /// Blocks until the next event is emitted by the collab system
    pub fn wait_for_event(&self) -> Option<CollabEvent> {
        self.event_receiver.recv().ok()
    }
}

impl CollabContext {
    pub fn emit(&self, event: CollabEvent) {
        let _ = self.event_sender.send(event);
    }
}
