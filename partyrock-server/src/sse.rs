use axum::{
    extract::State,
    response::{
        sse::{Event, KeepAlive},
        Sse,
    },
    routing::get,
};
use futures_util::Stream;
use parking_lot::Mutex;
use partyrock_collab::CollabEvent;
use serde::Serialize;
use std::{
    convert::Infallible,
    pin::Pin,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc, Weak,
    },
    task::{Context, Poll, Waker},
};
use utoipa::ToSchema;

use crate::{
    context::ServerContext,
    serialized::{PartyRocker, QueueEntry, ToSerialized},
    Router,
};

type ConnectionId = u64;

static CONNECTION_COUNTER: AtomicU64 = AtomicU64::new(1);

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "kebab-case", tag = "type")]
pub enum ServerEvent {
    /// A new listening session was created
    SessionCreated {
        session_id: i32,
        owner: PartyRocker,
    },
    /// A listening session was closed
    SessionClosed { session_id: i32 },
    /// A rocker became a member of a session
    RockerJoined {
        session_id: i32,
        new_member: PartyRocker,
    },
    /// A rocker left a session
    RockerLeft { session_id: i32, rocker_id: i32 },
    /// A session's queue was modified
    QueueUpdate {
        session_id: i32,
        entries: Vec<QueueEntry>,
    },
    /// The top entry of a session's queue was dequeued for playback
    QueueAdvanced {
        session_id: i32,
        entry: QueueEntry,
    },
}

impl From<CollabEvent> for ServerEvent {
    fn from(value: CollabEvent) -> Self {
        match value {
            CollabEvent::SessionCreated { session_id, owner } => Self::SessionCreated {
                session_id,
                owner: owner.to_serialized(),
            },
            CollabEvent::SessionClosed { session_id } => Self::SessionClosed { session_id },
            CollabEvent::RockerJoined {
                session_id,
                new_member,
            } => Self::RockerJoined {
                session_id,
                new_member: new_member.to_serialized(),
            },
            CollabEvent::RockerLeft {
                session_id,
                rocker_id,
            } => Self::RockerLeft {
                session_id,
                rocker_id,
            },
            CollabEvent::QueueUpdate {
                session_id,
                entries,
            } => Self::QueueUpdate {
                session_id,
                entries: entries.to_serialized(),
            },
            CollabEvent::QueueAdvanced { session_id, entry } => Self::QueueAdvanced {
                session_id,
                entry: entry.to_serialized(),
            },
        }
    }
}

/// Manages server sent event connections
pub struct ServerSentEvents {
    me: Weak<Self>,
    connections: Mutex<Vec<Connection>>,
}

struct Connection {
    id: ConnectionId,
    pending_messages: Arc<Mutex<Vec<ServerEvent>>>,
    waker: Arc<Mutex<Option<Waker>>>,
}

pub struct ConnectionHandle {
    id: ConnectionId,
    /// A reference to [Connection]'s pending messages
    pending_messages: Arc<Mutex<Vec<ServerEvent>>>,
    /// A reference to [Connection]'s stored [Waker]
    waker: Arc<Mutex<Option<Waker>>>,
    /// Required to remove connection when dropped
    manager: Weak<ServerSentEvents>,
}

impl ServerSentEvents {
    pub fn new() -> Arc<Self> {
        Arc::new_cyclic(|me| Self {
            me: me.clone(),
            connections: Default::default(),
        })
    }

    pub fn broadcast(&self, event: ServerEvent) {
        let connections = self.connections.lock();

        for connection in connections.iter() {
            connection.send(event.clone())
        }
    }

    fn connect(&self) -> ConnectionHandle {
        let connection = Connection::new();
        let handle = connection.handle(self.me.clone());

        self.connections.lock().push(connection);
        handle
    }

    fn disconnect(&self, id: ConnectionId) {
        self.connections.lock().retain(|c| c.id != id)
    }
}

impl Connection {
    fn new() -> Self {
        Self {
            id: CONNECTION_COUNTER.fetch_add(1, Ordering::SeqCst),
            pending_messages: Default::default(),
            waker: Default::default(),
        }
    }

    fn send(&self, message: ServerEvent) {
        self.pending_messages.lock().push(message);

        if let Some(waker) = self.waker.lock().take() {
            waker.wake()
        }
    }

    fn handle(&self, manager: Weak<ServerSentEvents>) -> ConnectionHandle {
        ConnectionHandle {
            id: self.id,
            pending_messages: self.pending_messages.clone(),
            waker: self.waker.clone(),
            manager,
        }
    }
}

impl Stream for ConnectionHandle {
    type Item = Result<Event, Infallible>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let mut pending_messages = self.pending_messages.lock();

        let next_event = pending_messages
            .pop()
            .map(|m| serde_json::to_string(&m).expect("serializes properly"));

        if let Some(event) = next_event {
            return Poll::Ready(Some(Ok(Event::default().data(event))));
        }

        *self.waker.lock() = Some(cx.waker().clone());
        Poll::Pending
    }
}

impl Drop for ConnectionHandle {
    fn drop(&mut self) {
        if let Some(manager) = self.manager.upgrade() {
            manager.disconnect(self.id)
        }
    }
}

#[utoipa::path(
    get,
    path = "/v1/events",
    tag = "events",
    responses(
        (
            status = 200,
            content_type = "text/event-stream",
            description = "A stream of events from partyrock",
            body = ServerEvent
        )
    )
)]
async fn event_stream(State(context): State<ServerContext>) -> Sse<ConnectionHandle> {
    Sse::new(context.sse.connect()).keep_alive(KeepAlive::default())
}

pub fn router() -> Router {
    Router::new().route("/", get(event_stream))
}
