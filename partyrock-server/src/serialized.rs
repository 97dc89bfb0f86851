//! All schemas that are exposed from endpoints are defined here
//! along with the conversions from collab types

use std::sync::Arc;

use partyrock_collab::{
    ListeningSession as CollabSession, PartyRockerData, QueueEntry as CollabQueueEntry, SongData,
};
use serde::Serialize;
use utoipa::ToSchema;

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct PartyRocker {
    id: i32,
    display_name: String,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct Song {
    id: i32,
    title: String,
    artist: Option<String>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct Session {
    id: i32,
    created_at: String,
    owner_id: i32,
    members: Vec<PartyRocker>,
    /// Derived from the queue entries, never stored
    queue_length: usize,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct QueueEntry {
    id: i32,
    score: i64,
    position: i32,
    song: Song,
}

/// Helper trait to convert any type into a serialized version
pub trait ToSerialized<T>
where
    T: Serialize,
{
    fn to_serialized(&self) -> T;
}

impl<I, O> ToSerialized<Vec<O>> for Vec<I>
where
    I: ToSerialized<O>,
    O: Serialize,
{
    fn to_serialized(&self) -> Vec<O> {
        self.iter().map(|x| x.to_serialized()).collect()
    }
}

impl ToSerialized<PartyRocker> for PartyRockerData {
    fn to_serialized(&self) -> PartyRocker {
        PartyRocker {
            id: self.id,
            display_name: self.display_name.clone(),
        }
    }
}

impl ToSerialized<Song> for SongData {
    fn to_serialized(&self) -> Song {
        Song {
            id: self.id,
            title: self.title.clone(),
            artist: self.artist.clone(),
        }
    }
}

impl ToSerialized<Session> for Arc<CollabSession> {
    fn to_serialized(&self) -> Session {
        let data = self.data();

        Session {
            id: data.id,
            created_at: data.created_at.to_rfc3339(),
            owner_id: data.owner_id,
            members: data.members.to_serialized(),
            queue_length: self.queue_len(),
        }
    }
}

impl ToSerialized<QueueEntry> for CollabQueueEntry {
    fn to_serialized(&self) -> QueueEntry {
        QueueEntry {
            id: self.id,
            score: self.score,
            position: self.position,
            song: self.song.to_serialized(),
        }
    }
}
