use thiserror::Error;

use crate::{with_deadline, CollabContext, DatabaseError, NewSong, PrimaryKey, SongData};

/// A minimal stand-in for an external song catalog. Queue entries reference
/// rows here so they have something to display.
pub struct SongCatalog {
    context: CollabContext,
}

#[derive(Debug, Error)]
pub enum SongError {
    #[error("Song does not exist")]
    NotFound,
    #[error(transparent)]
    Database(#[from] DatabaseError),
}

impl SongCatalog {
    pub fn new(context: &CollabContext) -> Self {
        Self {
            context: context.clone(),
        }
    }

    pub async fn add_song(
        &self,
        title: String,
        artist: Option<String>,
    ) -> Result<SongData, SongError> {
        let song = with_deadline(self.context.database.create_song(NewSong { title, artist }))
            .await?;

        Ok(song)
    }

    pub async fn song_by_id(&self, song_id: PrimaryKey) -> Result<SongData, SongError> {
        with_deadline(self.context.database.song_by_id(song_id))
            .await
            .map_err(|e| match e {
                DatabaseError::NotFound { .. } => SongError::NotFound,
                e => SongError::Database(e),
            })
    }

    pub async fn list_songs(&self) -> Result<Vec<SongData>, SongError> {
        let songs = with_deadline(self.context.database.list_songs()).await?;
        Ok(songs)
    }
}
