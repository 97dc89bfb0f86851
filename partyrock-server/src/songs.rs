use axum::{
    extract::{Path, State},
    response::IntoResponse,
    routing::{get, post},
    Json,
};

use crate::{
    context::ServerContext,
    errors::ServerResult,
    schemas::{NewSongSchema, ValidatedJson},
    serialized::{Song, ToSerialized},
    Router,
};

#[utoipa::path(
    post,
    path = "/v1/songs",
    tag = "songs",
    request_body = NewSongSchema,
    responses(
        (status = 200, body = Song)
    )
)]
async fn add_song(
    State(context): State<ServerContext>,
    ValidatedJson(body): ValidatedJson<NewSongSchema>,
) -> ServerResult<Json<Song>> {
    let song = context.collab.songs.add_song(body.title, body.artist).await?;

    Ok(Json(song.to_serialized()))
}

#[utoipa::path(
    get,
    path = "/v1/songs",
    tag = "songs",
    responses(
        (status = 200, body = Vec<Song>)
    )
)]
async fn list_songs(State(context): State<ServerContext>) -> ServerResult<impl IntoResponse> {
    let songs = context.collab.songs.list_songs().await?;

    Ok(Json(songs.to_serialized()))
}

#[utoipa::path(
    get,
    path = "/v1/songs/{id}",
    tag = "songs",
    responses(
        (status = 200, body = Song)
    )
)]
async fn song(
    State(context): State<ServerContext>,
    Path(song_id): Path<i32>,
) -> ServerResult<Json<Song>> {
    let song = context.collab.songs.song_by_id(song_id).await?;

    Ok(Json(song.to_serialized()))
}

pub fn router() -> Router {
    Router::new()
        .route("/", post(add_song))
        .route("/", get(list_songs))
        .route("/:id", get(song))
}
