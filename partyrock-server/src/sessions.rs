use axum::{
    extract::{Path, Query, State},
    response::IntoResponse,
    routing::{delete, get, patch, post},
    Json,
};

use crate::{
    context::ServerContext,
    errors::ServerResult,
    schemas::{EnqueueSchema, JoinSessionSchema, NewSessionSchema, RescoreSchema, RockerParams, ValidatedJson},
    serialized::{QueueEntry, Session, ToSerialized},
    Router,
};

#[utoipa::path(
    get,
    path = "/v1/sessions",
    tag = "sessions",
    responses(
        (status = 200, body = Vec<Session>)
    )
)]
async fn list_sessions(State(context): State<ServerContext>) -> impl IntoResponse {
    let sessions: Vec<_> = context
        .collab
        .sessions
        .list_all()
        .into_iter()
        .map(|s| s.to_serialized())
        .collect();

    Json(sessions)
}

#[utoipa::path(
    get,
    path = "/v1/sessions/{id}",
    tag = "sessions",
    responses(
        (status = 200, body = Session)
    )
)]
async fn session(
    State(context): State<ServerContext>,
    Path(session_id): Path<i32>,
) -> ServerResult<Json<Session>> {
    let session = context.collab.sessions.session_by_id(session_id)?;

    Ok(Json(session.to_serialized()))
}

#[utoipa::path(
    post,
    path = "/v1/sessions",
    tag = "sessions",
    request_body = NewSessionSchema,
    responses(
        (status = 200, body = Session)
    )
)]
async fn create_session(
    State(context): State<ServerContext>,
    ValidatedJson(body): ValidatedJson<NewSessionSchema>,
) -> ServerResult<Json<Session>> {
    let session = context.collab.sessions.create_session(body.owner_id).await?;

    Ok(Json(session.to_serialized()))
}

#[utoipa::path(
    delete,
    path = "/v1/sessions/{id}",
    tag = "sessions",
    params(RockerParams),
    responses(
        (status = 200, description = "Session was closed, cascading its members and queue")
    )
)]
async fn close_session(
    State(context): State<ServerContext>,
    Path(session_id): Path<i32>,
    Query(params): Query<RockerParams>,
) -> ServerResult<()> {
    context
        .collab
        .sessions
        .close_session(session_id, params.rocker_id)
        .await?;

    Ok(())
}

#[utoipa::path(
    post,
    path = "/v1/sessions/{id}/members",
    tag = "sessions",
    request_body = JoinSessionSchema,
    responses(
        (status = 200, description = "Rocker was added as a member of the session")
    )
)]
async fn join_session(
    State(context): State<ServerContext>,
    Path(session_id): Path<i32>,
    ValidatedJson(body): ValidatedJson<JoinSessionSchema>,
) -> ServerResult<()> {
    context.collab.sessions.join(session_id, body.rocker_id).await?;

    Ok(())
}

#[utoipa::path(
    delete,
    path = "/v1/sessions/{id}/members/{rocker_id}",
    tag = "sessions",
    responses(
        (status = 200, description = "Rocker left the session. Closes the session if the owner leaves.")
    )
)]
async fn leave_session(
    State(context): State<ServerContext>,
    Path((session_id, rocker_id)): Path<(i32, i32)>,
) -> ServerResult<()> {
    context.collab.sessions.leave(session_id, rocker_id).await?;

    Ok(())
}

#[utoipa::path(
    get,
    path = "/v1/sessions/{id}/queue",
    tag = "sessions",
    responses(
        (status = 200, body = Vec<QueueEntry>)
    )
)]
async fn queue(
    State(context): State<ServerContext>,
    Path(session_id): Path<i32>,
) -> ServerResult<Json<Vec<QueueEntry>>> {
    let session = context.collab.sessions.session_by_id(session_id)?;

    Ok(Json(session.queue_entries().to_serialized()))
}

#[utoipa::path(
    post,
    path = "/v1/sessions/{id}/queue",
    tag = "sessions",
    request_body = EnqueueSchema,
    responses(
        (status = 200, body = QueueEntry)
    )
)]
async fn add_to_queue(
    State(context): State<ServerContext>,
    Path(session_id): Path<i32>,
    ValidatedJson(body): ValidatedJson<EnqueueSchema>,
) -> ServerResult<Json<QueueEntry>> {
    let session = context.collab.sessions.session_by_id(session_id)?;
    let entry = session.enqueue(body.song_id, body.score).await?;

    Ok(Json(entry.to_serialized()))
}

#[utoipa::path(
    post,
    path = "/v1/sessions/{id}/queue/next",
    tag = "sessions",
    responses(
        (status = 200, body = QueueEntry, description = "The entry that was dequeued for playback")
    )
)]
async fn dequeue_next(
    State(context): State<ServerContext>,
    Path(session_id): Path<i32>,
) -> ServerResult<Json<QueueEntry>> {
    let session = context.collab.sessions.session_by_id(session_id)?;
    let entry = session.dequeue_next().await?;

    Ok(Json(entry.to_serialized()))
}

#[utoipa::path(
    patch,
    path = "/v1/sessions/{id}/queue/{entry_id}",
    tag = "sessions",
    request_body = RescoreSchema,
    responses(
        (status = 200, description = "Entry was rescored and the queue re-sorted")
    )
)]
async fn rescore_entry(
    State(context): State<ServerContext>,
    Path((session_id, entry_id)): Path<(i32, i32)>,
    ValidatedJson(body): ValidatedJson<RescoreSchema>,
) -> ServerResult<()> {
    let session = context.collab.sessions.session_by_id(session_id)?;
    session.rescore(entry_id, body.score).await?;

    Ok(())
}

#[utoipa::path(
    delete,
    path = "/v1/sessions/{id}/queue/{entry_id}",
    tag = "sessions",
    responses(
        (status = 200, description = "Entry was removed without playing")
    )
)]
async fn remove_entry(
    State(context): State<ServerContext>,
    Path((session_id, entry_id)): Path<(i32, i32)>,
) -> ServerResult<()> {
    let session = context.collab.sessions.session_by_id(session_id)?;
    session.remove_entry(entry_id).await?;

    Ok(())
}

pub fn router() -> Router {
    Router::new()
        .route("/", get(list_sessions))
        .route("/", post(create_session))
        .route("/:id", get(session))
        .route("/:id", delete(close_session))
        .route("/:id/members", post(join_session))
        .route("/:id/members/:rocker_id", delete(leave_session))
        .route("/:id/queue", get(queue))
        .route("/:id/queue", post(add_to_queue))
        .route("/:id/queue/next", post(dequeue_next))
        .route("/:id/queue/:entry_id", patch(rescore_entry))
        .route("/:id/queue/:entry_id", delete(remove_entry))
}
