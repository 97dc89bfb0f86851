use axum::{
    extract::{Path, State},
    routing::{delete, get, post},
    Json,
};

use crate::{
    context::ServerContext,
    errors::ServerResult,
    schemas::{NewRockerSchema, ValidatedJson},
    serialized::{PartyRocker, ToSerialized},
    Router,
};

#[utoipa::path(
    post,
    path = "/v1/rockers",
    tag = "rockers",
    request_body = NewRockerSchema,
    responses(
        (status = 200, body = PartyRocker)
    )
)]
async fn create_rocker(
    State(context): State<ServerContext>,
    ValidatedJson(body): ValidatedJson<NewRockerSchema>,
) -> ServerResult<Json<PartyRocker>> {
    let rocker = context.collab.rockers.create_rocker(body.display_name).await?;

    Ok(Json(rocker.to_serialized()))
}

#[utoipa::path(
    get,
    path = "/v1/rockers/{id}",
    tag = "rockers",
    responses(
        (status = 200, body = PartyRocker)
    )
)]
async fn rocker(
    State(context): State<ServerContext>,
    Path(rocker_id): Path<i32>,
) -> ServerResult<Json<PartyRocker>> {
    let rocker = context.collab.rockers.rocker_by_id(rocker_id).await?;

    Ok(Json(rocker.to_serialized()))
}

#[utoipa::path(
    delete,
    path = "/v1/rockers/{id}",
    tag = "rockers",
    responses(
        (status = 200, description = "Rocker was deleted. Refused while they are in a session.")
    )
)]
async fn delete_rocker(
    State(context): State<ServerContext>,
    Path(rocker_id): Path<i32>,
) -> ServerResult<()> {
    context.collab.rockers.delete_rocker(rocker_id).await?;

    Ok(())
}

pub fn router() -> Router {
    Router::new()
        .route("/", post(create_rocker))
        .route("/:id", get(rocker))
        .route("/:id", delete(delete_rocker))
}
