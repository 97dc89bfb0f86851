use axum::{response::IntoResponse, Json};
use utoipa::OpenApi;
use utoipauto::utoipauto;

#[utoipauto(paths = "./partyrock-server/src")]
#[derive(OpenApi)]
#[openapi(info(
    description = "partyrock-server exposes endpoints to interact with listening sessions"
))]
pub struct ApiDoc;

pub async fn docs() -> impl IntoResponse {
    Json(ApiDoc::openapi())
}
