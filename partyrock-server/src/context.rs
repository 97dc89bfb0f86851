use std::sync::Arc;

use axum::extract::FromRef;
use partyrock_collab::PartyRock;

use crate::sse::ServerSentEvents;

#[derive(Clone, FromRef)]
pub struct ServerContext {
    pub collab: Arc<PartyRock>,
    pub sse: Arc<ServerSentEvents>,
}
