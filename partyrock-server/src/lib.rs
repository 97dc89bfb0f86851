mod context;
mod docs;
mod errors;
mod logging;
mod rockers;
mod schemas;
mod serialized;
mod sessions;
mod songs;
mod sse;

use std::{
    env,
    net::{Ipv6Addr, SocketAddr},
    sync::Arc,
};

use axum::routing::get;
use log::info;
use partyrock_collab::PartyRock;
use tokio::{net::TcpListener, task::spawn_blocking};
use tower_http::cors::{Any, CorsLayer};

pub use context::ServerContext;
pub use logging::init_logger;

use crate::sse::ServerSentEvents;

/// The default port the server will listen on.
pub const DEFAULT_PORT: u16 = 9070;

pub type Router = axum::Router<ServerContext>;

/// Starts the partyrock server
pub async fn run_server(collab: Arc<PartyRock>) {
    let port = env::var("PARTYROCK_SERVER_PORT")
        .map(|x| x.parse::<u16>().expect("Port must be a number"))
        .unwrap_or(DEFAULT_PORT);

    let addr: SocketAddr = (Ipv6Addr::UNSPECIFIED, port).into();

    let sse = ServerSentEvents::new();
    let context = ServerContext {
        collab: collab.clone(),
        sse: sse.clone(),
    };

    // Forward collab events to the subscribed clients
    spawn_blocking(move || {
        while let Some(event) = collab.wait_for_event() {
            sse.broadcast(event.into())
        }
    });

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let version_one_router = Router::new()
        .nest("/sessions", sessions::router())
        .nest("/rockers", rockers::router())
        .nest("/songs", songs::router())
        .nest("/events", sse::router());

    let root_router = Router::new()
        .nest("/v1", version_one_router)
        .route("/api.json", get(docs::docs))
        .layer(cors)
        .with_state(context);

    let listener = TcpListener::bind(&addr).await.expect("listens on address");

    info!("Listening on port {}", port);

    axum::serve(listener, root_router.into_make_service())
        .await
        .expect("server runs");
}
