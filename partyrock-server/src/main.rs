use std::{env, sync::Arc};

use log::info;
use partyrock_collab::{MemoryDatabase, PartyRock, PgDatabase, SharedDatabase};
use partyrock_server::{init_logger, run_server};

#[tokio::main]
async fn main() {
    init_logger();

    let database: SharedDatabase = match env::var("PARTYROCK_DATABASE_URL") {
        Ok(url) => Arc::new(PgDatabase::new(&url).await.expect("database connects")),
        Err(_) => {
            info!("No database url configured, keeping sessions in memory");
            Arc::new(MemoryDatabase::new())
        }
    };

    let collab = Arc::new(PartyRock::new(database));

    collab
        .sessions
        .restore()
        .await
        .expect("sessions are restored");

    run_server(collab).await
}
