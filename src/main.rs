use std::sync::Arc;

use orgsync::backend::rest::RestBackend;
use orgsync::client::SyncClient;
use orgsync::config::SyncConfig;
use orgsync::notify::TracingNotifier;
use orgsync::realtime::MemoryHub;
use orgsync::session::{Session, SessionHandle};
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();
    if let Err(e) = dotenvy::dotenv() {
        info!(error = %e, "no .env file loaded");
    }

    let mut args = std::env::args().skip(1);
    let (Some(org_id), Some(user_id)) = (args.next(), args.next()) else {
        return Err("usage: orgsync <org-id> <user-id>".into());
    };

    let config = SyncConfig::from_env()?;
    let session = match std::env::var("ORGSYNC_ACCESS_TOKEN") {
        Ok(access_token) => Some(Session { user_id: user_id.clone(), access_token }),
        Err(_) => {
            warn!("ORGSYNC_ACCESS_TOKEN not set; requests use the anon key and mutations are refused");
            None
        }
    };
    let session = SessionHandle::new(session);

    let backend = Arc::new(RestBackend::new(&config, session.clone())?);
    let hub = Arc::new(MemoryHub::new(config.channel_buffer));
    let client = SyncClient::new(backend, hub, Arc::new(TracingNotifier), session);

    if let Err(e) = client.enter_org(&org_id, &user_id).await {
        warn!(%org_id, error = %e, "initial load failed");
    }

    let mut overview = client.chat().overview().subscribe();
    let mut boards = client.kanban().subscribe();
    info!(channels = ?client.realtime().channels().await, "orgsync listening; ctrl-c to stop");

    loop {
        tokio::select! {
            changed = overview.changed() => {
                if changed.is_err() {
                    break;
                }
                let state = overview.borrow_and_update().clone();
                info!(status = ?state.status, conversations = state.conversations.len(), "chat overview changed");
            }
            changed = boards.changed() => {
                if changed.is_err() {
                    break;
                }
                let state = boards.borrow_and_update().clone();
                info!(boards = state.boards.len(), error = ?state.error, "kanban changed");
            }
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    client.sign_out().await;
    Ok(())
}
