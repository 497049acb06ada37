use anyhow::Result;
use huddle_client::{EventKind, ServerEvent, SyncClient, SyncConfig, SyncEvent};

#[tokio::main]
async fn main() -> Result<()> {
    let url = std::env::var("HUDDLE_URL").unwrap_or_else(|_| "ws://localhost:4000/sync".into());
    let token = std::env::var("HUDDLE_TOKEN").unwrap_or_else(|_| "dev-token".into());
    let project = std::env::args().nth(1).unwrap_or_else(|| "project-1".into());

    let client = SyncClient::new(SyncConfig::new(url), "feed-watcher");
    let handle = client.handle();

    let _updates = {
        let handle = handle.clone();
        let project = project.clone();
        handle.clone().on(EventKind::ProjectUpdate, move |event| {
            if let SyncEvent::Server(ServerEvent::Counter(update)) = event {
                println!(
                    "{} {:?} -> {} (by {})",
                    update.entity_id, update.update_type, update.count, update.actor_id
                );
                if let Some(patch) = handle.patch_for(&project) {
                    println!("  overlay now: {:?}", patch.counters);
                }
            }
        })
    };

    handle.connect(&token)?;
    handle.subscribe_project(&project)?;
    println!("Watching counter updates for {project}; ctrl-c to stop.");

    tokio::signal::ctrl_c().await?;
    client.shutdown();
    Ok(())
}
