use anyhow::Result;
use huddle_client::{EventKind, MessageType, ServerEvent, SyncClient, SyncConfig, SyncEvent};
use tokio::io::{AsyncBufReadExt, BufReader};

#[tokio::main]
async fn main() -> Result<()> {
    let url = std::env::var("HUDDLE_URL").unwrap_or_else(|_| "ws://localhost:4000/sync".into());
    let token = std::env::var("HUDDLE_TOKEN").unwrap_or_else(|_| "dev-token".into());
    let user = std::env::var("HUDDLE_USER").unwrap_or_else(|_| "demo-user".into());
    let room = std::env::args().nth(1).unwrap_or_else(|| "squad-lobby".into());

    let client = SyncClient::new(SyncConfig::new(url), &user);
    let handle = client.handle();

    let _messages = {
        let me = user.clone();
        handle.on(EventKind::NewMessage, move |event| {
            if let SyncEvent::Server(ServerEvent::NewMessage(record)) = event {
                let who = if record.author_id == me { "you" } else { &record.author_id };
                println!("[{}] {}: {}", record.room_id, who, record.content);
            }
        })
    };
    let _typing = handle.on(EventKind::UserTyping, |event| {
        if let SyncEvent::Server(ServerEvent::UserTyping { room_id, user_id }) = event {
            println!("[{room_id}] {user_id} is typing...");
        }
    });
    let _offline = handle.on(EventKind::ConnectionFailed, |_| {
        println!("connection lost for good, restart to retry");
    });

    println!("Connecting...");
    handle.connect(&token)?;
    handle.join_room(&room)?;
    println!("Joined {room}. Type a message and press enter; /quit to exit.");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if line == "/quit" {
            break;
        }
        handle.send_message(&room, line, MessageType::Text)?;
    }

    handle.leave_room(&room)?;
    client.shutdown();
    Ok(())
}
