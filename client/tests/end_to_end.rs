//! Integration tests against an in-process WebSocket server.

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde_json::{Value, json};
use tokio::net::TcpListener;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::StatusCode;

use huddle_client::{
    ConnectionState, DeliveryState, EventKind, MessageType, RoomPhase, SyncClient, SyncConfig,
};

/// Accepts every handshake and scripts replies for the events the tests
/// exercise: joins are acked, sends are echoed with the correlation id,
/// project subscriptions get one like patch, typing starts are mirrored
/// back as another user.
async fn spawn_scripted_server() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        loop {
            let Ok((stream, _)) = listener.accept().await else {
                return;
            };
            tokio::spawn(async move {
                let Ok(mut ws) = tokio_tungstenite::accept_async(stream).await else {
                    return;
                };
                while let Some(Ok(message)) = ws.next().await {
                    let WsMessage::Text(text) = message else {
                        continue;
                    };
                    let Ok(envelope) = serde_json::from_str::<Value>(&text) else {
                        continue;
                    };
                    let data = envelope["data"].clone();

                    let reply = match envelope["event"].as_str().unwrap_or_default() {
                        "join_squad" => Some(json!({
                            "event": "squad_joined",
                            "data": { "roomId": data }
                        })),
                        "send_message" => Some(json!({
                            "event": "new_message",
                            "data": {
                                "id": format!("m-{}", data["correlationId"].as_str().unwrap_or_default()),
                                "roomId": data["roomId"],
                                "authorId": "viewer-1",
                                "content": data["content"],
                                "messageType": data["messageType"],
                                "createdAt": "2025-03-01T12:00:00Z",
                                "correlationId": data["correlationId"],
                            }
                        })),
                        "subscribe_project" => Some(json!({
                            "event": "project_update",
                            "data": {
                                "type": "LIKE_UPDATE",
                                "projectId": data,
                                "likeCount": 7,
                                "likedBy": "someone-else",
                                "liked": true,
                            }
                        })),
                        "typing_start" => Some(json!({
                            "event": "userTyping",
                            "data": { "roomId": data, "userId": "other-user" }
                        })),
                        _ => None,
                    };

                    if let Some(reply) = reply
                        && ws.send(WsMessage::Text(reply.to_string())).await.is_err()
                    {
                        return;
                    }
                }
            });
        }
    });

    addr
}

/// Rejects every handshake whose token query parameter is not `letmein`.
async fn spawn_auth_server() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        loop {
            let Ok((stream, _)) = listener.accept().await else {
                return;
            };
            tokio::spawn(async move {
                let check = |request: &Request, response: Response| -> Result<Response, ErrorResponse> {
                    let authorized = request
                        .uri()
                        .query()
                        .is_some_and(|query| query.contains("token=letmein"));
                    if authorized {
                        Ok(response)
                    } else {
                        let mut denied = ErrorResponse::new(Some("unauthorized".to_string()));
                        *denied.status_mut() = StatusCode::UNAUTHORIZED;
                        Err(denied)
                    }
                };

                if let Ok(mut ws) = tokio_tungstenite::accept_hdr_async(stream, check).await {
                    while ws.next().await.is_some() {}
                }
            });
        }
    });

    addr
}

async fn wait_for(what: &str, mut check: impl FnMut() -> bool) {
    for _ in 0..250 {
        if check() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("timed out waiting for {what}");
}

#[tokio::test]
async fn connect_join_send_and_confirm() {
    let addr = spawn_scripted_server().await;
    let client = SyncClient::new(SyncConfig::new(format!("ws://{addr}")), "viewer-1");
    let handle = client.handle();

    handle.connect("secret").unwrap();
    let state = handle.clone();
    wait_for("connected", move || {
        state.connection_state() == ConnectionState::Connected
    })
    .await;

    handle.join_room("squad-9").unwrap();
    let joined = handle.clone();
    wait_for("join ack", move || {
        joined.room_phase("squad-9") == Some(RoomPhase::Joined)
    })
    .await;

    let correlation = handle.send_message("squad-9", "hello squad", MessageType::Text).unwrap();
    let confirmed = handle.clone();
    wait_for("send confirmation", move || {
        confirmed
            .room_log("squad-9")
            .first()
            .is_some_and(|message| message.delivery == DeliveryState::Confirmed)
    })
    .await;

    let log = handle.room_log("squad-9");
    assert_eq!(log.len(), 1, "echo must replace the pending entry, not append");
    assert_eq!(log[0].id, format!("m-{correlation}"));
    assert_eq!(log[0].content, "hello squad");

    client.shutdown();
}

#[tokio::test]
async fn counter_patches_flow_into_overlay() {
    let addr = spawn_scripted_server().await;
    let client = SyncClient::new(SyncConfig::new(format!("ws://{addr}")), "viewer-1");
    let handle = client.handle();

    handle.connect("secret").unwrap();
    handle.subscribe_project("p1").unwrap();

    let patched = handle.clone();
    wait_for("project patch", move || {
        patched
            .patch_for("p1")
            .is_some_and(|patch| patch.counters.get("likeCount") == Some(&7))
    })
    .await;

    // The like came from someone else, so the viewer's own flag is
    // untouched.
    let patch = handle.patch_for("p1").unwrap();
    assert!(patch.viewer_flags.is_empty());

    client.shutdown();
}

#[tokio::test]
async fn typing_signal_round_trip() {
    let addr = spawn_scripted_server().await;
    let client = SyncClient::new(SyncConfig::new(format!("ws://{addr}")), "viewer-1");
    let handle = client.handle();

    handle.connect("secret").unwrap();
    let state = handle.clone();
    wait_for("connected", move || {
        state.connection_state() == ConnectionState::Connected
    })
    .await;

    handle.typing_start("squad-9").unwrap();
    let typing = handle.clone();
    wait_for("typing indicator", move || {
        typing.typing_users_for("squad-9") == vec!["other-user".to_string()]
    })
    .await;

    client.shutdown();
}

#[tokio::test]
async fn rejected_credential_is_terminal() {
    let addr = spawn_auth_server().await;
    let client = SyncClient::new(SyncConfig::new(format!("ws://{addr}")), "viewer-1");
    let handle = client.handle();

    let rejected = Arc::new(AtomicBool::new(false));
    let _watch = {
        let rejected = rejected.clone();
        handle.on(EventKind::AuthRejected, move |_| {
            rejected.store(true, Ordering::SeqCst);
        })
    };

    handle.connect("wrong").unwrap();
    let state = handle.clone();
    wait_for("auth rejection", move || {
        state.connection_state() == ConnectionState::Failed
    })
    .await;
    assert!(rejected.load(Ordering::SeqCst));

    // A fresh credential recovers without rebuilding the client.
    handle.connect("letmein").unwrap();
    let state = handle.clone();
    wait_for("recovery", move || {
        state.connection_state() == ConnectionState::Connected
    })
    .await;

    client.shutdown();
}
