use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tracing::{info, warn};
use uuid::Uuid;

use whisper_db::Database;
use whisper_db::models::MessageRow;
use whisper_types::api::Claims;
use whisper_types::events::{GatewayCommand, GatewayEvent};
use whisper_types::models::MemberSnapshot;

use crate::rooms::{RoomRegistry, SessionSender};

/// How long a fresh socket gets to present its Identify token.
const IDENTIFY_TIMEOUT: Duration = Duration::from_secs(10);

/// Handle a single WebSocket connection. The socket must authenticate with
/// an `Identify { token }` command first; after `Ready` the session can
/// join rooms, send messages, and leave. Disconnecting unbinds the session
/// from every room it was in — in-flight persistence writes it triggered
/// still run to completion.
pub async fn handle_connection(
    socket: WebSocket,
    db: Arc<Database>,
    rooms: RoomRegistry,
    jwt_secret: String,
) {
    let (mut sender, mut receiver) = socket.split();

    let claims = match wait_for_identify(&mut receiver, &jwt_secret).await {
        Some(claims) => claims,
        None => {
            warn!("WebSocket client failed to identify, closing");
            return;
        }
    };
    let user_id = claims.sub;
    let name = claims.name;

    info!("{} ({}) connected to gateway", name, user_id);

    let ready = GatewayEvent::Ready {
        user_id,
        name: name.clone(),
    };
    let Ok(text) = serde_json::to_string(&ready) else {
        return;
    };
    if sender.send(Message::Text(text.into())).await.is_err() {
        return;
    }

    // One session per connection; a user with several tabs holds several
    // independent sessions.
    let session_id = Uuid::new_v4();
    let (tx, mut rx) = mpsc::unbounded_channel::<GatewayEvent>();

    // Forward queued events -> client. Per-session FIFO, so fan-out order
    // matches append completion order.
    let mut send_task = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            let text = match serde_json::to_string(&event) {
                Ok(text) => text,
                Err(e) => {
                    warn!("failed to encode gateway event: {}", e);
                    continue;
                }
            };
            if sender.send(Message::Text(text.into())).await.is_err() {
                break;
            }
        }
    });

    // Read commands from client.
    let recv_rooms = rooms.clone();
    let recv_name = name.clone();
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            match msg {
                Message::Text(text) => match serde_json::from_str::<GatewayCommand>(&text) {
                    Ok(cmd) => {
                        handle_command(&db, &recv_rooms, session_id, user_id, &tx, cmd).await;
                    }
                    Err(e) => {
                        warn!(
                            "{} ({}) bad command: {} -- raw: {}",
                            recv_name,
                            user_id,
                            e,
                            &text[..text.len().min(200)]
                        );
                    }
                },
                Message::Close(_) => break,
                _ => {}
            }
        }
    });

    // Wait for either task to finish
    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }

    rooms.unbind_all(session_id).await;
    info!("{} ({}) disconnected from gateway", name, user_id);
}

async fn wait_for_identify(
    receiver: &mut futures_util::stream::SplitStream<WebSocket>,
    jwt_secret: &str,
) -> Option<Claims> {
    use jsonwebtoken::{DecodingKey, Validation, decode};

    let timeout = tokio::time::timeout(IDENTIFY_TIMEOUT, async {
        while let Some(Ok(msg)) = receiver.next().await {
            if let Message::Text(text) = msg {
                if let Ok(GatewayCommand::Identify { token }) =
                    serde_json::from_str::<GatewayCommand>(&text)
                {
                    let token_data = decode::<Claims>(
                        &token,
                        &DecodingKey::from_secret(jwt_secret.as_bytes()),
                        &Validation::default(),
                    )
                    .ok()?;

                    return Some(token_data.claims);
                }
            }
        }
        None
    });

    timeout.await.ok().flatten()
}

async fn handle_command(
    db: &Arc<Database>,
    rooms: &RoomRegistry,
    session_id: Uuid,
    user_id: Uuid,
    tx: &SessionSender,
    cmd: GatewayCommand,
) {
    match cmd {
        GatewayCommand::Identify { .. } => {} // Already handled

        GatewayCommand::Join { room_id } => {
            // Only actual chat members may bind into a room's fan-out set.
            let member = {
                let db = db.clone();
                tokio::task::spawn_blocking(move || {
                    db.chat_has_member(&room_id.to_string(), &user_id.to_string())
                })
                .await
            };

            match member {
                Ok(Ok(true)) => {
                    info!("{} joined room {}", user_id, room_id);
                    rooms.bind(room_id, session_id, tx.clone()).await;
                }
                Ok(Ok(false)) => {
                    let _ = tx.send(GatewayEvent::Error {
                        message: "Not a member of this chat.".to_string(),
                    });
                }
                Ok(Err(e)) => {
                    warn!("membership check failed for room {}: {}", room_id, e);
                    let _ = tx.send(GatewayEvent::Error {
                        message: "Error occured.".to_string(),
                    });
                }
                Err(e) => {
                    warn!("spawn_blocking join error: {}", e);
                    let _ = tx.send(GatewayEvent::Error {
                        message: "Error occured.".to_string(),
                    });
                }
            }
        }

        GatewayCommand::Leave { room_id } => {
            rooms.unbind(room_id, session_id).await;
        }

        GatewayCommand::Message {
            room_id,
            body,
            sender,
        } => {
            handle_message(db, rooms, session_id, tx, room_id, body, sender).await;
        }
    }
}

/// Persist the message, then fan it out to every session bound to the room
/// (sender included, for UI echo). A failed write surfaces as an `Error`
/// event to the sender only — the room never sees an unpersisted message.
/// Sending requires a bound session, so the membership gate at Join also
/// covers this path.
async fn handle_message(
    db: &Arc<Database>,
    rooms: &RoomRegistry,
    session_id: Uuid,
    tx: &SessionSender,
    room_id: Uuid,
    body: String,
    sender: MemberSnapshot,
) {
    let bound = rooms
        .members_of(room_id)
        .await
        .iter()
        .any(|(sid, _)| *sid == session_id);
    if !bound {
        let _ = tx.send(GatewayEvent::Error {
            message: "Join the room first.".to_string(),
        });
        return;
    }

    let sent_on = chrono::Utc::now();
    let row = MessageRow {
        id: Uuid::new_v4().to_string(),
        chat_id: room_id.to_string(),
        body: body.clone(),
        sender_id: sender.user_id.to_string(),
        sender_name: sender.name.clone(),
        sender_pfp: sender.pfp.clone(),
        sent_on: sent_on.to_rfc3339(),
    };

    let persisted = {
        let db = db.clone();
        tokio::task::spawn_blocking(move || db.append_message(&row)).await
    };

    match persisted {
        Ok(Ok(())) => {
            rooms
                .broadcast(
                    room_id,
                    GatewayEvent::Reply {
                        room_id,
                        body,
                        sender,
                        sent_on,
                    },
                )
                .await;
        }
        Ok(Err(e)) => {
            warn!("message persist failed for room {}: {}", room_id, e);
            let _ = tx.send(GatewayEvent::Error {
                message: "Message could not be saved.".to_string(),
            });
        }
        Err(e) => {
            warn!("message persist task failed to join: {}", e);
            let _ = tx.send(GatewayEvent::Error {
                message: "Message could not be saved.".to_string(),
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn test_db() -> (Arc<Database>, TempDir) {
        let dir = tempfile::tempdir().expect("tempdir");
        let db = Database::open(&dir.path().join("whisper.db")).expect("open db");
        (Arc::new(db), dir)
    }

    fn add_user(db: &Database, name: &str) -> Uuid {
        let id = Uuid::new_v4();
        db.create_user(
            &id.to_string(),
            name,
            &format!("{}@x.io", name),
            "hash",
            "hash",
            "2000-01-01",
            "",
            "2026-01-01T00:00:00Z",
        )
        .expect("create user");
        id
    }

    fn make_chat(db: &Database, a: Uuid, b: Uuid) -> Uuid {
        db.insert_friend_request(&b.to_string(), &a.to_string(), "2026-01-02T00:00:00Z")
            .unwrap();
        let chat_id = Uuid::new_v4();
        db.accept_friend_request(
            &b.to_string(),
            &a.to_string(),
            &chat_id.to_string(),
            "2026-01-03T00:00:00Z",
        )
        .unwrap()
        .unwrap();
        chat_id
    }

    fn snapshot(user_id: Uuid, name: &str) -> MemberSnapshot {
        MemberSnapshot {
            user_id,
            name: name.to_string(),
            pfp: String::new(),
        }
    }

    #[tokio::test]
    async fn member_join_binds_and_nonmember_join_is_refused() {
        let (db, _dir) = test_db();
        let alice = add_user(&db, "alice");
        let bob = add_user(&db, "bob");
        let carol = add_user(&db, "carol");
        let chat = make_chat(&db, alice, bob);

        let rooms = RoomRegistry::new();
        let session = Uuid::new_v4();
        let (tx, mut rx) = mpsc::unbounded_channel();

        handle_command(
            &db,
            &rooms,
            session,
            alice,
            &tx,
            GatewayCommand::Join { room_id: chat },
        )
        .await;
        assert_eq!(rooms.members_of(chat).await.len(), 1);

        let intruder = Uuid::new_v4();
        let (itx, mut irx) = mpsc::unbounded_channel();
        handle_command(
            &db,
            &rooms,
            intruder,
            carol,
            &itx,
            GatewayCommand::Join { room_id: chat },
        )
        .await;
        assert_eq!(rooms.members_of(chat).await.len(), 1);
        assert!(matches!(irx.try_recv(), Ok(GatewayEvent::Error { .. })));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn message_persists_and_fans_out_to_the_room_only() {
        let (db, _dir) = test_db();
        let alice = add_user(&db, "alice");
        let bob = add_user(&db, "bob");
        let carol = add_user(&db, "carol");
        let dave = add_user(&db, "dave");
        let chat = make_chat(&db, alice, bob);
        let other_chat = make_chat(&db, carol, dave);

        let rooms = RoomRegistry::new();

        let alice_session = Uuid::new_v4();
        let (alice_tx, mut alice_rx) = mpsc::unbounded_channel();
        let bob_session = Uuid::new_v4();
        let (bob_tx, mut bob_rx) = mpsc::unbounded_channel();
        let carol_session = Uuid::new_v4();
        let (carol_tx, mut carol_rx) = mpsc::unbounded_channel();

        rooms.bind(chat, alice_session, alice_tx.clone()).await;
        rooms.bind(chat, bob_session, bob_tx).await;
        rooms.bind(other_chat, carol_session, carol_tx).await;

        handle_command(
            &db,
            &rooms,
            alice_session,
            alice,
            &alice_tx,
            GatewayCommand::Message {
                room_id: chat,
                body: "hi".to_string(),
                sender: snapshot(alice, "alice"),
            },
        )
        .await;

        // Sender echo and peer delivery, nothing for the other room.
        for rx in [&mut alice_rx, &mut bob_rx] {
            match rx.try_recv() {
                Ok(GatewayEvent::Reply { body, sender, .. }) => {
                    assert_eq!(body, "hi");
                    assert_eq!(sender.user_id, alice);
                    assert_eq!(sender.name, "alice");
                }
                other => panic!("expected Reply, got {:?}", other),
            }
        }
        assert!(carol_rx.try_recv().is_err());

        // Durable and visible through history.
        let (page, total) = db.history_page(&chat.to_string(), 10).unwrap();
        assert_eq!(total, 1);
        assert_eq!(page[0].body, "hi");

        // Latest-message cache follows.
        let chats = db.chats_for_user(&alice.to_string()).unwrap();
        assert_eq!(chats[0].chat.latest_message, "hi");
    }

    #[tokio::test]
    async fn leave_then_message_no_longer_reaches_the_session() {
        let (db, _dir) = test_db();
        let alice = add_user(&db, "alice");
        let bob = add_user(&db, "bob");
        let chat = make_chat(&db, alice, bob);

        let rooms = RoomRegistry::new();
        let alice_session = Uuid::new_v4();
        let (alice_tx, _alice_rx) = mpsc::unbounded_channel();
        let bob_session = Uuid::new_v4();
        let (bob_tx, mut bob_rx) = mpsc::unbounded_channel();

        rooms.bind(chat, alice_session, alice_tx.clone()).await;
        rooms.bind(chat, bob_session, bob_tx).await;

        handle_command(
            &db,
            &rooms,
            bob_session,
            bob,
            &alice_tx,
            GatewayCommand::Leave { room_id: chat },
        )
        .await;
        // Leaving twice is fine.
        handle_command(
            &db,
            &rooms,
            bob_session,
            bob,
            &alice_tx,
            GatewayCommand::Leave { room_id: chat },
        )
        .await;

        handle_command(
            &db,
            &rooms,
            alice_session,
            alice,
            &alice_tx,
            GatewayCommand::Message {
                room_id: chat,
                body: "anyone there?".to_string(),
                sender: snapshot(alice, "alice"),
            },
        )
        .await;

        assert!(bob_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn message_from_an_unbound_session_is_refused() {
        let (db, _dir) = test_db();
        let alice = add_user(&db, "alice");
        let bob = add_user(&db, "bob");
        let chat = make_chat(&db, alice, bob);

        let rooms = RoomRegistry::new();
        let session = Uuid::new_v4();
        let (tx, mut rx) = mpsc::unbounded_channel();

        // Alice is a member but this session never joined the room.
        handle_command(
            &db,
            &rooms,
            session,
            alice,
            &tx,
            GatewayCommand::Message {
                room_id: chat,
                body: "hi".to_string(),
                sender: snapshot(alice, "alice"),
            },
        )
        .await;

        assert!(matches!(rx.try_recv(), Ok(GatewayEvent::Error { .. })));
        let (_, total) = db.history_page(&chat.to_string(), 10).unwrap();
        assert_eq!(total, 0);
    }
}
