use lifeline_core::{ClientMessage, Role, ServerMessage};
use serde_json::json;

use crate::integration::init_tracing;
use crate::utils::TestCoordinator;

#[tokio::test]
async fn test_parent_join_replays_offer_and_candidates() {
    init_tracing();

    let mut t = TestCoordinator::spawn().await;
    let room = "emergency_room_emergency_42".to_string();

    // Child establishes the session and relays two candidates before any
    // subscriber exists.
    let child = t.connect().await;
    t.send(
        child,
        ClientMessage::JoinRoom {
            room_id: room.clone(),
            role: Role::Child,
        },
    )
    .await;
    t.send(
        child,
        ClientMessage::Offer {
            room_id: room.clone(),
            offer: json!({"sdp": "v=0 o1"}),
        },
    )
    .await;
    t.send(
        child,
        ClientMessage::IceCandidate {
            room_id: Some(room.clone()),
            stream_id: None,
            candidate: json!({"candidate": "c1"}),
        },
    )
    .await;
    t.send(
        child,
        ClientMessage::IceCandidate {
            room_id: Some(room.clone()),
            stream_id: None,
            candidate: json!({"candidate": "c2"}),
        },
    )
    .await;
    t.settle().await;

    // A late parent must be caught up on everything it missed, in order.
    let parent = t.connect().await;
    t.send(
        parent,
        ClientMessage::JoinRoom {
            room_id: room.clone(),
            role: Role::Parent,
        },
    )
    .await;
    t.settle().await;

    let received = t.sink.sent_to(&parent).await;
    assert_eq!(received.len(), 5, "expected full replay, got {received:?}");
    assert!(matches!(
        &received[0],
        ServerMessage::Offer { room_id, offer }
            if *room_id == room && offer["sdp"] == "v=0 o1"
    ));
    assert!(matches!(
        &received[1],
        ServerMessage::ChildStreamOffer { offer, .. } if offer["sdp"] == "v=0 o1"
    ));
    assert!(matches!(
        &received[2],
        ServerMessage::IceCandidate { candidate, .. } if candidate["candidate"] == "c1"
    ));
    assert!(matches!(
        &received[3],
        ServerMessage::IceCandidate { candidate, .. } if candidate["candidate"] == "c2"
    ));
    assert!(matches!(
        &received[4],
        ServerMessage::RoomJoined { room_id, role: Role::Parent } if *room_id == room
    ));
}
