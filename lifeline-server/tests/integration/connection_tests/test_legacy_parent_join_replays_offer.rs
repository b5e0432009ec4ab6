use lifeline_core::{ClientMessage, Role, ServerMessage};
use serde_json::json;

use crate::integration::init_tracing;
use crate::utils::TestCoordinator;

// The legacy parent join replays the stored offer but, unlike the current
// join_room path, sends neither the candidate log nor a room_joined reply.
#[tokio::test]
async fn test_legacy_parent_join_replays_offer() {
    init_tracing();

    let mut t = TestCoordinator::spawn().await;
    let room = "emergency_room_emergency_5".to_string();

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
            offer: json!({"sdp": "o1"}),
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
    t.settle().await;

    let parent = t.connect().await;
    t.send(
        parent,
        ClientMessage::ParentJoinRoom {
            room_id: Some(room.clone()),
            stream_id: None,
        },
    )
    .await;
    t.settle().await;

    let received = t.sink.sent_to(&parent).await;
    assert!(matches!(
        &received[..],
        [
            ServerMessage::Offer { offer, .. },
            ServerMessage::ChildStreamOffer { .. },
        ] if offer["sdp"] == "o1"
    ));

    // It still counts as a subscriber for live fan-out.
    t.sink.clear().await;
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

    assert!(matches!(
        &t.sink.sent_to(&parent).await[..],
        [ServerMessage::IceCandidate { candidate, .. }] if candidate["candidate"] == "c2"
    ));
}
