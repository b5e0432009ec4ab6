use lifeline_core::{ClientMessage, Role, ServerMessage};
use serde_json::json;

use crate::integration::init_tracing;
use crate::utils::TestCoordinator;

// Full lifecycle: replay catches a late viewer up, stop_stream tears the
// whole session down and closes every subscriber.
#[tokio::test]
async fn test_late_join_catch_up_and_stop() {
    init_tracing();

    let mut t = TestCoordinator::spawn().await;
    let room = "emergency_room_emergency_99".to_string();

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

    let parent_a = t.connect().await;
    t.send(
        parent_a,
        ClientMessage::JoinRoom {
            room_id: room.clone(),
            role: Role::Parent,
        },
    )
    .await;
    t.settle().await;

    // A is caught up on the offer it missed.
    assert!(
        t.sink
            .sent_to(&parent_a)
            .await
            .iter()
            .any(|m| matches!(m, ServerMessage::Offer { offer, .. } if offer["sdp"] == "o1"))
    );

    // C1 reaches A live; B is not in the room yet and misses it.
    let parent_b = t.connect().await;
    t.sink.clear().await;
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

    assert!(matches!(
        &t.sink.sent_to(&parent_a).await[..],
        [ServerMessage::IceCandidate { candidate, .. }] if candidate["candidate"] == "c1"
    ));
    assert!(t.sink.sent_to(&parent_b).await.is_empty());

    // B joins late and replays O1 followed by [C1].
    t.send(
        parent_b,
        ClientMessage::JoinRoom {
            room_id: room.clone(),
            role: Role::Parent,
        },
    )
    .await;
    t.settle().await;

    let to_b = t.sink.sent_to(&parent_b).await;
    assert!(matches!(
        &to_b[..],
        [
            ServerMessage::Offer { offer, .. },
            ServerMessage::ChildStreamOffer { .. },
            ServerMessage::IceCandidate { candidate, .. },
            ServerMessage::RoomJoined { .. },
        ] if offer["sdp"] == "o1" && candidate["candidate"] == "c1"
    ));

    // Child ends the broadcast: both subscribers hear it and are closed.
    t.sink.clear().await;
    t.send(
        child,
        ClientMessage::StopStream {
            room_id: room.clone(),
        },
    )
    .await;
    t.settle().await;

    for parent in [parent_a, parent_b] {
        assert!(matches!(
            &t.sink.sent_to(&parent).await[..],
            [ServerMessage::StreamStopped { room_id }] if *room_id == room
        ));
        assert!(t.sink.was_closed(&parent).await);
    }
    assert!(t.sink.was_closed(&child).await);

    // The transport closes ripple back as disconnects, emptying the room.
    for conn in [child, parent_a, parent_b] {
        t.disconnect(conn).await;
    }
    t.settle().await;
    t.sink.clear().await;

    // Fresh joiners find no trace of the old session.
    let fresh = t.connect().await;
    t.send(
        fresh,
        ClientMessage::JoinRoom {
            room_id: room.clone(),
            role: Role::Parent,
        },
    )
    .await;
    t.settle().await;

    assert!(matches!(
        &t.sink.sent_to(&fresh).await[..],
        [ServerMessage::RoomJoined { .. }]
    ));
}
