mod common;

use std::net::SocketAddr;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use parley_auth::Identity;
use parley_chats::HistoryQuery;
use parley_config::RealtimeConfig;
use parley_gateway::create_router;
use serde_json::{json, Value};
use tokio::net::{TcpListener, TcpStream};
use tokio::time::{sleep, timeout};
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use common::TestContext;

type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

async fn spawn_server(ctx: &TestContext) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let address = listener.local_addr().unwrap();
    let app = create_router(ctx.state.clone());

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    address
}

fn room_url(address: SocketAddr, room_id: &str, token: &str) -> String {
    format!("ws://{address}/ws/chat/{room_id}?token={token}")
}

async fn connect(address: SocketAddr, room_id: &str, token: &str) -> Client {
    let (client, _) = connect_async(room_url(address, room_id, token)).await.unwrap();
    client
}

/// Status of a refused upgrade.
async fn refused_status(url: String) -> u16 {
    match connect_async(url).await {
        Err(WsError::Http(response)) => response.status().as_u16(),
        Err(other) => panic!("unexpected error: {other}"),
        Ok(_) => panic!("upgrade should have been refused"),
    }
}

async fn wait_for_members(ctx: &TestContext, room_id: &str, expected: &[&str]) {
    let mut expected: Vec<Identity> = expected.iter().map(|id| Identity::from(*id)).collect();
    expected.sort();

    for _ in 0..100 {
        let mut members = ctx.state.hub.live_members(room_id).await;
        members.sort();
        if members == expected {
            return;
        }
        sleep(Duration::from_millis(20)).await;
    }
    panic!("room {room_id} never reached members {expected:?}");
}

async fn next_frame(client: &mut Client) -> Message {
    loop {
        let message = timeout(Duration::from_secs(5), client.next())
            .await
            .expect("timed out waiting for a frame")
            .expect("stream ended")
            .expect("read failed");

        match message {
            Message::Ping(_) | Message::Pong(_) => continue,
            other => return other,
        }
    }
}

async fn next_json(client: &mut Client) -> Value {
    match next_frame(client).await {
        Message::Text(text) => serde_json::from_str(&text).unwrap(),
        other => panic!("expected a text frame, got {other:?}"),
    }
}

async fn next_close_code(client: &mut Client) -> u16 {
    match next_frame(client).await {
        Message::Close(Some(frame)) => u16::from(frame.code),
        other => panic!("expected a close frame, got {other:?}"),
    }
}

async fn wait_for_no_rooms(ctx: &TestContext) {
    for _ in 0..100 {
        if ctx.state.hub.active_rooms().await == 0 {
            return;
        }
        sleep(Duration::from_millis(20)).await;
    }
    panic!("room actor outlived its last connection");
}

async fn send_json(client: &mut Client, value: Value) {
    client.send(Message::Text(value.to_string())).await.unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn accepted_pair_exchanges_messages() {
    let ctx = TestContext::new().await;
    let address = spawn_server(&ctx).await;
    let room = ctx.open_room("u1", "u2").await;

    let mut u1 = connect(address, &room.public_id, &ctx.token("u1")).await;
    let mut u2 = connect(address, &room.public_id, &ctx.token("u2")).await;
    wait_for_members(&ctx, &room.public_id, &["u1", "u2"]).await;

    send_json(&mut u1, json!({ "content": "hi" })).await;

    let received = next_json(&mut u2).await;
    assert_eq!(received["sender"], "u1");
    assert_eq!(received["content"], "hi");
    assert_eq!(received["room_id"], room.public_id.as_str());

    let echoed = next_json(&mut u1).await;
    assert_eq!(echoed["id"], received["id"]);

    let history = ctx
        .state
        .messages
        .history(&room.public_id, HistoryQuery::default())
        .await
        .unwrap();
    assert_eq!(history.messages.len(), 1);
    assert_eq!(history.messages[0].content, "hi");
    assert_eq!(history.messages[0].sender_id, "u1");
}

#[tokio::test(flavor = "multi_thread")]
async fn bearer_header_is_accepted_for_upgrade() {
    let ctx = TestContext::new().await;
    let address = spawn_server(&ctx).await;
    let room = ctx.open_room("u1", "u2").await;

    let mut request = format!("ws://{address}/ws/chat/{}", room.public_id)
        .into_client_request()
        .unwrap();
    request.headers_mut().insert(
        "Authorization",
        format!("Bearer {}", ctx.token("u2")).parse().unwrap(),
    );

    let (_client, _) = connect_async(request).await.unwrap();
    wait_for_members(&ctx, &room.public_id, &["u2"]).await;
}

#[tokio::test(flavor = "multi_thread")]
async fn upgrades_without_valid_credentials_are_refused() {
    let ctx = TestContext::new().await;
    let address = spawn_server(&ctx).await;
    let room = ctx.open_room("u1", "u2").await;

    let status = refused_status(format!("ws://{address}/ws/chat/{}", room.public_id)).await;
    assert_eq!(status, 401);

    let status = refused_status(room_url(address, &room.public_id, "garbage")).await;
    assert_eq!(status, 401);

    assert_eq!(ctx.state.hub.active_rooms().await, 0);
}

#[tokio::test(flavor = "multi_thread")]
async fn non_participant_is_refused_and_live_set_is_unchanged() {
    let ctx = TestContext::new().await;
    let address = spawn_server(&ctx).await;
    let room = ctx.open_room("u1", "u2").await;

    let _u1 = connect(address, &room.public_id, &ctx.token("u1")).await;
    wait_for_members(&ctx, &room.public_id, &["u1"]).await;

    let status = refused_status(room_url(address, &room.public_id, &ctx.token("u3"))).await;
    assert_eq!(status, 403);

    let members = ctx.state.hub.live_members(&room.public_id).await;
    assert_eq!(members, vec![Identity::from("u1")]);
}

#[tokio::test(flavor = "multi_thread")]
async fn rejected_request_leaves_nothing_to_join() {
    let ctx = TestContext::new().await;
    let address = spawn_server(&ctx).await;

    let request = ctx
        .state
        .requests
        .submit(&Identity::from("u1"), &Identity::from("u2"))
        .await
        .unwrap();
    let resolution = ctx
        .state
        .requests
        .resolve(&request.public_id, &Identity::from("u2"), parley_chats::Decision::Reject)
        .await
        .unwrap();
    assert!(resolution.room.is_none());

    // neither the request id nor an invented id names a room
    for room_id in [request.public_id.as_str(), "no-such-room"] {
        let status = refused_status(room_url(address, room_id, &ctx.token("u1"))).await;
        assert_eq!(status, 404);
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn rejected_content_gets_an_error_frame_and_stays_open() {
    let ctx = TestContext::new().await;
    let address = spawn_server(&ctx).await;
    let room = ctx.open_room("u1", "u2").await;

    let mut u1 = connect(address, &room.public_id, &ctx.token("u1")).await;
    wait_for_members(&ctx, &room.public_id, &["u1"]).await;

    send_json(&mut u1, json!({ "content": "   " })).await;
    let error = next_json(&mut u1).await;
    assert!(error["error"].is_string());

    send_json(&mut u1, json!({ "content": "still here" })).await;
    let echoed = next_json(&mut u1).await;
    assert_eq!(echoed["content"], "still here");
}

#[tokio::test(flavor = "multi_thread")]
async fn undecodable_frame_closes_with_invalid_payload() {
    let ctx = TestContext::new().await;
    let address = spawn_server(&ctx).await;
    let room = ctx.open_room("u1", "u2").await;

    let mut u1 = connect(address, &room.public_id, &ctx.token("u1")).await;
    wait_for_members(&ctx, &room.public_id, &["u1"]).await;

    u1.send(Message::Text("not json".into())).await.unwrap();
    assert_eq!(next_close_code(&mut u1).await, 1007);

    wait_for_no_rooms(&ctx).await;
}

#[tokio::test(flavor = "multi_thread")]
async fn newer_connection_supersedes_older_one() {
    let ctx = TestContext::new().await;
    let address = spawn_server(&ctx).await;
    let room = ctx.open_room("u1", "u2").await;

    let mut first = connect(address, &room.public_id, &ctx.token("u1")).await;
    wait_for_members(&ctx, &room.public_id, &["u1"]).await;

    let mut second = connect(address, &room.public_id, &ctx.token("u1")).await;
    assert_eq!(next_close_code(&mut first).await, 4409);

    wait_for_members(&ctx, &room.public_id, &["u1"]).await;
    send_json(&mut second, json!({ "content": "from the new tab" })).await;
    let echoed = next_json(&mut second).await;
    assert_eq!(echoed["content"], "from the new tab");
}

#[tokio::test(flavor = "multi_thread")]
async fn disconnect_removes_connection_from_room() {
    let ctx = TestContext::new().await;
    let address = spawn_server(&ctx).await;
    let room = ctx.open_room("u1", "u2").await;

    let _u1 = connect(address, &room.public_id, &ctx.token("u1")).await;
    let mut u2 = connect(address, &room.public_id, &ctx.token("u2")).await;
    wait_for_members(&ctx, &room.public_id, &["u1", "u2"]).await;

    u2.close(None).await.unwrap();
    drop(u2);

    wait_for_members(&ctx, &room.public_id, &["u1"]).await;
}

#[tokio::test(flavor = "multi_thread")]
async fn error_frames_reach_only_the_sender() {
    let ctx = TestContext::new().await;
    let address = spawn_server(&ctx).await;
    let room = ctx.open_room("u1", "u2").await;

    let mut u1 = connect(address, &room.public_id, &ctx.token("u1")).await;
    let mut u2 = connect(address, &room.public_id, &ctx.token("u2")).await;
    wait_for_members(&ctx, &room.public_id, &["u1", "u2"]).await;

    send_json(&mut u1, json!({ "content": "   " })).await;
    let error = next_json(&mut u1).await;
    assert!(error["error"].is_string());

    send_json(&mut u1, json!({ "content": "ok" })).await;

    // the peer's first frame is the accepted message, not the error
    let received = next_json(&mut u2).await;
    assert!(received.get("error").is_none());
    assert_eq!(received["content"], "ok");
    assert_eq!(received["sender"], "u1");
}

#[tokio::test(flavor = "multi_thread")]
async fn silent_client_is_closed_as_idle() {
    let ctx = TestContext::with_realtime(RealtimeConfig {
        idle_timeout_seconds: 1,
        ..RealtimeConfig::default()
    })
    .await;
    let address = spawn_server(&ctx).await;
    let room = ctx.open_room("u1", "u2").await;

    let mut u1 = connect(address, &room.public_id, &ctx.token("u1")).await;
    wait_for_members(&ctx, &room.public_id, &["u1"]).await;

    // not reading means no pongs go back
    sleep(Duration::from_secs(2)).await;

    assert_eq!(next_close_code(&mut u1).await, 1001);
    wait_for_no_rooms(&ctx).await;
}

#[tokio::test(flavor = "multi_thread")]
async fn listening_client_is_kept_alive_by_heartbeats() {
    let ctx = TestContext::with_realtime(RealtimeConfig {
        idle_timeout_seconds: 1,
        ..RealtimeConfig::default()
    })
    .await;
    let address = spawn_server(&ctx).await;
    let room = ctx.open_room("u1", "u2").await;

    let mut u2 = connect(address, &room.public_id, &ctx.token("u2")).await;
    wait_for_members(&ctx, &room.public_id, &["u2"]).await;

    // reading answers the server's pings; nothing else is sent
    let mut pings = 0;
    let listen_until = tokio::time::Instant::now() + Duration::from_millis(3_500);
    while let Ok(frame) = tokio::time::timeout_at(listen_until, u2.next()).await {
        match frame.expect("stream ended").expect("read failed") {
            Message::Ping(_) => pings += 1,
            other => panic!("listener should only see pings, got {other:?}"),
        }
    }

    assert!(pings >= 3, "expected regular pings, saw {pings}");
    assert_eq!(ctx.state.hub.live_members(&room.public_id).await, vec![Identity::from("u2")]);

    let mut u1 = connect(address, &room.public_id, &ctx.token("u1")).await;
    wait_for_members(&ctx, &room.public_id, &["u1", "u2"]).await;
    send_json(&mut u1, json!({ "content": "still listening?" })).await;
    assert_eq!(next_json(&mut u2).await["content"], "still listening?");
}

#[tokio::test(flavor = "multi_thread")]
async fn session_expiry_closes_the_connection() {
    let ctx = TestContext::new().await;
    let address = spawn_server(&ctx).await;
    let room = ctx.open_room("u1", "u2").await;

    let token = ctx.token_with_ttl("u1", chrono::Duration::seconds(3));
    let mut u1 = connect(address, &room.public_id, &token).await;
    wait_for_members(&ctx, &room.public_id, &["u1"]).await;

    assert_eq!(next_close_code(&mut u1).await, 4401);
    wait_for_no_rooms(&ctx).await;
}

#[tokio::test(flavor = "multi_thread")]
async fn oversized_idle_timeout_still_serves_and_releases() {
    let ctx = TestContext::with_realtime(RealtimeConfig {
        idle_timeout_seconds: i64::MAX as u64,
        ..RealtimeConfig::default()
    })
    .await;
    let address = spawn_server(&ctx).await;
    let room = ctx.open_room("u1", "u2").await;

    let mut u1 = connect(address, &room.public_id, &ctx.token("u1")).await;
    wait_for_members(&ctx, &room.public_id, &["u1"]).await;

    send_json(&mut u1, json!({ "content": "hi" })).await;
    assert_eq!(next_json(&mut u1).await["content"], "hi");

    drop(u1);
    wait_for_no_rooms(&ctx).await;
}
