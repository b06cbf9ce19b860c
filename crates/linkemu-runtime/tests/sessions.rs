use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use linkemu_middleware::{ChannelHandle, DisplaySink, TelemetryChange, Transport, WsServer};
use linkemu_runtime::{Action, ActionOutcome, HardwareSettings, RolePolicy, Session};
use linkemu_types::{Channel, LinkId, Packet, Peer};
use serde_json::Value;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;

type Inbox = mpsc::UnboundedReceiver<(Channel, Packet)>;

fn game_session() -> Session {
    let (display, _updates) = DisplaySink::channel();
    Session::register(RolePolicy::Game, LinkId::generate(), display)
}

fn hardware_session(interval: Duration) -> Session {
    let (display, _updates) = DisplaySink::channel();
    Session::register(
        RolePolicy::Hardware(HardwareSettings {
            initial_rpm: 60.0,
            publish_interval: interval,
            speed_step: 5.0,
        }),
        LinkId::generate(),
        display,
    )
}

fn connect(session: &Session, id: &str) -> (Arc<ChannelHandle>, Inbox) {
    let (handle, rx) = ChannelHandle::new(id);
    session.on_connect(Peer::new(id, "127.0.0.1:0"), handle.clone());
    (handle, rx)
}

async fn next_rpm(rx: &mut Inbox) -> f64 {
    loop {
        let (_, packet) = tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .expect("packet within timeout")
            .expect("inbox open");
        if let Packet::Data(p) = packet {
            if p.body.module == "rpm" {
                return p.body.value.as_f64().expect("numeric rpm");
            }
        }
    }
}

#[tokio::test]
async fn start_session_reaches_connected_peer() {
    let session = game_session();
    let (_handle, mut rx) = connect(&session, "p1");

    let outcome = session.dispatch(Action::StartSession);
    assert!(matches!(outcome, ActionOutcome::Broadcast(r) if r.delivered == 1));

    let (channel, packet) = rx.try_recv().expect("one packet");
    assert_eq!(channel, Channel::Command);
    match packet {
        Packet::Command(p) => assert_eq!(p.body.command, "start_game"),
        other => panic!("expected start_game, got {other:?}"),
    }
    assert!(rx.try_recv().is_err(), "exactly one packet");
}

#[tokio::test]
async fn disconnect_all_empties_registry_once_events_arrive() {
    let session = game_session();
    let (h1, _rx1) = connect(&session, "p1");
    let (h2, _rx2) = connect(&session, "p2");

    assert_eq!(session.dispatch(Action::DisconnectAll), ActionOutcome::Closed(2));
    assert!(h1.is_closed() && h2.is_closed());

    // The transport reports each closed connection back.
    session.on_disconnect("p1");
    session.on_disconnect("p2");
    assert!(session.registry().snapshot().is_empty());
}

#[tokio::test]
async fn publisher_carries_speed_changes() {
    let session = hardware_session(Duration::from_millis(250));
    let (_handle, mut rx) = connect(&session, "p1");

    assert_eq!(next_rpm(&mut rx).await, 60.0);
    assert!(matches!(
        session.dispatch(Action::SpeedUp),
        ActionOutcome::Telemetry(TelemetryChange::Updated { current, .. }) if current == 65.0
    ));
    assert_eq!(next_rpm(&mut rx).await, 65.0);

    session.shutdown().await;
}

#[tokio::test]
async fn speed_down_stops_at_zero() {
    let session = hardware_session(Duration::from_secs(3600));
    let (_handle, _rx) = connect(&session, "p1");

    for _ in 0..13 {
        session.dispatch(Action::SpeedDown);
    }
    assert_eq!(session.registry().telemetry(), 0.0);
    assert_eq!(
        session.dispatch(Action::SpeedDown),
        ActionOutcome::Telemetry(TelemetryChange::AtFloor)
    );

    session.shutdown().await;
}

#[tokio::test]
async fn websocket_client_receives_framed_start_game() {
    let session = Arc::new(game_session());
    let (events, events_rx) = mpsc::unbounded_channel();
    let transport = WsServer::new("127.0.0.1:0".parse().unwrap())
        .open(events)
        .await
        .unwrap();
    let port = transport.local_addr.unwrap().port();

    let runner = {
        let session = Arc::clone(&session);
        tokio::spawn(async move { session.run(events_rx).await })
    };

    let (mut ws, _) = tokio_tungstenite::connect_async(format!("ws://127.0.0.1:{port}/"))
        .await
        .unwrap();

    tokio::time::timeout(Duration::from_secs(2), async {
        while session.registry().is_empty() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("server registers the client");

    session.dispatch(Action::StartSession);

    let frame = tokio::time::timeout(Duration::from_secs(2), async {
        loop {
            match ws.next().await {
                Some(Ok(Message::Text(text))) => break text.as_str().to_string(),
                Some(Ok(_)) => continue,
                other => panic!("connection ended early: {other:?}"),
            }
        }
    })
    .await
    .expect("frame within timeout");

    let value: Value = serde_json::from_str(&frame).unwrap();
    assert_eq!(value["event"], "command");
    assert_eq!(value["data"]["type"], "game");
    assert_eq!(value["data"]["body"]["command"], "start_game");

    transport.abort();
    runner.abort();
}
