//! The blocking façade against live relays.

use futures_util::{SinkExt, StreamExt};
use simrelay_client::{RelayClientConfig, RelayState, SyncRelay};
use simrelay_core::{test_pattern, ImageFrame, SimTick};
use simrelay_net::{
    decode_frame, decode_message, encode_message, ConnectionState, ControlAction, ControlMessage,
    WireMessage,
};
use simrelay_server::RelayServer;
use simrelay_testkit::MockRelay;
use std::time::{Duration, Instant};
use tokio_tungstenite::{connect_async, tungstenite::Message};

const WAIT: Duration = Duration::from_secs(5);

fn frame(tick: u64) -> ImageFrame {
    test_pattern(48, 64, 3, SimTick(tick)).expect("valid pattern")
}

fn next_control(relay: &SyncRelay) -> Option<ControlMessage> {
    let deadline = Instant::now() + WAIT;
    while Instant::now() < deadline {
        if let Some(control) = relay.get_control() {
            return Some(control);
        }
        std::thread::sleep(Duration::from_millis(2));
    }
    None
}

fn wait_for(done: impl Fn() -> bool) -> bool {
    let deadline = Instant::now() + WAIT;
    while Instant::now() < deadline {
        if done() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    false
}

#[test]
fn frames_and_controls_round_trip() {
    let mock = MockRelay::start().expect("mock relay");
    let mut relay = SyncRelay::new(RelayClientConfig::new("127.0.0.1", mock.port()));

    assert!(relay.connect());
    assert_eq!(relay.state(), RelayState::Ready);
    let log = mock
        .wait_until(WAIT, |log| !log.messages.is_empty())
        .expect("identification");
    assert_eq!(log.decoded(), vec![WireMessage::Simulation]);

    for tick in 0..3 {
        relay.stream_frame(&frame(tick)).expect("encodable");
    }
    let log = mock
        .wait_until(WAIT, |log| log.frames().len() == 3)
        .expect("three frames");
    let frames = log.frames();
    for pair in frames.windows(2) {
        let earlier = pair[0].parsed_timestamp().expect("rfc3339");
        let later = pair[1].parsed_timestamp().expect("rfc3339");
        assert!(later > earlier, "{} !> {}", pair[1].timestamp, pair[0].timestamp);
    }
    let image = decode_frame(&frames[0].frame).expect("jpeg");
    assert_eq!(image.dimensions(), (64, 48));

    let pause = ControlMessage::new(ControlAction::Pause);
    assert!(mock.send_control(&pause).expect("encodable"));
    assert_eq!(next_control(&relay), Some(pause));
    assert!(relay.get_control().is_none());

    relay.disconnect();
    let log = mock
        .wait_until(WAIT, |log| log.disconnects == 1)
        .expect("connection ended");
    assert_eq!(log.clean_closes, 1);
    assert_eq!(relay.state(), RelayState::Closed);

    relay.stream_frame(&frame(4)).expect("no-op");
    std::thread::sleep(Duration::from_millis(50));
    assert_eq!(mock.log().frames().len(), 3);
}

#[test]
fn peer_close_turns_streaming_into_a_no_op() {
    let mock = MockRelay::start().expect("mock relay");
    let mut relay = SyncRelay::new(RelayClientConfig::new("127.0.0.1", mock.port()));
    assert!(relay.connect());
    mock.wait_until(WAIT, |log| log.connections == 1)
        .expect("connected");

    assert!(mock.send_control(&ControlMessage::keyboard("forward")).unwrap());
    assert_eq!(next_control(&relay), Some(ControlMessage::keyboard("forward")));

    mock.close_clients();
    assert!(wait_for(|| relay.connection_state() == ConnectionState::Failed));
    assert_eq!(relay.state(), RelayState::Closed);

    relay.stream_frame(&frame(0)).expect("no-op");
    assert!(mock.log().frames().is_empty());
    relay.disconnect();
}

#[test]
fn malformed_inbound_text_is_not_queued() {
    let mock = MockRelay::start().expect("mock relay");
    let mut relay = SyncRelay::new(RelayClientConfig::new("127.0.0.1", mock.port()));
    assert!(relay.connect());
    mock.wait_until(WAIT, |log| log.connections == 1)
        .expect("connected");

    assert!(mock.send_text("{broken"));
    assert!(mock.send_text(r#"{"type":"control","action":"dance"}"#));
    assert!(mock.send_text(r#"{"type":"viewer"}"#));
    assert!(mock.send_control(&ControlMessage::new(ControlAction::Stand)).unwrap());

    assert_eq!(
        next_control(&relay),
        Some(ControlMessage::new(ControlAction::Stand))
    );
    assert_eq!(relay.pending_controls(), 0);
    assert!(relay.is_connected());
}

#[test]
fn viewer_sees_frames_and_drives_the_simulation_through_the_relay_server() {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .enable_all()
        .build()
        .unwrap();
    let server = runtime
        .block_on(RelayServer::bind("127.0.0.1:0"))
        .expect("bind");
    let handle = {
        let _guard = runtime.enter();
        server.spawn().expect("spawn")
    };
    let addr = handle.local_addr();

    let mut viewer = runtime.block_on(async {
        let (mut ws, _) = connect_async(format!("ws://{addr}")).await.unwrap();
        ws.send(Message::Text(encode_message(&WireMessage::Viewer).unwrap()))
            .await
            .unwrap();
        ws
    });

    let mut relay = SyncRelay::new(RelayClientConfig::new("127.0.0.1", addr.port()));
    assert!(relay.connect());
    assert!(wait_for(|| {
        let stats = handle.stats();
        stats.simulation_connected && stats.viewers == 1
    }));

    relay.stream_frame(&frame(1)).expect("encodable");
    let received = runtime.block_on(async {
        tokio::time::timeout(WAIT, viewer.next())
            .await
            .expect("frame before timeout")
            .expect("open")
            .expect("read")
    });
    let Message::Text(text) = received else {
        panic!("expected text, got {received:?}");
    };
    match decode_message(&text).expect("valid") {
        WireMessage::Frame(frame) => {
            assert_eq!(decode_frame(&frame.frame).unwrap().dimensions(), (64, 48));
        }
        other => panic!("expected frame, got {other:?}"),
    }

    runtime.block_on(async {
        let reset = encode_message(&WireMessage::Control(ControlMessage::new(ControlAction::Reset)))
            .unwrap();
        viewer.send(Message::Text(reset)).await.unwrap();
    });
    assert_eq!(
        next_control(&relay),
        Some(ControlMessage::new(ControlAction::Reset))
    );

    relay.disconnect();
    assert!(wait_for(|| !handle.stats().simulation_connected));
    runtime.block_on(handle.shutdown());
}
