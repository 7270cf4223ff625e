//! End-to-end relay tests over loopback sockets.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use framecast_hub::{
    Bridge, BridgeConfig, BridgeError, ChannelBroadcaster, ChannelConfig, RunningBridge,
};
use futures_util::{SinkExt, StreamExt};
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;

type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

const WAIT: Duration = Duration::from_secs(5);

fn loopback(channels: Vec<ChannelConfig>) -> BridgeConfig {
    BridgeConfig {
        host: IpAddr::V4(Ipv4Addr::LOCALHOST),
        channels,
        ..BridgeConfig::default()
    }
}

async fn start(channels: Vec<ChannelConfig>) -> RunningBridge {
    Bridge::start(&loopback(channels), CancellationToken::new())
        .await
        .expect("bridge should start")
}

async fn subscribe(addr: SocketAddr) -> Client {
    let (ws, _) = connect_async(format!("ws://{addr}"))
        .await
        .expect("websocket connect");
    ws
}

async fn wait_for_subscribers(broadcaster: &ChannelBroadcaster, expected: usize) {
    let deadline = tokio::time::Instant::now() + WAIT;
    while broadcaster.subscriber_count() != expected {
        assert!(
            tokio::time::Instant::now() < deadline,
            "expected {expected} subscribers, have {}",
            broadcaster.subscriber_count()
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

async fn next_binary(ws: &mut Client) -> Vec<u8> {
    loop {
        let message = tokio::time::timeout(WAIT, ws.next())
            .await
            .expect("timed out waiting for frame")
            .expect("stream ended")
            .expect("websocket error");
        match message {
            Message::Binary(data) => return data.to_vec(),
            Message::Ping(_) | Message::Pong(_) => continue,
            other => panic!("unexpected message: {other:?}"),
        }
    }
}

#[tokio::test]
async fn depth_frames_fan_out_and_follow_disconnects() {
    let bridge = start(vec![ChannelConfig::raw("depth", 0, 0, 16).with_trailer("\n")]).await;
    let depth = bridge.channel("depth").unwrap().clone();
    let broadcaster = depth.channel.broadcaster();

    let mut first = subscribe(depth.subscribe_addr).await;
    let mut second = subscribe(depth.subscribe_addr).await;
    wait_for_subscribers(broadcaster, 2).await;

    let mut producer = TcpStream::connect(depth.source_addr).await.unwrap();
    let frame_a = [0xAAu8; 16];
    producer.write_all(&frame_a).await.unwrap();
    producer.write_all(b"\n").await.unwrap();

    assert_eq!(next_binary(&mut first).await, frame_a);
    assert_eq!(next_binary(&mut second).await, frame_a);

    first.close(None).await.unwrap();
    wait_for_subscribers(broadcaster, 1).await;

    let frame_b: Vec<u8> = (0..16).collect();
    producer.write_all(&frame_b).await.unwrap();
    producer.write_all(b"\n").await.unwrap();
    assert_eq!(next_binary(&mut second).await, frame_b);

    bridge.shutdown();
    tokio::time::timeout(WAIT, bridge.wait()).await.unwrap();
}

#[tokio::test]
async fn chunked_producer_yields_whole_frames() {
    let bridge = start(vec![ChannelConfig::raw("rgb", 0, 0, 12)]).await;
    let rgb = bridge.channel("rgb").unwrap().clone();

    let mut ws = subscribe(rgb.subscribe_addr).await;
    wait_for_subscribers(rgb.channel.broadcaster(), 1).await;

    let mut producer = TcpStream::connect(rgb.source_addr).await.unwrap();
    for piece in [&b"abcde"[..], b"fgh", b"ijklmnop"] {
        producer.write_all(piece).await.unwrap();
        producer.flush().await.unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    assert_eq!(next_binary(&mut ws).await, b"abcdefghijkl");
    assert_eq!(rgb.channel.buffered(), 4);
    assert_eq!(rgb.channel.stats().frames, 1);

    bridge.shutdown();
}

#[tokio::test]
async fn malformed_base64_line_is_skipped() {
    let bridge = start(vec![ChannelConfig::base64_lines("imu", 0, 0, 0)]).await;
    let imu = bridge.channel("imu").unwrap().clone();

    let mut ws = subscribe(imu.subscribe_addr).await;
    wait_for_subscribers(imu.channel.broadcaster(), 1).await;

    let mut producer = TcpStream::connect(imu.source_addr).await.unwrap();
    let wire = format!(
        "{}\r\n%%% not base64 %%%\n{}\n",
        BASE64.encode(b"first"),
        BASE64.encode(b"second")
    );
    producer.write_all(wire.as_bytes()).await.unwrap();

    assert_eq!(next_binary(&mut ws).await, b"first");
    assert_eq!(next_binary(&mut ws).await, b"second");

    bridge.shutdown();
}

#[tokio::test]
async fn one_write_of_many_lines_reaches_connected_client() {
    let bridge = start(vec![ChannelConfig::base64_lines("imu", 0, 0, 0)]).await;
    let imu = bridge.channel("imu").unwrap().clone();

    let mut ws = subscribe(imu.subscribe_addr).await;
    wait_for_subscribers(imu.channel.broadcaster(), 1).await;

    let wire: String = (0..10)
        .map(|i| format!("{}\n", BASE64.encode(format!("w x y z {i}"))))
        .collect();
    let mut producer = TcpStream::connect(imu.source_addr).await.unwrap();
    producer.write_all(wire.as_bytes()).await.unwrap();

    for i in 0..10 {
        assert_eq!(next_binary(&mut ws).await, format!("w x y z {i}").into_bytes());
    }
    assert_eq!(imu.channel.broadcaster().subscriber_count(), 1);

    bridge.shutdown();
}

#[tokio::test]
async fn channels_are_isolated() {
    let bridge = start(vec![
        ChannelConfig::raw("rgb", 0, 0, 4),
        ChannelConfig::raw("depth", 0, 0, 4),
    ])
    .await;
    let rgb = bridge.channel("rgb").unwrap().clone();
    let depth = bridge.channel("depth").unwrap().clone();

    let mut rgb_ws = subscribe(rgb.subscribe_addr).await;
    let mut depth_ws = subscribe(depth.subscribe_addr).await;
    wait_for_subscribers(rgb.channel.broadcaster(), 1).await;
    wait_for_subscribers(depth.channel.broadcaster(), 1).await;

    let mut depth_producer = TcpStream::connect(depth.source_addr).await.unwrap();
    depth_producer.write_all(b"dddd").await.unwrap();
    let mut rgb_producer = TcpStream::connect(rgb.source_addr).await.unwrap();
    rgb_producer.write_all(b"rrrr").await.unwrap();

    assert_eq!(next_binary(&mut depth_ws).await, b"dddd");
    assert_eq!(next_binary(&mut rgb_ws).await, b"rrrr");

    bridge.shutdown();
}

#[tokio::test]
async fn client_greeting_is_ignored() {
    let bridge = start(vec![ChannelConfig::raw("depth", 0, 0, 2)]).await;
    let depth = bridge.channel("depth").unwrap().clone();

    let mut ws = subscribe(depth.subscribe_addr).await;
    ws.send(Message::text("Hi".to_string())).await.unwrap();
    wait_for_subscribers(depth.channel.broadcaster(), 1).await;

    let mut producer = TcpStream::connect(depth.source_addr).await.unwrap();
    producer.write_all(b"ok").await.unwrap();
    assert_eq!(next_binary(&mut ws).await, b"ok");
    assert_eq!(depth.channel.broadcaster().subscriber_count(), 1);

    bridge.shutdown();
}

#[tokio::test]
async fn port_conflict_fails_before_serving() {
    let taken = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = taken.local_addr().unwrap().port();

    let err = Bridge::start(
        &loopback(vec![ChannelConfig::raw("rgb", port, 0, 4)]),
        CancellationToken::new(),
    )
    .await
    .unwrap_err();
    assert!(matches!(err, BridgeError::Transport(_)));
}

#[tokio::test]
async fn invalid_config_is_rejected() {
    let err = Bridge::start(&loopback(Vec::new()), CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(err, BridgeError::Config(_)));
}
