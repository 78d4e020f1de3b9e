//! End-to-end remote control over an in-process message port pair:
//! a `RemotePlayer` driving a `Receiver` wired to a simulated backend.

use std::sync::Arc;
use std::time::Duration;

use embaudio::{AudioBackend, SimBackend};
use embplayer::PlayerController;
use embremote::{port_pair, Receiver, RemotePlayer};
use serde_json::json;

struct Rig {
    player: RemotePlayer,
    controller: Arc<PlayerController>,
    backend: Arc<SimBackend>,
}

fn rig() -> Rig {
    let backend = SimBackend::new(30.0);
    let controller = PlayerController::new(
        backend.clone() as Arc<dyn AudioBackend>,
        "http://localhost:8080",
        Duration::from_millis(10),
    );

    let (host_port, embed_port) = port_pair();
    let receiver = Receiver::new(Some(controller.clone()), embed_port.tx).expect("playback target");
    receiver.spawn_inbound(embed_port.rx);
    receiver.ready();

    Rig {
        player: RemotePlayer::new(host_port),
        controller,
        backend,
    }
}

#[tokio::test]
async fn receiver_signals_ready() {
    let rig = rig();
    rig.player.wait_ready().await.expect("ready event");
    rig.controller.shutdown();
}

#[tokio::test]
async fn volume_mute_and_loop_round_trip() {
    let rig = rig();
    rig.player.wait_ready().await.unwrap();

    rig.player.set("setVolume", json!(50)).await.unwrap();
    assert_eq!(rig.player.get("getVolume").await.unwrap(), json!(50.0));

    rig.player.call("mute").await.unwrap();
    assert_eq!(rig.player.get("getMuted").await.unwrap(), json!(true));
    rig.player.call("unmute").await.unwrap();
    assert_eq!(rig.player.get("getMuted").await.unwrap(), json!(false));

    rig.player.set("setLoop", json!(true)).await.unwrap();
    assert_eq!(rig.player.get("getLoop").await.unwrap(), json!(true));
    rig.controller.shutdown();
}

#[tokio::test]
async fn play_command_starts_playback_and_notifies() {
    let rig = rig();
    rig.player.wait_ready().await.unwrap();
    let mut play_events = rig.player.listen("play").await.unwrap();

    rig.controller.change_source(Some("/a.mp3"), None);
    assert_eq!(rig.player.get("getPaused").await.unwrap(), json!(true));

    rig.player.call("play").await.unwrap();
    tokio::time::timeout(Duration::from_secs(1), play_events.recv())
        .await
        .expect("play notification")
        .expect("channel open");

    assert_eq!(rig.player.get("getPaused").await.unwrap(), json!(false));
    assert_eq!(
        rig.player.get("getDuration").await.unwrap(),
        json!(30.0)
    );
    rig.controller.shutdown();
}

#[tokio::test]
async fn seek_round_trips_through_the_protocol() {
    let rig = rig();
    rig.player.wait_ready().await.unwrap();
    rig.controller.change_source(Some("/a.mp3"), None);

    rig.player.set("setCurrentTime", json!(12.5)).await.unwrap();
    assert_eq!(
        rig.player.get("getCurrentTime").await.unwrap(),
        json!(12.5)
    );
    rig.controller.shutdown();
}

#[tokio::test]
async fn ended_and_timeupdate_are_forwarded() {
    let rig = rig();
    rig.player.wait_ready().await.unwrap();
    let mut timeupdates = rig.player.listen("timeupdate").await.unwrap();
    let mut ended = rig.player.listen("ended").await.unwrap();

    rig.controller.change_source(Some("/a.mp3"), None);
    rig.controller.control_play(None, None);

    rig.backend.advance(10.0);
    let update = tokio::time::timeout(Duration::from_secs(1), timeupdates.recv())
        .await
        .expect("timeupdate")
        .expect("channel open");
    assert_eq!(update["seconds"], json!(10.0));
    assert_eq!(update["duration"], json!(30.0));

    rig.backend.advance(25.0);
    tokio::time::timeout(Duration::from_secs(1), ended.recv())
        .await
        .expect("ended notification")
        .expect("channel open");
    rig.controller.shutdown();
}
