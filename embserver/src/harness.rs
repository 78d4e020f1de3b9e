//! Protocol conformance harness.
//!
//! Connects to a receiver endpoint over WebSocket and walks the full
//! command/event surface in sequence, reporting a pass/fail map per event
//! and per method. The suite drives real playback, so it expects a source
//! that actually plays (the simulated backend in test deployments).

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use embplayer::PlayerController;
use embremote::{MessagePort, ReceiverError, RemotePlayer};
use futures_util::{SinkExt, StreamExt};
use serde::Serialize;
use serde_json::{json, Value};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tracing::info;

/// Source loaded when the suite starts against a sourceless player.
pub const HARNESS_SOURCE: &str = "/harness/sample.mp3";

const EVENT_TIMEOUT: Duration = Duration::from_secs(3);
const BRIDGE_CAPACITY: usize = 256;

#[derive(Debug, Default, Clone, Serialize)]
pub struct ConformanceReport {
    pub events: BTreeMap<String, bool>,
    pub methods: BTreeMap<String, bool>,
}

impl ConformanceReport {
    fn event(&mut self, name: &str, passed: bool) {
        self.events.insert(name.to_string(), passed);
    }

    fn method(&mut self, name: &str, passed: bool) {
        self.methods.insert(name.to_string(), passed);
    }

    pub fn all_passed(&self) -> bool {
        self.events.values().all(|p| *p) && self.methods.values().all(|p| *p)
    }
}

#[derive(Error, Debug)]
pub enum HarnessError {
    #[error("WebSocket connection failed: {0}")]
    Connect(#[from] tokio_tungstenite::tungstenite::Error),

    #[error(transparent)]
    Remote(#[from] ReceiverError),
}

/// Bridges a WebSocket connection into a string message port.
pub async fn connect_port(ws_url: &str) -> Result<MessagePort, HarnessError> {
    let (ws, _) = connect_async(ws_url).await?;
    let (mut ws_sink, mut ws_stream) = ws.split();

    let (port_tx, mut to_ws) = mpsc::channel::<String>(BRIDGE_CAPACITY);
    let (from_ws, port_rx) = mpsc::channel::<String>(BRIDGE_CAPACITY);

    tokio::spawn(async move {
        while let Some(text) = to_ws.recv().await {
            if ws_sink.send(WsMessage::Text(text)).await.is_err() {
                break;
            }
        }
    });
    tokio::spawn(async move {
        while let Some(message) = ws_stream.next().await {
            match message {
                Ok(WsMessage::Text(text)) => {
                    if from_ws.send(text).await.is_err() {
                        break;
                    }
                }
                Ok(WsMessage::Close(_)) | Err(_) => break,
                Ok(_) => {}
            }
        }
    });

    Ok(MessagePort {
        tx: port_tx,
        rx: port_rx,
    })
}

/// Runs the full conformance sequence against `ws_url`.
pub async fn run_suite(
    ws_url: &str,
    controller: &Arc<PlayerController>,
) -> Result<ConformanceReport, HarnessError> {
    if controller.source().is_none() {
        controller.change_source(Some(HARNESS_SOURCE), None);
    }

    let port = connect_port(ws_url).await?;
    let player = RemotePlayer::new(port);
    let mut report = ConformanceReport::default();

    report.event("ready", player.wait_ready().await.is_ok());

    let mut play_events = player.listen("play").await?;
    let mut pause_events = player.listen("pause").await?;
    let mut timeupdates = player.listen("timeupdate").await?;
    let mut ended_events = player.listen("ended").await?;

    player.call("play").await?;
    report.event("play", next_within(&mut play_events).await);
    let paused = get_bool(&player, "getPaused").await;
    report.method("play", paused == Some(false));
    report.method("getPaused", paused.is_some());

    report.event("timeupdate", next_within(&mut timeupdates).await);

    player.call("pause").await?;
    report.event("pause", next_within(&mut pause_events).await);
    report.method("pause", get_bool(&player, "getPaused").await == Some(true));

    let duration = get_f64(&player, "getDuration").await;
    report.method("getDuration", duration.map(|d| d > 0.0).unwrap_or(false));

    player.set("setVolume", json!(50)).await?;
    let volume = get_f64(&player, "getVolume").await;
    report.method("setVolume", volume == Some(50.0));
    report.method("getVolume", volume.is_some());

    player.call("mute").await?;
    let muted = get_bool(&player, "getMuted").await;
    report.method("mute", muted == Some(true));
    player.call("unmute").await?;
    let unmuted = get_bool(&player, "getMuted").await;
    report.method("unmute", unmuted == Some(false));
    report.method("getMuted", muted.is_some() && unmuted.is_some());

    player.set("setLoop", json!(true)).await?;
    let looping = get_bool(&player, "getLoop").await;
    report.method("setLoop", looping == Some(true));
    report.method("getLoop", looping.is_some());
    player.set("setLoop", json!(false)).await?;

    player.set("setCurrentTime", json!(1.0)).await?;
    let position = get_f64(&player, "getCurrentTime").await;
    report.method(
        "setCurrentTime",
        position.map(|p| (p - 1.0).abs() < 1.0).unwrap_or(false),
    );
    report.method("getCurrentTime", position.is_some());

    // Let playback run out close to the end to observe `ended`.
    match duration {
        Some(duration) if duration > 0.0 => {
            player
                .set("setCurrentTime", json!((duration - 0.25).max(0.0)))
                .await?;
            player.call("play").await?;
            report.event("ended", next_within(&mut ended_events).await);
        }
        _ => report.event("ended", false),
    }

    info!(passed = report.all_passed(), "conformance suite finished");
    Ok(report)
}

async fn next_within(rx: &mut mpsc::Receiver<Value>) -> bool {
    tokio::time::timeout(EVENT_TIMEOUT, rx.recv())
        .await
        .map(|v| v.is_some())
        .unwrap_or(false)
}

async fn get_bool(player: &RemotePlayer, method: &str) -> Option<bool> {
    player.get(method).await.ok().and_then(|v| v.as_bool())
}

async fn get_f64(player: &RemotePlayer, method: &str) -> Option<f64> {
    player.get(method).await.ok().and_then(|v| v.as_f64())
}
