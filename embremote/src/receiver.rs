//! The remote-control receiver: answers player.js commands against a
//! playback controller.
//!
//! The receiver never mutates the engine directly; every command goes
//! through controller operations or reads controller state. `ended` and
//! `timeupdate` media notifications are forwarded outbound as they occur;
//! `play` and `pause` notifications are emitted when the corresponding
//! command is handled. [`Receiver::ready`] must be called once the receiver
//! is fully wired; only then is the host told the channel is live.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use embplayer::{PlayerController, PlayerEvent};
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

use crate::error::ReceiverError;
use crate::protocol::{
    CommandFrame, OutboundFrame, ReadyPayload, TimeUpdatePayload, EVENTS, METHODS,
};

pub struct Receiver {
    controller: Arc<PlayerController>,
    outbound: mpsc::Sender<String>,
    /// Registered host listeners: event name -> listener tokens.
    listeners: Mutex<HashMap<String, Vec<String>>>,
    ready: AtomicBool,
}

impl Receiver {
    /// Builds a receiver over `controller`, sending outbound frames through
    /// `outbound`. Fails immediately when no playback target is available;
    /// a receiver must never exist without one.
    pub fn new(
        controller: Option<Arc<PlayerController>>,
        outbound: mpsc::Sender<String>,
    ) -> Result<Arc<Self>, ReceiverError> {
        let controller = controller.ok_or(ReceiverError::NoPlaybackTarget)?;
        let receiver = Arc::new(Self {
            controller,
            outbound,
            listeners: Mutex::new(HashMap::new()),
            ready: AtomicBool::new(false),
        });
        Self::spawn_forwarder(&receiver);
        Ok(receiver)
    }

    /// Marks the channel live: emits the `ready` event advertising the
    /// supported events and methods plus the current source.
    pub fn ready(&self) {
        self.ready.store(true, Ordering::SeqCst);
        let payload = ReadyPayload {
            src: self.controller.source(),
            events: EVENTS.iter().map(|s| s.to_string()).collect(),
            methods: METHODS.iter().map(|s| s.to_string()).collect(),
        };
        debug!(src = ?payload.src, "remote-control channel ready");
        self.emit_event("ready", Some(json!(payload)));
    }

    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }

    /// Spawns a task feeding inbound messages from `rx` into the receiver.
    pub fn spawn_inbound(self: &Arc<Self>, mut rx: mpsc::Receiver<String>) -> JoinHandle<()> {
        let receiver = self.clone();
        tokio::spawn(async move {
            while let Some(raw) = rx.recv().await {
                if let Err(err) = receiver.handle_message(&raw) {
                    warn!(error = %err, "dropping malformed inbound frame");
                }
            }
        })
    }

    /// Handles one raw inbound message. Frames not bearing the player.js
    /// context are ignored, not errors; the channel may be shared.
    pub fn handle_message(&self, raw: &str) -> Result<(), ReceiverError> {
        let frame: CommandFrame = serde_json::from_str(raw)?;
        if !frame.is_player_js() {
            trace!(context = %frame.context, "ignoring foreign frame");
            return Ok(());
        }
        self.dispatch(frame);
        Ok(())
    }

    fn dispatch(&self, frame: CommandFrame) {
        trace!(method = %frame.method, "command");
        match frame.method.as_str() {
            "play" => {
                self.controller.control_play(None, None);
                self.emit_event("play", None);
            }
            "pause" => {
                self.controller.control_pause();
                self.emit_event("pause", None);
            }
            "getPaused" => self.reply(&frame, json!(!self.controller.state().is_playing)),
            "getDuration" => self.reply(&frame, json!(self.controller.duration())),
            "getVolume" => self.reply(&frame, json!((self.controller.volume() * 100.0).round())),
            "setVolume" => {
                if let Some(v) = frame.value.as_ref().and_then(Value::as_f64) {
                    self.controller.set_volume((v / 100.0) as f32);
                }
            }
            "mute" => self.controller.set_muted(true),
            "unmute" => self.controller.set_muted(false),
            "getMuted" => self.reply(&frame, json!(self.controller.muted())),
            "getLoop" => self.reply(&frame, json!(self.controller.looping())),
            "setLoop" => {
                if let Some(v) = frame.value.as_ref().and_then(Value::as_bool) {
                    self.controller.set_looping(v);
                }
            }
            "getCurrentTime" => self.reply(&frame, json!(self.controller.position())),
            "setCurrentTime" => {
                if let Some(t) = frame.value.as_ref().and_then(Value::as_f64) {
                    self.controller.control_seek(t, false);
                }
            }
            "addEventListener" => self.add_listener(&frame),
            "removeEventListener" => self.remove_listener(&frame),
            other => warn!(method = %other, "unsupported command"),
        }
    }

    /// Answers a `get*` command on its callback listener token.
    fn reply(&self, frame: &CommandFrame, value: Value) {
        match frame.listener.as_deref() {
            Some(listener) => self.send(OutboundFrame::callback(listener, value)),
            None => warn!(method = %frame.method, "get command without a listener token"),
        }
    }

    fn add_listener(&self, frame: &CommandFrame) {
        let (Some(event), Some(listener)) = (
            frame.value.as_ref().and_then(Value::as_str),
            frame.listener.as_deref(),
        ) else {
            warn!("addEventListener without event name or listener token");
            return;
        };
        self.listeners
            .lock()
            .expect("Listener map mutex poisoned")
            .entry(event.to_string())
            .or_default()
            .push(listener.to_string());
        trace!(event, listener, "listener registered");
    }

    fn remove_listener(&self, frame: &CommandFrame) {
        let (Some(event), Some(listener)) = (
            frame.value.as_ref().and_then(Value::as_str),
            frame.listener.as_deref(),
        ) else {
            return;
        };
        let mut listeners = self.listeners.lock().expect("Listener map mutex poisoned");
        if let Some(tokens) = listeners.get_mut(event) {
            tokens.retain(|t| t != listener);
            if tokens.is_empty() {
                listeners.remove(event);
            }
        }
    }

    /// Emits an event: one frame per registered listener token, or a single
    /// bare frame when nobody registered (so passive observers still see it).
    fn emit_event(&self, name: &str, value: Option<Value>) {
        let tokens = self
            .listeners
            .lock()
            .expect("Listener map mutex poisoned")
            .get(name)
            .cloned()
            .unwrap_or_default();
        if tokens.is_empty() {
            self.send(OutboundFrame::event(name, value));
            return;
        }
        for token in tokens {
            let mut frame = OutboundFrame::event(name, value.clone());
            frame.listener = Some(token);
            self.send(frame);
        }
    }

    fn send(&self, frame: OutboundFrame) {
        match serde_json::to_string(&frame) {
            Ok(json) => {
                if self.outbound.try_send(json).is_err() {
                    warn!("outbound channel full or closed, frame dropped");
                }
            }
            Err(err) => warn!(error = %err, "failed to encode outbound frame"),
        }
    }

    /// Forwards the two native media notifications the protocol carries.
    fn spawn_forwarder(this: &Arc<Self>) {
        let mut events = this.controller.subscribe();
        let weak = Arc::downgrade(this);
        tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                let Some(receiver) = weak.upgrade() else {
                    break;
                };
                match event {
                    PlayerEvent::Ended => receiver.emit_event("ended", None),
                    PlayerEvent::TimeUpdate { seconds, duration } => {
                        let payload = TimeUpdatePayload { seconds, duration };
                        receiver.emit_event("timeupdate", Some(json!(payload)));
                    }
                    _ => {}
                }
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use embaudio::{AudioBackend, SimBackend};
    use std::time::Duration;

    fn command(method: &str) -> String {
        serde_json::to_string(&CommandFrame::new(method)).unwrap()
    }

    fn get(method: &str, listener: &str) -> String {
        serde_json::to_string(&CommandFrame::new(method).with_listener(listener)).unwrap()
    }

    fn set(method: &str, value: Value) -> String {
        serde_json::to_string(&CommandFrame::new(method).with_value(value)).unwrap()
    }

    async fn recv_frame(rx: &mut mpsc::Receiver<String>) -> OutboundFrame {
        let raw = tokio::time::timeout(Duration::from_secs(1), rx.recv())
            .await
            .expect("timed out waiting for a frame")
            .expect("channel closed");
        serde_json::from_str(&raw).unwrap()
    }

    struct Fixture {
        receiver: Arc<Receiver>,
        rx: mpsc::Receiver<String>,
        controller: Arc<PlayerController>,
        backend: Arc<SimBackend>,
    }

    fn receiver_with_sim() -> Fixture {
        let backend = SimBackend::new(30.0);
        let controller = PlayerController::new(
            backend.clone() as Arc<dyn AudioBackend>,
            "http://localhost:8080",
            Duration::from_millis(10),
        );
        let (tx, rx) = mpsc::channel(64);
        let receiver = Receiver::new(Some(controller.clone()), tx).unwrap();
        Fixture {
            receiver,
            rx,
            controller,
            backend,
        }
    }

    #[tokio::test]
    async fn construction_without_a_target_fails() {
        let (tx, _rx) = mpsc::channel(8);
        assert!(matches!(
            Receiver::new(None, tx),
            Err(ReceiverError::NoPlaybackTarget)
        ));
    }

    #[tokio::test]
    async fn ready_advertises_the_surface() {
        let mut f = receiver_with_sim();
        f.controller.change_source(Some("/a.mp3"), None);
        assert!(!f.receiver.is_ready());
        f.receiver.ready();
        assert!(f.receiver.is_ready());

        let frame = recv_frame(&mut f.rx).await;
        assert_eq!(frame.event.as_deref(), Some("ready"));
        let payload: ReadyPayload = serde_json::from_value(frame.value.unwrap()).unwrap();
        assert_eq!(payload.src.as_deref(), Some("http://localhost:8080/a.mp3"));
        assert!(payload.methods.contains(&"setCurrentTime".to_string()));
        assert!(payload.events.contains(&"timeupdate".to_string()));
        f.controller.shutdown();
    }

    #[tokio::test]
    async fn volume_round_trips_on_the_percent_scale() {
        let mut f = receiver_with_sim();
        f.receiver
            .handle_message(&set("setVolume", json!(50)))
            .unwrap();
        f.receiver.handle_message(&get("getVolume", "l-1")).unwrap();

        let frame = recv_frame(&mut f.rx).await;
        assert_eq!(frame.listener.as_deref(), Some("l-1"));
        assert_eq!(frame.value, Some(json!(50.0)));
        f.controller.shutdown();
    }

    #[tokio::test]
    async fn mute_and_loop_flags_round_trip() {
        let mut f = receiver_with_sim();

        f.receiver.handle_message(&command("mute")).unwrap();
        f.receiver.handle_message(&get("getMuted", "l-1")).unwrap();
        assert_eq!(recv_frame(&mut f.rx).await.value, Some(json!(true)));

        f.receiver.handle_message(&command("unmute")).unwrap();
        f.receiver.handle_message(&get("getMuted", "l-2")).unwrap();
        assert_eq!(recv_frame(&mut f.rx).await.value, Some(json!(false)));

        f.receiver
            .handle_message(&set("setLoop", json!(true)))
            .unwrap();
        f.receiver.handle_message(&get("getLoop", "l-3")).unwrap();
        assert_eq!(recv_frame(&mut f.rx).await.value, Some(json!(true)));
        f.controller.shutdown();
    }

    #[tokio::test]
    async fn play_emits_a_notification_and_flips_paused() {
        let mut f = receiver_with_sim();
        f.controller.change_source(Some("/a.mp3"), None);

        f.receiver.handle_message(&get("getPaused", "l-1")).unwrap();
        assert_eq!(recv_frame(&mut f.rx).await.value, Some(json!(true)));

        f.receiver.handle_message(&command("play")).unwrap();
        let frame = recv_frame(&mut f.rx).await;
        assert_eq!(frame.event.as_deref(), Some("play"));

        f.receiver.handle_message(&get("getPaused", "l-2")).unwrap();
        assert_eq!(recv_frame(&mut f.rx).await.value, Some(json!(false)));
        f.controller.shutdown();
    }

    #[tokio::test]
    async fn set_current_time_round_trips() {
        let mut f = receiver_with_sim();
        f.controller.change_source(Some("/a.mp3"), None);

        f.receiver
            .handle_message(&set("setCurrentTime", json!(12.5)))
            .unwrap();
        f.receiver
            .handle_message(&get("getCurrentTime", "l-1"))
            .unwrap();
        assert_eq!(recv_frame(&mut f.rx).await.value, Some(json!(12.5)));
        f.controller.shutdown();
    }

    #[tokio::test]
    async fn foreign_frames_are_ignored() {
        let mut f = receiver_with_sim();
        f.receiver
            .handle_message(r#"{"context":"other","version":"1.0","method":"play"}"#)
            .unwrap();
        assert!(f.rx.try_recv().is_err());
        f.controller.shutdown();
    }

    #[tokio::test]
    async fn ended_is_forwarded_to_registered_listeners() {
        let mut f = receiver_with_sim();
        let frame = CommandFrame::new("addEventListener")
            .with_value(json!("ended"))
            .with_listener("l-ended");
        f.receiver
            .handle_message(&serde_json::to_string(&frame).unwrap())
            .unwrap();

        f.controller.change_source(Some("/a.mp3"), None);
        f.controller.control_play(None, None);
        f.backend.advance(31.0);

        loop {
            let frame = recv_frame(&mut f.rx).await;
            if frame.event.as_deref() == Some("ended") {
                assert_eq!(frame.listener.as_deref(), Some("l-ended"));
                break;
            }
        }
        f.controller.shutdown();
    }
}
