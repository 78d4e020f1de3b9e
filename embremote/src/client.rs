//! Controller side of the protocol: drives a remote receiver over a
//! message port.
//!
//! This is what an embedding host uses (and what the conformance harness
//! exercises): `get*` commands are answered on per-call listener tokens,
//! events are subscribed with `addEventListener` and delivered on a channel.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::Value;
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{trace, warn};

use crate::error::ReceiverError;
use crate::port::MessagePort;
use crate::protocol::{CommandFrame, OutboundFrame};

const RESPONSE_TIMEOUT: Duration = Duration::from_secs(2);
const EVENT_CAPACITY: usize = 64;

struct ClientInner {
    /// In-flight get commands awaiting their callback frame.
    pending: Mutex<HashMap<String, oneshot::Sender<Value>>>,
    /// Event subscriptions: event name -> delivery channels.
    events: Mutex<HashMap<String, Vec<mpsc::Sender<Value>>>>,
    ready_tx: watch::Sender<bool>,
}

pub struct RemotePlayer {
    outbound: mpsc::Sender<String>,
    inner: Arc<ClientInner>,
    ready_rx: watch::Receiver<bool>,
    counter: AtomicU64,
}

impl RemotePlayer {
    /// Attaches to the controller end of a message port and starts reading
    /// receiver frames. Must be called from within a tokio runtime.
    pub fn new(port: MessagePort) -> Self {
        let (ready_tx, ready_rx) = watch::channel(false);
        let inner = Arc::new(ClientInner {
            pending: Mutex::new(HashMap::new()),
            events: Mutex::new(HashMap::new()),
            ready_tx,
        });

        let reader = inner.clone();
        let mut rx = port.rx;
        tokio::spawn(async move {
            while let Some(raw) = rx.recv().await {
                reader.handle_frame(&raw);
            }
        });

        Self {
            outbound: port.tx,
            inner,
            ready_rx,
            counter: AtomicU64::new(0),
        }
    }

    /// Waits for the receiver's `ready` event.
    pub async fn wait_ready(&self) -> Result<(), ReceiverError> {
        let mut ready = self.ready_rx.clone();
        let wait = async {
            while !*ready.borrow() {
                if ready.changed().await.is_err() {
                    return Err(ReceiverError::ChannelClosed);
                }
            }
            Ok(())
        };
        tokio::time::timeout(RESPONSE_TIMEOUT, wait)
            .await
            .map_err(|_| ReceiverError::ResponseTimeout("ready".to_string()))?
    }

    /// Sends a command with no value and no response.
    pub async fn call(&self, method: &str) -> Result<(), ReceiverError> {
        self.send(CommandFrame::new(method)).await
    }

    /// Sends a command carrying a value.
    pub async fn set(&self, method: &str, value: Value) -> Result<(), ReceiverError> {
        self.send(CommandFrame::new(method).with_value(value)).await
    }

    /// Sends a `get*` command and awaits its callback value.
    pub async fn get(&self, method: &str) -> Result<Value, ReceiverError> {
        let token = self.next_token();
        let (tx, rx) = oneshot::channel();
        self.inner
            .pending
            .lock()
            .expect("Pending map mutex poisoned")
            .insert(token.clone(), tx);

        self.send(CommandFrame::new(method).with_listener(&token))
            .await?;

        match tokio::time::timeout(RESPONSE_TIMEOUT, rx).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(_)) => Err(ReceiverError::ChannelClosed),
            Err(_) => {
                self.inner
                    .pending
                    .lock()
                    .expect("Pending map mutex poisoned")
                    .remove(&token);
                Err(ReceiverError::ResponseTimeout(method.to_string()))
            }
        }
    }

    /// Subscribes to a receiver event; delivered values are the event
    /// payloads (`Null` for payloadless events like `ended`).
    pub async fn listen(&self, event: &str) -> Result<mpsc::Receiver<Value>, ReceiverError> {
        let (tx, rx) = mpsc::channel(EVENT_CAPACITY);
        self.inner
            .events
            .lock()
            .expect("Event map mutex poisoned")
            .entry(event.to_string())
            .or_default()
            .push(tx);

        let token = self.next_token();
        self.send(
            CommandFrame::new("addEventListener")
                .with_value(event.into())
                .with_listener(&token),
        )
        .await?;
        Ok(rx)
    }

    fn next_token(&self) -> String {
        format!("listener-{}", self.counter.fetch_add(1, Ordering::SeqCst))
    }

    async fn send(&self, frame: CommandFrame) -> Result<(), ReceiverError> {
        let json = serde_json::to_string(&frame)?;
        self.outbound
            .send(json)
            .await
            .map_err(|_| ReceiverError::ChannelClosed)
    }
}

impl ClientInner {
    fn handle_frame(&self, raw: &str) {
        let frame: OutboundFrame = match serde_json::from_str(raw) {
            Ok(frame) => frame,
            Err(err) => {
                warn!(error = %err, "dropping malformed receiver frame");
                return;
            }
        };
        if !frame.is_player_js() {
            return;
        }

        match (&frame.event, &frame.listener) {
            // Callback answer to a get command.
            (None, Some(listener)) => {
                let pending = self
                    .pending
                    .lock()
                    .expect("Pending map mutex poisoned")
                    .remove(listener);
                match pending {
                    Some(tx) => {
                        let _ = tx.send(frame.value.unwrap_or(Value::Null));
                    }
                    None => trace!(listener, "callback for an unknown listener"),
                }
            }
            (Some(event), _) => {
                if event == "ready" {
                    let _ = self.ready_tx.send(true);
                }
                let subscribers = self
                    .events
                    .lock()
                    .expect("Event map mutex poisoned")
                    .get(event.as_str())
                    .cloned()
                    .unwrap_or_default();
                let value = frame.value.unwrap_or(Value::Null);
                for tx in subscribers {
                    let _ = tx.try_send(value.clone());
                }
            }
            (None, None) => trace!("frame with neither event nor listener"),
        }
    }
}
