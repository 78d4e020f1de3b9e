//! HTTP and WebSocket surface of the player.
//!
//! `GET /api/player/state` returns the current [`PlayerState`] snapshot,
//! `POST /api/player/source` changes the playback source, and
//! `GET /api/player/events` streams controller events over SSE.
//! `GET /embed/ws` upgrades to the player.js receiver (one per connection);
//! `GET /harness/run` runs the protocol conformance suite.

use std::convert::Infallible;
use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use embplayer::{PlayerController, PlayerEvent};
use embremote::Receiver;
use futures_util::stream::Stream;
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::harness;

const WS_OUTBOUND_CAPACITY: usize = 256;

#[derive(Clone)]
pub struct AppState {
    pub controller: Arc<PlayerController>,
    /// WebSocket URL of this server's own receiver endpoint, used by the
    /// conformance harness.
    pub ws_url: String,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/player/state", get(player_state))
        .route("/api/player/source", post(change_source))
        .route("/api/player/events", get(player_events))
        .route("/embed/ws", get(embed_ws))
        .route("/harness/run", get(run_harness))
        .with_state(state)
}

async fn player_state(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.controller.state())
}

#[derive(Debug, Deserialize)]
pub struct SourceRequest {
    pub source: Option<String>,
    #[serde(default)]
    pub meta: Option<Value>,
}

async fn change_source(
    State(state): State<AppState>,
    Json(request): Json<SourceRequest>,
) -> impl IntoResponse {
    state
        .controller
        .change_source(request.source.as_deref(), request.meta);
    Json(state.controller.state())
}

/// Server-sent events: one named event per controller publication.
async fn player_events(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let mut events = state.controller.subscribe();
    let stream = async_stream::stream! {
        while let Some(event) = events.recv().await {
            yield Ok(to_sse_event(event));
        }
    };
    Sse::new(stream).keep_alive(KeepAlive::default())
}

fn to_sse_event(event: PlayerEvent) -> Event {
    let (name, data) = match event {
        PlayerEvent::State(state) => ("state", json!(state)),
        PlayerEvent::Play => ("play", Value::Null),
        PlayerEvent::Pause => ("pause", Value::Null),
        PlayerEvent::Ended => ("ended", Value::Null),
        PlayerEvent::TimeUpdate { seconds, duration } => {
            ("timeupdate", json!({"seconds": seconds, "duration": duration}))
        }
        PlayerEvent::Error(info) => ("error", json!(info)),
    };
    Event::default().event(name).data(data.to_string())
}

/// Upgrades to a WebSocket speaking the player.js protocol.
async fn embed_ws(State(state): State<AppState>, upgrade: WebSocketUpgrade) -> impl IntoResponse {
    upgrade.on_upgrade(move |socket| serve_receiver(socket, state.controller.clone()))
}

async fn serve_receiver(socket: WebSocket, controller: Arc<PlayerController>) {
    let (outbound_tx, mut outbound_rx) = mpsc::channel::<String>(WS_OUTBOUND_CAPACITY);
    let receiver = match Receiver::new(Some(controller), outbound_tx) {
        Ok(receiver) => receiver,
        Err(err) => {
            warn!(error = %err, "refusing remote-control connection");
            return;
        }
    };
    receiver.ready();
    debug!("remote-control connection open");

    let (mut sink, mut stream) = socket.split();
    loop {
        tokio::select! {
            frame = outbound_rx.recv() => match frame {
                Some(text) => {
                    if sink.send(Message::Text(text.into())).await.is_err() {
                        break;
                    }
                }
                None => break,
            },
            message = stream.next() => match message {
                Some(Ok(Message::Text(text))) => {
                    if let Err(err) = receiver.handle_message(text.as_str()) {
                        warn!(error = %err, "bad frame from host");
                    }
                }
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {}
                Some(Err(err)) => {
                    warn!(error = %err, "websocket error");
                    break;
                }
            },
        }
    }
    debug!("remote-control connection closed");
}

/// Runs the conformance suite against this server's own receiver endpoint.
async fn run_harness(State(state): State<AppState>) -> impl IntoResponse {
    match harness::run_suite(&state.ws_url, &state.controller).await {
        Ok(report) => Json(json!(report)).into_response(),
        Err(err) => {
            warn!(error = %err, "conformance suite failed to run");
            (StatusCode::BAD_GATEWAY, err.to_string()).into_response()
        }
    }
}
