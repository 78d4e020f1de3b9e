//! Controller event bus.
//!
//! Subscribers get every state republish plus the media notifications the
//! remote-control surface forwards. Same channel discipline as the engine
//! bus: bounded per-subscriber channels, closed subscribers dropped on
//! publish, slow subscribers lose events rather than block the publisher.

use std::sync::{Arc, Mutex};

use embaudio::MediaErrorInfo;
use tokio::sync::mpsc;
use tracing::trace;

use crate::state::PlayerState;

const SUBSCRIBER_CAPACITY: usize = 64;

#[derive(Debug, Clone)]
pub enum PlayerEvent {
    /// A fresh derived-state snapshot.
    State(PlayerState),
    /// Playback started.
    Play,
    /// Playback paused.
    Pause,
    /// Playback reached the end of the source.
    Ended,
    /// Periodic position report while playing.
    TimeUpdate { seconds: f64, duration: f64 },
    /// A media error was recorded for the current source.
    Error(MediaErrorInfo),
}

#[derive(Clone, Default)]
pub struct PlayerEventBus {
    subscribers: Arc<Mutex<Vec<mpsc::Sender<PlayerEvent>>>>,
}

impl PlayerEventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self) -> mpsc::Receiver<PlayerEvent> {
        let (tx, rx) = mpsc::channel(SUBSCRIBER_CAPACITY);
        self.subscribers
            .lock()
            .expect("Subscriber list mutex poisoned")
            .push(tx);
        rx
    }

    pub fn publish(&self, event: PlayerEvent) {
        let mut subscribers = self
            .subscribers
            .lock()
            .expect("Subscriber list mutex poisoned");
        subscribers.retain(|tx| !tx.is_closed());
        for tx in subscribers.iter() {
            if tx.try_send(event.clone()).is_err() {
                trace!("player event dropped for slow subscriber");
            }
        }
    }

    pub fn subscriber_count(&self) -> usize {
        let mut subscribers = self
            .subscribers
            .lock()
            .expect("Subscriber list mutex poisoned");
        subscribers.retain(|tx| !tx.is_closed());
        subscribers.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn dropped_subscribers_are_pruned() {
        let bus = PlayerEventBus::new();
        let rx1 = bus.subscribe();
        let rx2 = bus.subscribe();
        assert_eq!(bus.subscriber_count(), 2);

        drop(rx1);
        bus.publish(PlayerEvent::Play);
        assert_eq!(bus.subscriber_count(), 1);
        drop(rx2);
    }

    #[tokio::test]
    async fn events_reach_all_subscribers() {
        let bus = PlayerEventBus::new();
        let mut rx1 = bus.subscribe();
        let mut rx2 = bus.subscribe();

        bus.publish(PlayerEvent::TimeUpdate {
            seconds: 1.5,
            duration: 30.0,
        });

        for rx in [&mut rx1, &mut rx2] {
            match rx.try_recv() {
                Ok(PlayerEvent::TimeUpdate { seconds, duration }) => {
                    assert_eq!(seconds, 1.5);
                    assert_eq!(duration, 30.0);
                }
                other => panic!("unexpected event: {other:?}"),
            }
        }
    }
}
