//! Lifecycle events raised by the audio backends.
//!
//! The bus keeps a list of channel senders and drops subscribers whose
//! receiving end has gone away. Publishing uses `try_send` so a slow
//! subscriber can never stall the engine.

use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;

use crate::error::MediaErrorInfo;

/// Capacity of each subscriber channel. Events are small and consumers keep
/// up with the 250 ms timeupdate cadence, so a short queue is enough.
const SUBSCRIBER_CAPACITY: usize = 64;

/// Native-media-element lifecycle events, remapped to the engine.
#[derive(Clone, Debug)]
pub enum MediaEvent {
    /// Playback started or resumed.
    Play,
    /// Playback paused.
    Pause,
    /// Playback reached the end of the source (loop disabled).
    Ended,
    /// First data for the current source is decoded and playable.
    LoadedData,
    /// Periodic position report while playing.
    TimeUpdate { seconds: f64, duration: f64 },
    /// Terminal per-source failure.
    Error(MediaErrorInfo),
}

/// Fan-out bus for [`MediaEvent`]s.
#[derive(Clone, Default)]
pub struct MediaEventBus {
    subscribers: Arc<Mutex<Vec<mpsc::Sender<MediaEvent>>>>,
}

impl MediaEventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self) -> mpsc::Receiver<MediaEvent> {
        let (tx, rx) = mpsc::channel(SUBSCRIBER_CAPACITY);
        self.subscribers
            .lock()
            .expect("Event bus mutex poisoned")
            .push(tx);
        rx
    }

    pub fn publish(&self, event: MediaEvent) {
        let mut subscribers = self.subscribers.lock().expect("Event bus mutex poisoned");
        subscribers.retain(|tx| !tx.is_closed());
        for tx in subscribers.iter() {
            // A full queue means the subscriber is hopelessly behind; drop
            // the event for it rather than blocking the engine.
            let _ = tx.try_send(event.clone());
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers
            .lock()
            .expect("Event bus mutex poisoned")
            .len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn publish_reaches_every_subscriber() {
        let bus = MediaEventBus::new();
        let mut rx1 = bus.subscribe();
        let mut rx2 = bus.subscribe();

        bus.publish(MediaEvent::Play);

        assert!(matches!(rx1.try_recv(), Ok(MediaEvent::Play)));
        assert!(matches!(rx2.try_recv(), Ok(MediaEvent::Play)));
    }

    #[test]
    fn dropped_subscribers_are_pruned() {
        let bus = MediaEventBus::new();
        let rx = bus.subscribe();
        drop(rx);
        bus.publish(MediaEvent::Pause);
        assert_eq!(bus.subscriber_count(), 0);
    }
}
