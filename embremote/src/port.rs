//! Transport-agnostic string-message ports.
//!
//! The protocol only needs an ordered, bidirectional text channel; a pair of
//! mpsc channels stands in for whatever structured messaging transport
//! actually carries the frames (WebSocket, postMessage, a test harness).

use tokio::sync::mpsc;

pub const PORT_CAPACITY: usize = 256;

/// One end of a bidirectional message channel.
pub struct MessagePort {
    pub tx: mpsc::Sender<String>,
    pub rx: mpsc::Receiver<String>,
}

/// Creates two connected ports: what one sends, the other receives.
pub fn port_pair() -> (MessagePort, MessagePort) {
    let (a_tx, b_rx) = mpsc::channel(PORT_CAPACITY);
    let (b_tx, a_rx) = mpsc::channel(PORT_CAPACITY);
    (
        MessagePort { tx: a_tx, rx: a_rx },
        MessagePort { tx: b_tx, rx: b_rx },
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn ports_are_cross_wired() {
        let (mut a, mut b) = port_pair();
        a.tx.send("ping".to_string()).await.unwrap();
        assert_eq!(b.rx.recv().await.unwrap(), "ping");
        b.tx.send("pong".to_string()).await.unwrap();
        assert_eq!(a.rx.recv().await.unwrap(), "pong");
    }
}
