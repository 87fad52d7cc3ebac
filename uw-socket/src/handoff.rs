//! Zero-capacity rendezvous channel.
//!
//! A send completes only after the receiver has taken the item, so a slow
//! consumer suspends the producer instead of growing a queue. Each item
//! travels with an acknowledgement slot; if the sending future is dropped
//! before the receiver gets to the item, the slot is closed and the receiver
//! discards it. A cancelled send is never delivered later.

use thiserror::Error;
use tokio::sync::{mpsc, oneshot};

/// The other side of the channel is gone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("handoff peer disconnected")]
pub struct Disconnected;

/// Create a connected sender/receiver pair.
pub fn channel<T>() -> (HandoffSender<T>, HandoffReceiver<T>) {
    // One slot for the in-flight item; the ack keeps it a rendezvous.
    let (tx, rx) = mpsc::channel(1);
    (HandoffSender { tx }, HandoffReceiver { rx })
}

/// Producer half. Cloneable; concurrent sends are taken in turn.
pub struct HandoffSender<T> {
    tx: mpsc::Sender<(T, oneshot::Sender<()>)>,
}

impl<T> Clone for HandoffSender<T> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
        }
    }
}

impl<T> HandoffSender<T> {
    /// Hand `item` to the receiver and wait until it has been taken.
    ///
    /// Cancel safe: dropping the returned future withdraws the item.
    pub async fn send(&self, item: T) -> Result<(), Disconnected> {
        let (ack_tx, ack_rx) = oneshot::channel();
        self.tx
            .send((item, ack_tx))
            .await
            .map_err(|_| Disconnected)?;
        ack_rx.await.map_err(|_| Disconnected)
    }

    /// Whether the receiver has been dropped.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Consumer half.
pub struct HandoffReceiver<T> {
    rx: mpsc::Receiver<(T, oneshot::Sender<()>)>,
}

impl<T> HandoffReceiver<T> {
    /// Take the next item whose sender is still waiting.
    ///
    /// Returns `None` once every sender is gone.
    pub async fn recv(&mut self) -> Option<T> {
        loop {
            let (item, ack) = self.rx.recv().await?;
            if ack.send(()).is_ok() {
                return Some(item);
            }
        }
    }
}
