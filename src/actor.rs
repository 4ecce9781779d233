//! Event channels between the host thread and its helpers.
//!
//! Every message carries the [`Span`] it was sent from, so handling shows up
//! under the sender's trace.

use tokio::sync::mpsc::error::SendError;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender, unbounded_channel};
use tracing::Span;

pub mod config_watcher;
pub mod effects;
pub mod replay;

pub struct Sender<E>(UnboundedSender<(Span, E)>);
pub type Receiver<E> = UnboundedReceiver<(Span, E)>;

pub fn channel<E>() -> (Sender<E>, Receiver<E>) {
    let (tx, rx) = unbounded_channel();
    (Sender(tx), rx)
}

impl<E> Sender<E> {
    pub fn send(&self, event: E) {
        // a closed channel only means the controller already stopped
        _ = self.try_send(event)
    }

    pub fn try_send(&self, event: E) -> Result<(), SendError<(Span, E)>> {
        self.0.send((Span::current(), event))
    }

    pub fn is_closed(&self) -> bool { self.0.is_closed() }
}

impl<E> Clone for Sender<E> {
    fn clone(&self) -> Self { Self(self.0.clone()) }
}

impl<E> std::fmt::Debug for Sender<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("actor::Sender(...)")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn send_after_close_is_ignored() {
        let (tx, rx) = channel::<u32>();
        drop(rx);
        assert!(tx.is_closed());
        tx.send(1);
        assert!(tx.try_send(2).is_err());
    }
}
