//! "Blur loaded" status flag published to outside listeners.

use tokio::sync::watch;
use tracing::info;

/// Emit-once flag: starts `false` and flips to `true` exactly once.
#[derive(Debug)]
pub struct BlurStatus {
    tx: watch::Sender<bool>,
}

impl Default for BlurStatus {
    fn default() -> Self { Self::new() }
}

impl BlurStatus {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(false);
        BlurStatus { tx }
    }

    pub fn subscribe(&self) -> watch::Receiver<bool> { self.tx.subscribe() }

    pub fn is_loaded(&self) -> bool { *self.tx.borrow() }

    /// Marks blur as loaded. Returns whether this call changed the flag.
    pub fn mark_loaded(&self) -> bool {
        let changed = self.tx.send_if_modified(|loaded| !std::mem::replace(loaded, true));
        if changed {
            info!("blur effects loaded");
        }
        changed
    }
}
