//! Host Environment Module
//!
//! Visibility and focus signals that gate automatic refetches.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::broadcast;

const FOCUS_CHANNEL_CAPACITY: usize = 16;

// == Host Environment ==
/// Reports whether the host is in the foreground and broadcasts focus events.
///
/// Clones share state: the embedding application keeps one clone to drive the
/// signals and hands others to query runners.
#[derive(Debug, Clone)]
pub struct HostEnvironment {
    visible: Arc<AtomicBool>,
    focus: broadcast::Sender<()>,
}

impl HostEnvironment {
    /// Creates a host that starts out visible.
    pub fn new() -> Self {
        let (focus, _) = broadcast::channel(FOCUS_CHANNEL_CAPACITY);
        Self {
            visible: Arc::new(AtomicBool::new(true)),
            focus,
        }
    }

    pub fn is_visible(&self) -> bool {
        self.visible.load(Ordering::SeqCst)
    }

    pub fn set_visible(&self, visible: bool) {
        self.visible.store(visible, Ordering::SeqCst);
    }

    /// Announces that the host regained focus.
    ///
    /// Returns the number of listeners that will see the event.
    pub fn notify_focus(&self) -> usize {
        self.focus.send(()).unwrap_or(0)
    }

    pub fn subscribe_focus(&self) -> broadcast::Receiver<()> {
        self.focus.subscribe()
    }
}

impl Default for HostEnvironment {
    fn default() -> Self {
        Self::new()
    }
}
