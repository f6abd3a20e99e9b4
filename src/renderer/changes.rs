//! Scene change tracking
//!
//! Scene mutation may happen on any thread. The [`SceneChangeTracker`] is the
//! renderer's [`SceneListener`]: it only pushes each change into a channel.
//! The render thread drains the channel at the start of the next frame and
//! turns the changes into per-pass dirty flags, so a change that arrives
//! while a frame is running is picked up by the following one.

use std::sync::Arc;

use flume::{Receiver, Sender};
use log::trace;

use crate::scene::{SceneChange, SceneListener};

/// Sending half, registered on the scene.
#[derive(Debug, Clone)]
pub struct SceneChangeTracker {
    sender: Sender<SceneChange>,
}

impl SceneListener for SceneChangeTracker {
    fn notify(&self, change: SceneChange) {
        // The receiver lives as long as the renderer; a closed channel only
        // means the renderer is gone and nobody cares anymore.
        let _ = self.sender.send(change);
    }
}

/// Receiving half, owned by the renderer.
#[derive(Debug)]
pub struct ChangeQueue {
    tracker: Arc<SceneChangeTracker>,
    receiver: Receiver<SceneChange>,
}

impl Default for ChangeQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl ChangeQueue {
    #[must_use]
    pub fn new() -> Self {
        let (sender, receiver) = flume::unbounded();
        Self {
            tracker: Arc::new(SceneChangeTracker { sender }),
            receiver,
        }
    }

    /// Listener to register on a scene.
    pub fn listener(&self) -> Arc<dyn SceneListener> {
        self.tracker.clone()
    }

    #[inline]
    pub fn pending(&self) -> usize {
        self.receiver.len()
    }

    /// Takes every change recorded so far.
    pub fn drain(&self) -> Vec<SceneChange> {
        let changes: Vec<_> = self.receiver.try_iter().collect();
        if !changes.is_empty() {
            trace!("Drained {} scene changes", changes.len());
        }
        changes
    }
}
