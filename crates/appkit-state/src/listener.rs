use std::sync::Mutex;

use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

/// Ensures a page runs at most one storage sync listener, however many storage managers it
/// creates.
#[derive(Debug, Default)]
pub(crate) struct ListenerGuard {
    active: Mutex<Option<CancellationToken>>,
}

impl ListenerGuard {
    /// Claim the page's listener slot. Returns `None` if a listener is already running.
    ///
    /// A slot whose token was cancelled, for instance because the storage manager running the
    /// listener was dropped, is free again.
    pub(crate) fn register(&self) -> Option<CancellationToken> {
        let mut active = self.active.lock().expect("Mutex should not be poisoned");
        if active.as_ref().is_some_and(|token| !token.is_cancelled()) {
            return None;
        }

        let token = CancellationToken::new();
        *active = Some(token.clone());
        Some(token)
    }

    /// Stop the registered listener, if any, and free the slot.
    pub(crate) fn unregister(&self) {
        let token = self
            .active
            .lock()
            .expect("Mutex should not be poisoned")
            .take();
        if let Some(token) = token {
            token.cancel();
        }
    }

    pub(crate) fn is_registered(&self) -> bool {
        self.active
            .lock()
            .expect("Mutex should not be poisoned")
            .as_ref()
            .is_some_and(|token| !token.is_cancelled())
    }
}

impl Drop for ListenerGuard {
    fn drop(&mut self) {
        self.unregister();
    }
}

/// Fired once, after the first session storage snapshot received from another context has been
/// merged.
#[derive(Debug, Clone)]
pub struct InitEvent {
    receiver: watch::Receiver<bool>,
}

impl InitEvent {
    pub(crate) fn new(receiver: watch::Receiver<bool>) -> Self {
        Self { receiver }
    }

    /// Returns `true` if the event has already fired.
    pub fn has_fired(&self) -> bool {
        *self.receiver.borrow()
    }

    /// Wait for the event.
    ///
    /// Returns `false` if the storage manager was dropped before the event fired.
    pub async fn wait(mut self) -> bool {
        self.receiver.wait_for(|fired| *fired).await.is_ok()
    }
}
