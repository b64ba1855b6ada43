//! Subscriber handle

use tokio::sync::mpsc;

use crate::hub::command::{Batch, Command, SubscriberId};

/// A registered subscriber's end of its batch queue
///
/// Dropping the subscription unregisters it from the hub. This happens exactly
/// once, whichever way the owner stops using it.
pub struct Subscription<T> {
    id: SubscriberId,
    batches: mpsc::Receiver<Batch<T>>,
    commands: mpsc::UnboundedSender<Command<T>>,
}

impl<T> Subscription<T> {
    pub(crate) fn new(
        id: SubscriberId,
        batches: mpsc::Receiver<Batch<T>>,
        commands: mpsc::UnboundedSender<Command<T>>,
    ) -> Self {
        Self {
            id,
            batches,
            commands,
        }
    }

    /// Subscriber ID assigned by the hub
    pub fn id(&self) -> SubscriberId {
        self.id
    }

    /// Wait for the next batch
    ///
    /// Returns `None` once the hub has dropped this subscriber's queue and
    /// every batch already in it has been received.
    pub async fn recv(&mut self) -> Option<Batch<T>> {
        self.batches.recv().await
    }

    /// Take a batch if one is ready, without waiting
    pub fn try_recv(&mut self) -> Option<Batch<T>> {
        self.batches.try_recv().ok()
    }

    /// Unregister from the hub
    pub fn close(self) {}
}

impl<T> Drop for Subscription<T> {
    fn drop(&mut self) {
        // The actor may already be gone after shutdown
        let _ = self.commands.send(Command::Unsubscribe { id: self.id });
    }
}

impl<T> std::fmt::Debug for Subscription<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription").field("id", &self.id).finish()
    }
}
