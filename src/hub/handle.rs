//! Public hub handle
//!
//! [`Hub`] is a cheap, cloneable front for the actor task. Each method turns
//! into one [`Command`] and waits for the actor to accept it.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::io::AsyncWriteExt;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::{self, Instant};
use tokio_util::sync::CancellationToken;

use crate::error::{Error, Result};
use crate::session::{DeliverySession, EventSink, Subscription, SSE_HEADERS};
use crate::stats::HubStats;

use super::actor::HubActor;
use super::command::Command;
use super::config::HubConfig;
use super::state::HubState;

/// Broadcast hub handle
///
/// Cloning is cheap; all clones talk to the same actor.
pub struct Hub<T> {
    commands: mpsc::UnboundedSender<Command<T>>,
    state: Arc<watch::Sender<HubState>>,
    release: watch::Receiver<bool>,
    config: Arc<HubConfig<T>>,
}

impl<T> Hub<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Create a hub and spawn its actor
    ///
    /// Must be called from within a Tokio runtime.
    pub fn new(config: HubConfig<T>) -> Self {
        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        let (state, _) = watch::channel(HubState::Open);
        let state = Arc::new(state);
        let (release_tx, release_rx) = watch::channel(false);

        let actor = HubActor::new(
            config.flush_frequency,
            config.replay,
            commands_rx,
            Arc::clone(&state),
            release_tx,
        );
        tokio::spawn(actor.run());

        tracing::debug!(config = ?config, "Hub started");

        Self {
            commands: commands_tx,
            state,
            release: release_rx,
            config: Arc::new(config),
        }
    }

    /// Get the hub configuration
    pub fn config(&self) -> &HubConfig<T> {
        &self.config
    }

    /// Current lifecycle state
    pub fn state(&self) -> HubState {
        *self.state.borrow()
    }

    /// Check if shutdown has started
    pub fn is_closing(&self) -> bool {
        self.state().is_closing()
    }

    /// Queue events for the next flush
    ///
    /// Returns once the actor has accepted the events, not once they are
    /// delivered. Fails with [`Error::Closed`] after shutdown has begun, even
    /// for an empty sequence.
    pub async fn publish<I>(&self, events: I) -> Result<()>
    where
        I: IntoIterator<Item = T>,
    {
        if self.is_closing() {
            return Err(Error::Closed);
        }

        let events: Vec<T> = events.into_iter().collect();
        let (reply, rx) = oneshot::channel();
        self.request(Command::Publish { events, reply }, rx).await?
    }

    /// Queue a single event for the next flush
    pub async fn broadcast(&self, event: T) -> Result<()> {
        self.publish(std::iter::once(event)).await
    }

    /// Register a new subscriber
    ///
    /// The returned subscription first yields the replay history in chunks of
    /// at most `replay.initial` events, then every live batch. Dropping it
    /// unregisters the subscriber.
    pub async fn subscribe(&self) -> Result<Subscription<T>> {
        if self.is_closing() {
            return Err(Error::Closed);
        }

        let (queue, batches) = mpsc::channel(self.config.queue_capacity);
        let (reply, rx) = oneshot::channel();
        let id = self.request(Command::Subscribe { queue, reply }, rx).await??;

        Ok(Subscription::new(id, batches, self.commands.clone()))
    }

    /// Shut down using the configured close timeout
    pub async fn shutdown(&self) -> Result<()> {
        self.shutdown_timeout(self.config.close_timeout).await
    }

    /// Stop accepting events and subscribers, then wait for every subscriber
    /// to disconnect
    ///
    /// The hub is `Closing` as soon as this is called, even while the actor is
    /// still busy with a flush. Only one call wins that transition; every
    /// other call fails with [`Error::Closed`]. On timeout the hub stays in
    /// [`HubState::Closing`] with its remaining subscribers still connected.
    pub async fn shutdown_timeout(&self, timeout: Duration) -> Result<()> {
        let deadline = Instant::now() + timeout;

        let began = self.state.send_if_modified(|state| {
            if state.is_open() {
                *state = HubState::Closing;
                true
            } else {
                false
            }
        });
        if !began {
            return Err(Error::Closed);
        }

        // The actor only stops after publishing `Closed`
        self.commands
            .send(Command::Shutdown)
            .map_err(|_| Error::Closed)?;

        let mut state = self.state.subscribe();
        let closed = time::timeout_at(deadline, state.wait_for(|s| *s == HubState::Closed))
            .await
            .is_ok();

        if closed {
            tracing::info!("Hub shut down gracefully");
            Ok(())
        } else {
            tracing::warn!(
                timeout_ms = timeout.as_millis() as u64,
                "Timed out waiting for subscribers to disconnect"
            );
            Err(Error::ShutdownTimeout(timeout))
        }
    }

    /// Snapshot hub statistics
    pub async fn stats(&self) -> Result<HubStats> {
        let (reply, rx) = oneshot::channel();
        self.request(Command::Stats { reply }, rx).await
    }

    /// Stream events to one client until it cancels, the hub closes, or a
    /// write fails
    ///
    /// Sets the event-stream headers on the sink, registers a subscriber and
    /// writes one `data: ...\n\n` frame per batch.
    pub async fn serve<S>(&self, sink: &mut S, cancel: CancellationToken) -> Result<()>
    where
        S: EventSink,
    {
        if !sink.supports_streaming() {
            return Err(Error::UnsupportedSink);
        }
        if self.is_closing() {
            return Err(Error::Closed);
        }

        // The status is committed by the first frame written
        for (name, value) in SSE_HEADERS {
            sink.set_header(name, value);
        }

        let subscription = self.subscribe().await?;
        DeliverySession::new(
            subscription,
            sink,
            Arc::clone(&self.config.encoder),
            self.release.clone(),
            cancel,
        )
        .run()
        .await
    }

    /// Like [`serve`](Self::serve), but reports failures to the client as a
    /// 500 response carrying the error text
    ///
    /// A sink that already wrote frames keeps its committed status; the error
    /// text is appended to the stream.
    pub async fn handle<S>(&self, sink: &mut S, cancel: CancellationToken)
    where
        S: EventSink,
    {
        let Err(err) = self.serve(sink, cancel).await else {
            return;
        };
        tracing::warn!(error = %err, "Event stream failed");

        sink.set_status(500);
        sink.set_header("Content-Type", "text/plain; charset=utf-8");
        sink.set_header("X-Content-Type-Options", "nosniff");

        let body = format!("{}\n", err);
        // The sink may be the thing that failed
        if let Err(e) = sink.write_all(body.as_bytes()).await {
            tracing::debug!(error = %e, "Unable to write error response");
            return;
        }
        if let Err(e) = sink.flush().await {
            tracing::debug!(error = %e, "Unable to flush error response");
        }
    }

    async fn request<R>(&self, command: Command<T>, reply: oneshot::Receiver<R>) -> Result<R> {
        // A stopped actor means the hub is closed
        self.commands.send(command).map_err(|_| Error::Closed)?;
        reply.await.map_err(|_| Error::Closed)
    }
}

impl<T> Default for Hub<T>
where
    T: Serialize + Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new(HubConfig::new())
    }
}

impl<T> Clone for Hub<T> {
    fn clone(&self) -> Self {
        Self {
            commands: self.commands.clone(),
            state: Arc::clone(&self.state),
            release: self.release.clone(),
            config: Arc::clone(&self.config),
        }
    }
}

impl<T> std::fmt::Debug for Hub<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Hub")
            .field("state", &*self.state.borrow())
            .field("config", &self.config)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    fn config() -> HubConfig<String> {
        HubConfig::new().flush_frequency(Duration::from_millis(128))
    }

    fn strings(batch: &[String]) -> Vec<&str> {
        batch.iter().map(String::as_str).collect()
    }

    async fn wait_flush() {
        tokio::time::sleep(Duration::from_millis(256)).await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_subscriber_receives_one_batch_in_order() {
        let hub = Hub::new(config());
        let mut sub = hub.subscribe().await.unwrap();

        hub.publish(["e1".to_string(), "e2".to_string(), "e3".to_string()])
            .await
            .unwrap();

        let batch = sub.recv().await.unwrap();
        assert_eq!(strings(&batch), vec!["e1", "e2", "e3"]);

        wait_flush().await;
        assert!(sub.try_recv().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_batches_arrive_in_flush_order() {
        let hub = Hub::new(config());
        let mut sub = hub.subscribe().await.unwrap();

        hub.broadcast("Event 1".to_string()).await.unwrap();
        wait_flush().await;
        hub.publish(["Event 2".to_string(), "Event 3".to_string()])
            .await
            .unwrap();

        assert_eq!(strings(&sub.recv().await.unwrap()), vec!["Event 1"]);
        assert_eq!(
            strings(&sub.recv().await.unwrap()),
            vec!["Event 2", "Event 3"]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_every_subscriber_gets_the_same_batch() {
        let hub = Hub::new(config().queue_capacity(4));
        let mut subs = Vec::new();
        for _ in 0..8 {
            subs.push(hub.subscribe().await.unwrap());
        }

        hub.publish(["a".to_string(), "b".to_string()]).await.unwrap();

        for sub in &mut subs {
            let batch = sub.recv().await.unwrap();
            assert_eq!(strings(&batch), vec!["a", "b"]);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_publish_returns_before_flush() {
        let hub = Hub::new(config());

        hub.broadcast("pending".to_string()).await.unwrap();

        let stats = hub.stats().await.unwrap();
        assert_eq!(stats.pending_events, 1);
        assert_eq!(stats.replay_len, 0);
        assert_eq!(stats.total_published, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_flush_moves_pending_into_replay() {
        let hub = Hub::new(config());

        hub.publish((0..3).map(|i| i.to_string())).await.unwrap();
        wait_flush().await;

        let stats = hub.stats().await.unwrap();
        assert_eq!(stats.pending_events, 0);
        assert_eq!(stats.replay_len, 3);
        assert_eq!(stats.total_flushes, 1);
        assert_eq!(stats.subscriber_count, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_late_subscriber_gets_replay_in_chunks() {
        let hub = Hub::new(config().replay_initial(2));

        hub.publish((0..5).map(|i| i.to_string())).await.unwrap();
        wait_flush().await;

        let mut sub = hub.subscribe().await.unwrap();

        assert_eq!(strings(&sub.recv().await.unwrap()), vec!["0", "1"]);
        assert_eq!(strings(&sub.recv().await.unwrap()), vec!["2", "3"]);
        assert_eq!(strings(&sub.recv().await.unwrap()), vec!["4"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_replay_precedes_live_batches() {
        let hub = Hub::new(config());

        hub.broadcast("old".to_string()).await.unwrap();
        wait_flush().await;

        let mut sub = hub.subscribe().await.unwrap();
        hub.broadcast("new".to_string()).await.unwrap();

        assert_eq!(strings(&sub.recv().await.unwrap()), vec!["old"]);
        assert_eq!(strings(&sub.recv().await.unwrap()), vec!["new"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_replay_respects_maximum() {
        let hub = Hub::new(config().replay_maximum(2));

        hub.publish((0..5).map(|i| i.to_string())).await.unwrap();
        wait_flush().await;

        let mut sub = hub.subscribe().await.unwrap();
        assert_eq!(strings(&sub.recv().await.unwrap()), vec!["3", "4"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_expired_events_are_not_replayed() {
        let hub = Hub::new(config().replay_expiry(Duration::from_secs(1)));

        hub.broadcast("stale".to_string()).await.unwrap();
        tokio::time::sleep(Duration::from_secs(2)).await;

        let mut sub = hub.subscribe().await.unwrap();
        hub.broadcast("fresh".to_string()).await.unwrap();

        assert_eq!(strings(&sub.recv().await.unwrap()), vec!["fresh"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_disabled_replay() {
        let hub = Hub::new(config().disable_replay());

        hub.broadcast("gone".to_string()).await.unwrap();
        wait_flush().await;

        let mut sub = hub.subscribe().await.unwrap();
        wait_flush().await;
        assert!(sub.try_recv().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropped_subscription_unregisters() {
        let hub = Hub::new(config());

        let sub = hub.subscribe().await.unwrap();
        assert_eq!(hub.stats().await.unwrap().subscriber_count, 1);

        drop(sub);
        assert_eq!(hub.stats().await.unwrap().subscriber_count, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_without_subscribers() {
        let hub = Hub::new(config());
        hub.broadcast("x".to_string()).await.unwrap();
        wait_flush().await;

        hub.shutdown().await.unwrap();

        assert_eq!(hub.state(), HubState::Closed);
        assert!(hub.is_closing());
    }

    #[tokio::test(start_paused = true)]
    async fn test_operations_fail_after_shutdown() {
        let hub = Hub::new(config());
        hub.shutdown().await.unwrap();

        assert!(matches!(
            hub.broadcast("late".to_string()).await,
            Err(Error::Closed)
        ));
        assert!(matches!(hub.publish(Vec::new()).await, Err(Error::Closed)));
        assert!(matches!(hub.subscribe().await, Err(Error::Closed)));
        assert!(matches!(hub.shutdown().await, Err(Error::Closed)));
        assert!(matches!(hub.stats().await, Err(Error::Closed)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_publish_is_noop() {
        let hub = Hub::new(config());

        hub.publish(Vec::new()).await.unwrap();

        let stats = hub.stats().await.unwrap();
        assert_eq!(stats.pending_events, 0);
        assert_eq!(stats.total_published, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_waits_for_subscribers() {
        let hub = Hub::new(config());
        let sub = hub.subscribe().await.unwrap();

        let closer = hub.clone();
        let shutdown = tokio::spawn(async move { closer.shutdown().await });

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(hub.state(), HubState::Closing);
        assert!(!shutdown.is_finished());
        assert!(matches!(
            hub.broadcast("rejected".to_string()).await,
            Err(Error::Closed)
        ));

        drop(sub);

        shutdown.await.unwrap().unwrap();
        assert_eq!(hub.state(), HubState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_pending_events_flushed_on_shutdown() {
        let hub = Hub::new(config());
        let mut sub = hub.subscribe().await.unwrap();

        hub.broadcast("last".to_string()).await.unwrap();

        let closer = hub.clone();
        let shutdown = tokio::spawn(async move { closer.shutdown().await });

        assert_eq!(strings(&sub.recv().await.unwrap()), vec!["last"]);

        sub.close();
        shutdown.await.unwrap().unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_timeout_leaves_subscribers_connected() {
        let hub = Hub::new(config());
        let sub = hub.subscribe().await.unwrap();

        let result = hub.shutdown_timeout(Duration::from_secs(1)).await;
        assert!(matches!(result, Err(Error::ShutdownTimeout(_))));

        // Nothing was forced: still closing, subscriber still registered
        assert_eq!(hub.state(), HubState::Closing);
        let stats = hub.stats().await.unwrap();
        assert_eq!(stats.subscriber_count, 1);
        assert_eq!(stats.state, HubState::Closing);

        // A second shutdown is rejected
        assert!(matches!(hub.shutdown().await, Err(Error::Closed)));

        // The straggler leaving still completes the close
        drop(sub);
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(hub.state(), HubState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_closes_while_flush_is_blocked() {
        let hub = Hub::new(config());
        // Never reads, so the second flush blocks on its full queue
        let stalled = hub.subscribe().await.unwrap();

        hub.broadcast("first".to_string()).await.unwrap();
        wait_flush().await;
        hub.broadcast("second".to_string()).await.unwrap();
        wait_flush().await;

        let first = hub.shutdown_timeout(Duration::from_secs(1)).await;
        assert!(matches!(first, Err(Error::ShutdownTimeout(_))));
        assert_eq!(hub.state(), HubState::Closing);

        let second = hub.shutdown_timeout(Duration::from_secs(1)).await;
        assert!(matches!(second, Err(Error::Closed)));
        assert!(matches!(
            hub.broadcast("late".to_string()).await,
            Err(Error::Closed)
        ));
        assert_eq!(hub.state(), HubState::Closing);

        // Unblocking the flush lets the actor finish the shutdown
        drop(stalled);
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(hub.state(), HubState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_shutdowns_have_one_winner() {
        let hub = Hub::new(config());

        let (a, b) = tokio::join!(hub.shutdown(), hub.shutdown());

        assert_eq!(
            [a.is_ok(), b.is_ok()].iter().filter(|ok| **ok).count(),
            1
        );
        assert!(matches!(a.err().or(b.err()), Some(Error::Closed)));
        assert_eq!(hub.state(), HubState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_subscriber_ids_are_unique() {
        let hub = Hub::new(config());

        let first = hub.subscribe().await.unwrap();
        let second = hub.subscribe().await.unwrap();
        drop(first);
        let third = hub.subscribe().await.unwrap();

        assert_ne!(second.id(), third.id());
        assert_eq!(hub.stats().await.unwrap().subscriber_count, 2);
    }

    #[tokio::test]
    async fn test_default_hub() {
        let hub: Hub<u64> = Hub::default();

        assert_eq!(hub.state(), HubState::Open);
        assert_eq!(hub.config().flush_frequency, Duration::from_millis(256));
        assert!(format!("{:?}", hub).contains("Open"));
    }
}
