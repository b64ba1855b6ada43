//! Hub actor
//!
//! The actor task is the only owner of the subscriber set, the pending batch
//! and the replay buffer. Every operation arrives as a [`Command`] and is
//! handled to completion before the next one, so none of that state needs a
//! lock.
//!
//! ```text
//! loop {
//!   ├─► command ──► Publish     → append to pending
//!   │           ├─► Subscribe   → replay chunks into queue, register
//!   │           ├─► Unsubscribe → remove, finalize if closing and empty
//!   │           ├─► Shutdown    → final flush, release sessions
//!   │           └─► Stats       → snapshot
//!   └─► tick ─────► flush pending to every queue, then into replay
//! }
//! ```
//!
//! The public lifecycle lives in a `watch` channel shared with every handle.
//! A handle moves it from `Open` to `Closing` before sending `Shutdown`, so
//! the transition never waits behind a blocked flush. Delivery sessions watch
//! a separate release signal that the actor raises only after its final
//! flush, so events accepted before shutdown still reach them.

use std::collections::HashMap;
use std::ops::ControlFlow;
use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use tokio::time::{self, Instant, MissedTickBehavior};

use crate::error::Error;
use crate::replay::ReplayBuffer;
use crate::stats::HubStats;

use super::command::{Batch, Command, SubscriberId};
use super::config::ReplayConfig;
use super::state::HubState;

pub(crate) struct HubActor<T> {
    flush_frequency: std::time::Duration,
    replay_chunk: usize,
    commands: mpsc::UnboundedReceiver<Command<T>>,
    state: Arc<watch::Sender<HubState>>,
    release: watch::Sender<bool>,
    /// Set once `Shutdown` has been handled
    draining: bool,
    subscribers: HashMap<SubscriberId, mpsc::Sender<Batch<T>>>,
    next_id: SubscriberId,
    pending: Vec<T>,
    replay: ReplayBuffer<T>,
    total_published: u64,
    total_flushes: u64,
}

impl<T> HubActor<T>
where
    T: Clone + Send + Sync + 'static,
{
    pub(crate) fn new(
        flush_frequency: std::time::Duration,
        replay: ReplayConfig,
        commands: mpsc::UnboundedReceiver<Command<T>>,
        state: Arc<watch::Sender<HubState>>,
        release: watch::Sender<bool>,
    ) -> Self {
        Self {
            flush_frequency,
            replay_chunk: replay.initial.max(1),
            commands,
            state,
            release,
            draining: false,
            subscribers: HashMap::new(),
            next_id: 1,
            pending: Vec::new(),
            replay: ReplayBuffer::new(replay.maximum, replay.expiry),
            total_published: 0,
            total_flushes: 0,
        }
    }

    /// Process commands and flush ticks until the hub is closed
    pub(crate) async fn run(mut self) {
        let start = Instant::now() + self.flush_frequency;
        let mut ticker = time::interval_at(start, self.flush_frequency);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                command = self.commands.recv() => {
                    let Some(command) = command else {
                        // Every hub handle and subscription is gone
                        tracing::debug!("All hub handles dropped, stopping actor");
                        self.finalize();
                        break;
                    };
                    if self.handle(command).await.is_break() {
                        break;
                    }
                }
                _ = ticker.tick() => {
                    self.flush().await;
                    if self.try_finalize().is_break() {
                        break;
                    }
                }
            }
        }
    }

    async fn handle(&mut self, command: Command<T>) -> ControlFlow<()> {
        match command {
            Command::Publish { events, reply } => {
                if self.is_closing() {
                    let _ = reply.send(Err(Error::Closed));
                } else {
                    self.total_published += events.len() as u64;
                    self.pending.extend(events);
                    let _ = reply.send(Ok(()));
                }
            }
            Command::Subscribe { queue, reply } => {
                if self.is_closing() {
                    let _ = reply.send(Err(Error::Closed));
                    return ControlFlow::Continue(());
                }

                let id = self.next_id;
                self.next_id += 1;

                // The caller must hold the receiver before replay can be drained
                if reply.send(Ok(id)).is_err() {
                    return ControlFlow::Continue(());
                }
                self.register(id, queue).await;
            }
            Command::Unsubscribe { id } => {
                if self.subscribers.remove(&id).is_some() {
                    tracing::debug!(
                        subscriber_id = id,
                        subscribers = self.subscribers.len(),
                        "Subscriber removed"
                    );
                }
                return self.try_finalize();
            }
            Command::Shutdown => {
                // Events accepted before shutdown still reach current subscribers
                self.flush().await;
                self.draining = true;
                self.release.send_replace(true);

                tracing::info!(
                    subscribers = self.subscribers.len(),
                    "Hub closing, waiting for subscribers to disconnect"
                );
                return self.try_finalize();
            }
            Command::Stats { reply } => {
                let _ = reply.send(self.stats());
            }
        }

        ControlFlow::Continue(())
    }

    /// Push the replay history into a new subscriber's queue, then make it
    /// eligible for live batches
    async fn register(&mut self, id: SubscriberId, queue: mpsc::Sender<Batch<T>>) {
        let mut replayed = 0;
        for chunk in self.replay.chunks(self.replay_chunk) {
            replayed += chunk.len();
            if queue.send(Batch::from(chunk)).await.is_err() {
                tracing::debug!(subscriber_id = id, "Subscriber gone during replay");
                return;
            }
        }

        self.subscribers.insert(id, queue);

        tracing::info!(
            subscriber_id = id,
            subscribers = self.subscribers.len(),
            replayed_events = replayed,
            "Subscriber added"
        );
    }

    /// Deliver the pending batch to every subscriber and record it for replay
    ///
    /// Sends are awaited one subscriber at a time, so a full queue delays the
    /// subscribers after it.
    async fn flush(&mut self) {
        if self.pending.is_empty() {
            return;
        }

        let batch: Batch<T> = Arc::from(std::mem::take(&mut self.pending));

        let mut gone = Vec::new();
        for (id, queue) in &self.subscribers {
            if queue.send(Arc::clone(&batch)).await.is_err() {
                gone.push(*id);
            }
        }
        for id in gone {
            self.subscribers.remove(&id);
            tracing::debug!(subscriber_id = id, "Subscriber queue closed, removed");
        }

        self.replay.add(batch.iter().cloned());
        self.total_flushes += 1;

        tracing::debug!(
            events = batch.len(),
            subscribers = self.subscribers.len(),
            replay_len = self.replay.len(),
            "Flushed batch"
        );
    }

    /// Finish shutdown once the final flush is done and no subscriber remains
    fn try_finalize(&mut self) -> ControlFlow<()> {
        if !self.draining {
            return ControlFlow::Continue(());
        }

        // Subscriptions dropped before their unsubscribe was sent
        self.subscribers.retain(|_, queue| !queue.is_closed());

        if self.subscribers.is_empty() {
            self.finalize();
            ControlFlow::Break(())
        } else {
            ControlFlow::Continue(())
        }
    }

    fn finalize(&mut self) {
        self.pending.clear();
        self.replay.clear();
        self.subscribers.clear();
        self.release.send_replace(true);
        self.state.send_replace(HubState::Closed);

        tracing::info!(
            total_published = self.total_published,
            total_flushes = self.total_flushes,
            "Hub closed"
        );
    }

    fn is_closing(&self) -> bool {
        self.state.borrow().is_closing()
    }

    fn stats(&self) -> HubStats {
        HubStats {
            state: *self.state.borrow(),
            subscriber_count: self.subscribers.len(),
            pending_events: self.pending.len(),
            replay_len: self.replay.len(),
            total_published: self.total_published,
            total_flushes: self.total_flushes,
        }
    }
}
