//! Ingestion pipeline: many producers, one consumer, FIFO.
//!
//! Every listener task holds a [`PipelineSender`]; the persistence sink owns
//! the single [`PipelineReceiver`]. The queue is bounded by default and the
//! [`OverflowPolicy`] decides what a producer does when it is full.
//! Closing the channel is the only shutdown signal the consumer sees: it
//! keeps receiving until the queue is both closed and empty.

use crate::domain::LogEntry;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use thiserror::Error;
use tokio::sync::Notify;

pub const DEFAULT_QUEUE_CAPACITY: usize = 10_000;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PipelineError {
    #[error("ingestion pipeline is closed")]
    Closed,
}

/// What a producer does when the queue is at capacity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverflowPolicy {
    /// Wait until the consumer makes room.
    #[default]
    Block,
    /// Discard the entry being sent.
    DropNewest,
    /// Evict the oldest queued entry to make room.
    DropOldest,
}

impl fmt::Display for OverflowPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            OverflowPolicy::Block => "block",
            OverflowPolicy::DropNewest => "drop_newest",
            OverflowPolicy::DropOldest => "drop_oldest",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    Enqueued,
    /// The entry was discarded because the queue was full.
    DroppedNewest,
    /// The entry was queued after evicting the oldest one.
    DroppedOldest,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PipelineStats {
    pub enqueued: u64,
    pub dropped: u64,
    pub depth: usize,
}

struct QueueState {
    entries: VecDeque<LogEntry>,
    closed: bool,
    senders: usize,
}

struct Shared {
    state: Mutex<QueueState>,
    item_ready: Notify,
    space_ready: Notify,
    /// Zero means unbounded.
    capacity: usize,
    policy: OverflowPolicy,
    enqueued: AtomicU64,
    dropped: AtomicU64,
}

impl Shared {
    fn close(&self) {
        let mut state = self.state.lock();
        if state.closed {
            return;
        }
        state.closed = true;
        drop(state);
        self.item_ready.notify_waiters();
        self.space_ready.notify_waiters();
    }

    fn is_full(&self, state: &QueueState) -> bool {
        self.capacity != 0 && state.entries.len() >= self.capacity
    }

    fn stats(&self) -> PipelineStats {
        PipelineStats {
            enqueued: self.enqueued.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
            depth: self.state.lock().entries.len(),
        }
    }
}

/// Pipeline settings; [`open`](IngestionPipeline::open) creates the channel.
#[derive(Debug, Clone, Copy)]
pub struct IngestionPipeline {
    capacity: usize,
    policy: OverflowPolicy,
}

impl Default for IngestionPipeline {
    fn default() -> Self {
        Self::new(DEFAULT_QUEUE_CAPACITY, OverflowPolicy::default())
    }
}

impl IngestionPipeline {
    /// `capacity == 0` gives an unbounded queue; the policy is then unused.
    pub fn new(capacity: usize, policy: OverflowPolicy) -> Self {
        Self { capacity, policy }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn policy(&self) -> OverflowPolicy {
        self.policy
    }

    pub fn open(&self) -> (PipelineSender, PipelineReceiver) {
        let shared = Arc::new(Shared {
            state: Mutex::new(QueueState {
                entries: VecDeque::with_capacity(self.capacity.min(1024)),
                closed: false,
                senders: 1,
            }),
            item_ready: Notify::new(),
            space_ready: Notify::new(),
            capacity: self.capacity,
            policy: self.policy,
            enqueued: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
        });
        (
            PipelineSender {
                shared: Arc::clone(&shared),
            },
            PipelineReceiver { shared },
        )
    }
}

pub struct PipelineSender {
    shared: Arc<Shared>,
}

impl Clone for PipelineSender {
    fn clone(&self) -> Self {
        self.shared.state.lock().senders += 1;
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl Drop for PipelineSender {
    fn drop(&mut self) {
        let mut state = self.shared.state.lock();
        state.senders -= 1;
        let last = state.senders == 0;
        drop(state);
        if last {
            self.shared.close();
        }
    }
}

impl PipelineSender {
    /// Enqueue an entry, applying the overflow policy when full.
    ///
    /// Entries from one sender are delivered in the order they were sent.
    pub async fn send(&self, entry: LogEntry) -> Result<SendOutcome, PipelineError> {
        let shared = &*self.shared;
        loop {
            let space = shared.space_ready.notified();
            tokio::pin!(space);
            {
                let mut state = shared.state.lock();
                if state.closed {
                    return Err(PipelineError::Closed);
                }
                if !shared.is_full(&state) {
                    state.entries.push_back(entry);
                    drop(state);
                    shared.enqueued.fetch_add(1, Ordering::Relaxed);
                    shared.item_ready.notify_one();
                    return Ok(SendOutcome::Enqueued);
                }
                match shared.policy {
                    OverflowPolicy::DropNewest => {
                        drop(state);
                        shared.dropped.fetch_add(1, Ordering::Relaxed);
                        return Ok(SendOutcome::DroppedNewest);
                    }
                    OverflowPolicy::DropOldest => {
                        state.entries.pop_front();
                        state.entries.push_back(entry);
                        drop(state);
                        shared.dropped.fetch_add(1, Ordering::Relaxed);
                        shared.enqueued.fetch_add(1, Ordering::Relaxed);
                        shared.item_ready.notify_one();
                        return Ok(SendOutcome::DroppedOldest);
                    }
                    OverflowPolicy::Block => {
                        // Register before releasing the lock so a concurrent
                        // recv cannot slip its wakeup in between.
                        space.as_mut().enable();
                    }
                }
            }
            space.await;
        }
    }

    /// Close the channel for every producer. Buffered entries stay
    /// available to the consumer.
    pub fn close(&self) {
        self.shared.close();
    }

    pub fn is_closed(&self) -> bool {
        self.shared.state.lock().closed
    }

    pub fn stats(&self) -> PipelineStats {
        self.shared.stats()
    }
}

pub struct PipelineReceiver {
    shared: Arc<Shared>,
}

impl Drop for PipelineReceiver {
    fn drop(&mut self) {
        self.shared.close();
    }
}

impl PipelineReceiver {
    /// Wait for the next entry. Returns `None` once the channel is closed
    /// and every buffered entry has been received.
    pub async fn recv(&mut self) -> Option<LogEntry> {
        let shared = &*self.shared;
        loop {
            let ready = shared.item_ready.notified();
            tokio::pin!(ready);
            {
                let mut state = shared.state.lock();
                if let Some(entry) = state.entries.pop_front() {
                    drop(state);
                    shared.space_ready.notify_one();
                    return Some(entry);
                }
                if state.closed {
                    return None;
                }
                ready.as_mut().enable();
            }
            ready.await;
        }
    }

    pub fn close(&self) {
        self.shared.close();
    }

    pub fn stats(&self) -> PipelineStats {
        self.shared.stats()
    }
}
