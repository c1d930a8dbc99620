//! A registry of event receivers.
//!
//! Each subscriber owns an unbounded channel; publishing clones the event
//! to every live receiver and prunes those that have been dropped.

use std::sync::{Mutex, MutexGuard};

use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

pub struct Subscribers<T> {
    senders: Mutex<Vec<UnboundedSender<T>>>,
}

impl<T: Clone> Subscribers<T> {
    pub fn new() -> Self {
        Self {
            senders: Mutex::new(Vec::new()),
        }
    }

    fn senders(&self) -> MutexGuard<'_, Vec<UnboundedSender<T>>> {
        self.senders.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn subscribe(&self) -> UnboundedReceiver<T> {
        self.subscribe_with(std::iter::empty())
    }

    /// Register a receiver that first sees `replay`, then every later event.
    pub fn subscribe_with(&self, replay: impl IntoIterator<Item = T>) -> UnboundedReceiver<T> {
        let (tx, rx) = mpsc::unbounded_channel();
        for item in replay {
            // The receiver is alive; it is returned below.
            let _ = tx.send(item);
        }
        self.senders().push(tx);
        rx
    }

    /// Deliver `event` to every live subscriber. Returns how many got it.
    pub fn publish(&self, event: T) -> usize {
        let mut senders = self.senders();
        senders.retain(|tx| tx.send(event.clone()).is_ok());
        senders.len()
    }

    pub fn len(&self) -> usize {
        self.senders().len()
    }

    pub fn is_empty(&self) -> bool {
        self.senders().is_empty()
    }
}

impl<T: Clone> Default for Subscribers<T> {
    fn default() -> Self {
        Self::new()
    }
}
