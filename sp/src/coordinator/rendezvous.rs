//! Rendezvous slots and the keyed tables that hold them
//!
//! A [`Rendezvous`] is an unbuffered handoff: a value only moves once a
//! sender and a receiver are both present. Receivers queue a oneshot sender
//! (an "offer"); senders pop offers until one accepts the value. A receiver
//! that goes away drops its oneshot receiver, which closes its offer, so a
//! sender never hands work to somebody who stopped listening.

use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::{Notify, oneshot};
use tracing::debug;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Unbuffered handoff point between one sender and one receiver at a time
pub struct Rendezvous<T> {
    /// Receivers ready to take a value, oldest first
    offers: Mutex<VecDeque<oneshot::Sender<T>>>,
    /// Wakes blocked senders when a new offer arrives
    offered: Notify,
}

impl<T> Default for Rendezvous<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Rendezvous<T> {
    pub fn new() -> Self {
        Self {
            offers: Mutex::new(VecDeque::new()),
            offered: Notify::new(),
        }
    }

    /// Announce a ready receiver and return the channel the value will arrive on
    ///
    /// Dropping the returned receiver withdraws the offer. Callers that need
    /// to stop waiting without losing a value that raced in should
    /// `close()` it and then `try_recv()`.
    pub fn offer(&self) -> oneshot::Receiver<T> {
        let (tx, rx) = oneshot::channel();
        {
            let mut offers = lock(&self.offers);
            offers.retain(|tx| !tx.is_closed());
            offers.push_back(tx);
        }
        self.offered.notify_waiters();
        rx
    }

    /// Block until a sender hands over a value
    ///
    /// Cancel by dropping the future.
    pub async fn receive(&self) -> T {
        loop {
            match self.offer().await {
                Ok(value) => return value,
                // The sender that took our offer went away before sending
                Err(_) => debug!("Rendezvous::receive: offer dropped, re-offering"),
            }
        }
    }

    /// Hand `value` to a receiver, blocking until one is ready or `until` completes
    ///
    /// Returns the value back if `until` completed first.
    pub async fn send<F: Future>(&self, value: T, until: F) -> Result<(), T> {
        let mut value = value;
        tokio::pin!(until);

        loop {
            // Register for wake-ups before looking, so an offer made between
            // the check and the wait is not missed.
            let notified = self.offered.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            loop {
                let offer = lock(&self.offers).pop_front();
                let Some(tx) = offer else { break };
                match tx.send(value) {
                    Ok(()) => return Ok(()),
                    Err(returned) => value = returned,
                }
            }

            tokio::select! {
                biased;
                _ = &mut notified => {}
                _ = &mut until => return Err(value),
            }
        }
    }

    /// Number of receivers currently waiting
    pub fn waiting_receivers(&self) -> usize {
        lock(&self.offers).iter().filter(|tx| !tx.is_closed()).count()
    }
}

/// String-keyed table of lazily created rendezvous slots
///
/// The table lock only guards lookup, insert and delete; handoffs happen on
/// the returned slot after the lock is released.
pub struct RendezvousTable<T> {
    name: &'static str,
    slots: Mutex<HashMap<String, Arc<Rendezvous<T>>>>,
}

impl<T> RendezvousTable<T> {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            slots: Mutex::new(HashMap::new()),
        }
    }

    /// Get the slot for `key`, creating it if absent
    pub fn slot(&self, key: &str) -> Arc<Rendezvous<T>> {
        let mut slots = lock(&self.slots);
        if let Some(slot) = slots.get(key) {
            return Arc::clone(slot);
        }

        debug!(table = self.name, %key, "RendezvousTable::slot: creating slot");
        let slot = Arc::new(Rendezvous::new());
        slots.insert(key.to_string(), Arc::clone(&slot));
        slot
    }

    /// Remove the slot for `key`. Idempotent.
    pub fn remove(&self, key: &str) -> bool {
        let removed = lock(&self.slots).remove(key).is_some();
        if removed {
            debug!(table = self.name, %key, "RendezvousTable::remove: slot removed");
        }
        removed
    }

    pub fn contains(&self, key: &str) -> bool {
        lock(&self.slots).contains_key(key)
    }

    pub fn len(&self) -> usize {
        lock(&self.slots).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
