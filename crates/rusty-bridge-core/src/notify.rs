//! Multicast channel that replays the latest value to every new subscriber.

use std::sync::{Mutex, PoisonError};

use tokio::sync::broadcast;
use tokio::sync::broadcast::error::{RecvError, TryRecvError};

const CHANNEL_CAPACITY: usize = 64;

#[derive(Debug)]
pub struct ReplayChannel<T: Clone> {
    latest: Mutex<T>,
    sender: broadcast::Sender<T>,
}

impl<T: Clone + Send + 'static> ReplayChannel<T> {
    pub fn new(initial: T) -> Self {
        let (sender, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self {
            latest: Mutex::new(initial),
            sender,
        }
    }

    /// Stores and broadcasts under one lock so a concurrent subscriber sees
    /// the value either as its snapshot or as its first message, never both.
    pub fn publish(&self, value: T) {
        let mut latest = self.latest.lock().unwrap_or_else(PoisonError::into_inner);
        *latest = value.clone();
        let _ = self.sender.send(value);
    }

    pub fn latest(&self) -> T {
        self.latest
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn subscribe(&self) -> Subscription<T> {
        let latest = self.latest.lock().unwrap_or_else(PoisonError::into_inner);
        Subscription {
            snapshot: Some(latest.clone()),
            receiver: self.sender.subscribe(),
        }
    }
}

#[derive(Debug)]
pub struct Subscription<T: Clone> {
    snapshot: Option<T>,
    receiver: broadcast::Receiver<T>,
}

impl<T: Clone> Subscription<T> {
    /// Next value in publish order; `None` once the channel is gone.
    pub async fn next(&mut self) -> Option<T> {
        if let Some(snapshot) = self.snapshot.take() {
            return Some(snapshot);
        }
        loop {
            match self.receiver.recv().await {
                Ok(value) => return Some(value),
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "subscriber lagged behind notifications");
                }
                Err(RecvError::Closed) => return None,
            }
        }
    }

    pub fn try_next(&mut self) -> Option<T> {
        if let Some(snapshot) = self.snapshot.take() {
            return Some(snapshot);
        }
        loop {
            match self.receiver.try_recv() {
                Ok(value) => return Some(value),
                Err(TryRecvError::Lagged(_)) => continue,
                Err(TryRecvError::Empty | TryRecvError::Closed) => return None,
            }
        }
    }
}
