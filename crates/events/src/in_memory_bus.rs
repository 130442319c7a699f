//! In-memory wake bus for tests and for a single-process dev setup.

use std::sync::{mpsc, Mutex};

use crate::bus::{EventBus, Subscription};

#[derive(Debug)]
pub enum InMemoryBusError {
    /// Publish failed because the subscriber list lock was poisoned.
    Poisoned,
}

/// Best-effort fan-out bus: every live subscriber gets every message.
///
/// Matches the "hint, not queue" semantics of spec §4.4 only loosely (it
/// does not drop messages under normal operation), but is sufficient for
/// exercising drain-loop coalescing logic deterministically in tests.
#[derive(Debug)]
pub struct InMemoryEventBus<M> {
    subscribers: Mutex<Vec<mpsc::Sender<M>>>,
}

impl<M> InMemoryEventBus<M> {
    pub fn new() -> Self {
        Self::default()
    }
}

impl<M> Default for InMemoryEventBus<M> {
    fn default() -> Self {
        Self {
            subscribers: Mutex::new(Vec::new()),
        }
    }
}

impl<M> EventBus<M> for InMemoryEventBus<M>
where
    M: Clone + Send + 'static,
{
    type Error = InMemoryBusError;

    fn publish(&self, message: M) -> Result<(), Self::Error> {
        let mut subs = self.subscribers.lock().map_err(|_| InMemoryBusError::Poisoned)?;
        subs.retain(|tx| tx.send(message.clone()).is_ok());
        Ok(())
    }

    fn subscribe(&self) -> Subscription<M> {
        let (tx, rx) = mpsc::channel();
        if let Ok(mut subs) = self.subscribers.lock() {
            subs.push(tx);
        }
        Subscription::new(rx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fans_out_to_all_subscribers() {
        let bus: InMemoryEventBus<u32> = InMemoryEventBus::new();
        let sub_a = bus.subscribe();
        let sub_b = bus.subscribe();

        bus.publish(7).unwrap();

        assert_eq!(sub_a.try_recv().unwrap(), 7);
        assert_eq!(sub_b.try_recv().unwrap(), 7);
    }

    #[test]
    fn drops_disconnected_subscribers_silently() {
        let bus: InMemoryEventBus<u32> = InMemoryEventBus::new();
        {
            let _dropped_immediately = bus.subscribe();
        }
        let sub = bus.subscribe();
        bus.publish(1).unwrap();
        assert_eq!(sub.try_recv().unwrap(), 1);
    }
}
