//! Redis pub/sub-backed wake bus (spec §4.4, §6).
//!
//! Redis pub/sub is not durable: a message published while no subscriber is
//! connected is simply lost. That is acceptable here because the bus is a
//! hint, not a queue (spec §4.4) — the drain loop's startup drain and tick
//! fallback (`aggregator::worker`) reconstruct any missed work from the
//! cursor and the log regardless of what the bus delivered.

use std::sync::mpsc;
use std::thread;

use redis::Commands;
use tracing::warn;

use notifyhub_events::{EventBus, Subscription, WakeMessage};

#[derive(Debug)]
pub enum RedisWakeBusError {
    Redis(String),
}

impl std::fmt::Display for RedisWakeBusError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RedisWakeBusError::Redis(msg) => write!(f, "redis wake bus error: {msg}"),
        }
    }
}

impl std::error::Error for RedisWakeBusError {}

/// One instance per worker: publishes to whichever worker owns a given
/// partition (`partition mod worker_count`, spec §5), and subscribes only
/// to its own channel (`notifications:wake:<worker_index>`).
///
/// A producer-only instance (the event log) still needs a `worker_index` to
/// construct one, even though it never calls `subscribe` — any valid index
/// works, since `publish` always routes by the message's own partition.
#[derive(Clone)]
pub struct RedisWakeBus {
    client: redis::Client,
    worker_count: u32,
    own_channel: String,
}

impl RedisWakeBus {
    pub fn new(redis_url: &str, worker_count: u32, worker_index: u32) -> Result<Self, RedisWakeBusError> {
        let client = redis::Client::open(redis_url)
            .map_err(|e| RedisWakeBusError::Redis(e.to_string()))?;
        Ok(Self {
            client,
            worker_count,
            own_channel: WakeMessage::channel_name(worker_index),
        })
    }
}

impl EventBus<WakeMessage> for RedisWakeBus {
    type Error = RedisWakeBusError;

    fn publish(&self, message: WakeMessage) -> Result<(), Self::Error> {
        let target_worker = message.partition_id.as_u32() % self.worker_count;
        let channel = WakeMessage::channel_name(target_worker);

        let mut conn = self
            .client
            .get_connection()
            .map_err(|e| RedisWakeBusError::Redis(e.to_string()))?;

        let _: i64 = conn
            .publish(&channel, message.encode())
            .map_err(|e| RedisWakeBusError::Redis(e.to_string()))?;

        Ok(())
    }

    fn subscribe(&self) -> Subscription<WakeMessage> {
        let (tx, rx) = mpsc::channel();
        let client = self.client.clone();
        let channel = self.own_channel.clone();

        thread::spawn(move || {
            let mut conn = match client.get_connection() {
                Ok(c) => c,
                Err(err) => {
                    warn!(%err, "redis wake bus: failed to connect for subscribe");
                    return;
                }
            };

            let mut pubsub = conn.as_pubsub();
            if let Err(err) = pubsub.subscribe(&channel) {
                warn!(%err, %channel, "redis wake bus: failed to subscribe");
                return;
            }

            loop {
                let msg = match pubsub.get_message() {
                    Ok(m) => m,
                    Err(err) => {
                        warn!(%err, "redis wake bus: connection lost, stopping subscriber thread");
                        return;
                    }
                };

                let payload: String = match msg.get_payload() {
                    Ok(p) => p,
                    Err(_) => continue,
                };

                // Unparseable payloads are dropped silently (spec §6): a
                // malformed hint is never worth crashing a worker over.
                let wake = match WakeMessage::decode(&payload) {
                    Some(w) => w,
                    None => continue,
                };

                if tx.send(wake).is_err() {
                    return;
                }
            }
        });

        Subscription::new(rx)
    }
}
