//! Wake bus channel naming and payload encoding (spec §6).

use notifyhub_core::PartitionId;

/// A wake hint: "this partition has new work". Carries no event data —
/// the worker reconstructs work from the cursor and the log.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WakeMessage {
    pub partition_id: PartitionId,
}

impl WakeMessage {
    pub fn new(partition_id: PartitionId) -> Self {
        Self { partition_id }
    }

    /// Channel name for worker index `w`: `notifications:wake:<w>`.
    pub fn channel_name(worker_index: u32) -> String {
        format!("notifications:wake:{worker_index}")
    }

    /// Wire payload: the decimal string representation of the partition id.
    pub fn encode(&self) -> String {
        self.partition_id.as_u32().to_string()
    }

    /// Parse a wire payload. Per spec §6, subscribers must ignore payloads
    /// they cannot parse — callers should treat `None` as "drop silently",
    /// not as an error to propagate.
    pub fn decode(payload: &str) -> Option<Self> {
        payload
            .trim()
            .parse::<u32>()
            .ok()
            .map(|p| Self::new(PartitionId::new_unchecked(p)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn channel_name_matches_spec() {
        assert_eq!(WakeMessage::channel_name(3), "notifications:wake:3");
    }

    #[test]
    fn round_trips_through_decimal_string() {
        let msg = WakeMessage::new(PartitionId::new_unchecked(42));
        let encoded = msg.encode();
        assert_eq!(encoded, "42");
        assert_eq!(WakeMessage::decode(&encoded), Some(msg));
    }

    #[test]
    fn unparseable_payload_is_ignored_not_errored() {
        assert_eq!(WakeMessage::decode("not-a-number"), None);
        assert_eq!(WakeMessage::decode(""), None);
    }
}
