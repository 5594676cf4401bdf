use std::sync::atomic::{AtomicU64, Ordering};

/// Message ids: a random per-process seed mixed with an atomic counter, so
/// ids never repeat within a process and are unpredictable across processes.
pub(crate) struct RequestIdGenerator {
    seed: u128,
    counter: AtomicU64,
}

impl RequestIdGenerator {
    #[must_use]
    pub(crate) fn new() -> Self {
        let seed_hi = u128::from(fastrand::u64(..));
        let seed_lo = u128::from(fastrand::u64(..));
        Self {
            seed: (seed_hi << 64) | seed_lo,
            counter: AtomicU64::new(1),
        }
    }

    /// Next `msg_<32 hex>` id.
    pub(crate) fn next_message_id(&self) -> String {
        let seq = self.counter.fetch_add(1, Ordering::Relaxed);
        let uuid = uuid::Uuid::from_u128(self.seed ^ u128::from(seq));
        let mut buf = uuid::Uuid::encode_buffer();
        format!("msg_{}", uuid.simple().encode_lower(&mut buf))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_id_shape() {
        let id = RequestIdGenerator::new().next_message_id();
        assert!(id.starts_with("msg_"));
        assert_eq!(id.len(), 4 + 32);
        assert!(id[4..].chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_message_ids_are_unique() {
        let generator = RequestIdGenerator::new();
        let ids: std::collections::HashSet<String> =
            (0..64).map(|_| generator.next_message_id()).collect();
        assert_eq!(ids.len(), 64);
    }
}
