//! Topic string to descriptor cache shared by all workers.
//!
//! Read-mostly. Inserts are set-if-absent so concurrent first sight of a
//! topic is idempotent. Entries are never removed while the fork digest
//! context lives; a miss means the node never subscribed to the topic.

use std::collections::HashMap;

use parking_lot::RwLock;

use super::entities::TopicDescriptor;
use super::errors::TopicError;

#[derive(Default)]
pub struct TopicCache {
    entries: RwLock<HashMap<String, TopicDescriptor>>,
}

impl TopicCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert unless present. Returns `true` if this call inserted.
    pub fn insert_if_absent(&self, topic: &str, descriptor: TopicDescriptor) -> bool {
        if self.entries.read().contains_key(topic) {
            return false;
        }
        let mut entries = self.entries.write();
        if entries.contains_key(topic) {
            return false;
        }
        entries.insert(topic.to_string(), descriptor);
        true
    }

    pub fn get(&self, topic: &str) -> Result<TopicDescriptor, TopicError> {
        self.entries
            .read()
            .get(topic)
            .copied()
            .ok_or_else(|| TopicError::UnknownTopic(topic.to_string()))
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ForkName, ObjectKind};
    use std::sync::Arc;

    #[test]
    fn test_miss_is_error() {
        let cache = TopicCache::new();
        assert_eq!(
            cache.get("/eth2/00000000/beacon_block/ssz_snappy"),
            Err(TopicError::UnknownTopic(
                "/eth2/00000000/beacon_block/ssz_snappy".to_string()
            ))
        );
    }

    #[test]
    fn test_concurrent_insert_is_idempotent() {
        let cache = Arc::new(TopicCache::new());
        let desc = TopicDescriptor::global(ObjectKind::BeaconBlock, ForkName::Deneb).unwrap();

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let cache = Arc::clone(&cache);
                std::thread::spawn(move || cache.insert_if_absent("/t", desc))
            })
            .collect();
        let inserted = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|inserted| *inserted)
            .count();

        assert_eq!(inserted, 1);
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get("/t").unwrap(), desc);
    }
}
