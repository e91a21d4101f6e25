//! # Topic Registry
//!
//! Explicit, refcounted topic subscriptions.
//!
//! `subscribe` hands out a [`Subscription`] handle and populates the shared
//! topic cache. The substrate is told to join a topic on its first handle
//! and to leave it when the last handle is dropped.
//!
//! Cache entries outlive subscriptions: a late message on a topic the node
//! just left still resolves and gets a verdict.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, info};

use crate::config::GossipConfig;
use crate::domain::{
    core_topics_at_fork, CoreTopicOptions, ForkDigestContext, ForkName, TopicCache, TopicCodec,
    TopicDescriptor, TopicError,
};
use crate::ports::outbound::SubscriptionSink;

struct RegistryInner {
    codec: TopicCodec,
    cache: Arc<TopicCache>,
    counts: Mutex<HashMap<String, usize>>,
    sink: Option<Arc<dyn SubscriptionSink>>,
}

/// Subscription bookkeeping shared by the pipeline and its callers.
#[derive(Clone)]
pub struct TopicRegistry {
    inner: Arc<RegistryInner>,
}

impl TopicRegistry {
    pub fn new(codec: TopicCodec, sink: Option<Arc<dyn SubscriptionSink>>) -> Self {
        Self {
            inner: Arc::new(RegistryInner {
                codec,
                cache: Arc::new(TopicCache::new()),
                counts: Mutex::new(HashMap::new()),
                sink,
            }),
        }
    }

    /// Registry whose codec uses the configured namespace.
    pub fn from_config(
        config: &GossipConfig,
        forks: ForkDigestContext,
        sink: Option<Arc<dyn SubscriptionSink>>,
    ) -> Self {
        Self::new(TopicCodec::new(config.namespace.clone(), forks), sink)
    }

    pub fn codec(&self) -> &TopicCodec {
        &self.inner.codec
    }

    /// Descriptor of a topic seen through `subscribe`.
    pub fn resolve(&self, topic: &str) -> Result<TopicDescriptor, TopicError> {
        self.inner.cache.get(topic)
    }

    /// Subscribe to `descriptor`. The topic stays joined while the handle lives.
    pub fn subscribe(&self, descriptor: TopicDescriptor) -> Subscription {
        let topic = self.inner.codec.encode(&descriptor);
        self.inner.cache.insert_if_absent(&topic, descriptor);

        let first = {
            let mut counts = self.inner.counts.lock();
            let count = counts.entry(topic.clone()).or_insert(0);
            *count += 1;
            *count == 1
        };
        if first {
            info!(%topic, "Subscribed to gossip topic");
            if let Some(sink) = &self.inner.sink {
                sink.subscribe(&topic);
            }
        } else {
            debug!(%topic, "Additional subscription handle");
        }

        Subscription {
            topic,
            descriptor,
            inner: Arc::clone(&self.inner),
        }
    }

    /// Subscribe to every core topic of `fork`.
    pub fn subscribe_core_topics(
        &self,
        fork: ForkName,
        opts: CoreTopicOptions,
    ) -> Vec<Subscription> {
        core_topics_at_fork(fork, opts)
            .into_iter()
            .map(|descriptor| self.subscribe(descriptor))
            .collect()
    }

    /// Live handles for `topic`.
    pub fn subscription_count(&self, topic: &str) -> usize {
        self.inner.counts.lock().get(topic).copied().unwrap_or(0)
    }

    /// Topics with at least one live handle.
    pub fn subscribed_topics(&self) -> Vec<String> {
        let mut topics: Vec<String> = self.inner.counts.lock().keys().cloned().collect();
        topics.sort();
        topics
    }
}

/// Subscription handle. Dropping the last handle of a topic leaves it.
pub struct Subscription {
    topic: String,
    descriptor: TopicDescriptor,
    inner: Arc<RegistryInner>,
}

impl Subscription {
    #[must_use]
    pub fn topic(&self) -> &str {
        &self.topic
    }

    #[must_use]
    pub fn descriptor(&self) -> TopicDescriptor {
        self.descriptor
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        let last = {
            let mut counts = self.inner.counts.lock();
            match counts.get_mut(&self.topic) {
                Some(count) if *count > 1 => {
                    *count -= 1;
                    false
                }
                Some(_) => {
                    counts.remove(&self.topic);
                    true
                }
                None => false,
            }
        };
        if last {
            info!(topic = %self.topic, "Unsubscribed from gossip topic");
            if let Some(sink) = &self.inner.sink {
                sink.unsubscribe(&self.topic);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ChainSpec, ObjectKind, DEFAULT_NAMESPACE};

    #[derive(Default)]
    struct RecordingSink {
        events: Mutex<Vec<(bool, String)>>,
    }

    impl SubscriptionSink for RecordingSink {
        fn subscribe(&self, topic: &str) {
            self.events.lock().push((true, topic.to_string()));
        }
        fn unsubscribe(&self, topic: &str) {
            self.events.lock().push((false, topic.to_string()));
        }
    }

    fn registry(sink: Arc<RecordingSink>) -> TopicRegistry {
        let forks = ForkDigestContext::new(&ChainSpec::mainnet(), [0u8; 32]).unwrap();
        TopicRegistry::new(TopicCodec::new(DEFAULT_NAMESPACE, forks), Some(sink))
    }

    #[test]
    fn test_refcounted_subscription() {
        let sink = Arc::new(RecordingSink::default());
        let reg = registry(Arc::clone(&sink));
        let desc = TopicDescriptor::global(ObjectKind::BeaconBlock, ForkName::Deneb).unwrap();

        let a = reg.subscribe(desc);
        let b = reg.subscribe(desc);
        let topic = a.topic().to_string();
        assert_eq!(reg.subscription_count(&topic), 2);
        assert_eq!(sink.events.lock().len(), 1);

        drop(a);
        assert_eq!(reg.subscription_count(&topic), 1);
        assert_eq!(sink.events.lock().len(), 1);

        drop(b);
        assert_eq!(reg.subscription_count(&topic), 0);
        assert_eq!(
            *sink.events.lock(),
            vec![(true, topic.clone()), (false, topic.clone())]
        );
    }

    #[test]
    fn test_resolve_requires_subscription() {
        let reg = registry(Arc::new(RecordingSink::default()));
        let desc = TopicDescriptor::subnet(ObjectKind::BeaconAttestation, ForkName::Deneb, 5).unwrap();
        let topic = reg.codec().encode(&desc);

        assert!(matches!(reg.resolve(&topic), Err(TopicError::UnknownTopic(_))));
        let sub = reg.subscribe(desc);
        assert_eq!(reg.resolve(&topic).unwrap(), desc);

        // Cache survives the handle
        drop(sub);
        assert_eq!(reg.resolve(&topic).unwrap(), desc);
    }

    #[test]
    fn test_from_config_uses_namespace() {
        let config = GossipConfig {
            namespace: "devnet".to_string(),
            ..GossipConfig::default()
        };
        let forks = ForkDigestContext::new(&ChainSpec::mainnet(), [0u8; 32]).unwrap();
        let reg = TopicRegistry::from_config(&config, forks, None);
        let sub = reg.subscribe(
            TopicDescriptor::global(ObjectKind::VoluntaryExit, ForkName::Deneb).unwrap(),
        );
        assert!(sub.topic().starts_with("/devnet/"));
        assert!(sub.topic().ends_with("/voluntary_exit/ssz_snappy"));
    }

    #[test]
    fn test_core_topics() {
        let reg = registry(Arc::new(RecordingSink::default()));
        let subs = reg.subscribe_core_topics(ForkName::Deneb, CoreTopicOptions::default());
        assert_eq!(subs.len(), reg.subscribed_topics().len());
        assert!(subs.iter().all(|s| s.descriptor().fork() == ForkName::Deneb));
        drop(subs);
        assert!(reg.subscribed_topics().is_empty());
    }
}
