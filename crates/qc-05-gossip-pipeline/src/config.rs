//! Gossip pipeline configuration with validation.
//!
//! Loaded from TOML. Every field has a default so an empty document is a
//! valid configuration:
//!
//! ```toml
//! namespace = "eth2"
//! subscribe_all_subnets = true
//!
//! [queues.beacon_attestation]
//! capacity = 8192
//! max_concurrency = 32
//! ```

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::adapters::side_effects::{
    DEFAULT_SIDE_EFFECT_CONCURRENCY, DEFAULT_SIDE_EFFECT_QUEUE_CAPACITY,
};
use crate::domain::{
    default_queue_config, ConfigError, CoreTopicOptions, Encoding, KindMap, ObjectKind,
    QueueConfig, QueueOrder, DEFAULT_MAX_PAYLOAD_SIZE, DEFAULT_NAMESPACE, MAX_CONCURRENCY,
};

/// Main gossip pipeline configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GossipConfig {
    /// First topic segment
    pub namespace: String,
    /// Last topic segment
    pub encoding: String,
    /// Largest accepted decompressed payload in bytes
    pub max_payload_size: usize,
    /// Subscribe to every attestation and sync committee subnet
    pub subscribe_all_subnets: bool,
    /// Skip light client topics
    pub disable_light_client_server: bool,
    /// Bound of the side-effect channel
    pub side_effect_queue_capacity: usize,
    /// Side effects running at once
    pub side_effect_concurrency: usize,
    /// Per-kind overrides keyed by topic name (e.g. `beacon_attestation`)
    pub queues: BTreeMap<String, QueueOverride>,
}

/// Partial queue policy merged onto the default table.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct QueueOverride {
    pub capacity: Option<usize>,
    pub order: Option<QueueOrder>,
    pub max_concurrency: Option<usize>,
}

impl QueueOverride {
    fn apply(&self, base: QueueConfig) -> QueueConfig {
        QueueConfig {
            capacity: self.capacity.unwrap_or(base.capacity),
            order: self.order.unwrap_or(base.order),
            max_concurrency: self.max_concurrency.unwrap_or(base.max_concurrency),
        }
    }
}

impl Default for GossipConfig {
    fn default() -> Self {
        Self {
            namespace: DEFAULT_NAMESPACE.to_string(),
            encoding: Encoding::SszSnappy.as_str().to_string(),
            max_payload_size: DEFAULT_MAX_PAYLOAD_SIZE,
            subscribe_all_subnets: false,
            disable_light_client_server: false,
            side_effect_queue_capacity: DEFAULT_SIDE_EFFECT_QUEUE_CAPACITY,
            side_effect_concurrency: DEFAULT_SIDE_EFFECT_CONCURRENCY,
            queues: BTreeMap::new(),
        }
    }
}

impl GossipConfig {
    /// Parse and validate a TOML document.
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_toml_str(&contents)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.namespace.is_empty() || self.namespace.contains('/') {
            return Err(ConfigError::Invalid(format!(
                "namespace must be a non-empty segment without '/': {:?}",
                self.namespace
            )));
        }
        self.encoding()?;
        if self.max_payload_size == 0 {
            return Err(ConfigError::Invalid(
                "max_payload_size cannot be 0".into(),
            ));
        }
        if self.side_effect_queue_capacity == 0 {
            return Err(ConfigError::Invalid(
                "side_effect_queue_capacity cannot be 0".into(),
            ));
        }
        if !(1..=MAX_CONCURRENCY).contains(&self.side_effect_concurrency) {
            return Err(ConfigError::Invalid(format!(
                "side_effect_concurrency must be within 1..={MAX_CONCURRENCY}"
            )));
        }

        self.queue_table().map(|_| ())
    }

    /// Default queue table with the overrides applied.
    pub fn queue_table(&self) -> Result<KindMap<QueueConfig>, ConfigError> {
        for name in self.queues.keys() {
            if ObjectKind::from_name(name).is_none() {
                return Err(ConfigError::Invalid(format!("unknown queue kind: {name}")));
            }
        }

        let table = KindMap::from_fn(|kind| {
            let base = default_queue_config(kind);
            match self.queues.get(kind.as_str()) {
                Some(o) => o.apply(base),
                None => base,
            }
        });

        for (kind, q) in table.iter() {
            if q.capacity == 0 {
                return Err(ConfigError::Invalid(format!("{kind}: capacity cannot be 0")));
            }
            if !(1..=MAX_CONCURRENCY).contains(&q.max_concurrency) {
                return Err(ConfigError::Invalid(format!(
                    "{kind}: max_concurrency must be within 1..={MAX_CONCURRENCY}"
                )));
            }
        }
        Ok(table)
    }

    /// Payload encoding named by `encoding`.
    pub fn encoding(&self) -> Result<Encoding, ConfigError> {
        Encoding::parse(&self.encoding).ok_or_else(|| {
            ConfigError::Invalid(format!("unsupported encoding: {}", self.encoding))
        })
    }

    pub fn core_topic_options(&self) -> CoreTopicOptions {
        CoreTopicOptions {
            subscribe_all_subnets: self.subscribe_all_subnets,
            disable_light_client_server: self.disable_light_client_server,
        }
    }
}
