//! # Topic Codec
//!
//! Bidirectional mapping between [`TopicDescriptor`] and the flat topic string
//! exchanged with peers:
//!
//! ```text
//! /<namespace>/<fork-digest hex>/<kind>[_<subnet>]/<encoding>
//! /eth2/aabbccdd/beacon_attestation_3/ssz_snappy
//! ```
//!
//! `encode` is injective and `decode` is its inverse on the image of
//! `encode`. Every other string is a [`TopicError`], never a panic.

use std::collections::HashMap;

use sha2::{Digest, Sha256};

use super::entities::{Encoding, ForkDigest, ForkName, ObjectKind, TopicDescriptor};
use super::errors::TopicError;
use super::value_objects::{
    ChainSpec, ATTESTATION_SUBNET_COUNT, FORK_EPOCH_LOOKAHEAD, MAX_BLOBS_PER_BLOCK,
    SYNC_COMMITTEE_SUBNET_COUNT,
};

/// Default topic namespace.
pub const DEFAULT_NAMESPACE: &str = "eth2";

/// `sha256(version ++ 28 zero bytes ++ genesis_validators_root)[..4]`
pub fn compute_fork_digest(version: [u8; 4], genesis_validators_root: [u8; 32]) -> ForkDigest {
    let mut padded_version = [0u8; 32];
    padded_version[..4].copy_from_slice(&version);

    let mut hasher = Sha256::new();
    hasher.update(padded_version);
    hasher.update(genesis_validators_root);
    let hash = hasher.finalize();

    let mut digest = [0u8; 4];
    digest.copy_from_slice(&hash[..4]);
    ForkDigest(digest)
}

/// Fork schedule plus the digest of every fork for one chain.
///
/// Digests are unique per fork so `fork_digest` and `fork_for_digest` are
/// inverse bijections.
#[derive(Clone, Debug)]
pub struct ForkDigestContext {
    epochs: [u64; ForkName::COUNT],
    digests: [ForkDigest; ForkName::COUNT],
    by_digest: HashMap<ForkDigest, ForkName>,
}

impl ForkDigestContext {
    pub fn new(spec: &ChainSpec, genesis_validators_root: [u8; 32]) -> Result<Self, TopicError> {
        let digests = ForkName::ALL
            .map(|fork| compute_fork_digest(spec.fork(fork).version, genesis_validators_root));
        let mut by_digest = HashMap::with_capacity(ForkName::COUNT);
        for fork in ForkName::ALL {
            let digest = digests[fork.index()];
            if let Some(first) = by_digest.insert(digest, fork) {
                return Err(TopicError::DuplicateForkDigest {
                    first,
                    second: fork,
                    digest,
                });
            }
        }
        Ok(Self {
            epochs: ForkName::ALL.map(|fork| spec.fork(fork).epoch),
            digests,
            by_digest,
        })
    }

    pub fn fork_digest(&self, fork: ForkName) -> ForkDigest {
        self.digests[fork.index()]
    }

    pub fn fork_for_digest(&self, digest: ForkDigest) -> Result<ForkName, TopicError> {
        self.by_digest
            .get(&digest)
            .copied()
            .ok_or(TopicError::UnknownForkDigest(digest))
    }

    pub fn fork_epoch(&self, fork: ForkName) -> u64 {
        self.epochs[fork.index()]
    }

    /// Latest fork whose activation epoch is at or before `epoch`.
    pub fn fork_at_epoch(&self, epoch: u64) -> ForkName {
        ForkName::ALL
            .into_iter()
            .rev()
            .find(|fork| self.fork_epoch(*fork) <= epoch)
            .unwrap_or(ForkName::Phase0)
    }

    /// Forks whose topics must be subscribed at `epoch`.
    ///
    /// Around a transition both digests are live: the next fork from
    /// `FORK_EPOCH_LOOKAHEAD` epochs before activation, the previous fork until
    /// `FORK_EPOCH_LOOKAHEAD` epochs after.
    pub fn active_forks_at_epoch(&self, epoch: u64) -> Vec<ForkName> {
        let current = self.fork_at_epoch(epoch);
        let mut forks = Vec::with_capacity(2);

        if let Some(previous) = current.previous() {
            if epoch < self.fork_epoch(current).saturating_add(FORK_EPOCH_LOOKAHEAD) {
                forks.push(previous);
            }
        }
        forks.push(current);
        if let Some(next) = current.next() {
            if epoch >= self.fork_epoch(next).saturating_sub(FORK_EPOCH_LOOKAHEAD) {
                forks.push(next);
            }
        }
        forks
    }
}

/// Topic string codec bound to one namespace and fork digest context.
#[derive(Clone, Debug)]
pub struct TopicCodec {
    namespace: String,
    forks: ForkDigestContext,
}

impl TopicCodec {
    pub fn new(namespace: impl Into<String>, forks: ForkDigestContext) -> Self {
        Self {
            namespace: namespace.into(),
            forks,
        }
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn forks(&self) -> &ForkDigestContext {
        &self.forks
    }

    pub fn encode(&self, topic: &TopicDescriptor) -> String {
        let digest = self.forks.fork_digest(topic.fork()).to_hex();
        let encoding = topic.encoding().as_str();
        match topic.subnet_index() {
            Some(subnet) => format!(
                "/{}/{}/{}_{}/{}",
                self.namespace,
                digest,
                topic.kind().as_str(),
                subnet,
                encoding
            ),
            None => format!(
                "/{}/{}/{}/{}",
                self.namespace,
                digest,
                topic.kind().as_str(),
                encoding
            ),
        }
    }

    pub fn decode(&self, topic: &str) -> Result<TopicDescriptor, TopicError> {
        let malformed = || TopicError::Malformed(topic.to_string());

        let rest = topic.strip_prefix('/').ok_or_else(malformed)?;
        let mut parts = rest.split('/');
        let (Some(namespace), Some(digest), Some(name), Some(encoding), None) = (
            parts.next(),
            parts.next(),
            parts.next(),
            parts.next(),
            parts.next(),
        ) else {
            return Err(malformed());
        };

        if namespace != self.namespace {
            return Err(TopicError::WrongNamespace {
                expected: self.namespace.clone(),
                actual: namespace.to_string(),
            });
        }

        let fork = self.forks.fork_for_digest(ForkDigest::from_hex(digest)?)?;
        let (kind, subnet) = parse_topic_name(name)?;
        let encoding =
            Encoding::parse(encoding).ok_or_else(|| TopicError::UnknownEncoding(encoding.into()))?;

        TopicDescriptor::new(kind, fork, subnet, encoding)
    }
}

/// Split `<kind>[_<subnet>]` into its parts.
fn parse_topic_name(name: &str) -> Result<(ObjectKind, Option<u64>), TopicError> {
    // Exact names first: `sync_committee_contribution_and_proof` also starts
    // with the partitioned prefix `sync_committee_`.
    if let Some(kind) = ObjectKind::from_name(name) {
        return if kind.is_subnet_partitioned() {
            Err(TopicError::MissingSubnet(kind))
        } else {
            Ok((kind, None))
        };
    }

    for kind in ObjectKind::ALL.into_iter().filter(|k| k.is_subnet_partitioned()) {
        let Some(index) = name
            .strip_prefix(kind.as_str())
            .and_then(|rest| rest.strip_prefix('_'))
        else {
            continue;
        };
        return parse_subnet(index)
            .map(|subnet| (kind, Some(subnet)))
            .ok_or_else(|| TopicError::UnknownName(name.to_string()));
    }

    Err(TopicError::UnknownName(name.to_string()))
}

/// Canonical decimal only: no sign, no leading zeros.
fn parse_subnet(s: &str) -> Option<u64> {
    let canonical = !s.is_empty()
        && s.bytes().all(|b| b.is_ascii_digit())
        && (s == "0" || !s.starts_with('0'));
    if canonical {
        s.parse().ok()
    } else {
        None
    }
}

/// Options that change which topics a node subscribes to.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CoreTopicOptions {
    pub subscribe_all_subnets: bool,
    pub disable_light_client_server: bool,
}

/// Every topic a node subscribes to at `fork`.
pub fn core_topics_at_fork(fork: ForkName, opts: CoreTopicOptions) -> Vec<TopicDescriptor> {
    let mut kinds: Vec<(ObjectKind, Option<u64>)> = vec![
        (ObjectKind::BeaconBlock, None),
        (ObjectKind::BeaconAggregateAndProof, None),
        (ObjectKind::VoluntaryExit, None),
        (ObjectKind::ProposerSlashing, None),
        (ObjectKind::AttesterSlashing, None),
    ];

    if fork >= ForkName::Deneb {
        kinds.extend((0..MAX_BLOBS_PER_BLOCK).map(|i| (ObjectKind::BlobSidecar, Some(i))));
    }
    if fork >= ForkName::Capella {
        kinds.push((ObjectKind::BlsToExecutionChange, None));
    }
    if fork >= ForkName::Altair {
        kinds.push((ObjectKind::SyncCommitteeContributionAndProof, None));
        if !opts.disable_light_client_server {
            kinds.push((ObjectKind::LightClientOptimisticUpdate, None));
            kinds.push((ObjectKind::LightClientFinalityUpdate, None));
        }
    }
    if opts.subscribe_all_subnets {
        kinds.extend((0..ATTESTATION_SUBNET_COUNT).map(|i| (ObjectKind::BeaconAttestation, Some(i))));
        if fork >= ForkName::Altair {
            kinds.extend(
                (0..SYNC_COMMITTEE_SUBNET_COUNT).map(|i| (ObjectKind::SyncCommittee, Some(i))),
            );
        }
    }

    kinds
        .into_iter()
        .filter_map(|(kind, subnet)| {
            TopicDescriptor::new(kind, fork, subnet, Encoding::SszSnappy).ok()
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::collections::HashSet;

    fn codec() -> TopicCodec {
        let forks = ForkDigestContext::new(&ChainSpec::mainnet(), [7u8; 32]).unwrap();
        TopicCodec::new(DEFAULT_NAMESPACE, forks)
    }

    fn descriptor_strategy() -> impl Strategy<Value = TopicDescriptor> {
        (0..ObjectKind::COUNT, 0..ForkName::COUNT, 0u64..64).prop_map(|(k, f, s)| {
            let kind = ObjectKind::ALL[k];
            let subnet = kind.subnet_count().map(|count| s % count);
            TopicDescriptor::new(kind, ForkName::ALL[f], subnet, Encoding::SszSnappy).unwrap()
        })
    }

    #[test]
    fn test_block_topic_round_trip() {
        let codec = codec();
        let desc = TopicDescriptor::global(ObjectKind::BeaconBlock, ForkName::Capella).unwrap();
        let digest = codec.forks().fork_digest(ForkName::Capella).to_hex();

        let topic = codec.encode(&desc);
        assert_eq!(topic, format!("/eth2/{digest}/beacon_block/ssz_snappy"));
        assert_eq!(codec.decode(&topic).unwrap(), desc);
    }

    #[test]
    fn test_subnet_topic_format() {
        let codec = codec();
        let desc = TopicDescriptor::subnet(ObjectKind::BeaconAttestation, ForkName::Deneb, 3).unwrap();
        let topic = codec.encode(&desc);
        assert!(topic.ends_with("/beacon_attestation_3/ssz_snappy"));
        assert_eq!(codec.decode(&topic).unwrap().subnet_index(), Some(3));
    }

    #[test]
    fn test_contribution_not_confused_with_sync_subnet() {
        let codec = codec();
        let desc = TopicDescriptor::global(
            ObjectKind::SyncCommitteeContributionAndProof,
            ForkName::Altair,
        )
        .unwrap();
        assert_eq!(codec.decode(&codec.encode(&desc)).unwrap(), desc);
    }

    #[test]
    fn test_decode_rejects_garbage() {
        let codec = codec();
        let digest = codec.forks().fork_digest(ForkName::Deneb).to_hex();
        let bad = [
            String::new(),
            "/".to_string(),
            "eth2/aabbccdd/beacon_block/ssz_snappy".to_string(),
            format!("/eth2/{digest}/beacon_block/ssz_snappy/extra"),
            format!("/eth3/{digest}/beacon_block/ssz_snappy"),
            "/eth2/zzzzzzzz/beacon_block/ssz_snappy".to_string(),
            "/eth2/ffffffff/beacon_block/ssz_snappy".to_string(),
            format!("/eth2/{digest}/beacon_blocks/ssz_snappy"),
            format!("/eth2/{digest}/beacon_block/ssz"),
            format!("/eth2/{digest}/beacon_attestation/ssz_snappy"),
            format!("/eth2/{digest}/beacon_attestation_64/ssz_snappy"),
            format!("/eth2/{digest}/beacon_attestation_03/ssz_snappy"),
            format!("/eth2/{digest}/beacon_attestation_+3/ssz_snappy"),
            format!("/eth2/{digest}/beacon_block_1/ssz_snappy"),
            format!("/eth2/{digest}/sync_committee_99999999999999999999999/ssz_snappy"),
        ];
        for topic in bad {
            assert!(codec.decode(&topic).is_err(), "accepted {topic:?}");
        }
    }

    #[test]
    fn test_fork_digest_changes_with_root() {
        let version = [1, 0, 0, 0];
        assert_ne!(
            compute_fork_digest(version, [0u8; 32]),
            compute_fork_digest(version, [1u8; 32])
        );
    }

    #[test]
    fn test_duplicate_fork_versions_rejected() {
        let mut spec = ChainSpec::mainnet();
        spec.forks[ForkName::Deneb.index()].version = spec.forks[ForkName::Capella.index()].version;
        assert!(matches!(
            ForkDigestContext::new(&spec, [0u8; 32]),
            Err(TopicError::DuplicateForkDigest {
                first: ForkName::Capella,
                second: ForkName::Deneb,
                ..
            })
        ));
    }

    #[test]
    fn test_active_forks_around_transition() {
        let ctx = ForkDigestContext::new(&ChainSpec::mainnet(), [0u8; 32]).unwrap();
        let deneb = ctx.fork_epoch(ForkName::Deneb);

        assert_eq!(ctx.active_forks_at_epoch(deneb - 3), vec![ForkName::Capella]);
        assert_eq!(
            ctx.active_forks_at_epoch(deneb - 2),
            vec![ForkName::Capella, ForkName::Deneb]
        );
        assert_eq!(
            ctx.active_forks_at_epoch(deneb + 1),
            vec![ForkName::Capella, ForkName::Deneb]
        );
        assert_eq!(ctx.active_forks_at_epoch(deneb + 2), vec![ForkName::Deneb]);
        assert_eq!(ctx.active_forks_at_epoch(0), vec![ForkName::Phase0]);
    }

    #[test]
    fn test_core_topics_per_fork() {
        let defaults = CoreTopicOptions::default();
        assert_eq!(core_topics_at_fork(ForkName::Phase0, defaults).len(), 5);
        // + contribution + 2 light client
        assert_eq!(core_topics_at_fork(ForkName::Altair, defaults).len(), 8);
        // + bls change
        assert_eq!(core_topics_at_fork(ForkName::Capella, defaults).len(), 9);
        // + 6 blob sidecars
        assert_eq!(core_topics_at_fork(ForkName::Deneb, defaults).len(), 15);

        let no_lc = CoreTopicOptions {
            disable_light_client_server: true,
            ..defaults
        };
        assert_eq!(core_topics_at_fork(ForkName::Deneb, no_lc).len(), 13);

        let all = CoreTopicOptions {
            subscribe_all_subnets: true,
            ..defaults
        };
        assert_eq!(core_topics_at_fork(ForkName::Phase0, all).len(), 5 + 64);
        assert_eq!(core_topics_at_fork(ForkName::Deneb, all).len(), 15 + 64 + 4);
    }

    proptest! {
        #[test]
        fn prop_round_trip(desc in descriptor_strategy()) {
            let codec = codec();
            prop_assert_eq!(codec.decode(&codec.encode(&desc)).unwrap(), desc);
        }

        #[test]
        fn prop_injective(a in descriptor_strategy(), b in descriptor_strategy()) {
            let codec = codec();
            prop_assert_eq!(a == b, codec.encode(&a) == codec.encode(&b));
        }

        #[test]
        fn prop_decode_never_panics(s in "\\PC*") {
            let _ = codec().decode(&s);
        }
    }

    #[test]
    fn test_every_descriptor_has_distinct_topic() {
        let codec = codec();
        let mut seen = HashSet::new();
        for fork in ForkName::ALL {
            for kind in ObjectKind::ALL {
                let subnets: Vec<Option<u64>> = match kind.subnet_count() {
                    Some(count) => (0..count).map(Some).collect(),
                    None => vec![None],
                };
                for subnet in subnets {
                    let desc = TopicDescriptor::new(kind, fork, subnet, Encoding::SszSnappy).unwrap();
                    assert!(seen.insert(codec.encode(&desc)));
                }
            }
        }
    }
}
