//! Core domain entities for the gossip pipeline.

use std::fmt;
use std::ops::{Index, IndexMut};
use std::time::{Instant, SystemTime};

use super::errors::TopicError;
use super::value_objects::{
    ATTESTATION_SUBNET_COUNT, MAX_BLOBS_PER_BLOCK, SYNC_COMMITTEE_SUBNET_COUNT,
};

/// Semantic category of a gossiped object.
///
/// The set is closed: every per-kind table in the pipeline is a [`KindMap`],
/// so adding a variant here fails to compile until every table covers it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ObjectKind {
    BeaconBlock,
    BeaconAggregateAndProof,
    BeaconAttestation,
    VoluntaryExit,
    ProposerSlashing,
    AttesterSlashing,
    SyncCommitteeContributionAndProof,
    SyncCommittee,
    LightClientFinalityUpdate,
    LightClientOptimisticUpdate,
    BlsToExecutionChange,
    BlobSidecar,
}

impl ObjectKind {
    /// Number of kinds.
    pub const COUNT: usize = 12;

    /// Every kind, in declaration order.
    pub const ALL: [ObjectKind; Self::COUNT] = [
        ObjectKind::BeaconBlock,
        ObjectKind::BeaconAggregateAndProof,
        ObjectKind::BeaconAttestation,
        ObjectKind::VoluntaryExit,
        ObjectKind::ProposerSlashing,
        ObjectKind::AttesterSlashing,
        ObjectKind::SyncCommitteeContributionAndProof,
        ObjectKind::SyncCommittee,
        ObjectKind::LightClientFinalityUpdate,
        ObjectKind::LightClientOptimisticUpdate,
        ObjectKind::BlsToExecutionChange,
        ObjectKind::BlobSidecar,
    ];

    /// Position in [`ObjectKind::ALL`].
    pub const fn index(self) -> usize {
        self as usize
    }

    /// Topic name segment, without subnet suffix.
    pub const fn as_str(self) -> &'static str {
        match self {
            ObjectKind::BeaconBlock => "beacon_block",
            ObjectKind::BeaconAggregateAndProof => "beacon_aggregate_and_proof",
            ObjectKind::BeaconAttestation => "beacon_attestation",
            ObjectKind::VoluntaryExit => "voluntary_exit",
            ObjectKind::ProposerSlashing => "proposer_slashing",
            ObjectKind::AttesterSlashing => "attester_slashing",
            ObjectKind::SyncCommitteeContributionAndProof => {
                "sync_committee_contribution_and_proof"
            }
            ObjectKind::SyncCommittee => "sync_committee",
            ObjectKind::LightClientFinalityUpdate => "light_client_finality_update",
            ObjectKind::LightClientOptimisticUpdate => "light_client_optimistic_update",
            ObjectKind::BlsToExecutionChange => "bls_to_execution_change",
            ObjectKind::BlobSidecar => "blob_sidecar",
        }
    }

    /// Inverse of [`ObjectKind::as_str`].
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.as_str() == name)
    }

    /// Number of subnets for partitioned kinds, `None` otherwise.
    pub const fn subnet_count(self) -> Option<u64> {
        match self {
            ObjectKind::BeaconAttestation => Some(ATTESTATION_SUBNET_COUNT),
            ObjectKind::SyncCommittee => Some(SYNC_COMMITTEE_SUBNET_COUNT),
            ObjectKind::BlobSidecar => Some(MAX_BLOBS_PER_BLOCK),
            _ => None,
        }
    }

    /// Whether topics of this kind carry a subnet index.
    pub const fn is_subnet_partitioned(self) -> bool {
        self.subnet_count().is_some()
    }
}

impl fmt::Display for ObjectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Total map from [`ObjectKind`] to `V`, backed by an array.
#[derive(Clone, Debug, PartialEq)]
pub struct KindMap<V>([V; ObjectKind::COUNT]);

impl<V> KindMap<V> {
    /// Build the map by calling `f` once per kind.
    pub fn from_fn(mut f: impl FnMut(ObjectKind) -> V) -> Self {
        Self(std::array::from_fn(|i| f(ObjectKind::ALL[i])))
    }

    pub fn get(&self, kind: ObjectKind) -> &V {
        &self.0[kind.index()]
    }

    pub fn get_mut(&mut self, kind: ObjectKind) -> &mut V {
        &mut self.0[kind.index()]
    }

    /// Iterate `(kind, value)` pairs in declaration order.
    pub fn iter(&self) -> impl Iterator<Item = (ObjectKind, &V)> {
        ObjectKind::ALL.into_iter().zip(self.0.iter())
    }

    /// Map every value, keeping the kind association.
    pub fn map<U>(&self, mut f: impl FnMut(ObjectKind, &V) -> U) -> KindMap<U> {
        KindMap::from_fn(|kind| f(kind, self.get(kind)))
    }
}

impl<V> Index<ObjectKind> for KindMap<V> {
    type Output = V;

    fn index(&self, kind: ObjectKind) -> &V {
        self.get(kind)
    }
}

impl<V> IndexMut<ObjectKind> for KindMap<V> {
    fn index_mut(&mut self, kind: ObjectKind) -> &mut V {
        self.get_mut(kind)
    }
}

/// Protocol fork, ordered by activation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ForkName {
    Phase0,
    Altair,
    Bellatrix,
    Capella,
    Deneb,
}

impl ForkName {
    pub const COUNT: usize = 5;

    pub const ALL: [ForkName; Self::COUNT] = [
        ForkName::Phase0,
        ForkName::Altair,
        ForkName::Bellatrix,
        ForkName::Capella,
        ForkName::Deneb,
    ];

    pub const fn index(self) -> usize {
        self as usize
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            ForkName::Phase0 => "phase0",
            ForkName::Altair => "altair",
            ForkName::Bellatrix => "bellatrix",
            ForkName::Capella => "capella",
            ForkName::Deneb => "deneb",
        }
    }

    pub fn previous(self) -> Option<ForkName> {
        self.index().checked_sub(1).map(|i| Self::ALL[i])
    }

    pub fn next(self) -> Option<ForkName> {
        Self::ALL.get(self.index() + 1).copied()
    }
}

impl fmt::Display for ForkName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 4-byte digest identifying a fork's ruleset on the wire.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ForkDigest(pub [u8; 4]);

impl ForkDigest {
    /// Lowercase hex, no `0x` prefix.
    pub fn to_hex(self) -> String {
        hex::encode(self.0)
    }

    /// Parse exactly 8 lowercase hex characters.
    ///
    /// Uppercase is refused so that each digest has a single textual form.
    pub fn from_hex(s: &str) -> Result<Self, TopicError> {
        let canonical = s.len() == 8
            && s
                .bytes()
                .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b));
        if !canonical {
            return Err(TopicError::InvalidForkDigest(s.to_string()));
        }
        let mut out = [0u8; 4];
        hex::decode_to_slice(s, &mut out)
            .map_err(|_| TopicError::InvalidForkDigest(s.to_string()))?;
        Ok(Self(out))
    }
}

/// Wire encoding of a topic's payload.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum Encoding {
    #[default]
    SszSnappy,
}

impl Encoding {
    pub const fn as_str(self) -> &'static str {
        match self {
            Encoding::SszSnappy => "ssz_snappy",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "ssz_snappy" => Some(Encoding::SszSnappy),
            _ => None,
        }
    }
}

/// Structured form of a gossip topic.
///
/// Fields are private: the constructor enforces that `subnet` is present
/// exactly when the kind is subnet-partitioned and lies within its range.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct TopicDescriptor {
    kind: ObjectKind,
    fork: ForkName,
    subnet: Option<u64>,
    encoding: Encoding,
}

impl TopicDescriptor {
    pub fn new(
        kind: ObjectKind,
        fork: ForkName,
        subnet: Option<u64>,
        encoding: Encoding,
    ) -> Result<Self, TopicError> {
        match (kind.subnet_count(), subnet) {
            (None, None) => {}
            (None, Some(_)) => return Err(TopicError::UnexpectedSubnet(kind)),
            (Some(_), None) => return Err(TopicError::MissingSubnet(kind)),
            (Some(count), Some(index)) if index >= count => {
                return Err(TopicError::SubnetOutOfRange { kind, index, count })
            }
            (Some(_), Some(_)) => {}
        }
        Ok(Self {
            kind,
            fork,
            subnet,
            encoding,
        })
    }

    /// Descriptor for a kind without subnets, using the default encoding.
    pub fn global(kind: ObjectKind, fork: ForkName) -> Result<Self, TopicError> {
        Self::new(kind, fork, None, Encoding::default())
    }

    /// Descriptor for a subnet-partitioned kind, using the default encoding.
    pub fn subnet(kind: ObjectKind, fork: ForkName, index: u64) -> Result<Self, TopicError> {
        Self::new(kind, fork, Some(index), Encoding::default())
    }

    pub fn kind(&self) -> ObjectKind {
        self.kind
    }

    pub fn fork(&self) -> ForkName {
        self.fork
    }

    pub fn subnet_index(&self) -> Option<u64> {
        self.subnet
    }

    pub fn encoding(&self) -> Encoding {
        self.encoding
    }
}

/// Unique identifier for a peer in the network.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct PeerId(pub [u8; 32]);

impl PeerId {
    pub fn new(id: [u8; 32]) -> Self {
        Self(id)
    }

    /// Short hex form for log lines.
    pub fn short(&self) -> String {
        hex::encode(&self.0[..6])
    }
}

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.short())
    }
}

/// 20-byte message identity used by the substrate for de-duplication.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct MessageId(pub [u8; 20]);

/// 8-byte identity over the raw frame, computed before decompression.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct FastMessageId(pub [u8; 8]);

/// A message exactly as received from the substrate.
#[derive(Clone, Debug)]
pub struct RawMessage {
    /// Identity the substrate uses to correlate the verdict
    pub msg_id: MessageId,
    /// Topic string the message arrived on
    pub topic: String,
    /// Compressed payload
    pub payload: Vec<u8>,
    /// Peer that propagated the message to us
    pub origin_peer: PeerId,
    /// Wall-clock arrival time
    pub received_at: SystemTime,
}

/// A raw message resident in an admission queue.
#[derive(Clone, Debug)]
pub struct QueueEntry {
    pub descriptor: TopicDescriptor,
    pub message: RawMessage,
    /// Monotonic admission time, for wait-time metrics
    pub enqueued_at: Instant,
}

impl QueueEntry {
    pub fn new(descriptor: TopicDescriptor, message: RawMessage) -> Self {
        Self {
            descriptor,
            message,
            enqueued_at: Instant::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_index_matches_all() {
        for (i, kind) in ObjectKind::ALL.iter().enumerate() {
            assert_eq!(kind.index(), i);
        }
    }

    #[test]
    fn test_kind_map_total() {
        let mut map = KindMap::from_fn(|_| 0u32);
        map[ObjectKind::BlobSidecar] += 2;
        assert_eq!(map.iter().count(), ObjectKind::COUNT);
        assert_eq!(*map.get(ObjectKind::BlobSidecar), 2);
        assert_eq!(map[ObjectKind::BeaconBlock], 0);
    }

    #[test]
    fn test_descriptor_subnet_invariant() {
        assert!(TopicDescriptor::global(ObjectKind::BeaconBlock, ForkName::Deneb).is_ok());
        assert_eq!(
            TopicDescriptor::global(ObjectKind::BeaconAttestation, ForkName::Deneb),
            Err(TopicError::MissingSubnet(ObjectKind::BeaconAttestation))
        );
        assert_eq!(
            TopicDescriptor::subnet(ObjectKind::BeaconBlock, ForkName::Deneb, 0),
            Err(TopicError::UnexpectedSubnet(ObjectKind::BeaconBlock))
        );
        assert!(matches!(
            TopicDescriptor::subnet(ObjectKind::SyncCommittee, ForkName::Altair, 4),
            Err(TopicError::SubnetOutOfRange { count: 4, .. })
        ));
    }

    #[test]
    fn test_fork_digest_hex_is_canonical() {
        let digest = ForkDigest::from_hex("aabbccdd").unwrap();
        assert_eq!(digest.0, [0xaa, 0xbb, 0xcc, 0xdd]);
        assert_eq!(digest.to_hex(), "aabbccdd");
        assert!(ForkDigest::from_hex("AABBCCDD").is_err());
        assert!(ForkDigest::from_hex("0xaabbcc").is_err());
        assert!(ForkDigest::from_hex("aabbcc").is_err());
    }

    #[test]
    fn test_fork_ladder() {
        assert!(ForkName::Phase0 < ForkName::Altair);
        assert_eq!(ForkName::Phase0.previous(), None);
        assert_eq!(ForkName::Capella.next(), Some(ForkName::Deneb));
        assert_eq!(ForkName::Deneb.next(), None);
    }
}
