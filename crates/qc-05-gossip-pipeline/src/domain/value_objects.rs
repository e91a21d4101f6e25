//! Value objects: protocol constants, queue policy and verdicts.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::entities::{ForkName, KindMap, ObjectKind};

// =============================================================================
// PROTOCOL CONSTANTS
// =============================================================================

/// Attestation subnets (`beacon_attestation_{0..64}`)
pub const ATTESTATION_SUBNET_COUNT: u64 = 64;
/// Sync committee subnets (`sync_committee_{0..4}`)
pub const SYNC_COMMITTEE_SUBNET_COUNT: u64 = 4;
/// Blob sidecar topics (`blob_sidecar_{0..6}`)
pub const MAX_BLOBS_PER_BLOCK: u64 = 6;
/// Epochs around a fork during which both digests are active
pub const FORK_EPOCH_LOOKAHEAD: u64 = 2;

/// Activation epoch and version of one fork.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ForkSchedule {
    pub epoch: u64,
    pub version: [u8; 4],
}

/// Chain constants the pipeline reads. Never mutated at runtime.
#[derive(Clone, Debug, PartialEq)]
pub struct ChainSpec {
    pub seconds_per_slot: u64,
    pub slots_per_epoch: u64,
    pub target_committee_size: u64,
    pub max_committees_per_slot: u64,
    pub target_aggregators_per_committee: u64,
    /// Indexed by [`ForkName::index`]
    pub forks: [ForkSchedule; ForkName::COUNT],
}

impl ChainSpec {
    /// Mainnet parameters and fork schedule.
    pub fn mainnet() -> Self {
        Self {
            seconds_per_slot: 12,
            slots_per_epoch: 32,
            target_committee_size: 128,
            max_committees_per_slot: 64,
            target_aggregators_per_committee: 16,
            forks: [
                ForkSchedule {
                    epoch: 0,
                    version: [0x00, 0x00, 0x00, 0x00],
                },
                ForkSchedule {
                    epoch: 74240,
                    version: [0x01, 0x00, 0x00, 0x00],
                },
                ForkSchedule {
                    epoch: 144896,
                    version: [0x02, 0x00, 0x00, 0x00],
                },
                ForkSchedule {
                    epoch: 194048,
                    version: [0x03, 0x00, 0x00, 0x00],
                },
                ForkSchedule {
                    epoch: 269568,
                    version: [0x04, 0x00, 0x00, 0x00],
                },
            ],
        }
    }

    pub fn fork(&self, fork: ForkName) -> ForkSchedule {
        self.forks[fork.index()]
    }

    pub fn slot_duration(&self) -> Duration {
        Duration::from_secs(self.seconds_per_slot)
    }

    pub fn epoch_duration(&self) -> Duration {
        Duration::from_secs(self.seconds_per_slot * self.slots_per_epoch)
    }

    pub fn epoch_at_slot(&self, slot: u64) -> u64 {
        slot / self.slots_per_epoch
    }
}

impl Default for ChainSpec {
    fn default() -> Self {
        Self::mainnet()
    }
}

// =============================================================================
// ADMISSION QUEUE POLICY
// =============================================================================

/// Processing order of an admission queue.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueueOrder {
    /// Arrival order; a full queue refuses new entries.
    Fifo,
    /// Newest first; a full queue evicts its oldest entry.
    Lifo,
}

/// Ceiling for any configured worker or effect concurrency.
pub const MAX_CONCURRENCY: usize = 4096;

/// Capacity, order and concurrency ceiling of one kind's queue.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueConfig {
    pub capacity: usize,
    pub order: QueueOrder,
    pub max_concurrency: usize,
}

impl QueueConfig {
    pub const fn fifo(capacity: usize) -> Self {
        Self {
            capacity,
            order: QueueOrder::Fifo,
            max_concurrency: 1,
        }
    }

    pub const fn lifo(capacity: usize, max_concurrency: usize) -> Self {
        Self {
            capacity,
            order: QueueOrder::Lifo,
            max_concurrency,
        }
    }
}

/// Default queue table.
///
/// Strictly ordered kinds (blocks, blobs, slashings) are FIFO with a single
/// worker. Attestation-like traffic is LIFO so that under overload the newest
/// votes are validated first.
pub fn default_queue_config(kind: ObjectKind) -> QueueConfig {
    match kind {
        ObjectKind::BeaconBlock => QueueConfig::fifo(1024),
        ObjectKind::BlobSidecar => QueueConfig::fifo(4096),
        ObjectKind::BeaconAggregateAndProof => QueueConfig::lifo(5120, 16),
        ObjectKind::BeaconAttestation => QueueConfig::lifo(24576, 64),
        ObjectKind::VoluntaryExit => QueueConfig::fifo(4096),
        ObjectKind::ProposerSlashing => QueueConfig::fifo(4096),
        ObjectKind::AttesterSlashing => QueueConfig::fifo(4096),
        ObjectKind::SyncCommitteeContributionAndProof => QueueConfig::lifo(4096, 16),
        ObjectKind::SyncCommittee => QueueConfig::lifo(4096, 64),
        ObjectKind::LightClientFinalityUpdate => QueueConfig::fifo(1024),
        ObjectKind::LightClientOptimisticUpdate => QueueConfig::fifo(1024),
        ObjectKind::BlsToExecutionChange => QueueConfig::fifo(16384),
    }
}

pub fn default_queue_table() -> KindMap<QueueConfig> {
    KindMap::from_fn(default_queue_config)
}

// =============================================================================
// VERDICTS
// =============================================================================

/// Machine-readable reason attached to an ignore or reject.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ReasonCode(pub &'static str);

impl ReasonCode {
    pub const MALFORMED_PAYLOAD: ReasonCode = ReasonCode("MalformedPayload");
    pub const INVALID_SIGNATURE: ReasonCode = ReasonCode("InvalidSignature");
    pub const INTERNAL_ERROR: ReasonCode = ReasonCode("InternalError");

    pub fn as_str(&self) -> &'static str {
        self.0
    }
}

impl fmt::Display for ReasonCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0)
    }
}

/// Severity class of a peer penalty.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PeerAction {
    /// Disconnect and ban immediately
    Fatal,
    /// Roughly 5 occurrences before a ban
    LowToleranceError,
    /// Roughly 10 occurrences before a ban
    MidToleranceError,
    /// Roughly 50 occurrences before a ban
    HighToleranceError,
}

impl PeerAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            PeerAction::Fatal => "fatal",
            PeerAction::LowToleranceError => "low_tolerance",
            PeerAction::MidToleranceError => "mid_tolerance",
            PeerAction::HighToleranceError => "high_tolerance",
        }
    }
}

/// Default penalty class for a reject reason.
pub fn severity_for(code: ReasonCode) -> PeerAction {
    match code.as_str() {
        "MalformedPayload" | "InvalidSignature" | "InvalidSerialization" => {
            PeerAction::LowToleranceError
        }
        "WrongSubnet" | "InvalidSlot" | "NotAggregator" => PeerAction::MidToleranceError,
        "FutureSlot" | "PastSlot" => PeerAction::HighToleranceError,
        "InvalidForkDigest" => PeerAction::Fatal,
        _ => PeerAction::LowToleranceError,
    }
}

/// Gossip verdict returned to the substrate, exactly once per entry.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Verdict {
    Accept,
    Ignore(ReasonCode),
    Reject { reason: ReasonCode, action: PeerAction },
}

impl Verdict {
    /// Metric label.
    pub fn as_str(&self) -> &'static str {
        match self {
            Verdict::Accept => "accept",
            Verdict::Ignore(_) => "ignore",
            Verdict::Reject { .. } => "reject",
        }
    }

    pub fn reject(reason: ReasonCode) -> Self {
        Verdict::Reject {
            reason,
            action: severity_for(reason),
        }
    }
}
