//! Error types for the gossip pipeline.

use thiserror::Error;

use super::entities::{ForkDigest, ForkName, ObjectKind};
use super::value_objects::{PeerAction, ReasonCode};

/// Topic parse, encode and lookup failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TopicError {
    #[error("Topic must have the form /<namespace>/<digest>/<name>/<encoding>: {0}")]
    Malformed(String),

    #[error("Wrong namespace: expected {expected}, got {actual}")]
    WrongNamespace { expected: String, actual: String },

    #[error("Invalid fork digest: {0}")]
    InvalidForkDigest(String),

    #[error("Unknown fork digest: {0:?}")]
    UnknownForkDigest(ForkDigest),

    #[error("Forks {first} and {second} share digest {digest:?}")]
    DuplicateForkDigest {
        first: ForkName,
        second: ForkName,
        digest: ForkDigest,
    },

    #[error("Unknown topic name: {0}")]
    UnknownName(String),

    #[error("Unknown encoding: {0}")]
    UnknownEncoding(String),

    #[error("Topic kind {0} requires a subnet index")]
    MissingSubnet(ObjectKind),

    #[error("Topic kind {0} has no subnets")]
    UnexpectedSubnet(ObjectKind),

    #[error("Subnet {index} out of range for {kind} (count {count})")]
    SubnetOutOfRange {
        kind: ObjectKind,
        index: u64,
        count: u64,
    },

    #[error("Topic not subscribed: {0}")]
    UnknownTopic(String),
}

/// Payload compression failures. Inbound failures never yield partial output.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransformError {
    #[error("Corrupt compressed payload: {0}")]
    Corrupt(String),

    #[error("Decompressed size {size} exceeds limit {max}")]
    TooLarge { size: usize, max: usize },
}

/// Failure to decode a decompressed payload into a typed object.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Failed to decode {kind}: {reason}")]
pub struct ObjectDecodeError {
    pub kind: ObjectKind,
    pub reason: String,
}

/// Admission queue failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueueError {
    #[error("Queue for {0} is closed")]
    Closed(ObjectKind),
}

/// Outcome of a business rule that did not accept the object.
#[derive(Debug, Error)]
pub enum RuleError {
    /// Protocol-level decision: ignore or reject with a reason.
    #[error("{action:?}: {code}")]
    Classified {
        action: RuleAction,
        code: ReasonCode,
        /// Overrides the default penalty class for `code`
        severity: Option<PeerAction>,
    },

    /// A fault in the node itself. Never attributed to the peer.
    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl RuleError {
    pub fn ignore(code: ReasonCode) -> Self {
        RuleError::Classified {
            action: RuleAction::Ignore,
            code,
            severity: None,
        }
    }

    pub fn reject(code: ReasonCode) -> Self {
        RuleError::Classified {
            action: RuleAction::Reject,
            code,
            severity: None,
        }
    }

    pub fn reject_with(code: ReasonCode, severity: PeerAction) -> Self {
        RuleError::Classified {
            action: RuleAction::Reject,
            code,
            severity: Some(severity),
        }
    }
}

/// Action carried by a classified rule error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleAction {
    Ignore,
    Reject,
}

/// Invalid inputs to the peer score parameter builder.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ScoringError {
    #[error("Active validator count must be positive")]
    NoActiveValidators,

    #[error("Expected message rate must be positive and finite: {0}")]
    InvalidRate(f64),
}

/// Configuration loading and validation failures.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid config: {0}")]
    Invalid(String),
}

/// Top-level error of the gossip pipeline.
#[derive(Debug, Error)]
pub enum GossipError {
    #[error(transparent)]
    Topic(#[from] TopicError),

    #[error(transparent)]
    Transform(#[from] TransformError),

    #[error(transparent)]
    Queue(#[from] QueueError),

    #[error(transparent)]
    Scoring(#[from] ScoringError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Telemetry(#[from] quantum_telemetry::TelemetryError),
}
