//! # Gossip Message Pipeline (qc-05)
//!
//! Turns raw pub/sub messages into validated consensus objects and feeds the
//! verdicts back to the transport and to peer scoring.
//!
//! ## Architecture Role
//!
//! ```text
//! [pub/sub substrate] ──RawMessage──→ [Gossip Pipeline (5)]
//!         ↑                                   │ topic → kind → queue
//!         │                                   ↓
//!         │                     decompress → decode → business rule
//!         │                                   │
//!         └──────── verdict ──────────────────┤
//!                                             ├──→ peer reporter (reject only)
//!                                             └──→ side effects (accept only)
//! ```
//!
//! ## Components
//!
//! - **Topic codec**: `/eth2/<fork digest>/<kind>[_<subnet>]/ssz_snappy` both ways
//! - **Payload transform**: snappy block format with a size ceiling
//! - **Admission queues**: bounded per-kind FIFO/LIFO queues that drop instead of blocking
//! - **Validation**: one verdict per message, internal faults never penalize peers
//! - **Score parameters**: gossip peer-score parameters derived from chain state every epoch
//!
//! ## Guarantees
//!
//! - Every dequeued message receives exactly one verdict
//! - A peer is reported only on `Reject`, once per message
//! - At most `max_concurrency` jobs of a kind are in flight

#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod adapters;
pub mod config;
pub mod domain;
pub mod ports;
pub mod service;

pub use adapters::{
    maintenance_task, PeerRpcScoreStore, PeerStatus, SideEffectExecutor, SCORE_UPDATE_INTERVAL,
};
pub use config::{GossipConfig, QueueOverride};
pub use domain::*;
pub use ports::inbound::GossipIngressApi;
pub use ports::outbound::{
    GossipContext, GossipHandler, KindHandler, ObjectDecoder, PeerReporter, SideEffect,
    SubscriptionSink, ValidationResultSink,
};
pub use service::{
    GossipPipeline, GossipPipelineBuilder, ScoreParamsService, Subscription, TopicRegistry,
};
