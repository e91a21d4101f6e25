//! # Domain Layer for the Gossip Pipeline
//!
//! Pure logic with no I/O. This is the innermost layer of the hexagonal
//! architecture.
//!
//! ## Contents
//!
//! - **entities**: `ObjectKind`, `KindMap`, `TopicDescriptor`, `RawMessage`, `QueueEntry`
//! - **value_objects**: protocol constants, queue policy, `Verdict`, `PeerAction`
//! - **topic**: topic string codec and fork digest context
//! - **topic_cache**: set-if-absent topic lookup shared by workers
//! - **message_id**: message identity digests
//! - **transform**: snappy payload transform
//! - **queue**: bounded admission queue with drop policy
//! - **scoring**: peer score parameter builder
//! - **errors**: error enums

mod entities;
mod errors;
mod message_id;
mod queue;
mod scoring;
mod topic;
mod topic_cache;
mod transform;
mod value_objects;

pub use entities::*;
pub use errors::*;
pub use message_id::*;
pub use queue::*;
pub use scoring::*;
pub use topic::*;
pub use topic_cache::*;
pub use transform::*;
pub use value_objects::*;
