//! Inbound ports (API) for the gossip pipeline.
//!
//! Driven by the pub/sub substrate on every received message.

use crate::domain::{
    FastMessageId, GossipError, KindMap, MessageId, ObjectKind, PushOutcome, QueueStats,
    RawMessage,
};

/// Admission API exposed to the transport substrate.
pub trait GossipIngressApi: Send + Sync {
    /// Pre-decompression duplicate hint over the raw frame.
    fn fast_message_id(&self, payload: Option<&[u8]>) -> FastMessageId;

    /// Canonical message identity. Falls back to the invalid-snappy domain
    /// when the payload does not decompress.
    fn message_id(&self, topic: &str, payload: &[u8]) -> Result<MessageId, GossipError>;

    /// Admit a raw message into its kind's queue. Never blocks.
    ///
    /// Errors only for topics the node has not subscribed to or after
    /// shutdown; a backpressure drop is reported as `Ok(PushOutcome::Dropped)`.
    fn on_gossip_message(&self, message: RawMessage) -> Result<PushOutcome, GossipError>;

    /// Counters of one kind's queue.
    fn queue_stats(&self, kind: ObjectKind) -> QueueStats;

    /// Counters of every queue.
    fn all_queue_stats(&self) -> KindMap<QueueStats>;
}
