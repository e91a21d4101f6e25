//! Outbound ports (SPI) for the gossip pipeline.
//!
//! Implemented by the consensus and networking layers. The pipeline never
//! interprets consensus objects itself: decoding and semantic validation are
//! both behind these traits.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::SystemTime;

use async_trait::async_trait;

use crate::domain::{
    MessageId, ObjectDecodeError, PeerAction, PeerId, ReasonCode, RuleError, TopicDescriptor,
    Verdict,
};

/// Decodes a decompressed payload into the consensus layer's object type.
pub trait ObjectDecoder<O>: Send + Sync {
    fn decode(&self, topic: &TopicDescriptor, bytes: &[u8]) -> Result<O, ObjectDecodeError>;
}

/// Context handed to the business rule alongside the decoded object.
#[derive(Clone, Debug)]
pub struct GossipContext {
    pub topic: TopicDescriptor,
    pub msg_id: MessageId,
    pub origin_peer: PeerId,
    pub received_at: SystemTime,
}

/// Deferred downstream effect of an accepted object.
///
/// Runs on the side-effect executor, never on the verdict path.
pub struct SideEffect {
    label: &'static str,
    future: Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send + 'static>>,
}

impl SideEffect {
    pub fn new<F>(label: &'static str, future: F) -> Self
    where
        F: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        Self {
            label,
            future: Box::pin(future),
        }
    }

    pub fn label(&self) -> &'static str {
        self.label
    }

    pub(crate) fn into_future(
        self,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send + 'static>> {
        self.future
    }
}

impl fmt::Debug for SideEffect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SideEffect").field("label", &self.label).finish()
    }
}

/// Per-kind business rule supplied by the consensus layer.
///
/// `Ok(Some(effect))` accepts and schedules `effect`; `Ok(None)` accepts
/// with nothing to schedule. A classified error maps to ignore or reject;
/// an internal error or a panic maps to ignore and is never scored.
#[async_trait]
pub trait GossipHandler<O>: Send + Sync {
    async fn validate(&self, object: O, ctx: GossipContext) -> Result<Option<SideEffect>, RuleError>;
}

/// Decoder and business rule for one object kind.
pub struct KindHandler<O> {
    pub decoder: Arc<dyn ObjectDecoder<O>>,
    pub rule: Arc<dyn GossipHandler<O>>,
}

impl<O> Clone for KindHandler<O> {
    fn clone(&self) -> Self {
        Self {
            decoder: Arc::clone(&self.decoder),
            rule: Arc::clone(&self.rule),
        }
    }
}

/// Peer reputation sink. Called only from the reject path.
pub trait PeerReporter: Send + Sync {
    fn report_peer(&self, peer: PeerId, action: PeerAction, reason: ReasonCode);
}

/// Verdict sink of the pub/sub substrate.
pub trait ValidationResultSink: Send + Sync {
    fn report_validation_result(&self, msg_id: MessageId, peer: PeerId, verdict: Verdict);
}

/// Topic subscription control of the pub/sub substrate.
pub trait SubscriptionSink: Send + Sync {
    fn subscribe(&self, topic: &str);
    fn unsubscribe(&self, topic: &str);
}
