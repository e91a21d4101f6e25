//! # Validation Stage
//!
//! Turns one queue entry into exactly one verdict.
//!
//! ## Flow
//!
//! ```text
//! QueueEntry
//!   │ inbound transform ── fail ──→ Reject(MalformedPayload)
//!   │ decode            ── fail ──→ Reject(MalformedPayload)
//!   │ business rule (own task)
//!   │    ├─ Ok(effect)         ──→ Accept, effect scheduled
//!   │    ├─ Classified Ignore  ──→ Ignore(code)
//!   │    ├─ Classified Reject  ──→ Reject(code), peer reported once
//!   │    └─ Internal / panic   ──→ Ignore(InternalError), never scored
//!   ▼
//! ValidationResultSink (exactly once)
//! ```

use std::sync::Arc;

use quantum_telemetry::GossipMetrics;
use tracing::{debug, warn};

use crate::adapters::side_effects::SideEffectExecutor;
use crate::domain::{
    severity_for, KindMap, ObjectDecodeError, ObjectKind, PayloadTransform, QueueEntry,
    ReasonCode, RuleAction, RuleError, Verdict,
};
use crate::ports::outbound::{
    GossipContext, KindHandler, PeerReporter, SideEffect, ValidationResultSink,
};

/// What the rule task produced, before mapping to a verdict.
enum RuleOutcome {
    Decoded(Result<Option<SideEffect>, RuleError>),
    DecodeFailed(ObjectDecodeError),
}

/// Per-entry validation shared by every worker.
pub struct Validator<O> {
    handlers: KindMap<Option<KindHandler<O>>>,
    transform: Arc<dyn PayloadTransform>,
    peer_reporter: Arc<dyn PeerReporter>,
    results: Arc<dyn ValidationResultSink>,
    effects: SideEffectExecutor,
    metrics: GossipMetrics,
}

impl<O: Send + 'static> Validator<O> {
    pub fn new(
        handlers: KindMap<Option<KindHandler<O>>>,
        transform: Arc<dyn PayloadTransform>,
        peer_reporter: Arc<dyn PeerReporter>,
        results: Arc<dyn ValidationResultSink>,
        effects: SideEffectExecutor,
        metrics: GossipMetrics,
    ) -> Self {
        Self {
            handlers,
            transform,
            peer_reporter,
            results,
            effects,
            metrics,
        }
    }

    pub fn has_handler(&self, kind: ObjectKind) -> bool {
        self.handlers[kind].is_some()
    }

    /// Validate `entry`, report the verdict and return it.
    pub async fn process(&self, entry: QueueEntry) -> Verdict {
        let kind = entry.descriptor.kind();
        let msg_id = entry.message.msg_id;
        let peer = entry.message.origin_peer;

        let verdict = self.evaluate(entry).await;

        if let Verdict::Reject { reason, action } = verdict {
            self.peer_reporter.report_peer(peer, action, reason);
            self.metrics
                .reject_reasons
                .with_label_values(&[kind.as_str(), reason.as_str()])
                .inc();
        }
        self.results.report_validation_result(msg_id, peer, verdict);
        self.metrics
            .verdicts
            .with_label_values(&[kind.as_str(), verdict.as_str()])
            .inc();

        debug!(
            kind = kind.as_str(),
            peer = %peer.short(),
            verdict = verdict.as_str(),
            code = reason_of(&verdict),
            "Gossip message validated"
        );
        verdict
    }

    async fn evaluate(&self, entry: QueueEntry) -> Verdict {
        let QueueEntry {
            descriptor,
            message,
            ..
        } = entry;
        let kind = descriptor.kind();

        let Some(handler) = self.handlers[kind].clone() else {
            return self.internal_fault(kind, "no handler registered");
        };

        let bytes = match self.transform.inbound(&message.payload) {
            Ok(bytes) => bytes,
            Err(e) => {
                debug!(kind = kind.as_str(), error = %e, "Payload transform failed");
                return Verdict::reject(ReasonCode::MALFORMED_PAYLOAD);
            }
        };

        let ctx = GossipContext {
            topic: descriptor,
            msg_id: message.msg_id,
            origin_peer: message.origin_peer,
            received_at: message.received_at,
        };

        // Own task so a panic in decoder or rule surfaces as a JoinError
        let task = tokio::spawn(async move {
            match handler.decoder.decode(&descriptor, &bytes) {
                Ok(object) => RuleOutcome::Decoded(handler.rule.validate(object, ctx).await),
                Err(e) => RuleOutcome::DecodeFailed(e),
            }
        });

        match task.await {
            Ok(RuleOutcome::DecodeFailed(e)) => {
                debug!(kind = kind.as_str(), error = %e, "Object decode failed");
                Verdict::reject(ReasonCode::MALFORMED_PAYLOAD)
            }
            Ok(RuleOutcome::Decoded(Ok(effect))) => {
                if let Some(effect) = effect {
                    self.effects.dispatch(kind, effect);
                }
                Verdict::Accept
            }
            Ok(RuleOutcome::Decoded(Err(RuleError::Classified {
                action: RuleAction::Ignore,
                code,
                ..
            }))) => Verdict::Ignore(code),
            Ok(RuleOutcome::Decoded(Err(RuleError::Classified {
                action: RuleAction::Reject,
                code,
                severity,
            }))) => Verdict::Reject {
                reason: code,
                action: severity.unwrap_or_else(|| severity_for(code)),
            },
            Ok(RuleOutcome::Decoded(Err(RuleError::Internal(e)))) => {
                self.internal_fault(kind, &format!("{e:#}"))
            }
            Err(join) if join.is_panic() => self.internal_fault(kind, "business rule panicked"),
            Err(join) => self.internal_fault(kind, &join.to_string()),
        }
    }

    fn internal_fault(&self, kind: ObjectKind, error: &str) -> Verdict {
        warn!(kind = kind.as_str(), error, "Internal fault during gossip validation");
        self.metrics
            .internal_errors
            .with_label_values(&[kind.as_str()])
            .inc();
        Verdict::Ignore(ReasonCode::INTERNAL_ERROR)
    }
}

fn reason_of(verdict: &Verdict) -> &'static str {
    match verdict {
        Verdict::Accept => "",
        Verdict::Ignore(code) => code.as_str(),
        Verdict::Reject { reason, .. } => reason.as_str(),
    }
}
