//! Peer score parameter publication.
//!
//! Rebuilds the full parameter set once per epoch and publishes it as an
//! immutable snapshot over a `watch` channel. Readers always see either the
//! old or the new set, never a mix.

use std::sync::Arc;

use quantum_telemetry::GossipMetrics;
use tokio::sync::watch;
use tracing::{info, warn};

use crate::domain::{ChainStateSnapshot, PeerScoreParams, ScoreParamsBuilder, ScoringError};

pub struct ScoreParamsService {
    builder: ScoreParamsBuilder,
    tx: watch::Sender<Arc<PeerScoreParams>>,
    metrics: GossipMetrics,
}

impl ScoreParamsService {
    /// Build the first snapshot. Fails if the initial chain state is unusable.
    pub fn new(
        builder: ScoreParamsBuilder,
        initial: ChainStateSnapshot,
        metrics: GossipMetrics,
    ) -> Result<Self, ScoringError> {
        let params = builder.build(initial)?;
        metrics.score_params_updates.inc();
        let (tx, _) = watch::channel(Arc::new(params));
        Ok(Self {
            builder,
            tx,
            metrics,
        })
    }

    pub fn subscribe(&self) -> watch::Receiver<Arc<PeerScoreParams>> {
        self.tx.subscribe()
    }

    pub fn current(&self) -> Arc<PeerScoreParams> {
        Arc::clone(&self.tx.borrow())
    }

    /// Rebuild for a new epoch. On error the previous snapshot stays published.
    pub fn on_epoch(&self, snapshot: ChainStateSnapshot) -> Result<Arc<PeerScoreParams>, ScoringError> {
        match self.builder.build(snapshot) {
            Ok(params) => {
                let params = Arc::new(params);
                self.tx.send_replace(Arc::clone(&params));
                self.metrics.score_params_updates.inc();
                info!(
                    epoch = params.epoch,
                    topics = params.topics.len(),
                    active_validators = snapshot.active_validators,
                    "Peer score parameters updated"
                );
                Ok(params)
            }
            Err(e) => {
                self.metrics.score_params_errors.inc();
                warn!(
                    error = %e,
                    slot = snapshot.current_slot,
                    "Peer score parameter rebuild failed, keeping previous set"
                );
                Err(e)
            }
        }
    }
}
