//! # Side-Effect Executor
//!
//! Runs the downstream effects of accepted gossip objects (op-pool inserts,
//! fork-choice notifications) off the verdict path.
//!
//! ```text
//!  validator ──dispatch()──→ [ bounded channel ] ──→ runner ──spawn──→ effect
//!     │                                               (semaphore)
//!     └── verdict returned immediately
//! ```
//!
//! A full channel drops the effect. Failures are logged and counted, never
//! fed back into the verdict: the gossip message was valid either way.
//!
//! The runner has its own stop signal. The pipeline raises it only after the
//! last validation job has finished, and the runner still executes every
//! effect already in the channel before returning.

use std::sync::Arc;

use quantum_telemetry::GossipMetrics;
use tokio::sync::{mpsc, watch, Semaphore};
use tracing::{info, warn};

use crate::domain::{ObjectKind, MAX_CONCURRENCY};
use crate::ports::outbound::SideEffect;

/// Default bound of the effect channel.
pub const DEFAULT_SIDE_EFFECT_QUEUE_CAPACITY: usize = 1024;
/// Default number of effects running at once.
pub const DEFAULT_SIDE_EFFECT_CONCURRENCY: usize = 16;

struct ScheduledEffect {
    kind: ObjectKind,
    effect: SideEffect,
}

/// Cloneable producer half.
#[derive(Clone)]
pub struct SideEffectExecutor {
    tx: mpsc::Sender<ScheduledEffect>,
    metrics: GossipMetrics,
}

/// Consumer half. Drive with [`SideEffectRunner::run`].
pub struct SideEffectRunner {
    rx: mpsc::Receiver<ScheduledEffect>,
    permits: Arc<Semaphore>,
    concurrency: usize,
    metrics: GossipMetrics,
}

impl SideEffectExecutor {
    pub fn new(
        capacity: usize,
        concurrency: usize,
        metrics: GossipMetrics,
    ) -> (Self, SideEffectRunner) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let concurrency = concurrency.clamp(1, MAX_CONCURRENCY);
        let runner = SideEffectRunner {
            rx,
            permits: Arc::new(Semaphore::new(concurrency)),
            concurrency,
            metrics: metrics.clone(),
        };
        (Self { tx, metrics }, runner)
    }

    /// Schedule `effect` without waiting. Returns `false` if it was dropped.
    pub fn dispatch(&self, kind: ObjectKind, effect: SideEffect) -> bool {
        let label = effect.label();
        match self.tx.try_send(ScheduledEffect { kind, effect }) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!(kind = kind.as_str(), effect = label, "Side-effect queue full, dropping");
                self.metrics
                    .side_effect_failures
                    .with_label_values(&[kind.as_str()])
                    .inc();
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                warn!(kind = kind.as_str(), effect = label, "Side-effect runner stopped, dropping");
                self.metrics
                    .side_effect_failures
                    .with_label_values(&[kind.as_str()])
                    .inc();
                false
            }
        }
    }
}

impl SideEffectRunner {
    /// Run effects until `stop` fires, then run whatever is still queued and
    /// wait for all of them.
    pub async fn run(mut self, mut stop: watch::Receiver<bool>) {
        loop {
            let scheduled = tokio::select! {
                biased;
                _ = stop.changed() => break,
                next = self.rx.recv() => match next {
                    Some(s) => s,
                    None => break,
                },
            };
            if !self.spawn(scheduled).await {
                break;
            }
        }

        // Later dispatches fail; buffered effects still run
        self.rx.close();
        let mut drained = 0usize;
        while let Some(scheduled) = self.rx.recv().await {
            drained += 1;
            if !self.spawn(scheduled).await {
                break;
            }
        }
        // Every permit back means every spawned effect has finished
        let _ = self.permits.acquire_many(self.concurrency as u32).await;
        info!(drained, "Side-effect runner stopped");
    }

    async fn spawn(&self, scheduled: ScheduledEffect) -> bool {
        let Ok(permit) = Arc::clone(&self.permits).acquire_owned().await else {
            return false;
        };
        let metrics = self.metrics.clone();
        tokio::spawn(async move {
            let _permit = permit;
            execute(scheduled, &metrics).await;
        });
        true
    }
}

async fn execute(scheduled: ScheduledEffect, metrics: &GossipMetrics) {
    let ScheduledEffect { kind, effect } = scheduled;
    let label = effect.label();
    // Own task so a panicking effect surfaces as a JoinError
    let outcome = tokio::spawn(effect.into_future()).await;
    let failure = match outcome {
        Ok(Ok(())) => return,
        Ok(Err(e)) => e.to_string(),
        Err(join) if join.is_panic() => "panicked".to_string(),
        Err(join) => join.to_string(),
    };
    warn!(kind = kind.as_str(), effect = label, error = %failure, "Side effect failed");
    metrics
        .side_effect_failures
        .with_label_values(&[kind.as_str()])
        .inc();
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn test_effects_run_and_failures_are_counted() {
        let metrics = GossipMetrics::new().unwrap();
        let (executor, runner) = SideEffectExecutor::new(8, 2, metrics.clone());
        let (stop_tx, stop_rx) = watch::channel(false);
        let handle = tokio::spawn(runner.run(stop_rx));

        let ran = Arc::new(AtomicUsize::new(0));
        let r = Arc::clone(&ran);
        assert!(executor.dispatch(
            ObjectKind::VoluntaryExit,
            SideEffect::new("op_pool_insert", async move {
                r.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }),
        ));
        assert!(executor.dispatch(
            ObjectKind::VoluntaryExit,
            SideEffect::new("op_pool_insert", async { anyhow::bail!("pool full") }),
        ));

        tokio::time::sleep(Duration::from_millis(50)).await;
        stop_tx.send(true).unwrap();
        handle.await.unwrap();

        assert_eq!(ran.load(Ordering::SeqCst), 1);
        assert_eq!(
            metrics
                .side_effect_failures
                .with_label_values(&["voluntary_exit"])
                .get(),
            1
        );
    }

    #[tokio::test]
    async fn test_panicking_effect_is_contained() {
        let metrics = GossipMetrics::new().unwrap();
        let (executor, runner) = SideEffectExecutor::new(8, 1, metrics.clone());
        let (stop_tx, stop_rx) = watch::channel(false);
        let handle = tokio::spawn(runner.run(stop_rx));

        executor.dispatch(
            ObjectKind::ProposerSlashing,
            SideEffect::new("boom", async { panic!("effect panicked") }),
        );
        tokio::time::sleep(Duration::from_millis(50)).await;
        stop_tx.send(true).unwrap();
        handle.await.unwrap();

        assert_eq!(
            metrics
                .side_effect_failures
                .with_label_values(&["proposer_slashing"])
                .get(),
            1
        );
    }

    #[tokio::test]
    async fn test_queued_effects_run_after_stop() {
        let metrics = GossipMetrics::new().unwrap();
        let (executor, runner) = SideEffectExecutor::new(8, 1, metrics.clone());
        let ran = Arc::new(AtomicUsize::new(0));
        for _ in 0..3 {
            let r = Arc::clone(&ran);
            assert!(executor.dispatch(
                ObjectKind::AttesterSlashing,
                SideEffect::new("op_pool_insert", async move {
                    tokio::time::sleep(Duration::from_millis(10)).await;
                    r.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                }),
            ));
        }

        // Stop is already raised when the runner starts
        let (stop_tx, stop_rx) = watch::channel(false);
        stop_tx.send(true).unwrap();
        runner.run(stop_rx).await;

        assert_eq!(ran.load(Ordering::SeqCst), 3);
        assert!(!executor.dispatch(
            ObjectKind::AttesterSlashing,
            SideEffect::new("late", async { Ok(()) }),
        ));
    }

    #[tokio::test]
    async fn test_full_channel_drops() {
        let metrics = GossipMetrics::new().unwrap();
        // Runner never started: the channel fills up
        let (executor, _runner) = SideEffectExecutor::new(1, 1, metrics.clone());
        assert!(executor.dispatch(ObjectKind::BeaconBlock, SideEffect::new("a", async { Ok(()) })));
        assert!(!executor.dispatch(ObjectKind::BeaconBlock, SideEffect::new("b", async { Ok(()) })));
        assert_eq!(
            metrics
                .side_effect_failures
                .with_label_values(&["beacon_block"])
                .get(),
            1
        );
    }
}
