//! # Gossip Pipeline Service
//!
//! Wires admission queues, per-kind dispatchers, the validation stage, the
//! side-effect executor and shutdown.
//!
//! ## Architecture
//!
//! ```text
//!                 on_gossip_message()
//!                        │ topic cache lookup
//!                        ▼
//!   ┌───────────┬────────────────┬─────────────────────┐
//!   │ block     │ aggregate      │ attestation   ...   │  one JobQueue per kind
//!   │ FIFO 1024 │ LIFO 5120      │ LIFO 24576          │
//!   └─────┬─────┴───────┬────────┴──────────┬──────────┘
//!         │ dispatcher: permit (max_concurrency) then pop
//!         ▼             ▼                   ▼
//!      job task      job task  ...      job task        Validator::process
//!                        │
//!                        ▼
//!            verdict → ValidationResultSink
//! ```
//!
//! ## Concurrency
//!
//! A kind never has more than `max_concurrency` jobs in flight: a dispatcher
//! takes a semaphore permit before popping, and the permit travels with the
//! job task. Admission never blocks; a full queue applies its drop policy.
//!
//! ## Shutdown
//!
//! `shutdown()` closes every queue, signals the dispatchers and waits for
//! in-flight jobs. Only then is the side-effect runner stopped, so effects of
//! jobs accepted during shutdown still run. Entries still resident are
//! abandoned without a verdict and counted in the return value.
//!
//! Dropping a started pipeline without `shutdown()` aborts its dispatchers
//! and the side-effect runner; queued entries and effects are lost.

use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;
use quantum_telemetry::GossipMetrics;
use tokio::sync::{watch, Notify, Semaphore};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::adapters::side_effects::{SideEffectExecutor, SideEffectRunner};
use crate::config::GossipConfig;
use crate::domain::{
    fast_message_id, invalid_message_id, message_id, ConfigError, Encoding, FastMessageId,
    GossipError, JobQueue, KindMap, MessageId, ObjectKind, PayloadTransform, PushOutcome,
    QueueConfig, QueueEntry, QueueStats, RawMessage, SnappyTransform,
};
use crate::ports::inbound::GossipIngressApi;
use crate::ports::outbound::{
    GossipHandler, KindHandler, ObjectDecoder, PeerReporter, ValidationResultSink,
};

use super::registry::TopicRegistry;
use super::validator::Validator;

struct KindQueue {
    queue: JobQueue<QueueEntry>,
    notify: Notify,
    permits: Arc<Semaphore>,
    max_concurrency: usize,
}

impl KindQueue {
    fn new(kind: ObjectKind, config: QueueConfig) -> Self {
        Self {
            queue: JobQueue::new(kind, config),
            notify: Notify::new(),
            permits: Arc::new(Semaphore::new(config.max_concurrency)),
            max_concurrency: config.max_concurrency,
        }
    }

    fn in_flight(&self) -> usize {
        self.max_concurrency - self.permits.available_permits()
    }
}

struct PipelineInner<O> {
    registry: TopicRegistry,
    queues: KindMap<KindQueue>,
    validator: Validator<O>,
    transform: Arc<dyn PayloadTransform>,
    metrics: GossipMetrics,
}

/// Validation and dispatch pipeline for objects of type `O`.
pub struct GossipPipeline<O> {
    inner: Arc<PipelineInner<O>>,
    shutdown_tx: watch::Sender<bool>,
    effects_stop_tx: watch::Sender<bool>,
    dispatchers: Mutex<Vec<JoinHandle<()>>>,
    effects_runner: Mutex<Option<SideEffectRunner>>,
    effects_handle: Mutex<Option<JoinHandle<()>>>,
}

// =============================================================================
// BUILDER
// =============================================================================

/// Collects handlers and ports for a [`GossipPipeline`].
pub struct GossipPipelineBuilder<O> {
    config: GossipConfig,
    registry: TopicRegistry,
    handlers: KindMap<Option<KindHandler<O>>>,
    peer_reporter: Option<Arc<dyn PeerReporter>>,
    results: Option<Arc<dyn ValidationResultSink>>,
    transform: Option<Arc<dyn PayloadTransform>>,
    metrics: Option<GossipMetrics>,
}

impl<O: Send + 'static> GossipPipelineBuilder<O> {
    pub fn new(config: GossipConfig, registry: TopicRegistry) -> Self {
        Self {
            config,
            registry,
            handlers: KindMap::from_fn(|_| None),
            peer_reporter: None,
            results: None,
            transform: None,
            metrics: None,
        }
    }

    /// Decoder and business rule for `kind`.
    pub fn handler(
        mut self,
        kind: ObjectKind,
        decoder: Arc<dyn ObjectDecoder<O>>,
        rule: Arc<dyn GossipHandler<O>>,
    ) -> Self {
        self.handlers[kind] = Some(KindHandler { decoder, rule });
        self
    }

    pub fn peer_reporter(mut self, reporter: Arc<dyn PeerReporter>) -> Self {
        self.peer_reporter = Some(reporter);
        self
    }

    pub fn result_sink(mut self, sink: Arc<dyn ValidationResultSink>) -> Self {
        self.results = Some(sink);
        self
    }

    /// Replaces the transform selected by the configured encoding.
    pub fn transform(mut self, transform: Arc<dyn PayloadTransform>) -> Self {
        self.transform = Some(transform);
        self
    }

    /// Defaults to the process-wide instance.
    pub fn metrics(mut self, metrics: GossipMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn build(self) -> Result<GossipPipeline<O>, GossipError> {
        self.config.validate()?;
        let table = self.config.queue_table()?;
        let namespace = self.registry.codec().namespace();
        if namespace != self.config.namespace {
            return Err(ConfigError::Invalid(format!(
                "registry serves namespace {namespace:?}, configuration expects {:?}",
                self.config.namespace
            ))
            .into());
        }
        let peer_reporter = self.peer_reporter.ok_or_else(|| missing("peer_reporter"))?;
        let results = self.results.ok_or_else(|| missing("result_sink"))?;
        let metrics = self
            .metrics
            .unwrap_or_else(|| quantum_telemetry::metrics().clone());
        let encoding = self.config.encoding()?;
        let transform: Arc<dyn PayloadTransform> = match (self.transform, encoding) {
            (Some(t), _) => t,
            (None, Encoding::SszSnappy) => {
                Arc::new(SnappyTransform::new(self.config.max_payload_size))
            }
        };

        let (effects, effects_runner) = SideEffectExecutor::new(
            self.config.side_effect_queue_capacity,
            self.config.side_effect_concurrency,
            metrics.clone(),
        );
        let validator = Validator::new(
            self.handlers,
            Arc::clone(&transform),
            peer_reporter,
            results,
            effects,
            metrics.clone(),
        );
        let queues = KindMap::from_fn(|kind| KindQueue::new(kind, table[kind]));
        let (shutdown_tx, _) = watch::channel(false);
        let (effects_stop_tx, _) = watch::channel(false);

        Ok(GossipPipeline {
            inner: Arc::new(PipelineInner {
                registry: self.registry,
                queues,
                validator,
                transform,
                metrics,
            }),
            shutdown_tx,
            effects_stop_tx,
            dispatchers: Mutex::new(Vec::new()),
            effects_runner: Mutex::new(Some(effects_runner)),
            effects_handle: Mutex::new(None),
        })
    }
}

fn missing(port: &str) -> GossipError {
    ConfigError::Invalid(format!("pipeline built without {port}")).into()
}

// =============================================================================
// SERVICE
// =============================================================================

impl<O: Send + 'static> GossipPipeline<O> {
    pub fn builder(config: GossipConfig, registry: TopicRegistry) -> GossipPipelineBuilder<O> {
        GossipPipelineBuilder::new(config, registry)
    }

    pub fn registry(&self) -> &TopicRegistry {
        &self.inner.registry
    }

    /// Jobs of `kind` currently being validated.
    pub fn in_flight(&self, kind: ObjectKind) -> usize {
        self.inner.queues[kind].in_flight()
    }

    /// Spawn one dispatcher per kind and the side-effect runner.
    ///
    /// Must be called from within a Tokio runtime. Calling twice is a no-op.
    pub fn start(&self) {
        let Some(runner) = self.effects_runner.lock().take() else {
            debug!("Gossip pipeline already started");
            return;
        };
        let effects = tokio::spawn(runner.run(self.effects_stop_tx.subscribe()));
        *self.effects_handle.lock() = Some(effects);

        let mut dispatchers = self.dispatchers.lock();
        for kind in ObjectKind::ALL {
            if !self.inner.validator.has_handler(kind) {
                debug!(kind = kind.as_str(), "No handler registered, entries will be ignored");
            }
            let inner = Arc::clone(&self.inner);
            let shutdown = self.shutdown_tx.subscribe();
            dispatchers.push(tokio::spawn(dispatch_loop(inner, kind, shutdown)));
        }
        info!(dispatchers = dispatchers.len(), "Gossip pipeline started");
    }

    /// Stop admissions, wait for in-flight jobs and return the number of
    /// entries abandoned in the queues.
    pub async fn shutdown(&self) -> usize {
        for (_, q) in self.inner.queues.iter() {
            q.queue.close();
        }
        let _ = self.shutdown_tx.send(true);

        let dispatchers: Vec<JoinHandle<()>> = self.dispatchers.lock().drain(..).collect();
        for handle in dispatchers {
            if let Err(e) = handle.await {
                warn!(error = %e, "Dispatcher task failed");
            }
        }

        let mut abandoned = 0;
        for (kind, q) in self.inner.queues.iter() {
            // All permits back means no job of this kind is running
            let _ = q.permits.acquire_many(q.max_concurrency as u32).await;
            let left = q.queue.len();
            if left > 0 {
                debug!(kind = kind.as_str(), abandoned = left, "Queue abandoned on shutdown");
            }
            abandoned += left;
        }

        // Jobs are done, so no further effects can be dispatched
        let _ = self.effects_stop_tx.send(true);
        let effects = self.effects_handle.lock().take();
        if let Some(handle) = effects {
            if let Err(e) = handle.await {
                warn!(error = %e, "Side-effect runner failed");
            }
        }

        info!(abandoned, "Gossip pipeline stopped");
        abandoned
    }
}

impl<O> Drop for GossipPipeline<O> {
    fn drop(&mut self) {
        // Dispatchers hold the inner state; without this they park forever
        for handle in self.dispatchers.get_mut().drain(..) {
            handle.abort();
        }
        if let Some(handle) = self.effects_handle.get_mut().take() {
            handle.abort();
        }
    }
}

async fn dispatch_loop<O: Send + 'static>(
    inner: Arc<PipelineInner<O>>,
    kind: ObjectKind,
    mut shutdown: watch::Receiver<bool>,
) {
    let label = kind.as_str();
    loop {
        let permit = {
            let q = &inner.queues[kind];
            tokio::select! {
                biased;
                _ = shutdown.changed() => break,
                permit = Arc::clone(&q.permits).acquire_owned() => match permit {
                    Ok(p) => p,
                    Err(_) => break,
                },
            }
        };

        let entry = loop {
            let q = &inner.queues[kind];
            if let Some(entry) = q.queue.pop() {
                break Some(entry);
            }
            // notify_one stores a wakeup if a push lands before we wait
            tokio::select! {
                biased;
                _ = shutdown.changed() => break None,
                _ = q.notify.notified() => {}
            }
        };
        let Some(entry) = entry else { break };

        let job_inner = Arc::clone(&inner);
        tokio::spawn(async move {
            let _permit = permit;
            let metrics = &job_inner.metrics;
            metrics
                .queue_length
                .with_label_values(&[label])
                .set(job_inner.queues[kind].queue.len() as i64);
            metrics
                .queue_job_wait_time
                .with_label_values(&[label])
                .observe(entry.enqueued_at.elapsed().as_secs_f64());

            let concurrency = metrics.queue_concurrency.with_label_values(&[label]);
            concurrency.inc();
            let started = Instant::now();
            job_inner.validator.process(entry).await;
            metrics
                .queue_job_time
                .with_label_values(&[label])
                .observe(started.elapsed().as_secs_f64());
            concurrency.dec();
        });
    }
    debug!(kind = label, "Dispatcher stopped");
}

impl<O: Send + 'static> GossipIngressApi for GossipPipeline<O> {
    fn fast_message_id(&self, payload: Option<&[u8]>) -> FastMessageId {
        fast_message_id(payload)
    }

    fn message_id(&self, topic: &str, payload: &[u8]) -> Result<MessageId, GossipError> {
        let fork = self.inner.registry.resolve(topic)?.fork();
        Ok(match self.inner.transform.inbound(payload) {
            Ok(decompressed) => message_id(fork, topic, &decompressed),
            Err(_) => invalid_message_id(fork, topic, payload),
        })
    }

    fn on_gossip_message(&self, message: RawMessage) -> Result<PushOutcome, GossipError> {
        let descriptor = self.inner.registry.resolve(&message.topic)?;
        let kind = descriptor.kind();
        let q = &self.inner.queues[kind];

        let outcome = q.queue.push(QueueEntry::new(descriptor, message))?;
        if outcome.dropped_any() {
            self.inner
                .metrics
                .queue_dropped_jobs
                .with_label_values(&[kind.as_str()])
                .inc();
            debug!(kind = kind.as_str(), ?outcome, "Admission queue full");
        }
        if outcome != PushOutcome::Dropped {
            q.notify.notify_one();
        }
        self.inner
            .metrics
            .queue_length
            .with_label_values(&[kind.as_str()])
            .set(q.queue.len() as i64);
        Ok(outcome)
    }

    fn queue_stats(&self, kind: ObjectKind) -> QueueStats {
        self.inner.queues[kind].queue.stats()
    }

    fn all_queue_stats(&self) -> KindMap<QueueStats> {
        self.inner.queues.map(|_, q| q.queue.stats())
    }
}
