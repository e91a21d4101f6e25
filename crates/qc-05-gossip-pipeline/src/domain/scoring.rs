//! # Peer Score Parameters
//!
//! Derives the gossip peer-scoring parameters from expected message rates
//! instead of hand-tuned constants.
//!
//! ## Model
//!
//! Every counter decays once per `decay_interval` (one slot). A counter fed
//! at `rate` per interval with decay `d` converges to `rate / (1 - d)`, which
//! sets caps and thresholds:
//!
//! ```text
//! decay(t)            = 0.01 ^ (interval / t)      reaches 1% after t
//! convergence(d, r)   = r / (1 - d)
//! threshold(d, r)     = convergence(d, r) * d
//! ```
//!
//! ## Weights
//!
//! | Topic | Weight |
//! |-------|--------|
//! | beacon_block | 0.5 |
//! | beacon_aggregate_and_proof | 0.5 |
//! | beacon_attestation_{n} | 1/64 each |
//! | voluntary_exit, proposer_slashing, attester_slashing | 0.05 |
//! | bls_to_execution_change (reserved) | 0.05 |
//!
//! The maximum positive score is `(10 + 40) * Σweights = 110`; every negative
//! weight is expressed relative to it.

use std::collections::HashMap;
use std::time::Duration;

use super::entities::{ForkName, ObjectKind, TopicDescriptor};
use super::errors::ScoringError;
use super::topic::TopicCodec;
use super::value_objects::{ChainSpec, ATTESTATION_SUBNET_COUNT};

pub const GOSSIP_D: f64 = 8.0;

const MAX_IN_MESH_SCORE: f64 = 10.0;
const MAX_FIRST_MESSAGE_DELIVERIES_SCORE: f64 = 40.0;
const BEACON_BLOCK_WEIGHT: f64 = 0.5;
const BEACON_AGGREGATE_PROOF_WEIGHT: f64 = 0.5;
const VOLUNTARY_EXIT_WEIGHT: f64 = 0.05;
const PROPOSER_SLASHING_WEIGHT: f64 = 0.05;
const ATTESTER_SLASHING_WEIGHT: f64 = 0.05;
const BLS_TO_EXECUTION_CHANGE_WEIGHT: f64 = 0.05;
const BEACON_ATTESTATION_SUBNET_WEIGHT: f64 = 1.0 / ATTESTATION_SUBNET_COUNT as f64;

const DECAY_TO_ZERO: f64 = 0.01;
const MESH_MESSAGE_DELIVERIES_WINDOW: Duration = Duration::from_secs(12);

/// Upper bound of the positive topic score.
pub fn max_positive_score() -> f64 {
    (MAX_IN_MESH_SCORE + MAX_FIRST_MESSAGE_DELIVERIES_SCORE)
        * (BEACON_BLOCK_WEIGHT
            + BEACON_AGGREGATE_PROOF_WEIGHT
            + BEACON_ATTESTATION_SUBNET_WEIGHT * ATTESTATION_SUBNET_COUNT as f64
            + VOLUNTARY_EXIT_WEIGHT
            + PROPOSER_SLASHING_WEIGHT
            + ATTESTER_SLASHING_WEIGHT
            + BLS_TO_EXECUTION_CHANGE_WEIGHT)
}

/// Global score thresholds of the pub/sub substrate.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PeerScoreThresholds {
    pub gossip_threshold: f64,
    pub publish_threshold: f64,
    pub graylist_threshold: f64,
    pub accept_px_threshold: f64,
    pub opportunistic_graft_threshold: f64,
}

impl Default for PeerScoreThresholds {
    fn default() -> Self {
        Self {
            gossip_threshold: -4000.0,
            publish_threshold: -8000.0,
            graylist_threshold: -16000.0,
            accept_px_threshold: 100.0,
            opportunistic_graft_threshold: 5.0,
        }
    }
}

/// Scoring parameters of one topic.
///
/// A topic without mesh delivery tracking has every `mesh_*` field zeroed.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct TopicScoreParams {
    pub topic_weight: f64,

    pub time_in_mesh_weight: f64,
    pub time_in_mesh_quantum: Duration,
    pub time_in_mesh_cap: f64,

    pub first_message_deliveries_weight: f64,
    pub first_message_deliveries_decay: f64,
    pub first_message_deliveries_cap: f64,

    pub mesh_message_deliveries_weight: f64,
    pub mesh_message_deliveries_decay: f64,
    pub mesh_message_deliveries_threshold: f64,
    pub mesh_message_deliveries_cap: f64,
    pub mesh_message_deliveries_activation: Duration,
    pub mesh_message_deliveries_window: Duration,

    pub mesh_failure_penalty_weight: f64,
    pub mesh_failure_penalty_decay: f64,

    pub invalid_message_deliveries_weight: f64,
    pub invalid_message_deliveries_decay: f64,
}

/// Full parameter set, replaced wholesale on every rebuild.
#[derive(Debug, Clone, PartialEq)]
pub struct PeerScoreParams {
    /// Keyed by topic string
    pub topics: HashMap<String, TopicScoreParams>,
    pub topic_score_cap: f64,
    pub app_specific_weight: f64,
    pub ip_colocation_factor_weight: f64,
    pub ip_colocation_factor_threshold: f64,
    pub behaviour_penalty_weight: f64,
    pub behaviour_penalty_threshold: f64,
    pub behaviour_penalty_decay: f64,
    pub decay_interval: Duration,
    pub decay_to_zero: f64,
    pub retain_score: Duration,
    pub thresholds: PeerScoreThresholds,
    /// Epoch the set was built for
    pub epoch: u64,
}

/// Cheap chain-state read used as builder input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChainStateSnapshot {
    pub active_validators: u64,
    pub current_slot: u64,
}

/// Mesh delivery tracking inputs for a topic.
#[derive(Debug, Clone, Copy)]
struct MeshMessageInfo {
    decay_slots: u64,
    cap_factor: f64,
    activation_window: Duration,
    current_slot: u64,
}

#[derive(Debug, Clone, Copy)]
struct TopicScoreInput {
    topic_weight: f64,
    expected_message_rate: f64,
    first_message_decay_time: Duration,
    mesh: Option<MeshMessageInfo>,
}

/// Committees per slot and expected aggregators per slot.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AggregatorEstimate {
    pub committees_per_slot: u64,
    pub aggregators_per_slot: f64,
}

/// Pure builder over chain constants and a topic codec.
#[derive(Debug, Clone)]
pub struct ScoreParamsBuilder {
    spec: ChainSpec,
    codec: TopicCodec,
}

impl ScoreParamsBuilder {
    pub fn new(spec: ChainSpec, codec: TopicCodec) -> Self {
        Self { spec, codec }
    }

    pub fn codec(&self) -> &TopicCodec {
        &self.codec
    }

    fn decay_interval(&self) -> Duration {
        self.spec.slot_duration()
    }

    /// Per-interval multiplier reaching `DECAY_TO_ZERO` after `decay_time`.
    pub fn score_parameter_decay(&self, decay_time: Duration) -> f64 {
        let ticks = decay_time.as_secs_f64() / self.decay_interval().as_secs_f64();
        DECAY_TO_ZERO.powf(1.0 / ticks)
    }

    pub fn committee_count_per_slot(&self, active_validators: u64) -> u64 {
        (active_validators / self.spec.slots_per_epoch / self.spec.target_committee_size)
            .clamp(1, self.spec.max_committees_per_slot)
    }

    /// Expected aggregators per slot given committee sizes and the
    /// aggregator selection modulo. Never below one, so the aggregate topic
    /// always has a positive expected rate.
    pub fn expected_aggregator_count_per_slot(&self, active_validators: u64) -> AggregatorEstimate {
        let target = self.spec.target_aggregators_per_committee;
        let committees_per_slot = self.committee_count_per_slot(active_validators);
        let committees_per_epoch = committees_per_slot * self.spec.slots_per_epoch;

        let smaller_size = active_validators / committees_per_epoch;
        let larger_size = smaller_size + 1;
        let large_committees = active_validators - smaller_size * committees_per_epoch;
        let small_committees = committees_per_epoch - large_committees;

        let modulo_smaller = (smaller_size / target).max(1);
        let modulo_larger = (larger_size / target).max(1);
        let small_aggregators =
            (smaller_size as f64 / modulo_smaller as f64 * small_committees as f64).floor();
        let large_aggregators =
            (larger_size as f64 / modulo_larger as f64 * large_committees as f64).floor();

        AggregatorEstimate {
            committees_per_slot,
            aggregators_per_slot: ((small_aggregators + large_aggregators)
                / self.spec.slots_per_epoch as f64)
                .floor()
                .max(1.0),
        }
    }

    /// Build the complete parameter set for the forks active at the
    /// snapshot's epoch.
    pub fn build(&self, snapshot: ChainStateSnapshot) -> Result<PeerScoreParams, ScoringError> {
        if snapshot.active_validators == 0 {
            return Err(ScoringError::NoActiveValidators);
        }
        let estimate = self.expected_aggregator_count_per_slot(snapshot.active_validators);

        let epoch = self.spec.epoch_at_slot(snapshot.current_slot);
        let mut topics = HashMap::new();
        for fork in self.codec.forks().active_forks_at_epoch(epoch) {
            self.add_fork_topics(&mut topics, fork, snapshot, estimate)?;
        }

        let epoch_duration = self.spec.epoch_duration();
        let thresholds = PeerScoreThresholds::default();
        let behaviour_penalty_decay = self.score_parameter_decay(epoch_duration * 10);
        let behaviour_penalty_threshold = 6.0;
        let target_value = decay_convergence(
            behaviour_penalty_decay,
            10.0 / self.spec.slots_per_epoch as f64,
        ) - behaviour_penalty_threshold;
        let topic_score_cap = max_positive_score() * 0.5;

        Ok(PeerScoreParams {
            topics,
            topic_score_cap,
            app_specific_weight: 1.0,
            ip_colocation_factor_weight: -topic_score_cap,
            ip_colocation_factor_threshold: 3.0,
            behaviour_penalty_weight: thresholds.gossip_threshold / (target_value * target_value),
            behaviour_penalty_threshold,
            behaviour_penalty_decay,
            decay_interval: self.decay_interval(),
            decay_to_zero: DECAY_TO_ZERO,
            retain_score: epoch_duration * 100,
            thresholds,
            epoch,
        })
    }

    fn add_fork_topics(
        &self,
        topics: &mut HashMap<String, TopicScoreParams>,
        fork: ForkName,
        snapshot: ChainStateSnapshot,
        estimate: AggregatorEstimate,
    ) -> Result<(), ScoringError> {
        let slots_per_epoch = self.spec.slots_per_epoch;
        let epoch = self.spec.epoch_duration();
        let slot = self.spec.slot_duration();
        let mut insert = |kind: ObjectKind, params: TopicScoreParams| {
            if let Ok(desc) = TopicDescriptor::global(kind, fork) {
                topics.insert(self.codec.encode(&desc), params);
            }
        };

        let slashing = |weight: f64| TopicScoreInput {
            topic_weight: weight,
            expected_message_rate: 1.0 / 5.0 / slots_per_epoch as f64,
            first_message_decay_time: epoch * 100,
            mesh: None,
        };
        insert(
            ObjectKind::VoluntaryExit,
            self.topic_params(TopicScoreInput {
                topic_weight: VOLUNTARY_EXIT_WEIGHT,
                expected_message_rate: 4.0 / slots_per_epoch as f64,
                first_message_decay_time: epoch * 100,
                mesh: None,
            })?,
        );
        insert(
            ObjectKind::AttesterSlashing,
            self.topic_params(slashing(ATTESTER_SLASHING_WEIGHT))?,
        );
        insert(
            ObjectKind::ProposerSlashing,
            self.topic_params(slashing(PROPOSER_SLASHING_WEIGHT))?,
        );

        insert(
            ObjectKind::BeaconBlock,
            self.topic_params(TopicScoreInput {
                topic_weight: BEACON_BLOCK_WEIGHT,
                expected_message_rate: 1.0,
                first_message_decay_time: epoch * 20,
                mesh: Some(MeshMessageInfo {
                    decay_slots: slots_per_epoch * 5,
                    cap_factor: 3.0,
                    activation_window: epoch,
                    current_slot: snapshot.current_slot,
                }),
            })?,
        );

        insert(
            ObjectKind::BeaconAggregateAndProof,
            self.topic_params(TopicScoreInput {
                topic_weight: BEACON_AGGREGATE_PROOF_WEIGHT,
                expected_message_rate: estimate.aggregators_per_slot,
                first_message_decay_time: epoch,
                mesh: Some(MeshMessageInfo {
                    decay_slots: slots_per_epoch * 2,
                    cap_factor: 4.0,
                    activation_window: epoch,
                    current_slot: snapshot.current_slot,
                }),
            })?,
        );

        let multiple_bursts_per_subnet_per_epoch = estimate.committees_per_slot as f64
            >= (2 * ATTESTATION_SUBNET_COUNT) as f64 / slots_per_epoch as f64;
        let attestation = self.topic_params(TopicScoreInput {
            topic_weight: BEACON_ATTESTATION_SUBNET_WEIGHT,
            expected_message_rate: snapshot.active_validators as f64
                / ATTESTATION_SUBNET_COUNT as f64
                / slots_per_epoch as f64,
            first_message_decay_time: if multiple_bursts_per_subnet_per_epoch {
                epoch
            } else {
                epoch * 4
            },
            mesh: Some(MeshMessageInfo {
                decay_slots: if multiple_bursts_per_subnet_per_epoch {
                    slots_per_epoch * 4
                } else {
                    slots_per_epoch * 16
                },
                cap_factor: 16.0,
                activation_window: if multiple_bursts_per_subnet_per_epoch {
                    slot * (slots_per_epoch / 2 + 1) as u32
                } else {
                    epoch
                },
                current_slot: snapshot.current_slot,
            }),
        })?;
        for subnet in 0..ATTESTATION_SUBNET_COUNT {
            if let Ok(desc) = TopicDescriptor::subnet(ObjectKind::BeaconAttestation, fork, subnet) {
                topics.insert(self.codec.encode(&desc), attestation);
            }
        }
        Ok(())
    }

    fn topic_params(&self, input: TopicScoreInput) -> Result<TopicScoreParams, ScoringError> {
        if !(input.expected_message_rate.is_finite() && input.expected_message_rate > 0.0) {
            return Err(ScoringError::InvalidRate(input.expected_message_rate));
        }
        let max_positive = max_positive_score();
        let slot = self.spec.slot_duration();

        let time_in_mesh_cap = 3600.0 / slot.as_secs_f64();
        let first_message_deliveries_decay =
            self.score_parameter_decay(input.first_message_decay_time);
        let first_message_deliveries_cap = decay_convergence(
            first_message_deliveries_decay,
            2.0 * input.expected_message_rate / GOSSIP_D,
        );

        let mut params = TopicScoreParams {
            topic_weight: input.topic_weight,
            time_in_mesh_weight: MAX_IN_MESH_SCORE / time_in_mesh_cap,
            time_in_mesh_quantum: slot,
            time_in_mesh_cap,
            first_message_deliveries_weight: MAX_FIRST_MESSAGE_DELIVERIES_SCORE
                / first_message_deliveries_cap,
            first_message_deliveries_decay,
            first_message_deliveries_cap,
            invalid_message_deliveries_weight: -max_positive / input.topic_weight,
            invalid_message_deliveries_decay: self
                .score_parameter_decay(self.spec.epoch_duration() * 50),
            ..TopicScoreParams::default()
        };

        if let Some(mesh) = input.mesh {
            let decay = self.score_parameter_decay(slot * mesh.decay_slots as u32);
            let threshold = decay_threshold(decay, input.expected_message_rate / 50.0);
            let weight = -max_positive / (input.topic_weight * threshold * threshold);

            params.mesh_message_deliveries_decay = decay;
            params.mesh_message_deliveries_threshold = threshold;
            params.mesh_message_deliveries_cap = (mesh.cap_factor * threshold).max(2.0);
            params.mesh_message_deliveries_activation = mesh.activation_window;
            params.mesh_message_deliveries_window = MESH_MESSAGE_DELIVERIES_WINDOW;
            params.mesh_message_deliveries_weight = weight;
            params.mesh_failure_penalty_decay = decay;
            params.mesh_failure_penalty_weight = weight;

            // Young chain: not enough history for delivery-rate penalties.
            if mesh.decay_slots >= mesh.current_slot {
                params.mesh_message_deliveries_threshold = 0.0;
                params.mesh_message_deliveries_weight = 0.0;
            }
        }
        Ok(params)
    }
}

pub fn decay_convergence(decay: f64, rate: f64) -> f64 {
    rate / (1.0 - decay)
}

pub fn decay_threshold(decay: f64, rate: f64) -> f64 {
    decay_convergence(decay, rate) * decay
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ForkDigestContext, DEFAULT_NAMESPACE};

    fn builder() -> ScoreParamsBuilder {
        let spec = ChainSpec::mainnet();
        let forks = ForkDigestContext::new(&spec, [0u8; 32]).unwrap();
        ScoreParamsBuilder::new(spec, TopicCodec::new(DEFAULT_NAMESPACE, forks))
    }

    #[test]
    fn test_max_positive_score() {
        assert!((max_positive_score() - 110.0).abs() < 1e-9);
    }

    #[test]
    fn test_committee_count_clamped() {
        let b = builder();
        assert_eq!(b.committee_count_per_slot(1), 1);
        assert_eq!(b.committee_count_per_slot(16384), 4);
        assert_eq!(b.committee_count_per_slot(10_000_000), 64);
    }

    #[test]
    fn test_aggregators_at_genesis_size() {
        let estimate = builder().expected_aggregator_count_per_slot(16384);
        assert_eq!(estimate.committees_per_slot, 4);
        assert_eq!(estimate.aggregators_per_slot, 64.0);
    }

    #[test]
    fn test_tiny_validator_set_still_has_an_aggregator() {
        let b = builder();
        for active in [1, 31, 32] {
            let estimate = b.expected_aggregator_count_per_slot(active);
            assert_eq!(estimate.committees_per_slot, 1);
            assert_eq!(estimate.aggregators_per_slot, 1.0, "{active} validators");
        }
        let params = b
            .build(ChainStateSnapshot {
                active_validators: 1,
                current_slot: 0,
            })
            .unwrap();
        let aggregate = TopicDescriptor::global(ObjectKind::BeaconAggregateAndProof, ForkName::Phase0)
            .unwrap();
        let p = params.topics[&b.codec().encode(&aggregate)];
        assert!(p.first_message_deliveries_cap.is_finite());
        assert!(p.first_message_deliveries_cap > 0.0);
    }

    #[test]
    fn test_zero_validators_is_error() {
        let result = builder().build(ChainStateSnapshot {
            active_validators: 0,
            current_slot: 0,
        });
        assert_eq!(result, Err(ScoringError::NoActiveValidators));
    }

    #[test]
    fn test_decay_reaches_one_percent() {
        let b = builder();
        let decay = b.score_parameter_decay(Duration::from_secs(120));
        // 10 intervals of 12s
        assert!((decay.powi(10) - 0.01).abs() < 1e-12);
    }

    #[test]
    fn test_peer_level_params() {
        let params = builder()
            .build(ChainStateSnapshot {
                active_validators: 16384,
                current_slot: 0,
            })
            .unwrap();
        assert_eq!(params.topic_score_cap, 55.0);
        assert_eq!(params.ip_colocation_factor_weight, -55.0);
        assert_eq!(params.decay_interval, Duration::from_secs(12));
        assert_eq!(params.retain_score, Duration::from_secs(384 * 100));
        assert!((params.behaviour_penalty_decay - 0.98571).abs() < 5e-5);
        assert!((params.behaviour_penalty_weight - -15.8793).abs() < 5e-4);
        // 5 global topics + 64 subnets, phase0 only at epoch 0
        assert_eq!(params.topics.len(), 69);
    }
}
