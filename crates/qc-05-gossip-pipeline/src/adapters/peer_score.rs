//! # Peer RPC Score Store
//!
//! Application-level peer reputation fed by the reject path of the
//! validation pipeline.
//!
//! ## Score Model
//!
//! A single score per peer in `[-100, 100]`, starting at 0 and decaying
//! exponentially towards 0 with a 10 minute half-life.
//!
//! | Action | Delta |
//! |--------|-------|
//! | `Fatal` | -200 (straight to the floor) |
//! | `LowToleranceError` | -10 |
//! | `MidToleranceError` | -5 |
//! | `HighToleranceError` | -1 |
//!
//! ## State Thresholds
//!
//! | Score | State |
//! |-------|-------|
//! | `> -20` | Healthy |
//! | `<= -20` | Disconnected |
//! | `<= -50` | Banned |
//!
//! Banned peers do not decay for 30 minutes after the ban.
//!
//! ## Maintenance
//!
//! Decay and pruning happen in [`PeerRpcScoreStore::update`]. The owner of the
//! store drives it with [`maintenance_task`]; without it scores never decay.
//! The number of tracked peers is capped on insert either way.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use std::sync::Arc;

use parking_lot::RwLock;
use quantum_telemetry::GossipMetrics;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::domain::{PeerAction, PeerId, ReasonCode};
use crate::ports::outbound::PeerReporter;

/// Score of a peer never seen before
pub const DEFAULT_SCORE: f64 = 0.0;
/// Score at or below which a peer is disconnected
pub const MIN_SCORE_BEFORE_DISCONNECT: f64 = -20.0;
/// Score at or below which a peer is banned
pub const MIN_SCORE_BEFORE_BAN: f64 = -50.0;
pub const MAX_SCORE: f64 = 100.0;
pub const MIN_SCORE: f64 = -100.0;
/// Scores closer to zero than this are pruned on `update`
const SCORE_THRESHOLD: f64 = 1.0;
const SCORE_HALFLIFE: Duration = Duration::from_secs(10 * 60);
const BANNED_BEFORE_DECAY: Duration = Duration::from_secs(30 * 60);
/// Upper bound on tracked peers
const MAX_ENTRIES: usize = 1000;
/// Default period of [`maintenance_task`]
pub const SCORE_UPDATE_INTERVAL: Duration = Duration::from_secs(30);

/// Score delta applied for an action.
pub fn action_score(action: PeerAction) -> f64 {
    match action {
        PeerAction::Fatal => -(MAX_SCORE - MIN_SCORE),
        PeerAction::LowToleranceError => -10.0,
        PeerAction::MidToleranceError => -5.0,
        PeerAction::HighToleranceError => -1.0,
    }
}

/// Connection state derived from a score.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeerStatus {
    Healthy,
    Disconnected,
    Banned,
}

impl PeerStatus {
    pub fn from_score(score: f64) -> Self {
        if score <= MIN_SCORE_BEFORE_BAN {
            PeerStatus::Banned
        } else if score <= MIN_SCORE_BEFORE_DISCONNECT {
            PeerStatus::Disconnected
        } else {
            PeerStatus::Healthy
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct PeerRpcScore {
    score: f64,
    last_update: Instant,
    /// Decay is suspended until this instant after a ban
    frozen_until: Option<Instant>,
}

impl PeerRpcScore {
    fn new(now: Instant) -> Self {
        Self {
            score: DEFAULT_SCORE,
            last_update: now,
            frozen_until: None,
        }
    }

    fn add(&mut self, delta: f64, now: Instant) {
        let before = PeerStatus::from_score(self.score);
        self.score = (self.score + delta).clamp(MIN_SCORE, MAX_SCORE);
        if before != PeerStatus::Banned && PeerStatus::from_score(self.score) == PeerStatus::Banned
        {
            self.frozen_until = Some(now + BANNED_BEFORE_DECAY);
        }
    }

    fn decay(&mut self, now: Instant) -> f64 {
        if let Some(until) = self.frozen_until {
            if now < until {
                self.last_update = now;
                return self.score;
            }
            self.frozen_until = None;
            self.last_update = self.last_update.max(until);
        }
        let elapsed = now.saturating_duration_since(self.last_update);
        let rate = -std::f64::consts::LN_2 / SCORE_HALFLIFE.as_secs_f64();
        self.score *= (rate * elapsed.as_secs_f64()).exp();
        self.last_update = now;
        self.score
    }
}

/// In-memory store of application-level peer scores.
pub struct PeerRpcScoreStore {
    scores: RwLock<HashMap<PeerId, PeerRpcScore>>,
    metrics: GossipMetrics,
}

impl PeerRpcScoreStore {
    pub fn new(metrics: GossipMetrics) -> Self {
        Self {
            scores: RwLock::new(HashMap::new()),
            metrics,
        }
    }

    pub fn score(&self, peer: &PeerId) -> f64 {
        self.scores
            .read()
            .get(peer)
            .map(|s| s.score)
            .unwrap_or(DEFAULT_SCORE)
    }

    pub fn status(&self, peer: &PeerId) -> PeerStatus {
        PeerStatus::from_score(self.score(peer))
    }

    pub fn tracked_peers(&self) -> usize {
        self.scores.read().len()
    }

    /// Apply `action` to `peer` at `now`.
    ///
    /// A new peer arriving at capacity replaces the tracked peer closest to
    /// a neutral score.
    pub fn apply_action_at(&self, peer: PeerId, action: PeerAction, now: Instant) -> f64 {
        let mut scores = self.scores.write();
        if scores.len() >= MAX_ENTRIES && !scores.contains_key(&peer) {
            let closest = scores
                .iter()
                .min_by(|a, b| a.1.score.abs().total_cmp(&b.1.score.abs()))
                .map(|(p, _)| *p);
            if let Some(evicted) = closest {
                scores.remove(&evicted);
            }
        }
        let entry = scores.entry(peer).or_insert_with(|| PeerRpcScore::new(now));
        entry.add(action_score(action), now);
        entry.score
    }

    /// Decay every score to `now`, pruning near-zero entries.
    pub fn update_at(&self, now: Instant) {
        let mut scores = self.scores.write();
        scores.retain(|_, s| s.decay(now).abs() >= SCORE_THRESHOLD);

        if scores.len() > MAX_ENTRIES {
            // Forget the peers closest to neutral first
            let mut ranked: Vec<(PeerId, f64)> =
                scores.iter().map(|(p, s)| (*p, s.score.abs())).collect();
            ranked.sort_by(|a, b| a.1.total_cmp(&b.1));
            let excess = scores.len() - MAX_ENTRIES;
            for (peer, _) in ranked.into_iter().take(excess) {
                scores.remove(&peer);
            }
        }
    }

    /// Periodic maintenance, driven by [`maintenance_task`].
    pub fn update(&self) {
        self.update_at(Instant::now());
    }
}

/// Background task decaying and pruning `store` every `interval` until
/// `shutdown` fires.
pub async fn maintenance_task(
    store: Arc<PeerRpcScoreStore>,
    interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            biased;
            _ = shutdown.changed() => break,
            _ = ticker.tick() => store.update(),
        }
    }
    info!(tracked = store.tracked_peers(), "Peer score maintenance stopped");
}

impl PeerReporter for PeerRpcScoreStore {
    fn report_peer(&self, peer: PeerId, action: PeerAction, reason: ReasonCode) {
        let before = self.status(&peer);
        let score = self.apply_action_at(peer, action, Instant::now());
        let after = PeerStatus::from_score(score);
        self.metrics
            .peer_reports
            .with_label_values(&[action.as_str()])
            .inc();

        if after != before {
            warn!(
                peer = %peer.short(),
                action = action.as_str(),
                %reason,
                score,
                status = ?after,
                "Peer status changed"
            );
        } else {
            debug!(peer = %peer.short(), action = action.as_str(), %reason, score, "Peer penalized");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> PeerRpcScoreStore {
        PeerRpcScoreStore::new(GossipMetrics::new().unwrap())
    }

    fn peer(n: u8) -> PeerId {
        PeerId::new([n; 32])
    }

    #[test]
    fn test_unknown_peer_is_healthy() {
        let s = store();
        assert_eq!(s.score(&peer(1)), DEFAULT_SCORE);
        assert_eq!(s.status(&peer(1)), PeerStatus::Healthy);
    }

    #[test]
    fn test_fatal_bans_immediately() {
        let s = store();
        s.report_peer(peer(1), PeerAction::Fatal, ReasonCode("InvalidForkDigest"));
        assert_eq!(s.score(&peer(1)), MIN_SCORE);
        assert_eq!(s.status(&peer(1)), PeerStatus::Banned);
    }

    #[test]
    fn test_low_tolerance_thresholds() {
        let s = store();
        let now = Instant::now();
        s.apply_action_at(peer(2), PeerAction::LowToleranceError, now);
        assert_eq!(s.status(&peer(2)), PeerStatus::Healthy);
        s.apply_action_at(peer(2), PeerAction::LowToleranceError, now);
        assert_eq!(s.status(&peer(2)), PeerStatus::Disconnected);
        for _ in 0..3 {
            s.apply_action_at(peer(2), PeerAction::LowToleranceError, now);
        }
        assert_eq!(s.score(&peer(2)), -50.0);
        assert_eq!(s.status(&peer(2)), PeerStatus::Banned);
    }

    #[test]
    fn test_score_is_clamped() {
        let s = store();
        let now = Instant::now();
        for _ in 0..30 {
            s.apply_action_at(peer(3), PeerAction::LowToleranceError, now);
        }
        assert_eq!(s.score(&peer(3)), MIN_SCORE);
    }

    #[test]
    fn test_half_life_decay() {
        let s = store();
        let start = Instant::now();
        for _ in 0..3 {
            s.apply_action_at(peer(4), PeerAction::MidToleranceError, start);
        }
        assert_eq!(s.score(&peer(4)), -15.0);
        s.update_at(start + SCORE_HALFLIFE);
        assert!((s.score(&peer(4)) + 7.5).abs() < 1e-9);
    }

    #[test]
    fn test_banned_peer_does_not_decay_during_ban() {
        let s = store();
        let start = Instant::now();
        s.apply_action_at(peer(5), PeerAction::Fatal, start);
        s.update_at(start + Duration::from_secs(20 * 60));
        assert_eq!(s.score(&peer(5)), MIN_SCORE);
        s.update_at(start + BANNED_BEFORE_DECAY + SCORE_HALFLIFE);
        assert!((s.score(&peer(5)) + 50.0).abs() < 1e-6);
    }

    #[test]
    fn test_near_zero_scores_are_pruned() {
        let s = store();
        let start = Instant::now();
        s.apply_action_at(peer(6), PeerAction::HighToleranceError, start);
        assert_eq!(s.tracked_peers(), 1);
        s.update_at(start + Duration::from_secs(60));
        assert_eq!(s.tracked_peers(), 0);
    }

    #[test]
    fn test_tracked_peers_are_capped_on_insert() {
        let s = store();
        let now = Instant::now();
        s.apply_action_at(PeerId::new([0xff; 32]), PeerAction::Fatal, now);
        for i in 0..MAX_ENTRIES as u32 + 50 {
            let mut id = [0u8; 32];
            id[..4].copy_from_slice(&i.to_le_bytes());
            s.apply_action_at(PeerId::new(id), PeerAction::HighToleranceError, now);
        }
        assert_eq!(s.tracked_peers(), MAX_ENTRIES);
        // The banned peer is the last one to be forgotten
        assert_eq!(s.status(&PeerId::new([0xff; 32])), PeerStatus::Banned);
    }

    #[tokio::test]
    async fn test_maintenance_task_prunes_until_shutdown() {
        let s = Arc::new(store());
        s.apply_action_at(peer(8), PeerAction::HighToleranceError, Instant::now());
        assert_eq!(s.tracked_peers(), 1);

        let (stop_tx, stop_rx) = watch::channel(false);
        let handle = tokio::spawn(maintenance_task(
            Arc::clone(&s),
            Duration::from_millis(10),
            stop_rx,
        ));
        tokio::time::sleep(Duration::from_millis(50)).await;
        // -1 decays below the prune threshold on the first tick after any delay
        assert_eq!(s.tracked_peers(), 0);

        stop_tx.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .unwrap()
            .unwrap();
    }

    #[test]
    fn test_reports_are_counted() {
        let metrics = GossipMetrics::new().unwrap();
        let s = PeerRpcScoreStore::new(metrics.clone());
        s.report_peer(peer(7), PeerAction::MidToleranceError, ReasonCode("WrongSubnet"));
        assert_eq!(
            metrics
                .peer_reports
                .with_label_values(&["mid_tolerance"])
                .get(),
            1
        );
    }
}
