//! In-crate implementations of outbound ports.
//!
//! - **peer_score**: application-level peer reputation behind [`PeerReporter`](crate::ports::outbound::PeerReporter)
//! - **side_effects**: bounded executor for effects of accepted objects

pub mod peer_score;
pub mod side_effects;

pub use peer_score::{maintenance_task, PeerRpcScoreStore, PeerStatus, SCORE_UPDATE_INTERVAL};
pub use side_effects::{SideEffectExecutor, SideEffectRunner};
