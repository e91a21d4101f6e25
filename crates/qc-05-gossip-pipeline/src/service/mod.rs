//! Application services of the gossip pipeline.
//!
//! - **registry**: refcounted topic subscriptions and the decode cache
//! - **validator**: one queue entry to exactly one verdict
//! - **pipeline**: queues, dispatchers and shutdown behind [`GossipIngressApi`](crate::ports::inbound::GossipIngressApi)
//! - **scoring**: per-epoch peer score parameter publication

mod pipeline;
mod registry;
mod scoring;
mod validator;

pub use pipeline::{GossipPipeline, GossipPipelineBuilder};
pub use registry::{Subscription, TopicRegistry};
pub use scoring::ScoreParamsService;
pub use validator::Validator;
