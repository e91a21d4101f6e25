//! Hexagonal ports of the gossip pipeline.

pub mod inbound;
pub mod outbound;
