//! Message identity digests.
//!
//! ## Formulas
//!
//! ```text
//! phase0:   sha256(domain ++ payload)[..20]
//! altair+:  sha256(domain ++ u64_le(len(topic)) ++ topic ++ payload)[..20]
//! fast:     sha256(raw_frame)[..8]
//! ```
//!
//! `domain` is `MESSAGE_DOMAIN_VALID_SNAPPY` over the decompressed payload,
//! or `MESSAGE_DOMAIN_INVALID_SNAPPY` over the raw frame when decompression
//! fails, so undecodable frames still de-duplicate.
//!
//! The fast identity is only a hint for dropping exact duplicates before
//! decompression. Canonical de-duplication always uses the full identity.

use sha2::{Digest, Sha256};

use super::entities::{FastMessageId, ForkName, MessageId};

pub const MESSAGE_DOMAIN_VALID_SNAPPY: [u8; 4] = [0x01, 0x00, 0x00, 0x00];
pub const MESSAGE_DOMAIN_INVALID_SNAPPY: [u8; 4] = [0x00, 0x00, 0x00, 0x00];

/// Full identity of a message whose payload decompressed successfully.
pub fn message_id(fork: ForkName, topic: &str, decompressed: &[u8]) -> MessageId {
    compute(MESSAGE_DOMAIN_VALID_SNAPPY, fork, topic, decompressed)
}

/// Full identity of a message whose payload failed to decompress.
pub fn invalid_message_id(fork: ForkName, topic: &str, raw: &[u8]) -> MessageId {
    compute(MESSAGE_DOMAIN_INVALID_SNAPPY, fork, topic, raw)
}

/// Fast identity over the raw frame. An absent payload maps to all zeroes.
pub fn fast_message_id(raw: Option<&[u8]>) -> FastMessageId {
    let mut id = [0u8; 8];
    if let Some(raw) = raw {
        id.copy_from_slice(&Sha256::digest(raw)[..8]);
    }
    FastMessageId(id)
}

fn compute(domain: [u8; 4], fork: ForkName, topic: &str, payload: &[u8]) -> MessageId {
    let mut hasher = Sha256::new();
    hasher.update(domain);
    if fork >= ForkName::Altair {
        hasher.update((topic.len() as u64).to_le_bytes());
        hasher.update(topic.as_bytes());
    }
    hasher.update(payload);

    let mut id = [0u8; 20];
    id.copy_from_slice(&hasher.finalize()[..20]);
    MessageId(id)
}
