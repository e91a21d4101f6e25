//! # Payload Transform
//!
//! Compression of gossip payloads, independent of the topic.
//!
//! ## Algorithm
//!
//! 1. **Inbound**: read the snappy block header, refuse anything declaring
//!    more than `max_size` bytes, then decompress the whole block
//! 2. **Outbound**: snappy block compression of the serialized object
//!
//! Inbound is all-or-nothing: a corrupt frame yields an error and no bytes.

use super::errors::TransformError;

/// Default ceiling on a decompressed gossip payload (10 MiB).
pub const DEFAULT_MAX_PAYLOAD_SIZE: usize = 10 * 1024 * 1024;

// =============================================================================
// TRANSFORM TRAIT
// =============================================================================

/// Symmetric payload codec applied to every topic.
pub trait PayloadTransform: Send + Sync {
    /// Wire bytes to object bytes. Fails closed on corrupt input.
    fn inbound(&self, data: &[u8]) -> Result<Vec<u8>, TransformError>;

    /// Object bytes to wire bytes.
    fn outbound(&self, data: &[u8]) -> Result<Vec<u8>, TransformError>;
}

// =============================================================================
// SNAPPY TRANSFORM
// =============================================================================

/// Snappy block-format transform used by `ssz_snappy` topics.
#[derive(Debug, Clone)]
pub struct SnappyTransform {
    max_size: usize,
}

impl SnappyTransform {
    pub fn new(max_size: usize) -> Self {
        Self { max_size }
    }

    pub fn max_size(&self) -> usize {
        self.max_size
    }
}

impl Default for SnappyTransform {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_PAYLOAD_SIZE)
    }
}

impl PayloadTransform for SnappyTransform {
    fn inbound(&self, data: &[u8]) -> Result<Vec<u8>, TransformError> {
        let size =
            snap::raw::decompress_len(data).map_err(|e| TransformError::Corrupt(e.to_string()))?;
        if size > self.max_size {
            return Err(TransformError::TooLarge {
                size,
                max: self.max_size,
            });
        }
        snap::raw::Decoder::new()
            .decompress_vec(data)
            .map_err(|e| TransformError::Corrupt(e.to_string()))
    }

    fn outbound(&self, data: &[u8]) -> Result<Vec<u8>, TransformError> {
        snap::raw::Encoder::new()
            .compress_vec(data)
            .map_err(|e| TransformError::Corrupt(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_inbound_inverts_outbound() {
        let transform = SnappyTransform::default();
        let data = b"attestation attestation attestation".repeat(10);
        let wire = transform.outbound(&data).unwrap();
        assert!(wire.len() < data.len());
        assert_eq!(transform.inbound(&wire).unwrap(), data);
    }

    #[test]
    fn test_corrupt_input_fails_closed() {
        let transform = SnappyTransform::default();
        let mut wire = transform.outbound(&[7u8; 256]).unwrap();
        let last = wire.len() - 1;
        wire.truncate(last);
        assert!(matches!(
            transform.inbound(&wire),
            Err(TransformError::Corrupt(_))
        ));
        assert!(transform.inbound(&[0xff, 0xff, 0xff, 0xff, 0xff, 0xff]).is_err());
    }

    #[test]
    fn test_oversized_payload_refused_before_decompression() {
        let transform = SnappyTransform::new(64);
        let wire = SnappyTransform::default().outbound(&[0u8; 65]).unwrap();
        assert_eq!(
            transform.inbound(&wire),
            Err(TransformError::TooLarge { size: 65, max: 64 })
        );
    }
}
