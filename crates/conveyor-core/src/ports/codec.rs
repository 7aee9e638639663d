//! PayloadCodec port - payload の at-rest 変換（圧縮）
//!
//! Payloads are compressed at rest; the algorithm is an external concern, so
//! the store only sees this seam. [`PassthroughCodec`] is the development
//! implementation; a real codec (deflate, zstd, ...) lives with the
//! production store adapter.

use crate::domain::EngineError;

/// Converts a raw payload to and from its at-rest form.
pub trait PayloadCodec: Send + Sync {
    fn compress(&self, raw: &[u8]) -> Result<Vec<u8>, EngineError>;

    fn decompress(&self, stored: &[u8]) -> Result<Vec<u8>, EngineError>;
}

/// Identity codec for development and tests.
#[derive(Debug, Clone, Copy, Default)]
pub struct PassthroughCodec;

impl PayloadCodec for PassthroughCodec {
    fn compress(&self, raw: &[u8]) -> Result<Vec<u8>, EngineError> {
        Ok(raw.to_vec())
    }

    fn decompress(&self, stored: &[u8]) -> Result<Vec<u8>, EngineError> {
        Ok(stored.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn passthrough_is_identity() {
        let codec = PassthroughCodec;
        let raw = b"{\"name\":\"conveyor\"}".to_vec();
        let stored = codec.compress(&raw).unwrap();
        assert_eq!(codec.decompress(&stored).unwrap(), raw);
    }
}
