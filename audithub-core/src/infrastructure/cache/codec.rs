//! Byte encoding shared by the cache backends
// cspell:ignore GzEncoder GzDecoder flate

use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use std::io::{Read, Write};

use crate::application::errors::{ApplicationError, CacheError};

const COMPRESSION_MARKER: &[u8; 4] = b"GZIP";

/// Stored envelope; `expires_at` backs up the backend TTL
#[derive(serde::Serialize, serde::Deserialize)]
pub(crate) struct CacheEntry<T> {
    pub data: T,
    pub created_at: u64,
    pub expires_at: u64,
}

pub(crate) fn current_timestamp() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

/// Serialize `value` into an envelope, gzip-compressing above the threshold
pub(crate) fn encode<T>(
    value: &T,
    ttl_seconds: u64,
    compression_threshold: Option<u64>,
) -> Result<Vec<u8>, ApplicationError>
where
    T: serde::Serialize,
{
    let now = current_timestamp();
    let entry = CacheEntry {
        data: value,
        created_at: now,
        expires_at: now.saturating_add(ttl_seconds),
    };
    let serialized = serde_json::to_vec(&entry)?;

    match compression_threshold {
        Some(threshold) if serialized.len() as u64 > threshold => {
            let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
            encoder.write_all(&serialized).map_err(CacheError::Io)?;
            let compressed = encoder.finish().map_err(CacheError::Io)?;
            let mut framed = COMPRESSION_MARKER.to_vec();
            framed.extend_from_slice(&compressed);
            Ok(framed)
        }
        _ => Ok(serialized),
    }
}

/// Inverse of [`encode`]; expired envelopes decode to `None`
pub(crate) fn decode<T>(bytes: &[u8]) -> Result<Option<T>, ApplicationError>
where
    T: serde::de::DeserializeOwned,
{
    let plain;
    let payload = match bytes.strip_prefix(COMPRESSION_MARKER.as_slice()) {
        Some(compressed) => {
            let mut decoder = GzDecoder::new(compressed);
            let mut buf = Vec::new();
            decoder.read_to_end(&mut buf).map_err(CacheError::Io)?;
            plain = buf;
            plain.as_slice()
        }
        None => bytes,
    };

    let entry: CacheEntry<T> = serde_json::from_slice(payload)?;
    if current_timestamp() >= entry.expires_at {
        return Ok(None);
    }
    Ok(Some(entry.data))
}
