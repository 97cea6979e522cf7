//! Chunk compression for dataset storage
//!
//! Each chunk holds a run of `f64` rows. Three encodings are available and
//! the choice is fixed per dataset when it is created:
//!
//! 1. `None`: little-endian `f64` bytes
//! 2. `Lz4`: the same bytes, LZ4 compressed
//! 3. `XorLz4`: each value's bit pattern XORed with its predecessor before
//!    LZ4. Slowly varying signals and clock times share sign, exponent and
//!    leading mantissa bits, so the XOR stream is mostly zero bytes.

use crate::storage::error::{StoreError, StoreResult};
use serde::{Deserialize, Serialize};

/// Compression applied to dataset chunks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum CompressionType {
    None,
    #[default]
    Lz4,
    #[serde(rename = "xor-lz4")]
    XorLz4,
}

impl std::fmt::Display for CompressionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CompressionType::None => write!(f, "none"),
            CompressionType::Lz4 => write!(f, "lz4"),
            CompressionType::XorLz4 => write!(f, "xor-lz4"),
        }
    }
}

impl std::str::FromStr for CompressionType {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "none" => Ok(CompressionType::None),
            "lz4" => Ok(CompressionType::Lz4),
            "xor-lz4" | "xorlz4" => Ok(CompressionType::XorLz4),
            other => Err(StoreError::Configuration(format!(
                "Unknown compression type: {}",
                other
            ))),
        }
    }
}

fn to_bytes(values: impl Iterator<Item = u64>, capacity: usize) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(capacity * 8);
    for v in values {
        bytes.extend_from_slice(&v.to_le_bytes());
    }
    bytes
}

fn from_bytes(bytes: &[u8]) -> StoreResult<Vec<u64>> {
    if bytes.len() % 8 != 0 {
        return Err(StoreError::Compression(format!(
            "Chunk length {} is not a multiple of 8",
            bytes.len()
        )));
    }
    Ok(bytes
        .chunks_exact(8)
        .map(|b| u64::from_le_bytes([b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7]]))
        .collect())
}

/// Encode a run of values into chunk payload bytes
pub fn compress_chunk(values: &[f64], compression: CompressionType) -> Vec<u8> {
    match compression {
        CompressionType::None => to_bytes(values.iter().map(|v| v.to_bits()), values.len()),
        CompressionType::Lz4 => {
            let raw = to_bytes(values.iter().map(|v| v.to_bits()), values.len());
            lz4_flex::compress_prepend_size(&raw)
        }
        CompressionType::XorLz4 => {
            let mut prev = 0u64;
            let xored = values.iter().map(|v| {
                let bits = v.to_bits();
                let delta = bits ^ prev;
                prev = bits;
                delta
            });
            let raw = to_bytes(xored, values.len());
            lz4_flex::compress_prepend_size(&raw)
        }
    }
}

/// Decode chunk payload bytes back into values
pub fn decompress_chunk(data: &[u8], compression: CompressionType) -> StoreResult<Vec<f64>> {
    let words = match compression {
        CompressionType::None => from_bytes(data)?,
        CompressionType::Lz4 | CompressionType::XorLz4 => {
            let raw = lz4_flex::decompress_size_prepended(data).map_err(|e| {
                StoreError::Compression(format!("LZ4 decompression failed: {}", e))
            })?;
            from_bytes(&raw)?
        }
    };

    if compression == CompressionType::XorLz4 {
        let mut prev = 0u64;
        Ok(words
            .into_iter()
            .map(|delta| {
                prev ^= delta;
                f64::from_bits(prev)
            })
            .collect())
    } else {
        Ok(words.into_iter().map(f64::from_bits).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ramp(n: usize) -> Vec<f64> {
        (0..n).map(|i| i as f64 / 1024.0).collect()
    }

    #[test]
    fn test_empty_chunk() {
        for compression in [CompressionType::None, CompressionType::Lz4, CompressionType::XorLz4] {
            let encoded = compress_chunk(&[], compression);
            assert!(decompress_chunk(&encoded, compression).unwrap().is_empty());
        }
    }

    #[test]
    fn test_values_survive_each_encoding() {
        let values = vec![0.0, -1.5, f64::MAX, f64::MIN_POSITIVE, 3.25, 3.25, 1e-300];
        for compression in [CompressionType::None, CompressionType::Lz4, CompressionType::XorLz4] {
            let encoded = compress_chunk(&values, compression);
            let decoded = decompress_chunk(&encoded, compression).unwrap();
            assert_eq!(decoded, values, "{} changed the values", compression);
        }
    }

    #[test]
    fn test_xor_compresses_clock_times() {
        let times = ramp(16384);
        let xored = compress_chunk(&times, CompressionType::XorLz4);
        let raw = compress_chunk(&times, CompressionType::None);

        assert_eq!(raw.len(), 16384 * 8);
        assert!(
            xored.len() * 4 < raw.len(),
            "xor-lz4 {} bytes against {} raw",
            xored.len(),
            raw.len()
        );
    }

    #[test]
    fn test_truncated_payload_is_an_error() {
        let encoded = compress_chunk(&ramp(10), CompressionType::None);
        let err = decompress_chunk(&encoded[..encoded.len() - 3], CompressionType::None);
        assert!(matches!(err, Err(StoreError::Compression(_))));
    }

    #[test]
    fn test_parse_compression_names() {
        assert_eq!("LZ4".parse::<CompressionType>().unwrap(), CompressionType::Lz4);
        assert_eq!("xor-lz4".parse::<CompressionType>().unwrap(), CompressionType::XorLz4);
        assert!("szip".parse::<CompressionType>().is_err());
    }
}
