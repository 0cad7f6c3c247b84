//! # Payload Ingestion
//!
//! Decodes inbound `audio` message payloads into samples. Browser clients
//! base64-encode the raw buffer; depending on the deployment the bytes are
//! either 32-bit float samples (a serialized JS `Float32Array`) or 16-bit
//! signed PCM. Both are little-endian. The active variant is fixed per
//! deployment through `audio.input_format`.

use anyhow::{anyhow, Result};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use byteorder::{LittleEndian, ReadBytesExt};
use std::io::Cursor;

/// Sample encoding of the inbound audio payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputFormat {
    /// 32-bit IEEE 754 floats in [-1.0, 1.0]
    Float32,
    /// 16-bit signed PCM
    PcmS16,
}

impl std::str::FromStr for InputFormat {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "float32" | "f32" => Ok(InputFormat::Float32),
            "pcm16" | "s16" => Ok(InputFormat::PcmS16),
            _ => Err(anyhow!("Unknown input format: {}", s)),
        }
    }
}

impl std::fmt::Display for InputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            InputFormat::Float32 => write!(f, "float32"),
            InputFormat::PcmS16 => write!(f, "pcm16"),
        }
    }
}

impl InputFormat {
    /// Bytes per sample for this encoding.
    pub fn sample_width(&self) -> usize {
        match self {
            InputFormat::Float32 => 4,
            InputFormat::PcmS16 => 2,
        }
    }
}

/// Decode a base64 payload into normalized float samples.
///
/// Errors (bad base64, byte count not a multiple of the sample width) are
/// reported to the caller, which drops the chunk and keeps the connection
/// alive.
pub fn decode_payload(payload: &str, format: InputFormat) -> Result<Vec<f32>> {
    let bytes = BASE64
        .decode(payload)
        .map_err(|e| anyhow!("Invalid base64 audio payload: {}", e))?;
    samples_from_bytes(&bytes, format)
}

/// Interpret raw little-endian bytes as samples in [-1.0, 1.0].
pub fn samples_from_bytes(bytes: &[u8], format: InputFormat) -> Result<Vec<f32>> {
    if bytes.is_empty() {
        return Err(anyhow!("Empty audio payload"));
    }
    let width = format.sample_width();
    if bytes.len() % width != 0 {
        return Err(anyhow!(
            "Audio payload length {} is not a multiple of the {}-byte sample width",
            bytes.len(),
            width
        ));
    }

    let mut cursor = Cursor::new(bytes);
    let mut samples = Vec::with_capacity(bytes.len() / width);

    match format {
        InputFormat::Float32 => {
            while let Ok(sample) = cursor.read_f32::<LittleEndian>() {
                samples.push(sample);
            }
        }
        InputFormat::PcmS16 => {
            while let Ok(sample) = cursor.read_i16::<LittleEndian>() {
                samples.push(sample as f32 / 32768.0);
            }
        }
    }

    Ok(samples)
}

/// Convert normalized floats to 16-bit PCM, clamping out-of-range values.
pub fn float_to_pcm(samples: &[f32]) -> Vec<i16> {
    samples
        .iter()
        .map(|&sample| (sample.clamp(-1.0, 1.0) * 32767.0) as i16)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode_f32(samples: &[f32]) -> String {
        let mut bytes = Vec::new();
        for s in samples {
            bytes.extend_from_slice(&s.to_le_bytes());
        }
        BASE64.encode(bytes)
    }

    #[test]
    fn decodes_float32_payload() {
        let payload = encode_f32(&[0.0, 0.5, -0.25]);
        let samples = decode_payload(&payload, InputFormat::Float32).unwrap();
        assert_eq!(samples, vec![0.0, 0.5, -0.25]);
    }

    #[test]
    fn decodes_pcm16_payload() {
        let mut bytes = Vec::new();
        for s in [0i16, 16384, -32768] {
            bytes.extend_from_slice(&s.to_le_bytes());
        }
        let payload = BASE64.encode(bytes);

        let samples = decode_payload(&payload, InputFormat::PcmS16).unwrap();
        assert_eq!(samples[0], 0.0);
        assert!((samples[1] - 0.5).abs() < 1e-4);
        assert_eq!(samples[2], -1.0);
    }

    #[test]
    fn rejects_misaligned_byte_count() {
        let payload = BASE64.encode([0u8, 1, 2]);
        assert!(decode_payload(&payload, InputFormat::Float32).is_err());
        assert!(decode_payload(&payload, InputFormat::PcmS16).is_err());
    }

    #[test]
    fn rejects_bad_base64() {
        assert!(decode_payload("not base64!!!", InputFormat::Float32).is_err());
    }

    #[test]
    fn float_to_pcm_clamps() {
        let pcm = float_to_pcm(&[0.0, 1.5, -2.0, 0.5]);
        assert_eq!(pcm[0], 0);
        assert_eq!(pcm[1], 32767);
        assert_eq!(pcm[2], -32767);
        assert_eq!(pcm[3], 16383);
    }

    #[test]
    fn input_format_parsing() {
        assert_eq!("float32".parse::<InputFormat>().unwrap(), InputFormat::Float32);
        assert_eq!("PCM16".parse::<InputFormat>().unwrap(), InputFormat::PcmS16);
        assert!("ogg".parse::<InputFormat>().is_err());
    }
}
