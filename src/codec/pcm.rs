//! PCM16 decoding
//!
//! The stream carries raw little-endian signed 16-bit mono samples. Decoding
//! to normalized `f32` happens once per finalized chunk, not per message.

use crate::error::CodecError;

/// Decode PCM16 LE bytes into normalized `f32` samples in `[-1.0, 1.0)`.
///
/// An odd byte length cannot be sample-aligned and is rejected; the caller
/// drops the affected chunk and keeps the session alive.
pub fn decode_pcm16(data: &[u8]) -> Result<Vec<f32>, CodecError> {
    if data.len() % 2 != 0 {
        return Err(CodecError::OddPcmLength(data.len()));
    }

    Ok(data
        .chunks_exact(2)
        .map(|pair| i16::from_le_bytes([pair[0], pair[1]]) as f32 / 32_768.0)
        .collect())
}

/// Encode `f32` samples back to PCM16 LE bytes.
///
/// Used by callers that feed captured audio into [`decode_pcm16`]-shaped
/// pipelines and by tests; saturates out-of-range input.
pub fn encode_pcm16(samples: &[f32]) -> Vec<u8> {
    let mut out = Vec::with_capacity(samples.len() * 2);
    for &sample in samples {
        let value = (sample * 32_768.0).clamp(i16::MIN as f32, i16::MAX as f32) as i16;
        out.extend_from_slice(&value.to_le_bytes());
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_decode_known_samples() {
        // 0, 1, -1, i16::MAX, i16::MIN
        let bytes = [0x00, 0x00, 0x01, 0x00, 0xFF, 0xFF, 0xFF, 0x7F, 0x00, 0x80];
        let samples = decode_pcm16(&bytes).unwrap();
        assert_eq!(samples.len(), 5);
        assert_eq!(samples[0], 0.0);
        assert_eq!(samples[1], 1.0 / 32_768.0);
        assert_eq!(samples[2], -1.0 / 32_768.0);
        assert_eq!(samples[3], 32_767.0 / 32_768.0);
        assert_eq!(samples[4], -1.0);
    }

    #[test]
    fn test_odd_length_rejected() {
        let err = decode_pcm16(&[0u8; 2001]).unwrap_err();
        assert!(matches!(err, CodecError::OddPcmLength(2001)));
    }

    #[test]
    fn test_empty_payload_decodes_empty() {
        assert!(decode_pcm16(&[]).unwrap().is_empty());
    }

    proptest! {
        /// Round-tripping arbitrary i16 samples through bytes and back is
        /// exact: every i16 maps to a distinct multiple of 1/32768.
        #[test]
        fn prop_pcm16_roundtrip(raw in proptest::collection::vec(any::<i16>(), 0..512)) {
            let bytes: Vec<u8> = raw.iter().flat_map(|s| s.to_le_bytes()).collect();
            let decoded = decode_pcm16(&bytes).unwrap();
            prop_assert_eq!(decoded.len(), raw.len());
            for (sample, original) in decoded.iter().zip(&raw) {
                prop_assert!((sample - *original as f32 / 32_768.0).abs() < 1.0 / 32_768.0);
                let back = (sample * 32_768.0).round() as i32;
                prop_assert_eq!(back, *original as i32);
            }
        }

        #[test]
        fn prop_encode_decode_inverse(raw in proptest::collection::vec(any::<i16>(), 0..256)) {
            let samples: Vec<f32> = raw.iter().map(|&s| s as f32 / 32_768.0).collect();
            let bytes = encode_pcm16(&samples);
            let decoded = decode_pcm16(&bytes).unwrap();
            prop_assert_eq!(decoded, samples);
        }
    }
}
