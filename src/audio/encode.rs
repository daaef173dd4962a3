// PCM wire codec for the agent channel.
//
// Outbound: microphone blocks arrive as f32 samples in [-1.0, 1.0] and are
// sent to the agent as base64-encoded 16-bit little-endian PCM.
// Inbound: agent speech arrives as raw 16-bit little-endian PCM bytes.

use base64::Engine;

/// One encoded capture block, ready to hand to the channel's send operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedAudioChunk {
    /// Base64-encoded 16-bit little-endian PCM.
    pub data: String,
    /// Encoding tag, e.g. `audio/pcm;rate=16000`.
    pub mime_type: String,
}

/// Convert f32 samples to 16-bit PCM.
///
/// Out-of-range input is clipped to the i16 range. That is intentional:
/// capture hardware occasionally delivers samples slightly outside
/// [-1.0, 1.0] and clipping is the correct wire behavior.
pub fn quantize(samples: &[f32]) -> Vec<i16> {
    samples
        .iter()
        .map(|&s| (s * 32768.0).clamp(i16::MIN as f32, i16::MAX as f32) as i16)
        .collect()
}

/// Encode one capture block into the wire payload.
///
/// Always succeeds for well-formed input; there is no error path.
pub fn encode_block(samples: &[f32], sample_rate: u32) -> EncodedAudioChunk {
    encode_pcm(&quantize(samples), sample_rate)
}

/// Encode already-quantized samples into the wire payload.
pub fn encode_pcm(samples: &[i16], sample_rate: u32) -> EncodedAudioChunk {
    let pcm_bytes: Vec<u8> = samples.iter().flat_map(|s| s.to_le_bytes()).collect();

    EncodedAudioChunk {
        data: base64::engine::general_purpose::STANDARD.encode(&pcm_bytes),
        mime_type: format!("audio/pcm;rate={}", sample_rate),
    }
}

/// Decode raw 16-bit little-endian PCM bytes into samples.
///
/// A trailing odd byte is dropped; callers log it.
pub fn samples_from_pcm(bytes: &[u8]) -> Vec<i16> {
    bytes
        .chunks_exact(2)
        .map(|pair| i16::from_le_bytes([pair[0], pair[1]]))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::Engine;

    #[test]
    fn test_quantize_zero_block() {
        let samples = quantize(&[0.0; 256]);
        assert_eq!(samples.len(), 256);
        assert!(samples.iter().all(|&s| s == 0));
    }

    #[test]
    fn test_quantize_full_scale_clips() {
        // +1.0 would be 32768, one past i16::MAX; it must clip, not wrap.
        let samples = quantize(&[1.0, -1.0, 2.0, -2.0]);
        assert_eq!(samples[0], i16::MAX);
        assert_eq!(samples[1], i16::MIN);
        assert_eq!(samples[2], i16::MAX);
        assert_eq!(samples[3], i16::MIN);
    }

    #[test]
    fn test_quantize_half_scale() {
        let samples = quantize(&[0.5, -0.5]);
        assert_eq!(samples[0], 16384);
        assert_eq!(samples[1], -16384);
    }

    #[test]
    fn test_encode_block_round_trip() {
        let chunk = encode_block(&[0.0, 0.5, -1.0], 16000);
        assert_eq!(chunk.mime_type, "audio/pcm;rate=16000");

        let bytes = base64::engine::general_purpose::STANDARD
            .decode(&chunk.data)
            .unwrap();
        let decoded = samples_from_pcm(&bytes);
        assert_eq!(decoded, vec![0, 16384, i16::MIN]);
    }

    #[test]
    fn test_encode_block_little_endian() {
        // 0x0102 must serialize low byte first.
        let chunk = encode_block(&[258.0 / 32768.0], 24000);
        let bytes = base64::engine::general_purpose::STANDARD
            .decode(&chunk.data)
            .unwrap();
        assert_eq!(bytes, vec![0x02, 0x01]);
    }

    #[test]
    fn test_samples_from_pcm_drops_trailing_byte() {
        let samples = samples_from_pcm(&[0x00, 0x01, 0xff]);
        assert_eq!(samples, vec![256]);
    }
}
