// PCM wire codec for the live agent protocol
//
// The remote service deals in raw PCM, not container formats: outbound
// microphone blocks are 16-bit signed little-endian samples at 16kHz,
// base64-wrapped and tagged with a fixed mime string. Inbound agent audio
// is the same framing at the agent's own output rate (24kHz).

use base64::Engine;
use tracing::debug;

use crate::error::SessionError;

/// Sample rate the remote protocol requires for captured audio.
pub const CAPTURE_RATE: u32 = 16_000;

/// Sample rate of the agent's synthesized audio output.
pub const AGENT_OUTPUT_RATE: u32 = 24_000;

/// Mime tag carried by every outbound audio frame.
pub const WIRE_MIME: &str = "audio/pcm;rate=16000";

/// One outbound audio frame in wire form: base64 PCM plus its mime tag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WireFrame {
    pub data: String,
    pub mime_type: String,
}

/// A decoded block of mono float samples, ready for scheduling.
#[derive(Debug, Clone, PartialEq)]
pub struct PcmBuffer {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
}

impl PcmBuffer {
    pub fn duration_secs(&self) -> f64 {
        self.samples.len() as f64 / self.sample_rate as f64
    }
}

/// Convert captured float samples (-1.0..1.0) to a wire frame.
///
/// Out-of-range input saturates at the i16 boundaries rather than wrapping;
/// wraparound turns loud input into full-scale noise bursts.
pub fn encode_frame(samples: &[f32]) -> WireFrame {
    let mut bytes = Vec::with_capacity(samples.len() * 2);
    for &sample in samples {
        let clamped = sample.clamp(-1.0, 1.0);
        let value = (clamped * 32768.0) as i32;
        let value = value.clamp(i16::MIN as i32, i16::MAX as i32) as i16;
        bytes.extend_from_slice(&value.to_le_bytes());
    }

    WireFrame {
        data: base64::engine::general_purpose::STANDARD.encode(&bytes),
        mime_type: WIRE_MIME.to_string(),
    }
}

/// Decode one inbound base64 PCM frame into float samples.
///
/// An odd trailing byte is dropped. Invalid base64 is a recoverable
/// `MalformedFrame` error; the caller drops the frame and keeps playing.
pub fn decode_frame(data: &str, sample_rate: u32) -> Result<PcmBuffer, SessionError> {
    let bytes = base64::engine::general_purpose::STANDARD
        .decode(data)
        .map_err(|e| SessionError::MalformedFrame(e.to_string()))?;

    if bytes.len() % 2 != 0 {
        debug!("Dropping odd trailing byte from {}-byte frame", bytes.len());
    }

    let samples: Vec<f32> = bytes
        .chunks_exact(2)
        .map(|pair| i16::from_le_bytes([pair[0], pair[1]]) as f32 / 32768.0)
        .collect();

    Ok(PcmBuffer {
        samples,
        sample_rate,
    })
}

/// Pack float samples as raw i16 LE bytes (the recording-side layout).
pub fn samples_to_i16_bytes(samples: &[f32]) -> Vec<u8> {
    samples
        .iter()
        .flat_map(|&s| {
            let clamped = s.clamp(-1.0, 1.0);
            let value = ((clamped * 32768.0) as i32).clamp(i16::MIN as i32, i16::MAX as i32) as i16;
            value.to_le_bytes()
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::Engine;

    #[test]
    fn encode_tags_wire_rate() {
        let frame = encode_frame(&[0.0, 0.5]);
        assert_eq!(frame.mime_type, "audio/pcm;rate=16000");
    }

    #[test]
    fn out_of_range_samples_saturate() {
        let frame = encode_frame(&[2.0, -2.0]);
        let bytes = base64::engine::general_purpose::STANDARD
            .decode(&frame.data)
            .unwrap();
        let first = i16::from_le_bytes([bytes[0], bytes[1]]);
        let second = i16::from_le_bytes([bytes[2], bytes[3]]);
        assert_eq!(first, i16::MAX);
        assert_eq!(second, i16::MIN);
    }

    #[test]
    fn odd_length_frame_drops_trailing_byte() {
        let encoded = base64::engine::general_purpose::STANDARD.encode([0x00u8, 0x40, 0x7f]);
        let buffer = decode_frame(&encoded, AGENT_OUTPUT_RATE).unwrap();
        assert_eq!(buffer.samples.len(), 1);
    }

    #[test]
    fn invalid_base64_is_malformed_frame() {
        let err = decode_frame("not base64!!!", AGENT_OUTPUT_RATE).unwrap_err();
        assert!(matches!(err, SessionError::MalformedFrame(_)));
    }
}
