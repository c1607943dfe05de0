//! # Audio Decode Boundary
//!
//! The pipeline treats the compressed-audio codec as an opaque collaborator:
//! bytes go in, normalized PCM floats at a declared rate come out. Everything
//! downstream (resampling, framing, scoring) only sees the float samples, so
//! swapping the codec means swapping one trait object at session creation.
//!
//! The shipped implementation decodes raw little-endian 16-bit PCM, which is
//! what the browser capture path in the demo client produces. An Opus/Ogg
//! decoder fits behind the same trait without touching the pipeline.

use anyhow::{anyhow, Result};
use byteorder::{LittleEndian, ReadBytesExt};
use std::io::Cursor;

/// Decoder contract consumed by the session pipeline.
///
/// A failed decode means the chunk contributes zero samples; implementations
/// must not leave partial samples in the returned buffer on error. Decoders
/// may keep internal stream state (container demux position), which is why
/// `decode` takes `&mut self`.
pub trait AudioDecoder: Send {
    /// Decode one compressed chunk into PCM samples in [-1.0, 1.0].
    fn decode(&mut self, data: &[u8]) -> Result<Vec<f32>>;

    /// Rate of the PCM this decoder produces.
    fn sample_rate(&self) -> u32;
}

/// Raw little-endian PCM16 pass-through decoder.
pub struct Pcm16Decoder {
    sample_rate: u32,
}

impl Pcm16Decoder {
    pub fn new(sample_rate: u32) -> Self {
        Self { sample_rate }
    }
}

impl AudioDecoder for Pcm16Decoder {
    fn decode(&mut self, data: &[u8]) -> Result<Vec<f32>> {
        if data.is_empty() {
            return Err(anyhow!("No audio data provided"));
        }
        if data.len() % 2 != 0 {
            return Err(anyhow!(
                "Audio data length must be even for 16-bit samples, got {} bytes",
                data.len()
            ));
        }

        let mut cursor = Cursor::new(data);
        let mut samples = Vec::with_capacity(data.len() / 2);

        while let Ok(sample) = cursor.read_i16::<LittleEndian>() {
            // Scale from i16 range to [-1.0, 1.0]
            samples.push(sample as f32 / 32768.0);
        }

        Ok(samples)
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decodes_little_endian_pcm16() {
        let mut decoder = Pcm16Decoder::new(24000);

        // 0x0000 = 0, 0x4000 = 16384, 0xC000 = -16384
        let data = [0x00u8, 0x00, 0x00, 0x40, 0x00, 0xC0];
        let samples = decoder.decode(&data).unwrap();

        assert_eq!(samples.len(), 3);
        assert!((samples[0] - 0.0).abs() < 1e-6);
        assert!((samples[1] - 0.5).abs() < 1e-6);
        assert!((samples[2] + 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_full_scale_stays_in_range() {
        let mut decoder = Pcm16Decoder::new(24000);

        let mut data = Vec::new();
        data.extend_from_slice(&i16::MIN.to_le_bytes());
        data.extend_from_slice(&i16::MAX.to_le_bytes());
        let samples = decoder.decode(&data).unwrap();

        assert_eq!(samples[0], -1.0);
        assert!(samples[1] < 1.0 && samples[1] > 0.999);
    }

    #[test]
    fn test_odd_byte_count_is_an_error() {
        let mut decoder = Pcm16Decoder::new(24000);
        assert!(decoder.decode(&[0x01, 0x02, 0x03]).is_err());
    }

    #[test]
    fn test_empty_chunk_is_an_error() {
        let mut decoder = Pcm16Decoder::new(24000);
        assert!(decoder.decode(&[]).is_err());
    }
}
