//! # Sample Rate Conversion
//!
//! Converts PCM audio from the decoder's output rate down to the rate the
//! voice-activity scorer expects (24kHz -> 16kHz in the default setup) using
//! index decimation: output sample `k` is taken from source position
//! `floor(k * ratio)` where `ratio = source_rate / target_rate`.
//!
//! ## Key Properties:
//! - **Chunk-boundary invariance**: network chunk sizes never change which
//!   source samples are selected, only how many calls it takes to emit them
//! - **Explicit carried state**: the unconsumed tail and the stream position
//!   survive between calls, so fractional phase never drifts
//! - **Lossless bookkeeping**: samples are either emitted or retained, never
//!   dropped or fabricated

use tracing::debug;

/// Streaming decimator with carried remainder state.
///
/// The selection grid is global to the stream: positions `0, r, 2r, 3r, ...`
/// truncated to integers. Tracking the emitted-sample count and the source
/// index of the buffer head as integers keeps the grid exact for arbitrarily
/// long streams; multiplying out `k * ratio` per step avoids accumulating
/// floating-point error the way a running `position += ratio` would.
pub struct Resampler {
    /// Unconsumed source samples carried between calls
    buffer: Vec<f32>,

    /// Source-stream index of `buffer[0]`
    base: u64,

    /// Output samples emitted so far over the life of the stream
    emitted: u64,

    /// Decimation ratio, `source_rate / target_rate`
    ratio: f64,

    source_rate: u32,
    target_rate: u32,
}

impl Resampler {
    /// Create a resampler for the given rate pair.
    ///
    /// Only downsampling (or the degenerate equal-rate passthrough) is
    /// supported; upsampling would require interpolation this stage does
    /// not perform.
    pub fn new(source_rate: u32, target_rate: u32) -> Result<Self, String> {
        if source_rate == 0 || target_rate == 0 {
            return Err("Sample rates must be non-zero".to_string());
        }
        if source_rate < target_rate {
            return Err(format!(
                "Resampler only decimates: source rate {} is below target rate {}",
                source_rate, target_rate
            ));
        }

        Ok(Self {
            buffer: Vec::new(),
            base: 0,
            emitted: 0,
            ratio: source_rate as f64 / target_rate as f64,
            source_rate,
            target_rate,
        })
    }

    /// Feed one source-rate chunk, returning whatever target-rate samples
    /// became available.
    ///
    /// Returns an empty vector when the carried remainder is still too short
    /// to reach the next grid position; those samples stay buffered for the
    /// next call.
    pub fn resample(&mut self, chunk: &[f32]) -> Vec<f32> {
        self.buffer.extend_from_slice(chunk);

        let mut output = Vec::new();
        let mut last_consumed: Option<usize> = None;

        loop {
            // Next grid position in source-stream coordinates.
            let source_index = (self.emitted as f64 * self.ratio) as u64;
            // source_index never falls behind base: the grid advances by at
            // least one source sample per emission when ratio >= 1.
            let local = (source_index - self.base) as usize;
            if local >= self.buffer.len() {
                break;
            }

            output.push(self.buffer[local]);
            last_consumed = Some(local);
            self.emitted += 1;
        }

        // Retain from the last consumed index onward. The consumed sample
        // itself stays buffered so the next grid position resolves against
        // an index that still exists.
        if let Some(last) = last_consumed {
            self.buffer.drain(..last);
            self.base += last as u64;
        }

        if output.is_empty() && !chunk.is_empty() {
            debug!(
                "Resampler buffering: {} samples carried, next grid position not reached",
                self.buffer.len()
            );
        }

        output
    }

    /// Discard all carried state, returning to the start-of-stream phase.
    pub fn reset(&mut self) {
        self.buffer.clear();
        self.base = 0;
        self.emitted = 0;
    }

    /// Number of source samples currently carried.
    pub fn pending_samples(&self) -> usize {
        self.buffer.len()
    }

    pub fn source_rate(&self) -> u32 {
        self.source_rate
    }

    pub fn target_rate(&self) -> u32 {
        self.target_rate
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Deterministic pseudo-random signal, enough to notice index mix-ups.
    fn test_signal(len: usize) -> Vec<f32> {
        let mut state: u32 = 0x1234_5678;
        (0..len)
            .map(|_| {
                state = state.wrapping_mul(1_664_525).wrapping_add(1_013_904_223);
                (state >> 8) as f32 / (1u32 << 24) as f32 - 0.5
            })
            .collect()
    }

    #[test]
    fn test_rejects_upsampling() {
        assert!(Resampler::new(16000, 24000).is_err());
        assert!(Resampler::new(0, 16000).is_err());
        assert!(Resampler::new(24000, 0).is_err());
        assert!(Resampler::new(16000, 16000).is_ok());

        let resampler = Resampler::new(24000, 16000).unwrap();
        assert_eq!(resampler.source_rate(), 24000);
        assert_eq!(resampler.target_rate(), 16000);
    }

    #[test]
    fn test_decimation_pattern_24k_to_16k() {
        // At ratio 1.5 the grid positions are 0, 1.5, 3, 4.5, 6, 7.5, ...
        // which truncate to source indices 0, 1, 3, 4, 6, 7.
        let mut resampler = Resampler::new(24000, 16000).unwrap();
        let input: Vec<f32> = (0..9).map(|i| i as f32).collect();

        let output = resampler.resample(&input);
        assert_eq!(output, vec![0.0, 1.0, 3.0, 4.0, 6.0, 7.0]);
    }

    #[test]
    fn test_output_length_ratio() {
        let mut resampler = Resampler::new(24000, 16000).unwrap();
        let input = test_signal(1000);

        let output = resampler.resample(&input);
        let expected = (1000.0_f64 / 1.5).floor() as i64;
        assert!((output.len() as i64 - expected).abs() <= 1);
    }

    #[test]
    fn test_chunk_boundary_invariance() {
        let input = test_signal(4096);

        let mut whole = Resampler::new(24000, 16000).unwrap();
        let reference = whole.resample(&input);

        // Hostile split sizes, including single samples and a zero-length call.
        let splits = [1usize, 2, 3, 5, 7, 0, 160, 333, 480, 11, 1024];
        let mut split_resampler = Resampler::new(24000, 16000).unwrap();
        let mut collected = Vec::new();
        let mut offset = 0;
        let mut split_index = 0;
        while offset < input.len() {
            let size = splits[split_index % splits.len()].min(input.len() - offset);
            collected.extend(split_resampler.resample(&input[offset..offset + size]));
            offset += size;
            split_index += 1;
            if size == 0 {
                // A zero-size split would never advance; consume at least one.
                collected.extend(split_resampler.resample(&input[offset..offset + 1]));
                offset += 1;
            }
        }

        assert_eq!(collected, reference);
    }

    #[test]
    fn test_starved_call_returns_empty_and_keeps_samples() {
        let mut resampler = Resampler::new(24000, 16000).unwrap();

        // Two samples cover grid positions 0 and 1; position 3 is out of
        // reach, so the call after consuming them yields nothing.
        let first = resampler.resample(&[10.0, 20.0]);
        assert_eq!(first, vec![10.0, 20.0]);

        let starved = resampler.resample(&[30.0]);
        assert!(starved.is_empty());
        assert!(resampler.pending_samples() > 0);

        // The next sample lands on grid position 3.
        let resumed = resampler.resample(&[40.0]);
        assert_eq!(resumed, vec![40.0]);
    }

    #[test]
    fn test_empty_input_is_noop() {
        let mut resampler = Resampler::new(24000, 16000).unwrap();
        assert!(resampler.resample(&[]).is_empty());
        assert_eq!(resampler.pending_samples(), 0);
    }

    #[test]
    fn test_equal_rates_pass_through() {
        let mut resampler = Resampler::new(16000, 16000).unwrap();
        let input = test_signal(128);
        let output = resampler.resample(&input);
        assert_eq!(output, input);
    }

    #[test]
    fn test_reset_restores_start_of_stream_phase() {
        let input = test_signal(777);

        let mut resampler = Resampler::new(24000, 16000).unwrap();
        let fresh = resampler.resample(&input);

        resampler.resample(&test_signal(123));
        resampler.reset();
        assert_eq!(resampler.pending_samples(), 0);

        let after_reset = resampler.resample(&input);
        assert_eq!(after_reset, fresh);
    }
}
