//! # Frame Accumulation
//!
//! Collects resampled PCM into the fixed-size frames the voice-activity
//! scorer requires. The scorer contract is strict: every frame must contain
//! exactly `frame_size` samples (512 at 16kHz in the default setup), so this
//! buffer absorbs the arbitrary chunk sizes the network delivers and releases
//! complete frames in arrival order.
//!
//! ## Key Features:
//! - **FIFO release**: frames come out in the exact order samples went in
//! - **Many per call**: a large chunk can complete several frames at once
//! - **Carried remainder**: anything below a full frame waits for more input

use std::collections::VecDeque;

/// One scorer-ready window of audio: exactly `frame_size` samples at the
/// target rate. Only [`FrameAccumulator`] constructs these, which is what
/// keeps the length contract honest.
#[derive(Debug, Clone, PartialEq)]
pub struct VadFrame {
    /// Normalized samples in [-1.0, 1.0]
    pub samples: Vec<f32>,

    /// Rate the samples are at (the pipeline's target rate)
    pub sample_rate: u32,
}

impl VadFrame {
    /// Number of samples in this frame.
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Frame duration in milliseconds.
    pub fn duration_ms(&self) -> f64 {
        self.samples.len() as f64 * 1000.0 / self.sample_rate as f64
    }
}

/// Buffers samples until complete frames can be released.
///
/// ## Rust Concepts:
/// - **VecDeque**: a ring buffer; popping from the front is O(1), unlike
///   `Vec::remove(0)` which would shift every remaining sample
/// - **drain(..n)**: removes and yields the first `n` elements in one pass,
///   which is exactly the "release the oldest full frame" operation
pub struct FrameAccumulator {
    /// Samples awaiting frame completion, oldest first
    buffer: VecDeque<f32>,

    /// Fixed frame length for the life of the session
    frame_size: usize,

    /// Rate stamped onto released frames
    sample_rate: u32,
}

impl FrameAccumulator {
    /// Create an accumulator releasing frames of `frame_size` samples.
    pub fn new(frame_size: usize, sample_rate: u32) -> Result<Self, String> {
        if frame_size == 0 {
            return Err("Frame size must be non-zero".to_string());
        }
        if sample_rate == 0 {
            return Err("Sample rate must be non-zero".to_string());
        }

        Ok(Self {
            buffer: VecDeque::with_capacity(frame_size * 2),
            frame_size,
            sample_rate,
        })
    }

    /// Append samples and release every frame that completes.
    ///
    /// Returns zero or more frames; after this call the internal remainder
    /// is always shorter than one frame.
    pub fn push(&mut self, samples: &[f32]) -> Vec<VadFrame> {
        self.buffer.extend(samples.iter().copied());

        let mut frames = Vec::new();
        while self.buffer.len() >= self.frame_size {
            let frame: Vec<f32> = self.buffer.drain(..self.frame_size).collect();
            frames.push(VadFrame {
                samples: frame,
                sample_rate: self.sample_rate,
            });
        }

        frames
    }

    /// Samples currently waiting for frame completion.
    pub fn pending_samples(&self) -> usize {
        self.buffer.len()
    }

    /// Drop any partial frame.
    pub fn clear(&mut self) {
        self.buffer.clear();
    }

    pub fn frame_size(&self) -> usize {
        self.frame_size
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn numbered(range: std::ops::Range<usize>) -> Vec<f32> {
        range.map(|i| i as f32).collect()
    }

    #[test]
    fn test_rejects_zero_frame_size() {
        assert!(FrameAccumulator::new(0, 16000).is_err());
        assert!(FrameAccumulator::new(512, 0).is_err());

        let acc = FrameAccumulator::new(512, 16000).unwrap();
        assert_eq!(acc.frame_size(), 512);
    }

    #[test]
    fn test_short_input_releases_nothing() {
        let mut acc = FrameAccumulator::new(512, 16000).unwrap();
        let frames = acc.push(&numbered(0..511));
        assert!(frames.is_empty());
        assert_eq!(acc.pending_samples(), 511);
    }

    #[test]
    fn test_releases_exact_frames_and_keeps_remainder() {
        let mut acc = FrameAccumulator::new(512, 16000).unwrap();
        let frames = acc.push(&numbered(0..1200));

        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0].len(), 512);
        assert_eq!(frames[1].len(), 512);
        assert_eq!(frames[0].samples[0], 0.0);
        assert_eq!(frames[0].samples[511], 511.0);
        assert_eq!(frames[1].samples[0], 512.0);
        assert_eq!(frames[1].samples[511], 1023.0);
        assert_eq!(acc.pending_samples(), 176);
    }

    #[test]
    fn test_remainder_always_below_frame_size() {
        let mut acc = FrameAccumulator::new(512, 16000).unwrap();
        for chunk_len in [100usize, 600, 512, 1, 5000, 511] {
            acc.push(&vec![0.25; chunk_len]);
            assert!(acc.pending_samples() < 512);
        }
    }

    #[test]
    fn test_chunking_invariance() {
        let input = numbered(0..4000);

        let mut whole = FrameAccumulator::new(512, 16000).unwrap();
        let reference: Vec<VadFrame> = whole.push(&input);

        let mut split = FrameAccumulator::new(512, 16000).unwrap();
        let mut collected = Vec::new();
        for chunk in input.chunks(77) {
            collected.extend(split.push(chunk));
        }

        assert_eq!(collected, reference);
        assert_eq!(split.pending_samples(), whole.pending_samples());
    }

    #[test]
    fn test_clear_drops_partial_frame() {
        let mut acc = FrameAccumulator::new(512, 16000).unwrap();
        acc.push(&numbered(0..300));
        assert_eq!(acc.pending_samples(), 300);

        acc.clear();
        assert_eq!(acc.pending_samples(), 0);

        // Old partial data must not leak into the next frame.
        let frames = acc.push(&numbered(0..512));
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].samples[0], 0.0);
    }

    #[test]
    fn test_frame_duration() {
        let frame = VadFrame {
            samples: vec![0.0; 512],
            sample_rate: 16000,
        };
        assert!((frame.duration_ms() - 32.0).abs() < 1e-9);
    }
}
