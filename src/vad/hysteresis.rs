//! # Hysteresis State Machine
//!
//! Turns the scorer's noisy per-frame confidence stream into stable
//! `speech_start` / `speech_end` events. Two mechanisms suppress flicker:
//!
//! - **Dual thresholds**: speech must score above `speech_threshold` to
//!   count toward starting, and below `silence_threshold` to count toward
//!   ending. Confidence landing between the two (the dead zone) changes
//!   nothing at all, so boundary noise cannot reset accumulated evidence.
//! - **Minimum durations**: a state flips only after enough consecutive
//!   evidence has accumulated, measured in samples so the guard tracks audio
//!   time rather than frame count.
//!
//! The machine emits at most one event per frame and never terminates on its
//! own; `reset` returns it to the initial silent state between utterances.

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Discrete transition emitted by the state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VadEventKind {
    SpeechStart,
    SpeechEnd,
}

impl VadEventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            VadEventKind::SpeechStart => "speech_start",
            VadEventKind::SpeechEnd => "speech_end",
        }
    }
}

/// Tuning for the state machine.
///
/// `speech_threshold` must be strictly above `silence_threshold`; the gap
/// between them is the dead zone. Durations are wall-clock milliseconds of
/// audio, converted to samples against `sample_rate`.
#[derive(Debug, Clone)]
pub struct HysteresisConfig {
    pub speech_threshold: f32,
    pub silence_threshold: f32,
    pub min_speech_duration_ms: u32,
    pub min_silence_duration_ms: u32,
    pub sample_rate: u32,
}

impl Default for HysteresisConfig {
    fn default() -> Self {
        Self {
            speech_threshold: 0.5,
            silence_threshold: 0.3,
            min_speech_duration_ms: 100,
            min_silence_duration_ms: 300,
            sample_rate: 16000,
        }
    }
}

impl HysteresisConfig {
    pub fn min_speech_samples(&self) -> u64 {
        self.min_speech_duration_ms as u64 * self.sample_rate as u64 / 1000
    }

    pub fn min_silence_samples(&self) -> u64 {
        self.min_silence_duration_ms as u64 * self.sample_rate as u64 / 1000
    }

    pub fn validate(&self) -> Result<(), String> {
        if !(0.0..=1.0).contains(&self.speech_threshold)
            || !(0.0..=1.0).contains(&self.silence_threshold)
        {
            return Err("VAD thresholds must be within [0.0, 1.0]".to_string());
        }
        if self.speech_threshold <= self.silence_threshold {
            return Err(format!(
                "speech_threshold ({}) must be above silence_threshold ({})",
                self.speech_threshold, self.silence_threshold
            ));
        }
        if self.sample_rate == 0 {
            return Err("Sample rate must be non-zero".to_string());
        }
        Ok(())
    }
}

/// Per-session speech/silence detector state.
pub struct HysteresisDetector {
    config: HysteresisConfig,
    min_speech_samples: u64,
    min_silence_samples: u64,

    is_speaking: bool,
    speech_run_samples: u64,
    silence_run_samples: u64,
}

impl HysteresisDetector {
    pub fn new(config: HysteresisConfig) -> Result<Self, String> {
        config.validate()?;
        let min_speech_samples = config.min_speech_samples();
        let min_silence_samples = config.min_silence_samples();

        Ok(Self {
            config,
            min_speech_samples,
            min_silence_samples,
            is_speaking: false,
            speech_run_samples: 0,
            silence_run_samples: 0,
        })
    }

    /// Apply one frame's confidence and sample count.
    ///
    /// Transition policy:
    /// 1. Above the speech threshold: the speech run grows, the silence run
    ///    zeroes, and a silent machine flips to speaking (emitting
    ///    `speech_start`) once the run reaches the minimum.
    /// 2. Below the silence threshold: mirrored, emitting `speech_end`.
    /// 3. In the dead zone: runs, state, and output are all untouched.
    pub fn update(&mut self, confidence: f32, frame_samples: u64) -> Option<VadEventKind> {
        if confidence > self.config.speech_threshold {
            self.speech_run_samples += frame_samples;
            self.silence_run_samples = 0;

            debug!(
                "Speech accumulating: {}/{} samples (confidence {:.3})",
                self.speech_run_samples, self.min_speech_samples, confidence
            );

            if !self.is_speaking && self.speech_run_samples >= self.min_speech_samples {
                self.is_speaking = true;
                info!(
                    "Speech started after {} accumulated samples",
                    self.speech_run_samples
                );
                return Some(VadEventKind::SpeechStart);
            }
        } else if confidence < self.config.silence_threshold {
            self.silence_run_samples += frame_samples;
            self.speech_run_samples = 0;

            debug!(
                "Silence accumulating: {}/{} samples (confidence {:.3})",
                self.silence_run_samples, self.min_silence_samples, confidence
            );

            if self.is_speaking && self.silence_run_samples >= self.min_silence_samples {
                self.is_speaking = false;
                info!(
                    "Speech ended after {} accumulated silence samples",
                    self.silence_run_samples
                );
                return Some(VadEventKind::SpeechEnd);
            }
        } else {
            debug!(
                "Confidence {:.3} in dead zone [{}, {}], state held",
                confidence, self.config.silence_threshold, self.config.speech_threshold
            );
        }

        None
    }

    /// Return to the initial state: silent, both runs zero.
    pub fn reset(&mut self) {
        self.is_speaking = false;
        self.speech_run_samples = 0;
        self.silence_run_samples = 0;
    }

    pub fn is_speaking(&self) -> bool {
        self.is_speaking
    }

    pub fn speech_run_samples(&self) -> u64 {
        self.speech_run_samples
    }

    pub fn silence_run_samples(&self) -> u64 {
        self.silence_run_samples
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn detector() -> HysteresisDetector {
        HysteresisDetector::new(HysteresisConfig::default()).unwrap()
    }

    /// Drive a fresh-from-silence detector into the speaking state.
    fn speaking_detector() -> HysteresisDetector {
        let mut det = detector();
        let mut started = false;
        for _ in 0..8 {
            if det.update(0.9, 512) == Some(VadEventKind::SpeechStart) {
                started = true;
                break;
            }
        }
        assert!(started);
        det
    }

    #[test]
    fn test_config_validation() {
        let mut config = HysteresisConfig::default();
        assert!(config.validate().is_ok());

        config.speech_threshold = 0.3;
        config.silence_threshold = 0.5;
        assert!(config.validate().is_err());

        config.speech_threshold = 0.3;
        config.silence_threshold = 0.3;
        assert!(config.validate().is_err());

        config = HysteresisConfig {
            speech_threshold: 1.5,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_duration_to_samples() {
        let config = HysteresisConfig::default();
        assert_eq!(config.min_speech_samples(), 1600);
        assert_eq!(config.min_silence_samples(), 4800);
    }

    #[test]
    fn test_speech_start_fires_on_crossing_frame() {
        // 512-sample frames at 0.9 confidence: runs hit 512, 1024, 1536,
        // then 2048 which is the first total at or past 1600.
        let mut det = detector();

        assert_eq!(det.update(0.9, 512), None);
        assert_eq!(det.update(0.9, 512), None);
        assert_eq!(det.update(0.9, 512), None);
        assert_eq!(det.update(0.9, 512), Some(VadEventKind::SpeechStart));
        assert!(det.is_speaking());

        // Continued speech produces no further start events.
        assert_eq!(det.update(0.9, 512), None);
        assert_eq!(det.update(0.95, 512), None);
    }

    #[test]
    fn test_speech_start_at_exactly_minimum_samples() {
        // 400-sample frames reach exactly 1600 on the fourth frame.
        let mut det = detector();

        for _ in 0..3 {
            assert_eq!(det.update(0.9, 400), None);
        }
        assert_eq!(det.update(0.9, 400), Some(VadEventKind::SpeechStart));
        assert_eq!(det.speech_run_samples(), 1600);
    }

    #[test]
    fn test_speech_end_symmetric_debounce() {
        // Minimum silence is 4800 samples; tenth 512-sample silent frame
        // reaches 5120.
        let mut det = speaking_detector();

        for i in 1..=9 {
            assert_eq!(det.update(0.1, 512), None, "no event at frame {}", i);
        }
        assert_eq!(det.update(0.1, 512), Some(VadEventKind::SpeechEnd));
        assert!(!det.is_speaking());
    }

    #[test]
    fn test_dead_zone_never_transitions() {
        let mut det = detector();
        let wobble = [0.4, 0.35, 0.45, 0.31, 0.49, 0.42, 0.38];

        for _ in 0..200 {
            for &confidence in &wobble {
                assert_eq!(det.update(confidence, 512), None);
            }
        }
        assert!(!det.is_speaking());
        assert_eq!(det.speech_run_samples(), 0);
        assert_eq!(det.silence_run_samples(), 0);

        // Same from the speaking side: the dead zone holds that state too.
        let mut det = speaking_detector();
        for _ in 0..200 {
            for &confidence in &wobble {
                assert_eq!(det.update(confidence, 512), None);
            }
        }
        assert!(det.is_speaking());
    }

    #[test]
    fn test_threshold_boundaries_belong_to_dead_zone() {
        let mut det = detector();

        // Strict inequalities: exactly-at-threshold frames change nothing.
        assert_eq!(det.update(0.5, 512), None);
        assert_eq!(det.speech_run_samples(), 0);
        assert_eq!(det.update(0.3, 512), None);
        assert_eq!(det.silence_run_samples(), 0);
    }

    #[test]
    fn test_dead_zone_preserves_accumulated_runs() {
        let mut det = detector();

        det.update(0.9, 512);
        det.update(0.9, 512);
        assert_eq!(det.speech_run_samples(), 1024);

        // A dead-zone frame must not reset the run.
        det.update(0.4, 512);
        assert_eq!(det.speech_run_samples(), 1024);

        det.update(0.9, 512);
        assert_eq!(det.update(0.9, 512), Some(VadEventKind::SpeechStart));
    }

    #[test]
    fn test_silence_frame_zeroes_speech_run() {
        let mut det = detector();

        det.update(0.9, 512);
        det.update(0.9, 512);
        det.update(0.9, 512);
        assert_eq!(det.speech_run_samples(), 1536);

        // One confidently-silent frame wipes the progress toward start.
        det.update(0.1, 512);
        assert_eq!(det.speech_run_samples(), 0);

        // The climb starts over: three more frames are not enough again.
        det.update(0.9, 512);
        det.update(0.9, 512);
        assert_eq!(det.update(0.9, 512), None);
        assert_eq!(det.update(0.9, 512), Some(VadEventKind::SpeechStart));
    }

    #[test]
    fn test_single_oversized_frame_emits_one_event() {
        let mut det = detector();
        assert_eq!(det.update(0.9, 16000), Some(VadEventKind::SpeechStart));
        assert_eq!(det.update(0.9, 16000), None);
    }

    #[test]
    fn test_reset_matches_fresh_detector() {
        let sequence: Vec<(f32, u64)> = vec![
            (0.1, 512),
            (0.1, 512),
            (0.9, 512),
            (0.9, 512),
            (0.9, 512),
            (0.9, 512),
            (0.4, 512),
            (0.1, 512),
        ];

        let mut fresh = detector();
        let fresh_events: Vec<_> = sequence
            .iter()
            .map(|&(c, n)| fresh.update(c, n))
            .collect();

        // Drive a detector mid-utterance, then reset.
        let mut reused = speaking_detector();
        reused.update(0.9, 512);
        reused.reset();
        assert!(!reused.is_speaking());
        assert_eq!(reused.speech_run_samples(), 0);
        assert_eq!(reused.silence_run_samples(), 0);

        let reused_events: Vec<_> = sequence
            .iter()
            .map(|&(c, n)| reused.update(c, n))
            .collect();

        assert_eq!(reused_events, fresh_events);
    }

    #[test]
    fn test_event_kind_serialization() {
        assert_eq!(
            serde_json::to_string(&VadEventKind::SpeechStart).unwrap(),
            "\"speech_start\""
        );
        assert_eq!(
            serde_json::to_string(&VadEventKind::SpeechEnd).unwrap(),
            "\"speech_end\""
        );
        assert_eq!(VadEventKind::SpeechStart.as_str(), "speech_start");
    }
}
