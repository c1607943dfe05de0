//! # Scorer Boundary
//!
//! The scoring model is a capability, not an object: one call takes a
//! fixed-size frame and returns a speech probability. Keeping the contract
//! this narrow isolates the hysteresis logic from any model runtime and lets
//! tests substitute scripted scorers without touching the state machine.
//!
//! The shipped implementation maps frame RMS energy onto [0, 1] with a
//! linear ramp between a noise floor and a full-scale reference. A neural
//! scorer such as Silero plugs in behind the same trait.

use crate::audio::VadFrame;
use anyhow::{anyhow, Result};

/// Scoring contract consumed by the session pipeline.
///
/// Implementations must be shareable across sessions (`Send + Sync`); any
/// model state they keep is invisible to the pipeline, which treats every
/// call as a pure function of the frame.
pub trait VadScorer: Send + Sync {
    /// Short identifier reported by the health endpoints.
    fn name(&self) -> &'static str;

    /// Score one frame, returning speech confidence in [0.0, 1.0].
    fn score(&self, frame: &VadFrame) -> Result<f32>;
}

/// RMS-energy scorer: silence scores near 0, loud sustained audio near 1.
#[derive(Debug, Clone)]
pub struct EnergyScorer {
    /// RMS at or below this maps to 0.0
    noise_floor_rms: f32,

    /// RMS at or above this maps to 1.0
    full_scale_rms: f32,
}

impl EnergyScorer {
    /// Create a scorer with explicit calibration points.
    ///
    /// Typical speech from a consumer microphone lands around 0.05 to 0.3 RMS,
    /// so the defaults put conversational levels comfortably above the 0.5
    /// speech threshold while leaving room noise near zero.
    pub fn new(noise_floor_rms: f32, full_scale_rms: f32) -> Self {
        Self {
            noise_floor_rms,
            full_scale_rms,
        }
    }

    fn rms(samples: &[f32]) -> f32 {
        if samples.is_empty() {
            return 0.0;
        }
        let sum_sq: f32 = samples.iter().map(|s| s * s).sum();
        (sum_sq / samples.len() as f32).sqrt()
    }
}

impl Default for EnergyScorer {
    fn default() -> Self {
        Self::new(0.01, 0.15)
    }
}

impl VadScorer for EnergyScorer {
    fn name(&self) -> &'static str {
        "energy-rms"
    }

    fn score(&self, frame: &VadFrame) -> Result<f32> {
        if frame.is_empty() {
            return Err(anyhow!("Cannot score an empty frame"));
        }

        let rms = Self::rms(&frame.samples);
        let span = self.full_scale_rms - self.noise_floor_rms;
        if span <= 0.0 {
            return Err(anyhow!(
                "Scorer misconfigured: full scale {} must exceed noise floor {}",
                self.full_scale_rms,
                self.noise_floor_rms
            ));
        }

        Ok(((rms - self.noise_floor_rms) / span).clamp(0.0, 1.0))
    }
}
