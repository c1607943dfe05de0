//! # Voice Activity Detection Module
//!
//! Turns fixed-size audio frames into stable speech/silence decisions. The
//! scorer produces a raw per-frame probability; the hysteresis state machine
//! debounces that stream into discrete `speech_start` / `speech_end` events.
//!
//! ## Key Components:
//! - **Scorer Boundary**: opaque `frame -> confidence` contract plus the
//!   shipped RMS-energy implementation
//! - **Hysteresis State Machine**: dual-threshold, duration-guarded event
//!   generation (the part that makes the output usable for UI and barge-in)
//!
//! ## Why Hysteresis:
//! Raw scorer output flickers near threshold boundaries. Requiring sustained
//! evidence before every transition trades a little latency (one minimum
//! duration) for events that fire exactly once per utterance.

pub mod hysteresis;  // Dual-threshold debounced state machine
pub mod scorer;      // Scorer contract and energy-based default

pub use hysteresis::{HysteresisConfig, HysteresisDetector, VadEventKind};
pub use scorer::{EnergyScorer, VadScorer};
