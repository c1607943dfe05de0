//! # Audio Processing Module
//!
//! This module implements the per-session audio pipeline that turns raw
//! WebSocket chunks into fixed-size frames ready for voice activity scoring.
//!
//! ## Key Components:
//! - **Decoder**: Byte payloads to mono f32 PCM (`decoder`)
//! - **Resampler**: Capture rate down to the scorer rate (`resampler`)
//! - **Frame Accumulator**: Regroups arbitrary chunks into 512-sample frames (`buffer`)
//! - **Session Manager**: Owns live pipelines and routes work to them (`session`)
//!
//! ## Audio Format Requirements:
//! - **Capture Rate**: 24kHz (24,000 Hz) from the browser
//! - **Scorer Rate**: 16kHz (16,000 Hz), 512-sample frames
//! - **Bit Depth**: 16-bit PCM
//! - **Channels**: Mono (1 channel)
//! - **Encoding**: Little-endian signed integers
//!
//! ## Pipeline Guarantee:
//! Every stage is chunk-boundary invariant: how the client slices the stream
//! into messages never changes which samples reach the scorer or when.

// WebSocket handler is in src/websocket.rs at the root level
pub mod buffer;       // Frame accumulation from arbitrary chunk sizes
pub mod decoder;      // Compressed payload to f32 PCM
pub mod resampler;    // Decimating rate conversion
pub mod session;      // Session state management

pub use buffer::VadFrame;
pub use session::{FrameResult, SessionCommand, SessionConfig, SessionManager, VadSession};
