//! # Configuration Management
//!
//! This module handles loading and managing application configuration from multiple sources:
//! - TOML configuration files (config.toml)
//! - Environment variables (with APP_ prefix)
//! - Default values (built into the code)
//!
//! ## Key Rust Concepts Used:
//! - **Serde**: Serialization/deserialization library for converting between Rust structs and data formats
//! - **derive macros**: Automatically generate code for common traits (Debug, Clone, Serialize, Deserialize)
//! - **struct**: Custom data types that group related fields together
//! - **impl blocks**: Add methods to structs
//! - **Result<T, E>**: Error handling that forces you to handle potential failures
//!
//! ## Configuration Priority (highest to lowest):
//! 1. Environment variables (APP_SERVER_HOST, APP_SERVER_PORT, etc.)
//! 2. Configuration file (config.toml)
//! 3. Default values (defined in the Default impl)

use crate::audio::SessionConfig;
use crate::vad::HysteresisConfig;

use anyhow::Result;              // Better error handling with context
use serde::{Deserialize, Serialize};  // For converting to/from TOML, JSON, etc.
use std::env;                    // For reading environment variables

/// Main application configuration that contains all settings.
///
/// ## Rust Concepts:
/// - **#[derive(...)]**: Automatically implements common traits:
///   - `Debug`: Allows printing with {:?} for debugging
///   - `Clone`: Allows making copies of the struct
///   - `Serialize`: Can convert this struct to JSON, TOML, etc.
///   - `Deserialize`: Can create this struct from JSON, TOML, etc.
/// - **pub struct**: Public struct that other modules can use
/// - **pub fields**: Public fields that can be accessed directly
///
/// ## Why separate config structs:
/// Breaking configuration into logical groups (server, audio, vad, performance)
/// makes it easier to understand and maintain as the application grows.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub audio: AudioConfig,
    pub vad: VadConfig,
    pub performance: PerformanceConfig,
}

/// Server-specific configuration settings.
///
/// ## Fields:
/// - `host`: IP address or hostname to bind the server to (e.g., "127.0.0.1", "0.0.0.0")
/// - `port`: TCP port number to listen on (1-65535, typically 8080 for development)
///
/// ## Common values:
/// - `host = "127.0.0.1"`: Only accept connections from localhost (development)
/// - `host = "0.0.0.0"`: Accept connections from any IP address (production)
/// - `port = 8080`: Common development port (production often uses 80 or 443)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,  // u16 = unsigned 16-bit integer (0-65535), perfect for port numbers
}

/// Audio pipeline dimensions.
///
/// ## Fields:
/// - `source_sample_rate`: Rate of the audio the client captures and streams (24000 for browser capture)
/// - `target_sample_rate`: Rate the voice activity scorer operates at (16000)
/// - `frame_size`: Samples per scorer frame at the target rate (512 = 32ms at 16kHz)
///
/// ## Rate relationship:
/// The source rate must be at least the target rate because the pipeline only
/// decimates (drops samples); it never invents samples by interpolation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AudioConfig {
    pub source_sample_rate: u32,
    pub target_sample_rate: u32,
    pub frame_size: usize,
}

/// Voice activity detection tuning.
///
/// ## Fields:
/// - `speech_threshold`: Confidence a frame must exceed to count toward speech (0.0-1.0)
/// - `silence_threshold`: Confidence a frame must fall below to count toward silence (0.0-1.0)
/// - `min_speech_duration_ms`: Sustained speech required before a speech_start event fires
/// - `min_silence_duration_ms`: Sustained silence required before a speech_end event fires
/// - `confidence_floor`: Per-frame confidence below this is not streamed to the client
///
/// ## Tuning guidelines:
/// - Wider threshold gap: Fewer spurious flips on borderline audio, slower to react
/// - Longer minimum durations: Coughs and pauses ignored, but events lag the voice
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VadConfig {
    pub speech_threshold: f32,
    pub silence_threshold: f32,
    pub min_speech_duration_ms: u32,
    pub min_silence_duration_ms: u32,
    pub confidence_floor: f32,
}

/// Performance tuning configuration.
///
/// ## Fields:
/// - `max_concurrent_sessions`: Maximum number of detection sessions to handle simultaneously
///
/// ## Tuning guidelines:
/// - Higher concurrent sessions: More users, but every active session keeps a
///   scoring task busy on the blocking pool
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PerformanceConfig {
    pub max_concurrent_sessions: usize,  // usize = platform-specific unsigned integer (usually 64-bit)
}

/// Provides default configuration values.
///
/// ## Rust Concepts:
/// - **impl Default**: Implements the Default trait, which provides a `default()` method
/// - **Self**: Refers to the current type (AppConfig)
/// - **to_string()**: Converts string literals (&str) to owned String objects
///
/// ## Why defaults matter:
/// Default values ensure the application can start even if no configuration file exists.
/// They also serve as documentation of reasonable starting values.
impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: "127.0.0.1".to_string(),  // Localhost only (safe for development)
                port: 8080,                     // Common development port
            },
            audio: AudioConfig {
                source_sample_rate: 24000,  // Browser capture rate
                target_sample_rate: 16000,  // Scorer rate
                frame_size: 512,            // 32ms frames at 16kHz
            },
            vad: VadConfig {
                speech_threshold: 0.5,
                silence_threshold: 0.3,
                min_speech_duration_ms: 100,   // Ignore clicks and coughs
                min_silence_duration_ms: 300,  // Ride out mid-sentence pauses
                confidence_floor: 0.1,         // Don't stream near-zero confidence
            },
            performance: PerformanceConfig {
                max_concurrent_sessions: 10,   // Reasonable for most development machines
            },
        }
    }
}

/// Implementation block for AppConfig - adds methods to the struct.
impl AppConfig {
    /// Load configuration from multiple sources in priority order.
    ///
    /// ## Configuration Loading Process:
    /// 1. Start with built-in defaults
    /// 2. Override with values from config.toml (if it exists)
    /// 3. Override with environment variables prefixed with APP_
    /// 4. Handle special cases for HOST and PORT environment variables
    ///
    /// ## Rust Concepts:
    /// - **Builder pattern**: Chain method calls to configure the config loader
    /// - **?**: Early return on error (if any step fails, return the error)
    /// - **env::var()**: Read environment variables, returns Result<String, VarError>
    /// - **if let Ok(...)**: Only execute if the environment variable exists
    ///
    /// ## Environment Variable Examples:
    /// - `APP_SERVER_HOST=0.0.0.0`: Override server host
    /// - `APP_SERVER_PORT=3000`: Override server port
    /// - `HOST=0.0.0.0`: Special case for deployment platforms
    /// - `PORT=3000`: Special case for deployment platforms
    pub fn load() -> Result<Self> {
        let mut settings = config::Config::builder()
            // 1. Start with defaults - converts our Default impl to config format
            .add_source(config::Config::try_from(&AppConfig::default())?)
            // 2. Load from config.toml file (if it exists) - required(false) means "don't error if missing"
            .add_source(config::File::with_name("config").required(false))
            // 3. Load from environment variables with APP_ prefix
            // Example: APP_SERVER_HOST becomes server.host in the config
            .add_source(config::Environment::with_prefix("APP").separator("_"));

        // Handle special environment variables used by deployment platforms
        // These don't follow the APP_ prefix convention but are commonly used
        if let Ok(host) = env::var("HOST") {
            settings = settings.set_override("server.host", host)?;
        }

        if let Ok(port) = env::var("PORT") {
            settings = settings.set_override("server.port", port)?;
        }

        // Build the final configuration and convert it back to our AppConfig struct
        let config = settings.build()?.try_deserialize()?;
        Ok(config)
    }

    /// Validate that the configuration values make sense.
    ///
    /// ## What this checks:
    /// - Server port is not 0 (port 0 is reserved and can't be used)
    /// - Sample rates support decimation (source at least target, neither zero)
    /// - Frame size is greater than 0 (the scorer needs actual frames)
    /// - VAD thresholds are in range with speech strictly above silence
    /// - Minimum durations are nonzero (zero would fire events instantly)
    /// - Confidence floor is a sane fraction
    /// - Max concurrent sessions is greater than 0 (must allow at least one session)
    ///
    /// ## Rust Concepts:
    /// - **&self**: Borrowed reference (read-only access to the struct)
    /// - **anyhow::anyhow!**: Creates an error with a custom message
    /// - **Early return**: Return immediately if validation fails
    ///
    /// ## Why validate:
    /// Catching configuration errors early prevents runtime failures and
    /// provides clear error messages about what's wrong.
    pub fn validate(&self) -> Result<()> {
        if self.server.port == 0 {
            return Err(anyhow::anyhow!("Server port cannot be 0"));
        }

        if self.audio.target_sample_rate == 0 || self.audio.source_sample_rate == 0 {
            return Err(anyhow::anyhow!("Sample rates must be greater than 0"));
        }

        if self.audio.source_sample_rate < self.audio.target_sample_rate {
            return Err(anyhow::anyhow!(
                "Source sample rate ({}) must be at least the target rate ({})",
                self.audio.source_sample_rate,
                self.audio.target_sample_rate
            ));
        }

        if self.audio.frame_size == 0 {
            return Err(anyhow::anyhow!("Frame size must be greater than 0"));
        }

        if !(0.0..=1.0).contains(&self.vad.speech_threshold)
            || !(0.0..=1.0).contains(&self.vad.silence_threshold)
        {
            return Err(anyhow::anyhow!("VAD thresholds must be between 0.0 and 1.0"));
        }

        if self.vad.speech_threshold <= self.vad.silence_threshold {
            return Err(anyhow::anyhow!(
                "Speech threshold ({}) must be above silence threshold ({})",
                self.vad.speech_threshold,
                self.vad.silence_threshold
            ));
        }

        if self.vad.min_speech_duration_ms == 0 || self.vad.min_silence_duration_ms == 0 {
            return Err(anyhow::anyhow!("Minimum durations must be greater than 0"));
        }

        if !(0.0..=1.0).contains(&self.vad.confidence_floor) {
            return Err(anyhow::anyhow!("Confidence floor must be between 0.0 and 1.0"));
        }

        if self.performance.max_concurrent_sessions == 0 {
            return Err(anyhow::anyhow!("Max concurrent sessions must be greater than 0"));
        }

        Ok(())  // All validation passed
    }

    /// Build the per-session pipeline settings from this configuration.
    ///
    /// The session layer never sees server or transport settings; it gets
    /// exactly the dimensions and tuning it needs.
    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            source_sample_rate: self.audio.source_sample_rate,
            target_sample_rate: self.audio.target_sample_rate,
            frame_size: self.audio.frame_size,
            hysteresis: HysteresisConfig {
                speech_threshold: self.vad.speech_threshold,
                silence_threshold: self.vad.silence_threshold,
                min_speech_duration_ms: self.vad.min_speech_duration_ms,
                min_silence_duration_ms: self.vad.min_silence_duration_ms,
                sample_rate: self.audio.target_sample_rate,
            },
        }
    }

    /// Update configuration from a JSON string (used for runtime config updates).
    ///
    /// ## What this does:
    /// 1. Parse the JSON string into a generic value
    /// 2. Extract individual configuration fields if they exist
    /// 3. Update only the fields that were provided
    /// 4. Validate the updated configuration
    ///
    /// ## Rust Concepts:
    /// - **&mut self**: Mutable reference (allows modifying the struct)
    /// - **serde_json::Value**: Generic JSON value that can hold any JSON data
    /// - **if let Some(...)**: Only execute if the field exists in the JSON
    /// - **and_then()**: Chain operations that might fail
    /// - **as_str(), as_u64(), as_f64()**: Convert JSON values to specific types
    ///
    /// ## Partial updates:
    /// This method allows updating only some fields, not the entire configuration.
    /// For example, you can send just `{"vad": {"speech_threshold": 0.6}}` to
    /// change only that threshold.
    pub fn update_from_json(&mut self, json_str: &str) -> Result<()> {
        // Parse the JSON string into a generic value
        let partial_config: serde_json::Value = serde_json::from_str(json_str)?;

        // Update server configuration if provided
        if let Some(server) = partial_config.get("server") {
            if let Some(host) = server.get("host").and_then(|v| v.as_str()) {
                self.server.host = host.to_string();
            }
            if let Some(port) = server.get("port").and_then(|v| v.as_u64()) {
                self.server.port = port as u16;  // Convert u64 to u16 for port number
            }
        }

        // Update audio configuration if provided
        if let Some(audio) = partial_config.get("audio") {
            if let Some(rate) = audio.get("source_sample_rate").and_then(|v| v.as_u64()) {
                self.audio.source_sample_rate = rate as u32;
            }
            if let Some(rate) = audio.get("target_sample_rate").and_then(|v| v.as_u64()) {
                self.audio.target_sample_rate = rate as u32;
            }
            if let Some(size) = audio.get("frame_size").and_then(|v| v.as_u64()) {
                self.audio.frame_size = size as usize;
            }
        }

        // Update VAD tuning if provided
        if let Some(vad) = partial_config.get("vad") {
            if let Some(threshold) = vad.get("speech_threshold").and_then(|v| v.as_f64()) {
                self.vad.speech_threshold = threshold as f32;
            }
            if let Some(threshold) = vad.get("silence_threshold").and_then(|v| v.as_f64()) {
                self.vad.silence_threshold = threshold as f32;
            }
            if let Some(ms) = vad.get("min_speech_duration_ms").and_then(|v| v.as_u64()) {
                self.vad.min_speech_duration_ms = ms as u32;
            }
            if let Some(ms) = vad.get("min_silence_duration_ms").and_then(|v| v.as_u64()) {
                self.vad.min_silence_duration_ms = ms as u32;
            }
            if let Some(floor) = vad.get("confidence_floor").and_then(|v| v.as_f64()) {
                self.vad.confidence_floor = floor as f32;
            }
        }

        // Update performance configuration if provided
        if let Some(performance) = partial_config.get("performance") {
            if let Some(sessions) = performance.get("max_concurrent_sessions").and_then(|v| v.as_u64()) {
                self.performance.max_concurrent_sessions = sessions as usize;
            }
        }

        // Validate the updated configuration to ensure it's still valid
        self.validate()?;
        Ok(())
    }
}
