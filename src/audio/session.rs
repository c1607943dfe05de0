//! # Session Management
//!
//! One session per WebSocket connection, each owning a complete, isolated
//! detection pipeline: decoder -> resampler -> frame accumulator -> scorer ->
//! hysteresis. Sessions never share mutable state; the registry map is the
//! only structure touched by more than one task, and it is locked only
//! around insert/remove/lookup.
//!
//! ## Session Lifecycle:
//! 1. **Connect**: registry builds the pipeline and hands the caller the
//!    session plus a command receiver
//! 2. **Running**: a dedicated worker task owns the session and processes
//!    commands strictly in arrival order
//! 3. **Disconnect**: registry drops the command sender; the worker drains
//!    and exits, taking the pipeline state with it
//!
//! ## Rust Concepts:
//! - **Exclusive ownership**: the worker task holds the `VadSession` by
//!   value, so no lock guards any per-frame state; isolation between
//!   sessions falls out of the ownership model
//! - **mpsc ordering**: an unbounded channel preserves send order, which is
//!   what guarantees frame N is scored and applied before frame N+1

use crate::audio::buffer::FrameAccumulator;
use crate::audio::decoder::{AudioDecoder, Pcm16Decoder};
use crate::audio::resampler::Resampler;
use crate::vad::{HysteresisConfig, HysteresisDetector, VadEventKind, VadScorer};

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Pipeline dimensions for one session, snapshotted at connection time.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Rate the decoder produces (24000 for the browser capture path)
    pub source_sample_rate: u32,

    /// Rate the scorer expects (16000)
    pub target_sample_rate: u32,

    /// Scorer frame length in samples (512)
    pub frame_size: usize,

    /// State machine tuning
    pub hysteresis: HysteresisConfig,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            source_sample_rate: 24000,
            target_sample_rate: 16000,
            frame_size: 512,
            hysteresis: HysteresisConfig::default(),
        }
    }
}

/// Outcome of scoring one completed frame.
///
/// Every completed frame produces one of these, event or not, so the
/// transport layer can forward continuous confidence to the client.
#[derive(Debug, Clone, PartialEq)]
pub struct FrameResult {
    /// State transition triggered by this frame, if any
    pub event: Option<VadEventKind>,

    /// Scorer confidence for this frame (0.0 on scorer failure)
    pub confidence: f32,

    /// Detector state after applying this frame
    pub is_speaking: bool,

    /// Seconds of audio processed when this frame completed, counted at the
    /// target rate from session start (or the last reset)
    pub timestamp: f64,
}

/// Work items delivered to a session's worker task.
#[derive(Debug)]
pub enum SessionCommand {
    /// One compressed audio chunk, already base64-decoded
    Ingest(Vec<u8>),

    /// Clear all pipeline state
    Reset,
}

/// One connection's detection pipeline.
pub struct VadSession {
    pub session_id: String,

    decoder: Box<dyn AudioDecoder>,
    resampler: Resampler,
    accumulator: FrameAccumulator,
    detector: HysteresisDetector,
    scorer: Arc<dyn VadScorer>,

    /// Audio clock: target-rate samples pushed through the detector
    samples_processed: u64,
    target_sample_rate: u32,

    created_at: DateTime<Utc>,
}

impl VadSession {
    /// Build a pipeline around the given decoder and scorer.
    ///
    /// The resampler is sized from the decoder's declared output rate, so a
    /// substituted codec cannot silently disagree with the rate conversion.
    pub fn new(
        session_id: String,
        config: &SessionConfig,
        decoder: Box<dyn AudioDecoder>,
        scorer: Arc<dyn VadScorer>,
    ) -> Result<Self, String> {
        let resampler = Resampler::new(decoder.sample_rate(), config.target_sample_rate)?;
        let accumulator = FrameAccumulator::new(config.frame_size, config.target_sample_rate)?;
        let detector = HysteresisDetector::new(config.hysteresis.clone())?;

        Ok(Self {
            session_id,
            decoder,
            resampler,
            accumulator,
            detector,
            scorer,
            samples_processed: 0,
            target_sample_rate: config.target_sample_rate,
            created_at: Utc::now(),
        })
    }

    /// Run one compressed chunk through the full pipeline.
    ///
    /// Returns one result per frame the chunk completed. Decode failures
    /// drop the chunk without touching any pipeline state; scorer failures
    /// report the affected frame as confidence 0.0 and leave the state
    /// machine untouched. Scoring happens on the blocking pool one frame at
    /// a time, which keeps a slow scorer off the async executor while
    /// preserving frame order.
    pub async fn ingest(&mut self, payload: &[u8]) -> Vec<FrameResult> {
        let pcm = match self.decoder.decode(payload) {
            Ok(pcm) => pcm,
            Err(err) => {
                warn!(
                    "Session {}: decode failed, chunk contributes nothing: {}",
                    self.session_id, err
                );
                return Vec::new();
            }
        };

        let resampled = self.resampler.resample(&pcm);
        let frames = self.accumulator.push(&resampled);

        let mut results = Vec::with_capacity(frames.len());
        for frame in frames {
            let frame_samples = frame.len() as u64;
            self.samples_processed += frame_samples;
            let timestamp = self.samples_processed as f64 / self.target_sample_rate as f64;

            let scorer = Arc::clone(&self.scorer);
            let confidence = match tokio::task::spawn_blocking(move || scorer.score(&frame)).await
            {
                Ok(Ok(value)) => value.clamp(0.0, 1.0),
                Ok(Err(err)) => {
                    warn!(
                        "Session {}: scorer failed, frame reported as silence: {}",
                        self.session_id, err
                    );
                    results.push(FrameResult {
                        event: None,
                        confidence: 0.0,
                        is_speaking: self.detector.is_speaking(),
                        timestamp,
                    });
                    continue;
                }
                Err(err) => {
                    error!("Session {}: scorer task failed: {}", self.session_id, err);
                    results.push(FrameResult {
                        event: None,
                        confidence: 0.0,
                        is_speaking: self.detector.is_speaking(),
                        timestamp,
                    });
                    continue;
                }
            };

            let event = self.detector.update(confidence, frame_samples);
            results.push(FrameResult {
                event,
                confidence,
                is_speaking: self.detector.is_speaking(),
                timestamp,
            });
        }

        results
    }

    /// Clear resampler phase, partial frame, detector state, and the audio
    /// clock in one synchronous step.
    ///
    /// The worker owns this session exclusively and `reset` has no await
    /// points, so no caller can ever observe a half-cleared pipeline.
    pub fn reset(&mut self) {
        self.resampler.reset();
        self.accumulator.clear();
        self.detector.reset();
        self.samples_processed = 0;
        info!("Session {}: pipeline state reset", self.session_id);
    }

    pub fn is_speaking(&self) -> bool {
        self.detector.is_speaking()
    }

    pub fn samples_processed(&self) -> u64 {
        self.samples_processed
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }
}

/// Registry entry: the channel feeding one session's worker.
struct SessionHandle {
    tx: mpsc::UnboundedSender<SessionCommand>,
}

/// Maps connection identities to live sessions.
///
/// Shared across the server as one instance passed by reference to the
/// transport layer. The registry owns only the scorer and the live channel
/// senders; pipeline dimensions and the connection limit are supplied per
/// `connect` call, so they track the configuration current at accept time
/// rather than at boot. Dropping a handle on disconnect closes the worker's
/// channel, which is how teardown propagates without any signal beyond
/// ownership.
pub struct SessionManager {
    sessions: RwLock<HashMap<String, SessionHandle>>,
    scorer: Arc<dyn VadScorer>,
}

impl SessionManager {
    pub fn new(scorer: Arc<dyn VadScorer>) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            scorer,
        }
    }

    /// Register a fresh session for a connection.
    ///
    /// `config` and `max_sessions` are whatever the caller read at accept
    /// time; running sessions keep the dimensions they were built with.
    /// Returns the session id, the session itself, and the receiver its
    /// worker task should drain. The caller spawns the worker; the registry
    /// keeps only the sender.
    pub fn connect(
        &self,
        session_id: Option<String>,
        config: &SessionConfig,
        max_sessions: usize,
    ) -> Result<
        (
            String,
            VadSession,
            mpsc::UnboundedReceiver<SessionCommand>,
        ),
        String,
    > {
        let session_id = session_id.unwrap_or_else(|| Uuid::new_v4().to_string());

        let decoder = Box::new(Pcm16Decoder::new(config.source_sample_rate));
        let session = VadSession::new(
            session_id.clone(),
            config,
            decoder,
            Arc::clone(&self.scorer),
        )?;
        let (tx, rx) = mpsc::unbounded_channel();

        {
            let mut sessions = self.sessions.write().unwrap();

            if sessions.len() >= max_sessions {
                return Err(format!(
                    "Maximum concurrent sessions ({}) reached",
                    max_sessions
                ));
            }
            if sessions.contains_key(&session_id) {
                return Err(format!("Session ID '{}' already exists", session_id));
            }

            sessions.insert(session_id.clone(), SessionHandle { tx });
        }

        info!(
            "Session {} registered ({} active)",
            session_id,
            self.active_session_count()
        );
        Ok((session_id, session, rx))
    }

    /// Remove a session, closing its worker's channel.
    pub fn disconnect(&self, session_id: &str) -> bool {
        let removed = self
            .sessions
            .write()
            .unwrap()
            .remove(session_id)
            .is_some();

        if removed {
            info!(
                "Session {} removed ({} active)",
                session_id,
                self.active_session_count()
            );
        } else {
            debug!("Session {} already gone at disconnect", session_id);
        }

        removed
    }

    /// Queue a command for a session's worker.
    ///
    /// An unknown id (a race with disconnect) is reported as an error for
    /// the caller to log and ignore; it must never tear anything down.
    pub fn command(&self, session_id: &str, command: SessionCommand) -> Result<(), String> {
        let sessions = self.sessions.read().unwrap();
        let handle = sessions
            .get(session_id)
            .ok_or_else(|| format!("No session registered for '{}'", session_id))?;

        handle
            .tx
            .send(command)
            .map_err(|_| format!("Session '{}' worker is no longer running", session_id))
    }

    pub fn active_session_count(&self) -> usize {
        self.sessions.read().unwrap().len()
    }

    pub fn active_session_ids(&self) -> Vec<String> {
        self.sessions.read().unwrap().keys().cloned().collect()
    }

    pub fn scorer_name(&self) -> &'static str {
        self.scorer.name()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vad::EnergyScorer;
    use anyhow::anyhow;

    /// Scorer that always fails, for the fail-open path.
    struct FailingScorer;

    impl VadScorer for FailingScorer {
        fn name(&self) -> &'static str {
            "failing"
        }

        fn score(&self, _frame: &crate::audio::VadFrame) -> anyhow::Result<f32> {
            Err(anyhow!("scorer exploded"))
        }
    }

    fn pcm16_bytes(samples: &[f32]) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(samples.len() * 2);
        for &sample in samples {
            let value = (sample * 32767.0) as i16;
            bytes.extend_from_slice(&value.to_le_bytes());
        }
        bytes
    }

    fn silence(len: usize) -> Vec<f32> {
        vec![0.0; len]
    }

    fn tone(len: usize) -> Vec<f32> {
        (0..len)
            .map(|i| if i % 2 == 0 { 0.5 } else { -0.5 })
            .collect()
    }

    /// Quieter tone scoring near 0.6 with the default scorer.
    fn soft_tone(len: usize) -> Vec<f32> {
        (0..len)
            .map(|i| if i % 2 == 0 { 0.094 } else { -0.094 })
            .collect()
    }

    fn test_session() -> VadSession {
        let config = SessionConfig::default();
        VadSession::new(
            "test-session".to_string(),
            &config,
            Box::new(Pcm16Decoder::new(config.source_sample_rate)),
            Arc::new(EnergyScorer::default()),
        )
        .unwrap()
    }

    fn events_of(results: &[FrameResult]) -> Vec<VadEventKind> {
        results.iter().filter_map(|r| r.event).collect()
    }

    #[tokio::test]
    async fn test_silence_produces_no_events_and_zero_confidence() {
        let mut session = test_session();

        let results = session.ingest(&pcm16_bytes(&silence(3600))).await;

        // 3600 source samples decimate to 2400, completing four 512-frames.
        assert_eq!(results.len(), 4);
        for result in &results {
            assert_eq!(result.event, None);
            assert_eq!(result.confidence, 0.0);
            assert!(!result.is_speaking);
        }
    }

    #[tokio::test]
    async fn test_end_to_end_silence_tone_silence() {
        let mut session = test_session();
        let mut all_results = Vec::new();

        // Lead-in silence: 3600 samples at 24kHz.
        all_results.extend(session.ingest(&pcm16_bytes(&silence(3600))).await);

        // 400ms of loud tone in 100ms chunks.
        for _ in 0..4 {
            all_results.extend(session.ingest(&pcm16_bytes(&tone(2400))).await);
        }

        // 500ms of silence in 125ms chunks.
        for _ in 0..4 {
            all_results.extend(session.ingest(&pcm16_bytes(&silence(3000))).await);
        }

        let events = events_of(&all_results);
        assert_eq!(
            events,
            vec![VadEventKind::SpeechStart, VadEventKind::SpeechEnd]
        );

        // Timestamps carry the audio clock and never move backwards.
        let mut last = 0.0;
        for result in &all_results {
            assert!(result.timestamp > last);
            last = result.timestamp;
        }
    }

    #[tokio::test]
    async fn test_chunk_sizes_do_not_change_detection() {
        let mut stream = Vec::new();
        stream.extend(silence(2000));
        stream.extend(tone(9600));
        stream.extend(silence(12000));

        let mut whole = test_session();
        let whole_results = whole.ingest(&pcm16_bytes(&stream)).await;

        let mut split = test_session();
        let mut split_results = Vec::new();
        for chunk in stream.chunks(731) {
            split_results.extend(split.ingest(&pcm16_bytes(chunk)).await);
        }

        assert_eq!(split_results, whole_results);
    }

    #[tokio::test]
    async fn test_decode_failure_leaves_pipeline_untouched() {
        let mut session = test_session();
        let mut control = test_session();

        // Odd byte count cannot decode; the chunk must contribute nothing.
        let bad_results = session.ingest(&[0x01, 0x02, 0x03]).await;
        assert!(bad_results.is_empty());
        assert_eq!(session.samples_processed(), 0);

        // Subsequent audio behaves exactly as if the bad chunk never arrived.
        let after = session.ingest(&pcm16_bytes(&tone(4800))).await;
        let expected = control.ingest(&pcm16_bytes(&tone(4800))).await;
        assert_eq!(after, expected);
    }

    #[tokio::test]
    async fn test_scorer_failure_reports_zero_and_no_event() {
        let config = SessionConfig::default();
        let mut session = VadSession::new(
            "failing".to_string(),
            &config,
            Box::new(Pcm16Decoder::new(config.source_sample_rate)),
            Arc::new(FailingScorer),
        )
        .unwrap();

        let results = session.ingest(&pcm16_bytes(&tone(3600))).await;

        assert_eq!(results.len(), 4);
        for result in &results {
            assert_eq!(result.event, None);
            assert_eq!(result.confidence, 0.0);
            assert!(!result.is_speaking);
        }
        // Failed frames advance the clock but never the state machine.
        assert_eq!(session.samples_processed(), 2048);
    }

    #[tokio::test]
    async fn test_reset_reproduces_fresh_session_timing() {
        // Fixed post-reset program: silence, then enough tone to start.
        let program: Vec<Vec<f32>> = vec![
            silence(2400),
            tone(2400),
            tone(2400),
            tone(2400),
            tone(2400),
            silence(3000),
        ];

        let mut fresh = test_session();
        let mut fresh_results = Vec::new();
        for chunk in &program {
            fresh_results.extend(fresh.ingest(&pcm16_bytes(chunk)).await);
        }

        // Drive another session mid-utterance, then reset it.
        let mut reused = test_session();
        reused.ingest(&pcm16_bytes(&tone(9000))).await;
        assert!(reused.is_speaking());
        reused.reset();
        assert!(!reused.is_speaking());
        assert_eq!(reused.samples_processed(), 0);

        let mut reused_results = Vec::new();
        for chunk in &program {
            reused_results.extend(reused.ingest(&pcm16_bytes(chunk)).await);
        }

        assert_eq!(reused_results, fresh_results);
    }

    #[tokio::test]
    async fn test_sessions_are_isolated() {
        let program: Vec<Vec<f32>> = vec![
            silence(2400),
            tone(2400),
            tone(2400),
            tone(2400),
            tone(2400),
        ];

        // B alone.
        let mut control = test_session();
        let mut control_results = Vec::new();
        for chunk in &program {
            control_results.extend(control.ingest(&pcm16_bytes(chunk)).await);
        }

        // B interleaved with a busy session A that resets mid-way.
        let mut a = test_session();
        let mut b = test_session();
        let mut b_results = Vec::new();
        for (i, chunk) in program.iter().enumerate() {
            a.ingest(&pcm16_bytes(&tone(2400))).await;
            if i == 2 {
                a.reset();
            }
            b_results.extend(b.ingest(&pcm16_bytes(chunk)).await);
        }

        assert_eq!(b_results, control_results);
    }

    #[test]
    fn test_manager_enforces_session_limit() {
        let manager = SessionManager::new(Arc::new(EnergyScorer::default()));
        let config = SessionConfig::default();

        let (id_a, _session_a, _rx_a) = manager.connect(None, &config, 2).unwrap();
        let (_id_b, _session_b, _rx_b) = manager.connect(None, &config, 2).unwrap();
        assert_eq!(manager.active_session_count(), 2);

        let overflow = manager.connect(None, &config, 2);
        assert!(overflow.is_err());

        // Freed capacity can be reused.
        assert!(manager.disconnect(&id_a));
        assert!(manager.connect(None, &config, 2).is_ok());
    }

    #[test]
    fn test_manager_rejects_duplicate_ids() {
        let manager = SessionManager::new(Arc::new(EnergyScorer::default()));
        let config = SessionConfig::default();

        let _first = manager
            .connect(Some("conn-1".to_string()), &config, 4)
            .unwrap();
        assert!(manager
            .connect(Some("conn-1".to_string()), &config, 4)
            .is_err());
    }

    #[test]
    fn test_manager_tracks_ids_and_disconnect() {
        let manager = SessionManager::new(Arc::new(EnergyScorer::default()));
        let config = SessionConfig::default();

        let (id, _session, _rx) = manager.connect(None, &config, 4).unwrap();
        assert!(manager.active_session_ids().contains(&id));

        assert!(manager.disconnect(&id));
        assert_eq!(manager.active_session_count(), 0);
        assert!(!manager.disconnect(&id));
    }

    #[tokio::test]
    async fn test_manager_routes_commands_to_worker_channel() {
        let manager = SessionManager::new(Arc::new(EnergyScorer::default()));
        let config = SessionConfig::default();

        let (id, _session, mut rx) = manager.connect(None, &config, 4).unwrap();

        manager
            .command(&id, SessionCommand::Ingest(vec![1, 2, 3, 4]))
            .unwrap();
        manager.command(&id, SessionCommand::Reset).unwrap();

        match rx.recv().await.unwrap() {
            SessionCommand::Ingest(data) => assert_eq!(data, vec![1, 2, 3, 4]),
            other => panic!("expected Ingest, got {:?}", other),
        }
        assert!(matches!(rx.recv().await.unwrap(), SessionCommand::Reset));

        // Unknown ids are an error the caller logs and ignores.
        assert!(manager
            .command("missing", SessionCommand::Reset)
            .is_err());
    }

    #[tokio::test]
    async fn test_connect_applies_caller_config_to_new_sessions() {
        let manager = SessionManager::new(Arc::new(EnergyScorer::default()));

        // Under the default thresholds this mid-energy audio starts speech.
        let (_, mut relaxed, _rx_a) = manager
            .connect(None, &SessionConfig::default(), 4)
            .unwrap();
        let results = relaxed.ingest(&pcm16_bytes(&soft_tone(9600))).await;
        assert!(events_of(&results).contains(&VadEventKind::SpeechStart));

        // A raised threshold handed to a later connect governs that session:
        // the same audio now sits in the dead zone and never starts speech.
        let mut strict_config = SessionConfig::default();
        strict_config.hysteresis.speech_threshold = 0.9;
        let (_, mut strict, _rx_b) = manager.connect(None, &strict_config, 4).unwrap();
        let results = strict.ingest(&pcm16_bytes(&soft_tone(9600))).await;
        assert!(events_of(&results).is_empty());
        assert!(!strict.is_speaking());
    }
}
