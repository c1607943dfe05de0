//! # WebSocket Voice Activity Streaming Handler
//!
//! Handles real-time voice activity detection via WebSocket. Clients connect
//! to `/ws`, stream base64-encoded audio chunks, and receive speech events
//! and per-frame confidence as the audio is scored.
//!
//! ## WebSocket Protocol:
//! 1. **Connection**: Client connects; the server registers a session and
//!    starts its processing worker
//! 2. **Audio Streaming**: `{"type": "audio_chunk", "data": "<base64>"}`
//!    messages carry PCM audio at the configured capture rate
//! 3. **Detection Results**: Server pushes `vad_event` messages on
//!    speech_start/speech_end transitions and `vad_confidence` messages for
//!    scored frames
//! 4. **Reset**: `{"type": "reset"}` clears all pipeline state and is
//!    acknowledged with `reset_complete`
//! 5. **Disconnect**: The session and all its state are discarded
//!
//! ## Error Philosophy:
//! A malformed or unexpected inbound message is logged and dropped, never
//! answered. The client keeps streaming; one bad message must not cost the
//! connection or any detector state.
//!
//! ## Key Rust Concepts:
//! - **Actor model**: Each connection is an independent Actix actor with its
//!   own mailbox, so per-connection state needs no locks
//! - **Worker task**: Audio processing happens on a dedicated tokio task that
//!   owns the session pipeline; the actor only routes commands and results
//! - **Channels**: An unbounded mpsc channel carries commands to the worker
//!   in arrival order, which keeps frames strictly ordered per session

use crate::audio::{FrameResult, SessionCommand, SessionConfig, SessionManager, VadSession};
use crate::state::AppState;
use crate::vad::VadEventKind;

use actix::prelude::*;
use actix_web::{web, HttpRequest, HttpResponse, Result as ActixResult};
use actix_web_actors::ws;
use base64::{engine::general_purpose, Engine as _};
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// WebSocket message types for client-server communication.
#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum WebSocketMessage {
    /// Audio chunk from client, base64-encoded bytes of PCM audio
    #[serde(rename = "audio_chunk")]
    AudioChunk {
        /// Base64 payload, decoded before it enters the pipeline
        data: String,
    },

    /// Client request to clear all detection state
    #[serde(rename = "reset")]
    Reset,

    /// Connectivity probe from client, logged and never answered
    #[serde(rename = "test")]
    Test,

    /// Speech boundary event from server
    #[serde(rename = "vad_event")]
    VadEvent {
        /// Which boundary was crossed (speech_start or speech_end)
        event: VadEventKind,
        /// Confidence of the frame that triggered the transition
        confidence: f32,
        /// Seconds of audio processed when the event fired
        timestamp: f64,
    },

    /// Per-frame confidence update from server
    #[serde(rename = "vad_confidence")]
    VadConfidence {
        /// Scorer confidence for the frame (0.0 to 1.0)
        confidence: f32,
        /// Whether the detector currently considers the user speaking
        is_speaking: bool,
    },

    /// Acknowledgement that a reset completed
    #[serde(rename = "reset_complete")]
    ResetComplete {
        message: String,
    },
}

/// WebSocket actor for one voice activity detection connection.
///
/// ## Actor Model:
/// Uses Actix's actor system where each WebSocket connection is an independent
/// actor that can receive and send messages asynchronously. The actor never
/// touches audio itself; it forwards commands to the session worker and
/// relays the worker's results back over the socket.
pub struct VadWebSocket {
    /// Unique session ID for this connection
    session_id: String,

    /// Shared registry of live sessions
    session_manager: web::Data<SessionManager>,

    /// Pipeline dimensions read from the configuration at accept time
    session_config: SessionConfig,

    /// Connection limit read from the configuration at accept time
    max_sessions: usize,

    /// Confidence below this is not streamed to the client
    confidence_floor: f32,

    /// Last heartbeat time
    last_heartbeat: Instant,

    /// Whether this connection holds a registered session
    registered: bool,
}

impl VadWebSocket {
    /// Create a new WebSocket actor with a fresh session identity.
    pub fn new(
        session_manager: web::Data<SessionManager>,
        session_config: SessionConfig,
        max_sessions: usize,
        confidence_floor: f32,
    ) -> Self {
        Self {
            session_id: Uuid::new_v4().to_string(),
            session_manager,
            session_config,
            max_sessions,
            confidence_floor,
            last_heartbeat: Instant::now(),
            registered: false,
        }
    }

    /// Serialize and send one protocol message to the client.
    fn send_message(&self, ctx: &mut ws::WebsocketContext<Self>, message: &WebSocketMessage) {
        match serde_json::to_string(message) {
            Ok(json) => ctx.text(json),
            Err(err) => {
                error!(
                    "Session {}: failed to serialize outbound message: {}",
                    self.session_id, err
                );
            }
        }
    }

    /// Queue one decoded audio payload for the session worker.
    fn forward_audio(&self, payload: Vec<u8>) {
        if let Err(err) = self
            .session_manager
            .command(&self.session_id, SessionCommand::Ingest(payload))
        {
            debug!("Session {}: audio chunk dropped: {}", self.session_id, err);
        }
    }
}

/// Result of one scored frame, delivered from the worker task.
#[derive(Message)]
#[rtype(result = "()")]
struct FrameProcessed(FrameResult);

/// Notification that the worker finished a reset.
#[derive(Message)]
#[rtype(result = "()")]
struct ResetDone;

/// Implement Actor trait for WebSocket handling.
impl Actor for VadWebSocket {
    type Context = ws::WebsocketContext<Self>;

    /// Called when the WebSocket connection starts.
    ///
    /// Registers the session and spawns its worker. If the registry refuses
    /// the connection (session limit), the socket is closed immediately.
    fn started(&mut self, ctx: &mut Self::Context) {
        info!("Session {}: WebSocket connection started", self.session_id);

        match self.session_manager.connect(
            Some(self.session_id.clone()),
            &self.session_config,
            self.max_sessions,
        ) {
            Ok((_, session, rx)) => {
                self.registered = true;
                tokio::spawn(run_session_worker(session, rx, ctx.address()));
            }
            Err(err) => {
                warn!("Session {}: connection refused: {}", self.session_id, err);
                ctx.close(Some(ws::CloseReason {
                    code: ws::CloseCode::Again,
                    description: Some(err),
                }));
                ctx.stop();
                return;
            }
        }

        // Heartbeat timer: ping every 30s, drop clients silent for 60s
        ctx.run_interval(Duration::from_secs(30), |act, ctx| {
            if Instant::now().duration_since(act.last_heartbeat) > Duration::from_secs(60) {
                warn!(
                    "Session {}: heartbeat timeout, closing connection",
                    act.session_id
                );
                ctx.stop();
                return;
            }
            ctx.ping(b"");
        });
    }

    /// Called when the WebSocket connection stops.
    fn stopped(&mut self, _ctx: &mut Self::Context) {
        if self.registered {
            // Dropping the registry entry closes the worker's channel; the
            // worker drains what it has and exits on its own.
            self.session_manager.disconnect(&self.session_id);
        }
        info!("Session {}: WebSocket connection stopped", self.session_id);
    }
}

/// Handle incoming WebSocket messages.
impl StreamHandler<Result<ws::Message, ws::ProtocolError>> for VadWebSocket {
    fn handle(&mut self, msg: Result<ws::Message, ws::ProtocolError>, ctx: &mut Self::Context) {
        match msg {
            Ok(ws::Message::Text(text)) => {
                match serde_json::from_str::<WebSocketMessage>(&text) {
                    Ok(WebSocketMessage::AudioChunk { data }) => {
                        match general_purpose::STANDARD.decode(data.as_bytes()) {
                            Ok(payload) => self.forward_audio(payload),
                            Err(err) => {
                                warn!(
                                    "Session {}: undecodable base64 audio dropped: {}",
                                    self.session_id, err
                                );
                            }
                        }
                    }
                    Ok(WebSocketMessage::Reset) => {
                        info!("Session {}: reset requested", self.session_id);
                        if let Err(err) = self
                            .session_manager
                            .command(&self.session_id, SessionCommand::Reset)
                        {
                            debug!("Session {}: reset dropped: {}", self.session_id, err);
                        }
                    }
                    Ok(WebSocketMessage::Test) => {
                        info!("Session {}: test message received", self.session_id);
                    }
                    Ok(_) => {
                        warn!(
                            "Session {}: unexpected message type from client, dropped",
                            self.session_id
                        );
                    }
                    Err(err) => {
                        warn!(
                            "Session {}: malformed message dropped: {}",
                            self.session_id, err
                        );
                    }
                }
            }
            Ok(ws::Message::Binary(data)) => {
                // The protocol is text-only; audio arrives base64-encoded.
                warn!(
                    "Session {}: unexpected binary frame ({} bytes) dropped",
                    self.session_id,
                    data.len()
                );
            }
            Ok(ws::Message::Ping(data)) => {
                ctx.pong(&data);
                self.last_heartbeat = Instant::now();
            }
            Ok(ws::Message::Pong(_)) => {
                self.last_heartbeat = Instant::now();
            }
            Ok(ws::Message::Close(reason)) => {
                info!("Session {}: WebSocket closed: {:?}", self.session_id, reason);
                ctx.stop();
            }
            Ok(ws::Message::Continuation(_)) => {
                warn!("Session {}: unexpected continuation frame", self.session_id);
            }
            Ok(ws::Message::Nop) => {
                // No-op frames (usually internal)
            }
            Err(err) => {
                error!("Session {}: WebSocket protocol error: {}", self.session_id, err);
                ctx.stop();
            }
        }
    }
}

/// Handle results for scored frames coming back from the worker.
impl Handler<FrameProcessed> for VadWebSocket {
    type Result = ();

    fn handle(&mut self, msg: FrameProcessed, ctx: &mut Self::Context) {
        let result = msg.0;

        // Boundary events always go out, even when the triggering frame's
        // confidence sits below the streaming floor (speech_end usually does).
        if let Some(event) = result.event {
            self.send_message(
                ctx,
                &WebSocketMessage::VadEvent {
                    event,
                    confidence: result.confidence,
                    timestamp: result.timestamp,
                },
            );
        }

        if result.confidence > self.confidence_floor {
            self.send_message(
                ctx,
                &WebSocketMessage::VadConfidence {
                    confidence: result.confidence,
                    is_speaking: result.is_speaking,
                },
            );
        }
    }
}

/// Handle reset acknowledgements from the worker.
impl Handler<ResetDone> for VadWebSocket {
    type Result = ();

    fn handle(&mut self, _msg: ResetDone, ctx: &mut Self::Context) {
        self.send_message(
            ctx,
            &WebSocketMessage::ResetComplete {
                message: "VAD state reset successfully".to_string(),
            },
        );
    }
}

/// Drive one session until its command channel closes.
///
/// The worker owns the session outright. Commands are processed strictly in
/// arrival order, and results are posted back to the actor's mailbox; if the
/// actor has already stopped, `do_send` drops them silently, which is exactly
/// the behavior a closed connection needs.
async fn run_session_worker(
    mut session: VadSession,
    mut rx: mpsc::UnboundedReceiver<SessionCommand>,
    addr: Addr<VadWebSocket>,
) {
    while let Some(command) = rx.recv().await {
        match command {
            SessionCommand::Ingest(payload) => {
                for result in session.ingest(&payload).await {
                    addr.do_send(FrameProcessed(result));
                }
            }
            SessionCommand::Reset => {
                session.reset();
                addr.do_send(ResetDone);
            }
        }
    }

    let lifetime = chrono::Utc::now() - session.created_at();
    debug!(
        "Session {}: worker finished after {:.1}s, {} samples processed",
        session.session_id,
        lifetime.num_milliseconds() as f64 / 1000.0,
        session.samples_processed()
    );
}

/// WebSocket endpoint handler.
///
/// ## HTTP to WebSocket Upgrade:
/// This function handles the initial HTTP request and upgrades it to a
/// WebSocket connection. The actual communication is handled by the
/// VadWebSocket actor; the session registry is shared across all connections
/// so the limit and the health endpoints see every live session. Detection
/// settings are read from the live configuration here, so an update applies
/// to every connection opened after it.
pub async fn vad_websocket(
    req: HttpRequest,
    stream: web::Payload,
    app_state: web::Data<AppState>,
    session_manager: web::Data<SessionManager>,
) -> ActixResult<HttpResponse> {
    info!(
        "New WebSocket connection request from: {:?}",
        req.connection_info().peer_addr()
    );

    let config = app_state.get_config();
    let websocket = VadWebSocket::new(
        session_manager,
        config.session_config(),
        config.performance.max_concurrent_sessions,
        config.vad.confidence_floor,
    );

    ws::start(websocket, &req, stream)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_audio_chunk_message_parsing() {
        let json = r#"{"type":"audio_chunk","data":"AAAAAA=="}"#;

        match serde_json::from_str::<WebSocketMessage>(json).unwrap() {
            WebSocketMessage::AudioChunk { data } => assert_eq!(data, "AAAAAA=="),
            _ => panic!("Wrong message type"),
        }
    }

    #[test]
    fn test_reset_message_parsing() {
        let json = r#"{"type":"reset"}"#;
        assert!(matches!(
            serde_json::from_str::<WebSocketMessage>(json).unwrap(),
            WebSocketMessage::Reset
        ));
    }

    #[test]
    fn test_test_message_tolerates_extra_fields() {
        let json = r#"{"type":"test","message":"hello from client"}"#;
        assert!(matches!(
            serde_json::from_str::<WebSocketMessage>(json).unwrap(),
            WebSocketMessage::Test
        ));
    }

    #[test]
    fn test_unknown_type_is_rejected() {
        let json = r#"{"type":"shutdown"}"#;
        assert!(serde_json::from_str::<WebSocketMessage>(json).is_err());
    }

    #[test]
    fn test_audio_chunk_without_data_is_rejected() {
        let json = r#"{"type":"audio_chunk"}"#;
        assert!(serde_json::from_str::<WebSocketMessage>(json).is_err());
    }

    #[test]
    fn test_vad_event_serialization() {
        let msg = WebSocketMessage::VadEvent {
            event: VadEventKind::SpeechStart,
            confidence: 0.75,
            timestamp: 1.25,
        };

        let json = serde_json::to_string(&msg).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&json).unwrap();

        assert_eq!(parsed["type"], "vad_event");
        assert_eq!(parsed["event"], "speech_start");
        assert_eq!(parsed["confidence"], 0.75);
        assert_eq!(parsed["timestamp"], 1.25);
    }

    #[test]
    fn test_vad_confidence_serialization() {
        let msg = WebSocketMessage::VadConfidence {
            confidence: 0.5,
            is_speaking: true,
        };

        let json = serde_json::to_string(&msg).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&json).unwrap();

        assert_eq!(parsed["type"], "vad_confidence");
        assert_eq!(parsed["confidence"], 0.5);
        assert_eq!(parsed["is_speaking"], true);
    }

    #[test]
    fn test_reset_complete_serialization() {
        let msg = WebSocketMessage::ResetComplete {
            message: "VAD state reset successfully".to_string(),
        };

        let json = serde_json::to_string(&msg).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&json).unwrap();

        assert_eq!(parsed["type"], "reset_complete");
        assert_eq!(parsed["message"], "VAD state reset successfully");
    }
}
