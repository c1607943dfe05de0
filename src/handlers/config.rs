use crate::error::{AppError, AppResult};
use crate::state::AppState;
use actix_web::{web, HttpResponse};
use serde_json::json;

pub async fn get_config(state: web::Data<AppState>) -> AppResult<HttpResponse> {
    let config = state.get_config();

    Ok(HttpResponse::Ok().json(json!({
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "config": {
            "server": {
                "host": config.server.host,
                "port": config.server.port
            },
            "audio": {
                "source_sample_rate": config.audio.source_sample_rate,
                "target_sample_rate": config.audio.target_sample_rate,
                "frame_size": config.audio.frame_size
            },
            "vad": {
                "speech_threshold": config.vad.speech_threshold,
                "silence_threshold": config.vad.silence_threshold,
                "min_speech_duration_ms": config.vad.min_speech_duration_ms,
                "min_silence_duration_ms": config.vad.min_silence_duration_ms,
                "confidence_floor": config.vad.confidence_floor
            },
            "performance": {
                "max_concurrent_sessions": config.performance.max_concurrent_sessions
            }
        }
    })))
}

pub async fn update_config(
    state: web::Data<AppState>,
    body: web::Json<serde_json::Value>,
) -> AppResult<HttpResponse> {
    let json_str = serde_json::to_string(&body.into_inner())?;

    let mut current_config = state.get_config();
    current_config
        .update_from_json(&json_str)
        .map_err(|e| AppError::ValidationError(e.to_string()))?;

    state.update_config(current_config.clone())
        .map_err(AppError::ValidationError)?;

    Ok(HttpResponse::Ok().json(json!({
        "status": "success",
        "message": "Configuration updated successfully",
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "updated_config": {
            "server": {
                "host": current_config.server.host,
                "port": current_config.server.port
            },
            "audio": {
                "source_sample_rate": current_config.audio.source_sample_rate,
                "target_sample_rate": current_config.audio.target_sample_rate,
                "frame_size": current_config.audio.frame_size
            },
            "vad": {
                "speech_threshold": current_config.vad.speech_threshold,
                "silence_threshold": current_config.vad.silence_threshold,
                "min_speech_duration_ms": current_config.vad.min_speech_duration_ms,
                "min_silence_duration_ms": current_config.vad.min_silence_duration_ms,
                "confidence_floor": current_config.vad.confidence_floor
            },
            "performance": {
                "max_concurrent_sessions": current_config.performance.max_concurrent_sessions
            }
        }
    })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::SessionManager;
    use crate::config::AppConfig;
    use crate::vad::EnergyScorer;
    use actix_web::{body::to_bytes, http::StatusCode};
    use std::sync::Arc;

    #[actix_web::test]
    async fn test_get_config_reports_vad_settings() {
        let state = web::Data::new(AppState::new(AppConfig::default()));

        let response = get_config(state).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = to_bytes(response.into_body()).await.unwrap();
        let parsed: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(parsed["config"]["vad"]["speech_threshold"], 0.5);
        assert_eq!(parsed["config"]["audio"]["frame_size"], 512);
    }

    #[actix_web::test]
    async fn test_update_config_applies_partial_update() {
        let state = web::Data::new(AppState::new(AppConfig::default()));
        let body = web::Json(serde_json::json!({
            "vad": { "min_silence_duration_ms": 450 }
        }));

        let response = update_config(state.clone(), body).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(state.get_config().vad.min_silence_duration_ms, 450);
        // Untouched fields survive the partial update.
        assert_eq!(state.get_config().vad.min_speech_duration_ms, 100);
    }

    #[actix_web::test]
    async fn test_update_config_rejects_invalid_thresholds() {
        let state = web::Data::new(AppState::new(AppConfig::default()));
        let body = web::Json(serde_json::json!({
            "vad": { "speech_threshold": 0.2 }
        }));

        let result = update_config(state.clone(), body).await;
        assert!(result.is_err());
        // The stored configuration is untouched on rejection.
        assert_eq!(state.get_config().vad.speech_threshold, 0.5);
    }

    #[actix_web::test]
    async fn test_updated_thresholds_reach_new_sessions() {
        let state = web::Data::new(AppState::new(AppConfig::default()));
        let body = web::Json(serde_json::json!({
            "vad": { "speech_threshold": 0.9 }
        }));
        update_config(state.clone(), body).await.unwrap();

        // Build a session the way the WebSocket endpoint does after the
        // update: dimensions come from the live configuration.
        let config = state.get_config();
        let manager = SessionManager::new(Arc::new(EnergyScorer::default()));
        let (_, mut session, _rx) = manager
            .connect(
                None,
                &config.session_config(),
                config.performance.max_concurrent_sessions,
            )
            .unwrap();

        // Mid-energy audio scores near 0.6: above the default threshold but
        // below the raised one, so no speech may start.
        let payload: Vec<u8> = (0..9600)
            .flat_map(|i| {
                let value: i16 = if i % 2 == 0 { 3080 } else { -3080 };
                value.to_le_bytes()
            })
            .collect();
        let results = session.ingest(&payload).await;

        assert!(!results.is_empty());
        assert!(results.iter().all(|r| r.event.is_none()));
        assert!(!session.is_speaking());
    }
}
