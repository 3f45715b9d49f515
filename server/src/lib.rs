//! klingel-server – Bibliotheks-Root
//!
//! Baut den HTTP/WebSocket-Endpunkt zusammen: `/ws` fuer das Signaling,
//! `POST /auth/telegram` fuer die Login-Proof-Verifikation, alles andere
//! antwortet mit einem schlichten Erfolg fuer Load-Balancer-Proben.

pub mod config;

use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use anyhow::Result;
use axum::{
    extract::{State, WebSocketUpgrade},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use tokio::sync::watch;

use klingel_auth::{AuthError, LoginProof};
use klingel_signaling::{
    verbindung_verarbeiten, LivenessMonitor, SignalingConfig, SignalingState,
};

use config::ServerConfig;

/// Haelt den laufenden Server-Zustand zusammen
pub struct Server {
    pub config: ServerConfig,
}

/// Zustand der axum-Handler
struct AppState {
    signaling: Arc<SignalingState>,
    bot_token: Option<String>,
    shutdown_rx: watch::Receiver<bool>,
}

impl Server {
    /// Erstellt einen neuen Server aus der gegebenen Konfiguration
    pub fn neu(config: ServerConfig) -> Self {
        Self { config }
    }

    /// Startet den Server und laeuft bis zum Shutdown-Signal
    ///
    /// Reihenfolge:
    /// 1. Signaling-Zustand aufbauen
    /// 2. Liveness-Monitor als Hintergrund-Task starten
    /// 3. HTTP/WebSocket-Endpunkt binden
    /// 4. Auf Ctrl-C warten, dann Verbindungen geordnet schliessen
    pub async fn starten(self) -> Result<()> {
        let signaling = SignalingState::neu(SignalingConfig {
            max_clients: self.config.server.max_clients as usize,
            probe_intervall_sek: self.config.signaling.probe_intervall_sek,
        });

        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let monitor = LivenessMonitor::neu(
            signaling.verbindungen.clone(),
            Duration::from_secs(self.config.signaling.probe_intervall_sek),
        );
        tokio::spawn(monitor.ausfuehren(shutdown_rx.clone()));

        if self.config.auth.bot_token.is_none() {
            tracing::warn!(
                "Kein Bot-Token konfiguriert, /auth/telegram lehnt alle Anfragen ab"
            );
        }

        let state = Arc::new(AppState {
            signaling,
            bot_token: self.config.auth.bot_token.clone(),
            shutdown_rx: shutdown_rx.clone(),
        });

        let router = Router::new()
            .route("/ws", get(ws_handler))
            .route("/auth/telegram", post(telegram_auth_handler))
            .fallback(gesundheits_handler)
            .with_state(state);

        let adresse = self.config.bind_adresse();
        let listener = tokio::net::TcpListener::bind(&adresse).await?;
        tracing::info!(
            server_name = %self.config.server.name,
            adresse = %adresse,
            max_clients = self.config.server.max_clients,
            "Server laeuft. Warte auf Shutdown-Signal (Ctrl-C)..."
        );

        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("Shutdown-Signal empfangen, Server wird beendet");
                let _ = shutdown_tx.send(true);
            }
        });

        let mut serve_shutdown = shutdown_rx;
        axum::serve(listener, router)
            .with_graceful_shutdown(async move {
                let _ = serve_shutdown.changed().await;
            })
            .await?;

        tracing::info!("Server beendet");
        Ok(())
    }
}

/// Nimmt eine WebSocket-Verbindung an, sofern noch Platz ist
async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> Response {
    if state.signaling.verbindungen.anzahl() >= state.signaling.config.max_clients {
        tracing::warn!(
            max_clients = state.signaling.config.max_clients,
            "Verbindung abgelehnt, Server voll"
        );
        return (StatusCode::SERVICE_UNAVAILABLE, "server full").into_response();
    }

    let signaling = state.signaling.clone();
    let shutdown_rx = state.shutdown_rx.clone();
    ws.on_upgrade(move |socket| verbindung_verarbeiten(socket, signaling, shutdown_rx))
}

/// Prueft einen Telegram-Login-Proof und meldet das Ergebnis
async fn telegram_auth_handler(
    State(state): State<Arc<AppState>>,
    Json(proof): Json<LoginProof>,
) -> Response {
    let jetzt = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default();

    let (status, antwort) = proof_antwort(&proof, state.bot_token.as_deref(), jetzt);
    (status, Json(antwort)).into_response()
}

/// Bildet das Pruefergebnis auf Status und Antwort-JSON ab
fn proof_antwort(
    proof: &LoginProof,
    bot_token: Option<&str>,
    jetzt_unix: u64,
) -> (StatusCode, serde_json::Value) {
    let token = bot_token.unwrap_or_default();

    match proof.pruefen(token, jetzt_unix) {
        Ok(()) => {
            tracing::info!(user_id = %proof.identitaet(), "Login-Proof akzeptiert");
            (
                StatusCode::OK,
                serde_json::json!({
                    "ok": true,
                    "userId": proof.identitaet(),
                    "name": proof.anzeige_name(),
                }),
            )
        }
        Err(AuthError::TokenFehlt) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            serde_json::json!({ "ok": false, "error": "verification unavailable" }),
        ),
        Err(AuthError::ProofVeraltet { alter_sek, .. }) => {
            tracing::info!(alter_sek, "Login-Proof abgelaufen");
            (
                StatusCode::UNAUTHORIZED,
                serde_json::json!({ "ok": false, "error": "proof expired" }),
            )
        }
        Err(fehler) => {
            tracing::info!(%fehler, "Login-Proof zurueckgewiesen");
            (
                StatusCode::UNAUTHORIZED,
                serde_json::json!({ "ok": false, "error": "invalid proof" }),
            )
        }
    }
}

/// Plain-Erfolg fuer alles was kein Signaling ist (Load-Balancer-Proben)
async fn gesundheits_handler() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_proof(bot_token: &str, auth_date: u64) -> LoginProof {
        let mut proof = LoginProof {
            id: 42,
            first_name: "Erika".into(),
            last_name: None,
            username: Some("erika".into()),
            photo_url: None,
            auth_date,
            hash: String::new(),
        };
        proof.hash = proof.signatur_berechnen(bot_token).unwrap();
        proof
    }

    #[test]
    fn gueltiger_proof_ergibt_ok_mit_identitaet() {
        let proof = test_proof("123:token", 1_000_000);
        let (status, antwort) = proof_antwort(&proof, Some("123:token"), 1_000_100);
        assert_eq!(status, StatusCode::OK);
        assert_eq!(antwort["ok"], true);
        assert_eq!(antwort["userId"], "42");
    }

    #[test]
    fn veralteter_proof_ergibt_unauthorized() {
        let proof = test_proof("123:token", 1_000_000);
        let (status, antwort) = proof_antwort(&proof, Some("123:token"), 1_000_000 + 86_401);
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(antwort["error"], "proof expired");
    }

    #[test]
    fn falsche_signatur_ergibt_unauthorized() {
        let proof = test_proof("123:token", 1_000_000);
        let (status, antwort) = proof_antwort(&proof, Some("anderes:token"), 1_000_100);
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(antwort["error"], "invalid proof");
    }

    #[test]
    fn fehlendes_token_ergibt_serverfehler() {
        let proof = test_proof("123:token", 1_000_000);
        let (status, antwort) = proof_antwort(&proof, None, 1_000_100);
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(antwort["ok"], false);
    }
}
