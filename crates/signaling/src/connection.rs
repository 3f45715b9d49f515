//! Client-Verbindung – verwaltet eine einzelne WebSocket-Verbindung
//!
//! Jede Verbindung bekommt einen eigenen tokio-Task mit einer einzigen
//! `tokio::select!`-Schleife ueber eingehende Frames, die Send-Queue und
//! das Shutdown-Signal. Dadurch ist die Verarbeitung pro Verbindung
//! strikt FIFO: der Task ist der einzige Leser seines Sockets.
//!
//! ## Trenn-Pfad
//! Beim Verbindungsende (egal aus welchem Grund) wird die Identitaet –
//! falls registriert – genau so ausgetragen und der Presence-Schnappschuss
//! genau so verteilt wie bei einem expliziten `logout`.

use axum::extract::ws::{Message, WebSocket};
use dashmap::DashMap;
use klingel_protocol::SignalMessage;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch, Notify};
use uuid::Uuid;

use crate::router::{SignalRouter, VerbindungsKontext};
use crate::server_state::SignalingState;

/// Transport-Kennung einer Verbindung (unabhaengig von der Identitaet)
pub type VerbindungsId = Uuid;

/// Groesse der Send-Queue pro Verbindung
pub const SEND_QUEUE_GROESSE: usize = 64;

/// Frist fuer einen einzelnen Socket-Send; wird sie ueberschritten,
/// gilt der Client als nicht mehr bedienbar und die Verbindung endet
const SENDE_FRIST: Duration = Duration::from_secs(10);

// ---------------------------------------------------------------------------
// Ausgehende Frames
// ---------------------------------------------------------------------------

/// Frames die ueber die Send-Queue einer Verbindung laufen
#[derive(Debug, Clone)]
pub enum AusgehendesFrame {
    /// Eine Signaling-Nachricht als Text-Frame
    Signal(SignalMessage),
    /// Liveness-Probe (WebSocket-Ping)
    Probe,
    /// Erzwungene serverseitige Trennung
    Schliessen,
}

// ---------------------------------------------------------------------------
// Verbindungstabelle (Transport-Ebene)
// ---------------------------------------------------------------------------

/// Transport-Handle einer offenen Verbindung, auch vor dem Login
#[derive(Clone)]
pub struct VerbindungsHandle {
    pub id: VerbindungsId,
    pub tx: mpsc::Sender<AusgehendesFrame>,
    /// Liveness-Flag: vor jeder Probe auf `false` gesetzt, beim
    /// Pong-Empfang wieder auf `true`
    pub lebt: Arc<AtomicBool>,
    /// Preemptives Trenn-Signal; der Verbindungs-Task wartet darauf
    /// unabhaengig von Socket und Send-Queue
    pub abbruch: Arc<Notify>,
}

impl VerbindungsHandle {
    /// Reiht eine Liveness-Probe ein (nicht-blockierend)
    pub fn probe_anstossen(&self) -> bool {
        self.tx.try_send(AusgehendesFrame::Probe).is_ok()
    }

    /// Stoesst die serverseitige Trennung an
    ///
    /// Laeuft bewusst nicht ueber die Send-Queue: auch eine Verbindung
    /// deren Queue voll ist oder die in einem blockierten Send haengt
    /// wird getrennt.
    pub fn schliessen_anstossen(&self) {
        self.abbruch.notify_one();
    }
}

/// Alle offenen Verbindungen auf Transport-Ebene
///
/// Im Gegensatz zur PresenceRegistry kennt die Tabelle auch Verbindungen
/// die sich (noch) nicht eingeloggt haben – der LivenessMonitor prueft
/// jede offene Verbindung.
#[derive(Clone)]
pub struct Verbindungstabelle {
    inner: Arc<DashMap<VerbindungsId, VerbindungsHandle>>,
}

impl Verbindungstabelle {
    /// Erstellt eine leere Tabelle
    pub fn neu() -> Self {
        Self {
            inner: Arc::new(DashMap::new()),
        }
    }

    /// Traegt eine neue Verbindung ein
    pub fn registrieren(&self, handle: VerbindungsHandle) {
        self.inner.insert(handle.id, handle);
    }

    /// Entfernt eine Verbindung (idempotent)
    pub fn entfernen(&self, id: &VerbindungsId) {
        self.inner.remove(id);
    }

    /// Schnappschuss aller Handles (fuer den Probe-Zyklus)
    pub fn alle(&self) -> Vec<VerbindungsHandle> {
        self.inner.iter().map(|e| e.value().clone()).collect()
    }

    /// Anzahl der offenen Verbindungen
    pub fn anzahl(&self) -> usize {
        self.inner.len()
    }
}

impl Default for Verbindungstabelle {
    fn default() -> Self {
        Self::neu()
    }
}

// ---------------------------------------------------------------------------
// Verbindungs-Task
// ---------------------------------------------------------------------------

/// Verarbeitet eine WebSocket-Verbindung bis zum Ende
///
/// Laeuft als eigener tokio-Task. Nicht parsebare Text-Frames werden
/// bewusst still verworfen ("be lenient, don't crash") – das ist kein
/// Transportfehler.
pub async fn verbindung_verarbeiten(
    mut socket: WebSocket,
    state: Arc<SignalingState>,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    let id = Uuid::new_v4();
    let (tx, mut rx) = mpsc::channel::<AusgehendesFrame>(SEND_QUEUE_GROESSE);
    let lebt = Arc::new(AtomicBool::new(true));
    let abbruch = Arc::new(Notify::new());

    state.verbindungen.registrieren(VerbindungsHandle {
        id,
        tx: tx.clone(),
        lebt: Arc::clone(&lebt),
        abbruch: Arc::clone(&abbruch),
    });

    let router = SignalRouter::neu(state.registry.clone());
    let mut ctx = VerbindungsKontext {
        verbindungs_id: id,
        user_id: None,
        tx,
    };

    tracing::debug!(verbindung = %id, "Neue Signaling-Verbindung");

    loop {
        tokio::select! {
            // Eingehender Frame vom Client
            eingehend = socket.recv() => {
                match eingehend {
                    Some(Ok(Message::Text(text))) => {
                        let nachricht = match SignalMessage::from_json(&text) {
                            Ok(n) => n,
                            Err(e) => {
                                tracing::trace!(
                                    verbindung = %id,
                                    fehler = %e,
                                    "Unparsebare Nachricht verworfen"
                                );
                                continue;
                            }
                        };

                        if let Some(antwort) = router.verarbeiten(nachricht, &mut ctx) {
                            let json = match antwort.to_json() {
                                Ok(json) => json,
                                Err(e) => {
                                    tracing::error!(
                                        verbindung = %id,
                                        fehler = %e,
                                        "Antwort nicht serialisierbar"
                                    );
                                    continue;
                                }
                            };
                            if !frame_senden(&mut socket, id, Message::Text(json)).await {
                                break;
                            }
                        }
                    }
                    Some(Ok(Message::Pong(_))) => {
                        lebt.store(true, Ordering::Relaxed);
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        tracing::debug!(verbindung = %id, "Verbindung vom Client geschlossen");
                        break;
                    }
                    // Binary- und Ping-Frames tragen keine Signaling-Semantik
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        tracing::debug!(verbindung = %id, fehler = %e, "WebSocket-Lesefehler");
                        break;
                    }
                }
            }

            // Ausgehender Frame aus der Send-Queue (Broadcasts, Proben)
            Some(ausgehend) = rx.recv() => {
                let weiter = match ausgehend {
                    AusgehendesFrame::Signal(nachricht) => match nachricht.to_json() {
                        Ok(json) => frame_senden(&mut socket, id, Message::Text(json)).await,
                        Err(e) => {
                            tracing::error!(
                                verbindung = %id,
                                fehler = %e,
                                "Nachricht nicht serialisierbar"
                            );
                            true
                        }
                    },
                    AusgehendesFrame::Probe => {
                        frame_senden(&mut socket, id, Message::Ping(Vec::new())).await
                    }
                    AusgehendesFrame::Schliessen => {
                        tracing::info!(verbindung = %id, "Verbindung wird serverseitig getrennt");
                        let _ = tokio::time::timeout(
                            SENDE_FRIST,
                            socket.send(Message::Close(None)),
                        )
                        .await;
                        false
                    }
                };
                if !weiter {
                    break;
                }
            }

            // Erzwungene Trennung (Liveness-Eviction). Laeuft an der
            // Send-Queue vorbei, damit auch eine nicht mehr lesende
            // Gegenseite die Verbindung nicht festhalten kann.
            _ = abbruch.notified() => {
                tracing::info!(verbindung = %id, "Verbindung wird serverseitig getrennt");
                let _ = tokio::time::timeout(
                    SENDE_FRIST,
                    socket.send(Message::Close(None)),
                )
                .await;
                break;
            }

            // Shutdown-Signal des Servers
            Ok(()) = shutdown_rx.changed() => {
                if *shutdown_rx.borrow() {
                    tracing::debug!(verbindung = %id, "Shutdown – Verbindung wird getrennt");
                    let _ = tokio::time::timeout(
                        SENDE_FRIST,
                        socket.send(Message::Close(None)),
                    )
                    .await;
                    break;
                }
            }
        }
    }

    // Cleanup: identisch zum expliziten Logout
    state.verbindungen.entfernen(&id);
    if let Some(user_id) = ctx.user_id.take() {
        if state.registry.verbindung_entfernen(&user_id, id) {
            router.online_broadcast();
        }
    }

    tracing::debug!(verbindung = %id, "Verbindungs-Task beendet");
}

/// Sendet einen Frame mit Frist
///
/// `false` bedeutet: die Verbindung ist nicht mehr bedienbar (Fehler
/// oder ueberschrittene Frist, etwa weil die Gegenseite nicht mehr
/// liest) und der Aufrufer soll sie beenden.
async fn frame_senden(socket: &mut WebSocket, id: VerbindungsId, frame: Message) -> bool {
    match tokio::time::timeout(SENDE_FRIST, socket.send(frame)).await {
        Ok(Ok(())) => true,
        Ok(Err(e)) => {
            tracing::debug!(verbindung = %id, fehler = %e, "Senden fehlgeschlagen");
            false
        }
        Err(_) => {
            tracing::warn!(
                verbindung = %id,
                frist_sek = SENDE_FRIST.as_secs(),
                "Sende-Frist ueberschritten, Verbindung wird getrennt"
            );
            false
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
