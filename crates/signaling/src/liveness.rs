//! Liveness-Monitor – Ping-Proben und Zwei-Schlag-Eviction
//!
//! Der Monitor laeuft als eigener Task und prueft in festem Intervall
//! jede dem Transport bekannte Verbindung, auch solche ohne Login:
//! wer seit der letzten Probe nicht mit einem Pong geantwortet hat,
//! wird getrennt. Eine Verbindung ueberlebt damit genau eine verpasste
//! Probe bevor sie beim naechsten Zyklus faellt.

use std::sync::atomic::Ordering;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::MissedTickBehavior;

use crate::connection::Verbindungstabelle;

/// Probt periodisch alle Verbindungen und trennt stumme
pub struct LivenessMonitor {
    verbindungen: Verbindungstabelle,
    intervall: Duration,
}

impl LivenessMonitor {
    /// Erstellt einen Monitor ueber der gegebenen Verbindungstabelle
    pub fn neu(verbindungen: Verbindungstabelle, intervall: Duration) -> Self {
        Self {
            verbindungen,
            intervall,
        }
    }

    /// Laeuft bis zum Shutdown-Signal
    pub async fn ausfuehren(self, mut shutdown_rx: watch::Receiver<bool>) {
        let mut takt = tokio::time::interval(self.intervall);
        takt.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // Der erste Tick feuert sofort und wuerde frisch verbundene
        // Clients proben bevor sie antworten koennen
        takt.tick().await;

        tracing::info!(
            intervall_sek = self.intervall.as_secs(),
            "Liveness-Monitor gestartet"
        );

        loop {
            tokio::select! {
                _ = takt.tick() => self.zyklus(),
                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        tracing::info!("Liveness-Monitor beendet");
                        return;
                    }
                }
            }
        }
    }

    /// Ein Probenzyklus: stumme Verbindungen trennen, den Rest proben
    pub fn zyklus(&self) {
        let mut geprobt = 0usize;
        let mut getrennt = 0usize;

        for handle in self.verbindungen.alle() {
            // `lebt` wird vom Pong-Handler gesetzt; wer seit dem letzten
            // Zyklus nicht geantwortet hat, gilt als tot
            if !handle.lebt.swap(false, Ordering::AcqRel) {
                tracing::info!(verbindung = %handle.id, "Verbindung stumm – wird getrennt");
                handle.schliessen_anstossen();
                getrennt += 1;
                continue;
            }
            if !handle.probe_anstossen() {
                // Volle Queue heisst der Client liest nicht mehr mit;
                // der naechste Zyklus trennt ihn ohnehin
                tracing::warn!(verbindung = %handle.id, "Probe nicht einreihbar");
            }
            geprobt += 1;
        }

        if geprobt > 0 || getrennt > 0 {
            tracing::debug!(geprobt, getrennt, "Probenzyklus abgeschlossen");
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
