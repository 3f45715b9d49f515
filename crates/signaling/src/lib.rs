//! klingel-signaling – WebSocket Signaling- und Presence-Service
//!
//! Dieser Crate implementiert den Relay-Kern von Klingel: er verwaltet
//! WebSocket-Verbindungen, die Presence (wer ist gerade erreichbar) und
//! leitet Verhandlungsnachrichten (`call`, `offer`, `answer`, `ice`)
//! zwischen zwei Identitaeten weiter.
//!
//! ## Architektur
//!
//! ```text
//! HTTP-Listener (im server-Crate, axum)
//!     |
//!     v
//! verbindung_verarbeiten (pro WebSocket ein Task)
//!     |  tokio::select! ueber Socket, Send-Queue, Shutdown
//!     |
//!     v
//! SignalRouter
//!     +-- login / logout     (Presence + onlineList-Broadcast)
//!     +-- getOnline          (Schnappschuss nur an den Absender)
//!     +-- call|offer|answer|ice (Weiterleitung an das Ziel)
//!
//! PresenceRegistry   – Identitaet -> lebende Verbindung
//! Verbindungstabelle – alle offenen Verbindungen (auch vor dem Login)
//! LivenessMonitor    – periodische Proben, Zwei-Zyklen-Eviction
//! ```
//!
//! ## Fehler-Politik
//! Der Router ist bewusst unfehlbar: fehlgeformte Nachrichten werden
//! still verworfen, unerreichbare Ziele mit einem gezielten `error` an
//! den Absender beantwortet. Kein Pfad hier darf den Prozess oder andere
//! Verbindungen reissen.

pub mod connection;
pub mod liveness;
pub mod registry;
pub mod router;
pub mod server_state;

// Bequeme Re-Exporte
pub use connection::{
    verbindung_verarbeiten, AusgehendesFrame, VerbindungsHandle, VerbindungsId,
    Verbindungstabelle,
};
pub use liveness::LivenessMonitor;
pub use registry::{ClientSender, PresenceRegistry};
pub use router::{SignalRouter, VerbindungsKontext};
pub use server_state::{SignalingConfig, SignalingState};
