//! klingel-protocol – Wire-Format des Signaling-Protokolls
//!
//! Definiert alle Nachrichten die zwischen Client und Signaling-Server
//! ueber die WebSocket-Verbindung ausgetauscht werden, dazu die
//! Verhandlungs-Payloads (Session Description, ICE-Kandidat) die der
//! Server unveraendert weiterreicht.
//!
//! ## Design
//! - Eine JSON-Nachricht pro WebSocket-Text-Frame
//! - Tagged Enum (`type`-Feld) fuer typsichere Nachrichtentypen
//! - Payloads der gerichteten Nachrichten bleiben opaque
//!   (`serde_json::Value`) – der Server interpretiert sie nicht

pub mod signal;
pub mod types;

// Bequeme Re-Exporte
pub use signal::{
    DirectedFrame, ErrorFrame, IceCandidate, LoginFrame, LogoutFrame, OnlineListFrame,
    SessionDescription, SignalMessage,
};
pub use types::UserId;
