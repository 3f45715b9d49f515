//! klingel-call – Zustandsmaschine der Anruf-Verhandlung
//!
//! Eine [`CallSession`] fuehrt genau einen Anrufversuch durch den
//! Offer/Answer/ICE-Handschlag: der Anrufer erstellt und sendet das
//! Offer, der Angerufene nimmt an und antwortet, Kandidaten fliessen
//! in beide Richtungen sobald sie gefunden sind. Der eigentliche
//! Medienfluss liegt hinter dem [`MedienTransport`]-Trait; dieser
//! Crate verhandelt nur.
//!
//! Ausgehende Signal-Nachrichten verlassen die Sitzung ueber einen
//! Kanal; die Zustellung an das Relay uebernimmt der Besitzer.

pub mod error;
pub mod media;
pub mod session;

// Bequeme Re-Exporte
pub use error::{CallError, CallResult};
pub use media::MedienTransport;
pub use session::{CallRolle, CallSession, CallZustand};
