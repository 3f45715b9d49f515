//! Fehlertypen der Anruf-Verhandlung

use thiserror::Error;

use crate::session::CallZustand;

/// Fehler waehrend einer Anruf-Sitzung
#[derive(Debug, Error)]
pub enum CallError {
    /// Der Medien-Transport hat eine Operation abgelehnt
    #[error("Medien-Transport: {0}")]
    Medien(String),

    /// Die Operation passt nicht zum aktuellen Sitzungszustand
    #[error("Operation im Zustand {0:?} nicht zulaessig")]
    FalscherZustand(CallZustand),

    /// Verhandlungs-Payload liess sich nicht (de)kodieren
    #[error("Payload-Kodierung fehlgeschlagen: {0}")]
    Kodierung(#[from] serde_json::Error),

    /// Der Signalkanal zum Relay ist geschlossen
    #[error("Signalkanal geschlossen")]
    AusgangGeschlossen,
}

/// Ergebnis-Alias fuer Anruf-Operationen
pub type CallResult<T> = Result<T, CallError>;
