//! Fehlertypen fuer die Login-Proof-Verifikation

use thiserror::Error;

/// Alle moeglichen Fehler bei der Proof-Pruefung
///
/// Signaturfehler und Veraltung sind getrennte Varianten, damit der
/// Aufrufer dem Benutzer den Grund unterscheiden kann.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum AuthError {
    /// Die HMAC-Signatur stimmt nicht mit den Feldern ueberein
    #[error("Signatur ungueltig")]
    UngueltigeSignatur,

    /// Der Proof ist aelter als das erlaubte Fenster
    #[error("Proof veraltet: {alter_sek} Sekunden alt (erlaubt: {maximal_sek})")]
    ProofVeraltet { alter_sek: u64, maximal_sek: u64 },

    /// Die Signatur ist kein gueltiger Hex-String
    #[error("Signatur ist kein gueltiges Hex")]
    UngueltigesHex,

    /// Kein Bot-Token konfiguriert – Pruefung nicht moeglich
    #[error("Kein Bot-Token konfiguriert")]
    TokenFehlt,
}

/// Result-Typ fuer die Proof-Pruefung
pub type AuthResult<T> = Result<T, AuthError>;
