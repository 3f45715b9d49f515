//! klingel-auth – Verifikation des Telegram-Login-Proofs
//!
//! Das Telegram-Login-Widget liefert eine signierte Identitaets-Behauptung
//! (`id`, Name, optionaler Username, Zeitstempel, Signatur). Dieser Crate
//! prueft die Signatur offline gegen das Bot-Token und lehnt veraltete
//! Proofs ab. Erst danach darf die Identitaet in die Presence aufgenommen
//! werden – was mit einer gueltigen Identitaet passiert, entscheidet der
//! Aufrufer.
//!
//! Die Pruefung ist zustandslos und frei von Seiteneffekten.

pub mod error;
pub mod proof;

// Bequeme Re-Exporte
pub use error::{AuthError, AuthResult};
pub use proof::{LoginProof, PROOF_MAX_ALTER_SEK};
