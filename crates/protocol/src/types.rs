//! Gemeinsame Identifikationstypen
//!
//! Die Identitaet ist ein vom Client beim Login behaupteter String und
//! dient als Adressierungseinheit fuer alle gerouteten Nachrichten.
//! Newtype statt nacktem String, damit Identitaeten und freie Strings
//! zur Compilezeit nicht verwechselt werden koennen.

use serde::{Deserialize, Serialize};

/// Stabile Benutzer-Identitaet (Adressierungseinheit des Routings)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub String);

impl UserId {
    /// Erstellt eine UserId aus einem beliebigen String
    pub fn neu(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Gibt den inneren String zurueck
    pub fn als_str(&self) -> &str {
        &self.0
    }

    /// Leere Identitaeten sind beim Login nicht zulaessig
    pub fn ist_leer(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<&str> for UserId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for UserId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
