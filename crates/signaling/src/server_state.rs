//! Geteilter Zustand des Signaling-Servers

use std::sync::Arc;

use crate::connection::Verbindungstabelle;
use crate::registry::PresenceRegistry;

/// Laufzeit-Parameter des Signaling-Teils
#[derive(Debug, Clone)]
pub struct SignalingConfig {
    /// Obergrenze gleichzeitiger Verbindungen
    pub max_clients: usize,
    /// Abstand der Liveness-Proben in Sekunden
    pub probe_intervall_sek: u64,
}

impl Default for SignalingConfig {
    fn default() -> Self {
        Self {
            max_clients: 512,
            probe_intervall_sek: 30,
        }
    }
}

/// Zustand den alle Verbindungs-Tasks teilen
pub struct SignalingState {
    pub config: SignalingConfig,
    pub registry: PresenceRegistry,
    pub verbindungen: Verbindungstabelle,
}

impl SignalingState {
    /// Erstellt den geteilten Zustand
    pub fn neu(config: SignalingConfig) -> Arc<Self> {
        Arc::new(Self {
            config,
            registry: PresenceRegistry::neu(),
            verbindungen: Verbindungstabelle::neu(),
        })
    }
}
