//! Presence-Registry – Identitaet -> lebende Verbindung
//!
//! Die Registry ist die einzige autoritative Quelle dafuer, wer gerade
//! Nachrichten empfangen kann. Jede Identitaet hat genau einen lebenden
//! Eintrag; `registrieren` ueberschreibt einen bestehenden Eintrag
//! (last-writer-wins) und gibt den verdraengten zurueck, damit der
//! Aufrufer die alte Verbindung trennen kann.
//!
//! Thread-safe via Arc + DashMap. Clone der Registry teilt den inneren
//! Zustand. Jede Mutation ist eine einzelne Map-Operation und damit fuer
//! nebenlaeufige Schnappschuss-Leser atomar sichtbar.

use dashmap::DashMap;
use klingel_protocol::{SignalMessage, UserId};
use std::sync::Arc;
use tokio::sync::mpsc;

use crate::connection::{AusgehendesFrame, VerbindungsId};

// ---------------------------------------------------------------------------
// ClientSender
// ---------------------------------------------------------------------------

/// Handle auf die Send-Queue einer registrierten Verbindung
#[derive(Clone, Debug)]
pub struct ClientSender {
    pub user_id: UserId,
    /// Transport-Verbindung zu der dieser Eintrag gehoert
    pub verbindungs_id: VerbindungsId,
    pub tx: mpsc::Sender<AusgehendesFrame>,
}

impl ClientSender {
    /// Reiht eine Nachricht nicht-blockierend in die Send-Queue ein
    ///
    /// Gibt `false` zurueck wenn die Queue voll oder geschlossen ist.
    pub fn senden(&self, nachricht: SignalMessage) -> bool {
        match self.tx.try_send(AusgehendesFrame::Signal(nachricht)) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                tracing::warn!(user_id = %self.user_id, "Send-Queue voll – Nachricht verworfen");
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                tracing::debug!(user_id = %self.user_id, "Send-Queue geschlossen (Client getrennt)");
                false
            }
        }
    }

    /// Stoesst die serverseitige Trennung dieser Verbindung an
    pub fn schliessen(&self) {
        let _ = self.tx.try_send(AusgehendesFrame::Schliessen);
    }
}

// ---------------------------------------------------------------------------
// PresenceRegistry
// ---------------------------------------------------------------------------

/// Bidirektionale Zuordnung Identitaet -> lebende Verbindung
///
/// Thread-safe via Arc + DashMap. Clone teilt den inneren Zustand.
#[derive(Clone)]
pub struct PresenceRegistry {
    inner: Arc<PresenceRegistryInner>,
}

struct PresenceRegistryInner {
    clients: DashMap<UserId, ClientSender>,
}

impl PresenceRegistry {
    /// Erstellt eine neue, leere Registry
    pub fn neu() -> Self {
        Self {
            inner: Arc::new(PresenceRegistryInner {
                clients: DashMap::new(),
            }),
        }
    }

    /// Registriert eine Identitaet (last-writer-wins)
    ///
    /// Gibt den verdraengten Eintrag zurueck falls die Identitaet bereits
    /// registriert war. Die alte Verbindung wird hier NICHT geschlossen –
    /// das entscheidet der Aufrufer.
    pub fn registrieren(&self, sender: ClientSender) -> Option<ClientSender> {
        let user_id = sender.user_id.clone();
        let verdraengt = self.inner.clients.insert(user_id.clone(), sender);
        tracing::info!(user_id = %user_id, "Client online");
        verdraengt
    }

    /// Entfernt eine Identitaet (idempotent)
    ///
    /// Gibt `true` zurueck wenn ein Eintrag entfernt wurde.
    pub fn entfernen(&self, user_id: &UserId) -> bool {
        let entfernt = self.inner.clients.remove(user_id).is_some();
        if entfernt {
            tracing::info!(user_id = %user_id, "Client offline");
        }
        entfernt
    }

    /// Entfernt eine Identitaet nur wenn der Eintrag zur gegebenen
    /// Verbindung gehoert
    ///
    /// Schutz fuer den Trenn-Pfad: hat sich dieselbe Identitaet inzwischen
    /// ueber eine neue Verbindung registriert, darf das Schliessen der
    /// alten Verbindung die frische Registrierung nicht entfernen.
    pub fn verbindung_entfernen(&self, user_id: &UserId, verbindungs_id: VerbindungsId) -> bool {
        let entfernt = self
            .inner
            .clients
            .remove_if(user_id, |_, sender| sender.verbindungs_id == verbindungs_id)
            .is_some();
        if entfernt {
            tracing::info!(user_id = %user_id, "Client offline");
        }
        entfernt
    }

    /// Schlaegt die Verbindung einer Identitaet nach
    pub fn nachschlagen(&self, user_id: &UserId) -> Option<ClientSender> {
        self.inner.clients.get(user_id).map(|e| e.clone())
    }

    /// Prueft ob eine Identitaet registriert ist
    pub fn ist_online(&self, user_id: &UserId) -> bool {
        self.inner.clients.contains_key(user_id)
    }

    /// Schnappschuss aller registrierten Identitaeten (Reihenfolge
    /// ohne Bedeutung)
    pub fn online_schnappschuss(&self) -> Vec<UserId> {
        self.inner
            .clients
            .iter()
            .map(|e| e.key().clone())
            .collect()
    }

    /// Sendet eine Nachricht an eine einzelne Identitaet
    ///
    /// Gibt `true` zurueck wenn das Ziel registriert war und die
    /// Nachricht eingereiht wurde.
    pub fn senden_an(&self, user_id: &UserId, nachricht: SignalMessage) -> bool {
        match self.inner.clients.get(user_id) {
            Some(sender) => sender.senden(nachricht),
            None => false,
        }
    }

    /// Sendet eine Nachricht an alle registrierten Clients (best effort)
    ///
    /// Ein fehlgeschlagenes Einreihen bei einem Ziel bricht die uebrigen
    /// Sendungen nicht ab. Gibt die Anzahl der erfolgreichen Sendungen
    /// zurueck.
    pub fn an_alle_senden(&self, nachricht: SignalMessage) -> usize {
        let mut gesendet = 0;
        self.inner.clients.iter().for_each(|entry| {
            if entry.value().senden(nachricht.clone()) {
                gesendet += 1;
            }
        });
        gesendet
    }

    /// Gibt die Anzahl der registrierten Identitaeten zurueck
    pub fn anzahl(&self) -> usize {
        self.inner.clients.len()
    }
}

impl Default for PresenceRegistry {
    fn default() -> Self {
        Self::neu()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
