//! Signal-Router – verteilt eingehende Nachrichten einer Verbindung
//!
//! Der Router entscheidet pro Nachricht: direkt antworten (Rueckgabewert),
//! an ein Ziel weiterleiten oder den Presence-Schnappschuss an alle
//! verteilen. Er ist bewusst unfehlbar – jede Fehlersituation endet in
//! einem gezielten `error` an den Absender oder im stillen Verwerfen,
//! nie in einem Abbruch.
//!
//! ## Ablauf pro Nachrichtentyp
//! - `login`   – Identitaet registrieren, Ack an den Absender, danach
//!   `onlineList` an alle (inklusive Absender)
//! - `logout`  – Identitaet austragen (falls vorhanden), `onlineList` an alle
//! - `getOnline` – Schnappschuss nur an den Absender
//! - `call|offer|answer|ice` – Ziel nachschlagen, `{type, from, payload}`
//!   weiterreichen; unerreichbares Ziel ergibt einen `error` an den Absender
//! - alles andere – still verwerfen

use klingel_protocol::{DirectedFrame, SignalMessage, UserId};
use tokio::sync::mpsc;

use crate::connection::{AusgehendesFrame, VerbindungsId};
use crate::registry::{ClientSender, PresenceRegistry};

/// Kontext der Verbindung deren Nachrichten geroutet werden
pub struct VerbindungsKontext {
    pub verbindungs_id: VerbindungsId,
    /// Registrierte Identitaet (None vor dem Login)
    pub user_id: Option<UserId>,
    /// Send-Queue der eigenen Verbindung (fuer die Registrierung)
    pub tx: mpsc::Sender<AusgehendesFrame>,
}

/// Routet die Nachrichten einer Verbindung anhand der Presence-Registry
pub struct SignalRouter {
    registry: PresenceRegistry,
}

impl SignalRouter {
    /// Erstellt einen neuen Router
    pub fn neu(registry: PresenceRegistry) -> Self {
        Self { registry }
    }

    /// Verarbeitet eine eingehende Nachricht
    ///
    /// Gibt die direkte Antwort an den Absender zurueck, falls eine
    /// faellig ist. Broadcasts laufen sofort ueber die Registry.
    pub fn verarbeiten(
        &self,
        nachricht: SignalMessage,
        ctx: &mut VerbindungsKontext,
    ) -> Option<SignalMessage> {
        match nachricht {
            SignalMessage::Login(frame) => self.login(frame.user_id, ctx),

            SignalMessage::Logout(frame) => {
                self.logout(frame.user_id, ctx);
                None
            }

            SignalMessage::GetOnline => Some(SignalMessage::online_list(
                self.registry.online_schnappschuss(),
            )),

            gerichtet @ (SignalMessage::Call(_)
            | SignalMessage::Offer(_)
            | SignalMessage::Answer(_)
            | SignalMessage::Ice(_)) => self.weiterleiten(gerichtet, ctx),

            // Server->Client-Typen vom Client: still verwerfen
            SignalMessage::OnlineList(_) | SignalMessage::Error(_) => {
                tracing::trace!(
                    verbindung = %ctx.verbindungs_id,
                    "Unerwartete Server->Client Nachricht verworfen"
                );
                None
            }
        }
    }

    /// Registriert die Identitaet dieser Verbindung
    fn login(
        &self,
        user_id: Option<UserId>,
        ctx: &mut VerbindungsKontext,
    ) -> Option<SignalMessage> {
        let user_id = match user_id {
            Some(id) if !id.ist_leer() => id,
            // Fehlende Identitaet: gezielter Fehler, keine Registry-Mutation
            _ => return Some(SignalMessage::error("login requires userId", None)),
        };

        // Identitaetswechsel auf derselben Verbindung: die bisherige
        // Registrierung bliebe sonst stehen und wuerde beim Trennen
        // nie ausgetragen – der Trenn-Pfad kennt nur die letzte Identitaet
        if let Some(bisher) = ctx.user_id.take() {
            if bisher != user_id {
                self.registry.verbindung_entfernen(&bisher, ctx.verbindungs_id);
            }
        }

        let verdraengt = self.registry.registrieren(ClientSender {
            user_id: user_id.clone(),
            verbindungs_id: ctx.verbindungs_id,
            tx: ctx.tx.clone(),
        });

        // Re-Login derselben Identitaet ueber eine neue Verbindung:
        // die verdraengte Verbindung wird serverseitig getrennt statt
        // verwaist weiterzulaufen
        if let Some(alt) = verdraengt {
            if alt.verbindungs_id != ctx.verbindungs_id {
                tracing::info!(
                    user_id = %user_id,
                    "Identitaet neu registriert – alte Verbindung wird getrennt"
                );
                alt.schliessen();
            }
        }

        ctx.user_id = Some(user_id);
        self.online_broadcast();

        // Das Ack geht direkt ueber den Socket und damit vor der
        // eingereihten onlineList beim Absender an
        Some(SignalMessage::login_ok())
    }

    /// Traegt die genannte Identitaet aus (fehlende Identitaet: No-op)
    fn logout(&self, user_id: Option<UserId>, ctx: &mut VerbindungsKontext) {
        let Some(user_id) = user_id else {
            return;
        };
        if self.registry.entfernen(&user_id) {
            if ctx.user_id.as_ref() == Some(&user_id) {
                ctx.user_id = None;
            }
            self.online_broadcast();
        }
    }

    /// Leitet eine gerichtete Nachricht an ihr Ziel weiter
    fn weiterleiten(
        &self,
        nachricht: SignalMessage,
        ctx: &VerbindungsKontext,
    ) -> Option<SignalMessage> {
        let frame: &DirectedFrame = nachricht.gerichtet()?;

        // Ohne Ziel ist nichts zuzustellen – stilles Verwerfen
        let Some(ziel) = frame.to.clone() else {
            return None;
        };

        // Ursprung: registrierte Identitaet des Absenders; das
        // Client-Feld zaehlt nur als Rueckfall vor dem Login
        let Some(von) = ctx.user_id.clone().or_else(|| frame.from.clone()) else {
            tracing::trace!(
                verbindung = %ctx.verbindungs_id,
                "Gerichtete Nachricht ohne Ursprung verworfen"
            );
            return None;
        };

        let weiterleitung = nachricht.als_weiterleitung(von)?;
        if self.registry.senden_an(&ziel, weiterleitung) {
            None
        } else {
            // Ziel abwesend oder nicht lebendig: Fehler an den Absender,
            // die Nachricht wird verworfen (kein Queueing, kein Retry)
            Some(SignalMessage::error("peer not available", Some(ziel)))
        }
    }

    /// Verteilt den aktuellen Presence-Schnappschuss an alle Clients
    pub fn online_broadcast(&self) {
        let schnappschuss = self.registry.online_schnappschuss();
        let anzahl = self
            .registry
            .an_alle_senden(SignalMessage::online_list(schnappschuss));
        tracing::debug!(empfaenger = anzahl, "Presence-Schnappschuss verteilt");
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
