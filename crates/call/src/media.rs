//! Schnittstelle zum lokalen Medien-Transport
//!
//! Die Sitzungs-Zustandsmaschine besitzt den Transport nur ueber dieses
//! Trait. Aufnahme, Kodierung und der eigentliche Medienfluss liegen
//! vollstaendig dahinter; hier zaehlt nur die Verhandlung.

use async_trait::async_trait;
use klingel_protocol::{IceCandidate, SessionDescription};

use crate::error::CallResult;

/// Steuerung des lokalen Medien-Transports einer Sitzung
#[async_trait]
pub trait MedienTransport: Send {
    /// Erfasst das lokale Audio (Mikrofonzugriff)
    async fn audio_erfassen(&mut self) -> CallResult<()>;

    /// Erstellt die lokale Sitzungsbeschreibung als Offer
    async fn offer_erstellen(&mut self) -> CallResult<SessionDescription>;

    /// Erstellt die lokale Sitzungsbeschreibung als Answer
    ///
    /// Setzt voraus dass die Remote-Beschreibung bereits gesetzt ist.
    async fn answer_erstellen(&mut self) -> CallResult<SessionDescription>;

    /// Setzt die Beschreibung der Gegenseite
    async fn remote_beschreibung_setzen(
        &mut self,
        beschreibung: SessionDescription,
    ) -> CallResult<()>;

    /// Ob die Remote-Beschreibung bereits gesetzt ist
    fn hat_remote_beschreibung(&self) -> bool;

    /// Wendet einen ICE-Kandidaten der Gegenseite an
    async fn ice_anwenden(&mut self, kandidat: IceCandidate) -> CallResult<()>;

    /// Gibt Transport und Aufnahme-Ressourcen frei (idempotent)
    async fn freigeben(&mut self);
}

#[cfg(test)]
pub(crate) mod mock {
    //! Aufzeichnender Medien-Transport fuer Tests

    use std::sync::{Arc, Mutex};

    use super::*;
    use crate::error::CallError;

    /// Von aussen einsehbarer Zustand des Mocks
    #[derive(Default)]
    pub struct MockZustand {
        pub audio_erfasst: bool,
        pub remote_beschreibung: Option<SessionDescription>,
        pub angewendete_kandidaten: Vec<IceCandidate>,
        pub freigaben: usize,
        /// Laesst `audio_erfassen` fehlschlagen
        pub audio_fehler: bool,
        /// Laesst `offer_erstellen` fehlschlagen
        pub offer_fehler: bool,
    }

    #[derive(Clone, Default)]
    pub struct MockMedien {
        pub zustand: Arc<Mutex<MockZustand>>,
    }

    impl MockMedien {
        pub fn neu() -> Self {
            Self::default()
        }

        fn sperren(&self) -> std::sync::MutexGuard<'_, MockZustand> {
            self.zustand.lock().unwrap()
        }
    }

    #[async_trait]
    impl MedienTransport for MockMedien {
        async fn audio_erfassen(&mut self) -> CallResult<()> {
            let mut z = self.sperren();
            if z.audio_fehler {
                return Err(CallError::Medien("kein Mikrofon".into()));
            }
            z.audio_erfasst = true;
            Ok(())
        }

        async fn offer_erstellen(&mut self) -> CallResult<SessionDescription> {
            if self.sperren().offer_fehler {
                return Err(CallError::Medien("Offer fehlgeschlagen".into()));
            }
            Ok(SessionDescription {
                typ: "offer".into(),
                sdp: "v=0 mock-offer".into(),
            })
        }

        async fn answer_erstellen(&mut self) -> CallResult<SessionDescription> {
            Ok(SessionDescription {
                typ: "answer".into(),
                sdp: "v=0 mock-answer".into(),
            })
        }

        async fn remote_beschreibung_setzen(
            &mut self,
            beschreibung: SessionDescription,
        ) -> CallResult<()> {
            self.sperren().remote_beschreibung = Some(beschreibung);
            Ok(())
        }

        fn hat_remote_beschreibung(&self) -> bool {
            self.sperren().remote_beschreibung.is_some()
        }

        async fn ice_anwenden(&mut self, kandidat: IceCandidate) -> CallResult<()> {
            self.sperren().angewendete_kandidaten.push(kandidat);
            Ok(())
        }

        async fn freigeben(&mut self) {
            self.sperren().freigaben += 1;
        }
    }
}
