//! Anruf-Sitzung – Zustandsmaschine der Offer/Answer/ICE-Verhandlung
//!
//! Eine Sitzung gehoert genau einem Anrufversuch zwischen zwei
//! Identitaeten und wird nach `Ended` nicht wiederverwendet. Alle
//! Operationen laufen serialisiert auf `&mut self`; asynchrone
//! Ergebnisse die erst nach dem Ende eintreffen werden verworfen
//! statt angewendet.
//!
//! ## Zustaende
//! ```text
//! Idle --starten--> Calling --answer--> Connecting --hergestellt--> Active
//! Idle --offer----> Ringing --annehmen-> Connecting --hergestellt--> Active
//! (jeder Zustand) --auflegen/Fehler--> Ended
//! ```
//!
//! ICE-Kandidaten der Gegenseite die vor der Remote-Beschreibung
//! eintreffen werden gepuffert und in Eingangsreihenfolge nachgezogen
//! sobald die Beschreibung gesetzt ist.

use klingel_protocol::{IceCandidate, SessionDescription, SignalMessage, UserId};
use tokio::sync::mpsc;

use crate::error::{CallError, CallResult};
use crate::media::MedienTransport;

/// Zustand einer Anruf-Sitzung
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallZustand {
    Idle,
    /// Offer gesendet, Answer steht aus (nur Anrufer)
    Calling,
    /// Offer empfangen, lokale Annahme steht aus (nur Angerufener)
    Ringing,
    /// Beschreibungen getauscht, Medienverbindung baut sich auf
    Connecting,
    Active,
    /// Terminal – eine neue Sitzung braucht eine neue Instanz
    Ended,
}

/// Rolle der lokalen Seite in dieser Sitzung
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallRolle {
    Anrufer,
    Angerufener,
}

/// Eine Anruf-Sitzung zwischen der lokalen und einer entfernten Identitaet
pub struct CallSession {
    lokal: UserId,
    remote: UserId,
    rolle: CallRolle,
    zustand: CallZustand,
    /// Beim Angerufenen: das Offer bis zur lokalen Annahme
    eingehendes_offer: Option<SessionDescription>,
    /// Kandidaten die vor der Remote-Beschreibung eintrafen
    ice_puffer: Vec<IceCandidate>,
    medien: Box<dyn MedienTransport>,
    ausgang: mpsc::UnboundedSender<SignalMessage>,
}

impl CallSession {
    /// Erstellt eine ausgehende Sitzung (Zustand `Idle`)
    pub fn neu_als_anrufer(
        lokal: UserId,
        remote: UserId,
        medien: Box<dyn MedienTransport>,
        ausgang: mpsc::UnboundedSender<SignalMessage>,
    ) -> Self {
        Self {
            lokal,
            remote,
            rolle: CallRolle::Anrufer,
            zustand: CallZustand::Idle,
            eingehendes_offer: None,
            ice_puffer: Vec::new(),
            medien,
            ausgang,
        }
    }

    /// Erstellt eine eingehende Sitzung aus einem empfangenen Offer
    ///
    /// Die Sitzung beginnt direkt in `Ringing`; die Annahme entscheidet
    /// der lokale Nutzer ueber [`annehmen`](Self::annehmen).
    pub fn neu_als_angerufener(
        lokal: UserId,
        remote: UserId,
        offer: SessionDescription,
        medien: Box<dyn MedienTransport>,
        ausgang: mpsc::UnboundedSender<SignalMessage>,
    ) -> Self {
        Self {
            lokal,
            remote,
            rolle: CallRolle::Angerufener,
            zustand: CallZustand::Ringing,
            eingehendes_offer: Some(offer),
            ice_puffer: Vec::new(),
            medien,
            ausgang,
        }
    }

    pub fn zustand(&self) -> CallZustand {
        self.zustand
    }

    pub fn rolle(&self) -> CallRolle {
        self.rolle
    }

    pub fn remote(&self) -> &UserId {
        &self.remote
    }

    // -----------------------------------------------------------------------
    // Anrufer-Pfad
    // -----------------------------------------------------------------------

    /// Startet den Anruf: Audio erfassen, Offer erstellen und senden
    pub async fn starten(&mut self) -> CallResult<()> {
        if self.zustand != CallZustand::Idle {
            return Err(CallError::FalscherZustand(self.zustand));
        }

        if let Err(fehler) = self.offer_senden().await {
            // Fehlschlag bricht die Sitzung ab; die Gegenseite erfaehrt
            // davon nichts und muss selbst in einen Timeout laufen
            self.abbrechen().await;
            return Err(fehler);
        }

        self.zustand = CallZustand::Calling;
        tracing::info!(remote = %self.remote, "Anruf gestartet");
        Ok(())
    }

    async fn offer_senden(&mut self) -> CallResult<()> {
        self.medien.audio_erfassen().await?;
        let offer = self.medien.offer_erstellen().await?;
        self.senden(SignalMessage::offer(
            self.remote.clone(),
            serde_json::to_value(offer)?,
        ))
    }

    /// Wendet die Answer der Gegenseite an (nur im Zustand `Calling`)
    pub async fn answer_empfangen(&mut self, answer: SessionDescription) -> CallResult<()> {
        if self.zustand == CallZustand::Ended {
            tracing::trace!(remote = %self.remote, "Answer nach Sitzungsende verworfen");
            return Ok(());
        }
        if self.zustand != CallZustand::Calling {
            return Err(CallError::FalscherZustand(self.zustand));
        }

        if let Err(fehler) = self.remote_beschreibung_uebernehmen(answer).await {
            self.abbrechen().await;
            return Err(fehler);
        }

        self.zustand = CallZustand::Connecting;
        tracing::debug!(remote = %self.remote, "Answer angewendet");
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Angerufenen-Pfad
    // -----------------------------------------------------------------------

    /// Nimmt den eingehenden Anruf an: Audio erfassen, Offer anwenden,
    /// Answer erstellen und senden
    pub async fn annehmen(&mut self) -> CallResult<()> {
        if self.zustand != CallZustand::Ringing {
            return Err(CallError::FalscherZustand(self.zustand));
        }
        let Some(offer) = self.eingehendes_offer.take() else {
            return Err(CallError::FalscherZustand(self.zustand));
        };

        if let Err(fehler) = self.answer_senden(offer).await {
            self.abbrechen().await;
            return Err(fehler);
        }

        self.zustand = CallZustand::Connecting;
        tracing::info!(remote = %self.remote, "Anruf angenommen");
        Ok(())
    }

    async fn answer_senden(&mut self, offer: SessionDescription) -> CallResult<()> {
        self.medien.audio_erfassen().await?;
        self.remote_beschreibung_uebernehmen(offer).await?;
        let answer = self.medien.answer_erstellen().await?;
        self.senden(SignalMessage::answer(
            self.remote.clone(),
            serde_json::to_value(answer)?,
        ))
    }

    // -----------------------------------------------------------------------
    // ICE-Austausch (beide Rollen)
    // -----------------------------------------------------------------------

    /// Nimmt einen Kandidaten der Gegenseite entgegen
    ///
    /// Vor der Remote-Beschreibung wird gepuffert statt verworfen;
    /// der Puffer wird beim Setzen der Beschreibung in
    /// Eingangsreihenfolge geleert.
    pub async fn ice_empfangen(&mut self, kandidat: IceCandidate) -> CallResult<()> {
        if self.zustand == CallZustand::Ended {
            tracing::trace!(remote = %self.remote, "Kandidat nach Sitzungsende verworfen");
            return Ok(());
        }

        if !self.medien.hat_remote_beschreibung() {
            self.ice_puffer.push(kandidat);
            tracing::debug!(
                remote = %self.remote,
                gepuffert = self.ice_puffer.len(),
                "Kandidat vor Remote-Beschreibung gepuffert"
            );
            return Ok(());
        }

        if let Err(fehler) = self.medien.ice_anwenden(kandidat).await {
            // Ein einzelner fehlgeschlagener Kandidat beendet die
            // Verhandlung nicht
            tracing::warn!(remote = %self.remote, %fehler, "Kandidat nicht anwendbar");
        }
        Ok(())
    }

    /// Sendet einen lokal gefundenen Kandidaten sofort an die Gegenseite
    pub fn lokaler_kandidat(&self, kandidat: IceCandidate) -> CallResult<()> {
        if self.zustand == CallZustand::Ended {
            return Ok(());
        }
        self.senden(SignalMessage::ice(
            self.remote.clone(),
            serde_json::to_value(kandidat)?,
        ))
    }

    /// Setzt die Remote-Beschreibung und zieht gepufferte Kandidaten nach
    async fn remote_beschreibung_uebernehmen(
        &mut self,
        beschreibung: SessionDescription,
    ) -> CallResult<()> {
        self.medien.remote_beschreibung_setzen(beschreibung).await?;
        for kandidat in std::mem::take(&mut self.ice_puffer) {
            if let Err(fehler) = self.medien.ice_anwenden(kandidat).await {
                tracing::warn!(remote = %self.remote, %fehler, "Gepufferter Kandidat nicht anwendbar");
            }
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Aktivierung und Ende
    // -----------------------------------------------------------------------

    /// Meldung des Medien-Transports dass die Verbindung steht
    pub fn verbindung_hergestellt(&mut self) {
        if self.zustand == CallZustand::Connecting {
            self.zustand = CallZustand::Active;
            tracing::info!(remote = %self.remote, "Anruf aktiv");
        } else {
            tracing::trace!(
                zustand = ?self.zustand,
                "Verbindungsmeldung ausserhalb von Connecting ignoriert"
            );
        }
    }

    /// Beendet die Sitzung und gibt den Medien-Transport frei
    ///
    /// Idempotent: ein zweites Auflegen auf einer beendeten Sitzung
    /// ist ein No-op.
    pub async fn auflegen(&mut self) {
        if self.zustand == CallZustand::Ended {
            return;
        }
        self.medien.freigeben().await;
        self.zustand = CallZustand::Ended;
        self.ice_puffer.clear();
        tracing::info!(remote = %self.remote, "Anruf beendet");
    }

    /// Abbruch nach einem Verhandlungsfehler
    async fn abbrechen(&mut self) {
        if self.zustand == CallZustand::Ended {
            return;
        }
        self.medien.freigeben().await;
        self.zustand = CallZustand::Ended;
        self.ice_puffer.clear();
    }

    fn senden(&self, nachricht: SignalMessage) -> CallResult<()> {
        self.ausgang
            .send(nachricht)
            .map_err(|_| CallError::AusgangGeschlossen)
    }
}

impl std::fmt::Debug for CallSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallSession")
            .field("lokal", &self.lokal)
            .field("remote", &self.remote)
            .field("rolle", &self.rolle)
            .field("zustand", &self.zustand)
            .field("gepufferte_kandidaten", &self.ice_puffer.len())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::mock::MockMedien;
    use klingel_protocol::DirectedFrame;

    fn test_sitzung(
        rolle: CallRolle,
    ) -> (
        CallSession,
        MockMedien,
        mpsc::UnboundedReceiver<SignalMessage>,
    ) {
        let medien = MockMedien::neu();
        let (tx, rx) = mpsc::unbounded_channel();
        let sitzung = match rolle {
            CallRolle::Anrufer => CallSession::neu_als_anrufer(
                UserId::neu("alice"),
                UserId::neu("bob"),
                Box::new(medien.clone()),
                tx,
            ),
            CallRolle::Angerufener => CallSession::neu_als_angerufener(
                UserId::neu("bob"),
                UserId::neu("alice"),
                SessionDescription {
                    typ: "offer".into(),
                    sdp: "v=0 test-offer".into(),
                },
                Box::new(medien.clone()),
                tx,
            ),
        };
        (sitzung, medien, rx)
    }

    fn kandidat(nr: u32) -> IceCandidate {
        IceCandidate {
            candidate: format!("candidate:{} 1 udp 2122260223 10.0.0.{} 54321 typ host", nr, nr),
            sdp_mid: Some("0".into()),
            sdp_m_line_index: Some(0),
        }
    }

    fn gerichtetes_frame(nachricht: SignalMessage) -> DirectedFrame {
        nachricht
            .gerichtet()
            .expect("gerichtete Nachricht erwartet")
            .clone()
    }

    #[tokio::test]
    async fn anrufer_laeuft_bis_active() {
        let (mut sitzung, medien, mut rx) = test_sitzung(CallRolle::Anrufer);
        assert_eq!(sitzung.zustand(), CallZustand::Idle);

        sitzung.starten().await.unwrap();
        assert_eq!(sitzung.zustand(), CallZustand::Calling);
        assert!(medien.zustand.lock().unwrap().audio_erfasst);

        // Offer ging an den Angerufenen raus
        let frame = gerichtetes_frame(rx.try_recv().unwrap());
        assert_eq!(frame.to, Some(UserId::neu("bob")));
        let offer: SessionDescription =
            serde_json::from_value(frame.payload.unwrap()).unwrap();
        assert_eq!(offer.typ, "offer");

        sitzung
            .answer_empfangen(SessionDescription {
                typ: "answer".into(),
                sdp: "v=0 test-answer".into(),
            })
            .await
            .unwrap();
        assert_eq!(sitzung.zustand(), CallZustand::Connecting);

        sitzung.verbindung_hergestellt();
        assert_eq!(sitzung.zustand(), CallZustand::Active);
    }

    #[tokio::test]
    async fn angerufener_puffert_fruehe_kandidaten() {
        let (mut sitzung, medien, mut rx) = test_sitzung(CallRolle::Angerufener);
        assert_eq!(sitzung.zustand(), CallZustand::Ringing);

        // Kandidaten treffen vor der Annahme ein – noch keine
        // Remote-Beschreibung, also puffern
        sitzung.ice_empfangen(kandidat(1)).await.unwrap();
        sitzung.ice_empfangen(kandidat(2)).await.unwrap();
        assert!(medien.zustand.lock().unwrap().angewendete_kandidaten.is_empty());

        sitzung.annehmen().await.unwrap();
        assert_eq!(sitzung.zustand(), CallZustand::Connecting);

        // Puffer wurde in Eingangsreihenfolge nachgezogen
        let angewendet = medien.zustand.lock().unwrap().angewendete_kandidaten.clone();
        assert_eq!(angewendet.len(), 2);
        assert_eq!(angewendet[0], kandidat(1));
        assert_eq!(angewendet[1], kandidat(2));

        // Answer ging an den Anrufer raus
        let frame = gerichtetes_frame(rx.try_recv().unwrap());
        assert_eq!(frame.to, Some(UserId::neu("alice")));
    }

    #[tokio::test]
    async fn kandidaten_nach_beschreibung_gehen_direkt_durch() {
        let (mut sitzung, medien, _rx) = test_sitzung(CallRolle::Angerufener);
        sitzung.annehmen().await.unwrap();

        sitzung.ice_empfangen(kandidat(7)).await.unwrap();
        let angewendet = medien.zustand.lock().unwrap().angewendete_kandidaten.clone();
        assert_eq!(angewendet.last(), Some(&kandidat(7)));
    }

    #[tokio::test]
    async fn lokale_kandidaten_gehen_sofort_raus() {
        let (mut sitzung, _medien, mut rx) = test_sitzung(CallRolle::Anrufer);
        sitzung.starten().await.unwrap();
        rx.try_recv().unwrap(); // Offer

        sitzung.lokaler_kandidat(kandidat(3)).unwrap();
        let frame = gerichtetes_frame(rx.try_recv().unwrap());
        assert_eq!(frame.to, Some(UserId::neu("bob")));
        let gesendet: IceCandidate =
            serde_json::from_value(frame.payload.unwrap()).unwrap();
        assert_eq!(gesendet, kandidat(3));
    }

    #[tokio::test]
    async fn doppeltes_auflegen_ist_noop() {
        let (mut sitzung, medien, _rx) = test_sitzung(CallRolle::Anrufer);
        sitzung.starten().await.unwrap();

        sitzung.auflegen().await;
        assert_eq!(sitzung.zustand(), CallZustand::Ended);
        assert_eq!(medien.zustand.lock().unwrap().freigaben, 1);

        // Zweites Auflegen loest keinen weiteren Teardown aus
        sitzung.auflegen().await;
        assert_eq!(medien.zustand.lock().unwrap().freigaben, 1);
    }

    #[tokio::test]
    async fn audio_fehler_beendet_die_sitzung() {
        let (mut sitzung, medien, mut rx) = test_sitzung(CallRolle::Anrufer);
        medien.zustand.lock().unwrap().audio_fehler = true;

        let fehler = sitzung.starten().await.unwrap_err();
        assert!(matches!(fehler, CallError::Medien(_)));
        assert_eq!(sitzung.zustand(), CallZustand::Ended);
        // Ressourcen wurden freigegeben, nichts ging raus
        assert_eq!(medien.zustand.lock().unwrap().freigaben, 1);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn offer_fehler_beendet_die_sitzung() {
        let (mut sitzung, medien, _rx) = test_sitzung(CallRolle::Anrufer);
        medien.zustand.lock().unwrap().offer_fehler = true;

        assert!(sitzung.starten().await.is_err());
        assert_eq!(sitzung.zustand(), CallZustand::Ended);
        assert_eq!(medien.zustand.lock().unwrap().freigaben, 1);
    }

    #[tokio::test]
    async fn spaete_ergebnisse_nach_ende_werden_verworfen() {
        let (mut sitzung, medien, mut rx) = test_sitzung(CallRolle::Anrufer);
        sitzung.starten().await.unwrap();
        rx.try_recv().unwrap(); // Offer
        sitzung.auflegen().await;

        // Answer und Kandidaten nach dem Ende: kein Fehler, keine Wirkung
        sitzung
            .answer_empfangen(SessionDescription {
                typ: "answer".into(),
                sdp: "v=0 spaet".into(),
            })
            .await
            .unwrap();
        sitzung.ice_empfangen(kandidat(9)).await.unwrap();
        sitzung.lokaler_kandidat(kandidat(9)).unwrap();

        assert_eq!(sitzung.zustand(), CallZustand::Ended);
        assert!(medien.zustand.lock().unwrap().remote_beschreibung.is_none());
        assert!(medien.zustand.lock().unwrap().angewendete_kandidaten.is_empty());
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn answer_im_falschen_zustand_ist_ein_fehler() {
        let (mut sitzung, _medien, _rx) = test_sitzung(CallRolle::Anrufer);

        let fehler = sitzung
            .answer_empfangen(SessionDescription {
                typ: "answer".into(),
                sdp: "v=0".into(),
            })
            .await
            .unwrap_err();
        assert!(matches!(fehler, CallError::FalscherZustand(CallZustand::Idle)));
    }

    #[tokio::test]
    async fn verbindungsmeldung_ausserhalb_connecting_wird_ignoriert() {
        let (mut sitzung, _medien, _rx) = test_sitzung(CallRolle::Anrufer);
        sitzung.verbindung_hergestellt();
        assert_eq!(sitzung.zustand(), CallZustand::Idle);
    }

    /// Kompletter Handschlag: Offer, fruehe Kandidaten, Answer,
    /// Kandidaten-Austausch, beide Seiten aktiv
    #[tokio::test]
    async fn beidseitiger_handschlag_bis_active() {
        let medien_a = MockMedien::neu();
        let medien_b = MockMedien::neu();
        let (tx_a, mut rx_a) = mpsc::unbounded_channel();
        let (tx_b, mut rx_b) = mpsc::unbounded_channel();

        let mut a = CallSession::neu_als_anrufer(
            UserId::neu("alice"),
            UserId::neu("bob"),
            Box::new(medien_a.clone()),
            tx_a,
        );
        a.starten().await.unwrap();

        // Das Offer erreicht Bob
        let offer_frame = gerichtetes_frame(rx_a.try_recv().unwrap());
        let offer: SessionDescription =
            serde_json::from_value(offer_frame.payload.unwrap()).unwrap();
        let mut b = CallSession::neu_als_angerufener(
            UserId::neu("bob"),
            UserId::neu("alice"),
            offer,
            Box::new(medien_b.clone()),
            tx_b,
        );

        // Alices Kandidat ueberholt die Annahme – muss ueberleben
        a.lokaler_kandidat(kandidat(1)).unwrap();
        let ice_frame = gerichtetes_frame(rx_a.try_recv().unwrap());
        let frueher: IceCandidate =
            serde_json::from_value(ice_frame.payload.unwrap()).unwrap();
        b.ice_empfangen(frueher).await.unwrap();

        b.annehmen().await.unwrap();
        let answer_frame = gerichtetes_frame(rx_b.try_recv().unwrap());
        let answer: SessionDescription =
            serde_json::from_value(answer_frame.payload.unwrap()).unwrap();
        a.answer_empfangen(answer).await.unwrap();

        // Bobs Kandidat in die Gegenrichtung
        b.lokaler_kandidat(kandidat(2)).unwrap();
        let ice_frame = gerichtetes_frame(rx_b.try_recv().unwrap());
        let spaeter: IceCandidate =
            serde_json::from_value(ice_frame.payload.unwrap()).unwrap();
        a.ice_empfangen(spaeter).await.unwrap();

        a.verbindung_hergestellt();
        b.verbindung_hergestellt();
        assert_eq!(a.zustand(), CallZustand::Active);
        assert_eq!(b.zustand(), CallZustand::Active);

        // Der fruehe Kandidat ist bei Bob angekommen
        assert_eq!(
            medien_b.zustand.lock().unwrap().angewendete_kandidaten,
            vec![kandidat(1)]
        );
        assert_eq!(
            medien_a.zustand.lock().unwrap().angewendete_kandidaten,
            vec![kandidat(2)]
        );
    }
}
