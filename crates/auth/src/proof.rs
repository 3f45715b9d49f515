//! Login-Proof – signierte Identitaets-Behauptung des Telegram-Widgets
//!
//! ## Pruef-Algorithmus
//! 1. Alle Felder ausser der Signatur als `key=value`-Zeilen serialisieren,
//!    Schluessel lexikographisch sortiert, mit `\n` verbunden
//! 2. Signierschluessel = SHA-256(Bot-Token), einfacher Digest
//! 3. HMAC-SHA-256 des Pruef-Strings unter diesem Schluessel
//! 4. Konstantzeit-Vergleich gegen die mitgelieferte Hex-Signatur
//! 5. Unabhaengig davon: Proofs aelter als 24 Stunden werden abgelehnt

use hmac::{Hmac, Mac};
use klingel_protocol::UserId;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::{AuthError, AuthResult};

type HmacSha256 = Hmac<Sha256>;

/// Maximales Proof-Alter in Sekunden (24 Stunden)
pub const PROOF_MAX_ALTER_SEK: u64 = 86400;

/// Die vom Telegram-Login-Widget behaupteten Felder
///
/// Transient: wird einmal geprueft und dann verworfen oder in eine
/// Registry-Identitaet umgewandelt, nie persistiert.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginProof {
    /// Numerische Telegram-Benutzer-ID
    pub id: i64,
    pub first_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub photo_url: Option<String>,
    /// Ausstellungszeitpunkt (Unix-Sekunden)
    pub auth_date: u64,
    /// HMAC-SHA-256-Signatur, hex-kodiert
    pub hash: String,
}

impl LoginProof {
    /// Prueft Signatur und Alter des Proofs
    ///
    /// `jetzt_unix` wird hereingereicht statt intern gelesen, damit die
    /// Pruefung zustandslos und testbar bleibt. Signaturfehler und
    /// Veraltung sind im Fehlertyp unterscheidbar.
    pub fn pruefen(&self, bot_token: &str, jetzt_unix: u64) -> AuthResult<()> {
        if bot_token.is_empty() {
            return Err(AuthError::TokenFehlt);
        }

        let erwartet = hex::decode(&self.hash).map_err(|_| AuthError::UngueltigesHex)?;

        let schluessel = Sha256::digest(bot_token.as_bytes());
        let mut mac = HmacSha256::new_from_slice(&schluessel)
            .map_err(|_| AuthError::UngueltigeSignatur)?;
        mac.update(self.daten_pruef_string().as_bytes());

        // verify_slice vergleicht in konstanter Zeit
        if mac.verify_slice(&erwartet).is_err() {
            tracing::debug!(id = self.id, "Login-Proof mit ungueltiger Signatur");
            return Err(AuthError::UngueltigeSignatur);
        }

        let alter_sek = jetzt_unix.saturating_sub(self.auth_date);
        if alter_sek > PROOF_MAX_ALTER_SEK {
            tracing::debug!(id = self.id, alter_sek, "Login-Proof veraltet");
            return Err(AuthError::ProofVeraltet {
                alter_sek,
                maximal_sek: PROOF_MAX_ALTER_SEK,
            });
        }

        Ok(())
    }

    /// Baut den Pruef-String: `key=value`-Zeilen, Schluessel sortiert,
    /// Signaturfeld ausgenommen, fehlende optionale Felder uebersprungen
    pub fn daten_pruef_string(&self) -> String {
        let mut felder: Vec<(&str, String)> = vec![
            ("auth_date", self.auth_date.to_string()),
            ("first_name", self.first_name.clone()),
            ("id", self.id.to_string()),
        ];
        if let Some(ref v) = self.last_name {
            felder.push(("last_name", v.clone()));
        }
        if let Some(ref v) = self.photo_url {
            felder.push(("photo_url", v.clone()));
        }
        if let Some(ref v) = self.username {
            felder.push(("username", v.clone()));
        }
        felder.sort_by(|a, b| a.0.cmp(b.0));

        felder
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Leitet die Registry-Identitaet aus der numerischen ID ab
    pub fn identitaet(&self) -> UserId {
        UserId::neu(self.id.to_string())
    }

    /// Anzeigename fuer die UI (Vorname, optional Nachname)
    pub fn anzeige_name(&self) -> String {
        match self.last_name {
            Some(ref nachname) => format!("{} {}", self.first_name, nachname),
            None => self.first_name.clone(),
        }
    }

    /// Berechnet die gueltige Signatur fuer diesen Proof (hex-kodiert)
    ///
    /// Gegenstueck zu `pruefen` – nuetzlich fuer Fixtures und Werkzeuge
    /// die Widget-Antworten nachbilden.
    pub fn signatur_berechnen(&self, bot_token: &str) -> AuthResult<String> {
        let schluessel = Sha256::digest(bot_token.as_bytes());
        let mut mac = HmacSha256::new_from_slice(&schluessel)
            .map_err(|_| AuthError::UngueltigeSignatur)?;
        mac.update(self.daten_pruef_string().as_bytes());
        Ok(hex::encode(mac.finalize().into_bytes()))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    const BOT_TOKEN: &str = "123456:ABC-DEF1234ghIkl-zyx57W2v1u123ew11";
    const JETZT: u64 = 1_700_000_000;

    fn frischer_proof() -> LoginProof {
        let mut proof = LoginProof {
            id: 42424242,
            first_name: "Anna".to_string(),
            last_name: Some("Schmidt".to_string()),
            username: Some("anna_s".to_string()),
            photo_url: None,
            auth_date: JETZT - 60,
            hash: String::new(),
        };
        proof.hash = proof.signatur_berechnen(BOT_TOKEN).unwrap();
        proof
    }

    #[test]
    fn gueltiger_proof_wird_akzeptiert() {
        let proof = frischer_proof();
        assert_eq!(proof.pruefen(BOT_TOKEN, JETZT), Ok(()));
    }

    #[test]
    fn pruef_string_sortiert_und_ohne_signatur() {
        let proof = frischer_proof();
        let s = proof.daten_pruef_string();
        assert_eq!(
            s,
            format!(
                "auth_date={}\nfirst_name=Anna\nid=42424242\nlast_name=Schmidt\nusername=anna_s",
                JETZT - 60
            )
        );
        assert!(!s.contains("hash"));
    }

    #[test]
    fn optionale_felder_werden_uebersprungen() {
        let mut proof = frischer_proof();
        proof.last_name = None;
        proof.username = None;
        let s = proof.daten_pruef_string();
        assert!(!s.contains("last_name"));
        assert!(!s.contains("username"));
    }

    #[test]
    fn jedes_gekippte_feld_invalidiert_die_signatur() {
        // Textfeld
        let mut proof = frischer_proof();
        proof.first_name = "Anja".to_string();
        assert_eq!(
            proof.pruefen(BOT_TOKEN, JETZT),
            Err(AuthError::UngueltigeSignatur)
        );

        // Numerische ID
        let mut proof = frischer_proof();
        proof.id += 1;
        assert_eq!(
            proof.pruefen(BOT_TOKEN, JETZT),
            Err(AuthError::UngueltigeSignatur)
        );

        // Numerischer Zeitstempel
        let mut proof = frischer_proof();
        proof.auth_date += 1;
        assert_eq!(
            proof.pruefen(BOT_TOKEN, JETZT),
            Err(AuthError::UngueltigeSignatur)
        );

        // Optionales Feld entfernt
        let mut proof = frischer_proof();
        proof.username = None;
        assert_eq!(
            proof.pruefen(BOT_TOKEN, JETZT),
            Err(AuthError::UngueltigeSignatur)
        );
    }

    #[test]
    fn falsches_bot_token_invalidiert() {
        let proof = frischer_proof();
        assert_eq!(
            proof.pruefen("999999:anderes-token", JETZT),
            Err(AuthError::UngueltigeSignatur)
        );
    }

    #[test]
    fn proof_am_rand_des_fensters() {
        let mut proof = frischer_proof();
        proof.auth_date = JETZT - PROOF_MAX_ALTER_SEK;
        proof.hash = proof.signatur_berechnen(BOT_TOKEN).unwrap();
        // Genau 86400 Sekunden alt: noch gueltig
        assert_eq!(proof.pruefen(BOT_TOKEN, JETZT), Ok(()));
    }

    #[test]
    fn veralteter_proof_wird_abgelehnt() {
        let mut proof = frischer_proof();
        proof.auth_date = JETZT - PROOF_MAX_ALTER_SEK - 1;
        proof.hash = proof.signatur_berechnen(BOT_TOKEN).unwrap();
        // 86401 Sekunden alt, Signatur selbst ist korrekt
        assert_eq!(
            proof.pruefen(BOT_TOKEN, JETZT),
            Err(AuthError::ProofVeraltet {
                alter_sek: PROOF_MAX_ALTER_SEK + 1,
                maximal_sek: PROOF_MAX_ALTER_SEK,
            })
        );
    }

    #[test]
    fn kaputtes_hex_wird_abgelehnt() {
        let mut proof = frischer_proof();
        proof.hash = "kein-hex".to_string();
        assert_eq!(proof.pruefen(BOT_TOKEN, JETZT), Err(AuthError::UngueltigesHex));
    }

    #[test]
    fn leeres_token_wird_abgelehnt() {
        let proof = frischer_proof();
        assert_eq!(proof.pruefen("", JETZT), Err(AuthError::TokenFehlt));
    }

    #[test]
    fn widget_json_wird_geparst() {
        let json = r#"{
            "id": 42424242,
            "first_name": "Anna",
            "username": "anna_s",
            "auth_date": 1700000000,
            "hash": "deadbeef"
        }"#;
        let proof: LoginProof = serde_json::from_str(json).unwrap();
        assert_eq!(proof.id, 42424242);
        assert_eq!(proof.last_name, None);
        assert_eq!(proof.identitaet(), UserId::neu("42424242"));
    }
}
