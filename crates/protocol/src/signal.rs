//! Signaling-Nachrichten (WebSocket, JSON)
//!
//! Alle Nachrichten tragen ein `type`-Feld als Diskriminator. Die
//! gerichteten Nachrichten (`call`, `offer`, `answer`, `ice`) werden vom
//! Server mit `{type, from, payload}` an das Ziel weitergereicht – das
//! `to`-Feld wird dabei konsumiert und nicht zurueckgespiegelt.
//!
//! Optionale Felder sind bewusst `Option`: ob ein Pflichtfeld fehlt,
//! entscheidet der Router (gezielter `error` bzw. stilles Verwerfen),
//! nicht der Decoder.

use serde::{Deserialize, Serialize};

use crate::types::UserId;

// ---------------------------------------------------------------------------
// Verhandlungs-Payloads
// ---------------------------------------------------------------------------

/// Session Description (Offer oder Answer) der Medien-Verhandlung
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionDescription {
    /// "offer" oder "answer"
    #[serde(rename = "type")]
    pub typ: String,
    /// SDP-Text
    pub sdp: String,
}

/// Ein einzelner ICE-Kandidat (ein entdeckter Netzwerkpfad)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IceCandidate {
    pub candidate: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sdp_mid: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sdp_m_line_index: Option<u32>,
}

// ---------------------------------------------------------------------------
// Frame-Inhalte pro Nachrichtentyp
// ---------------------------------------------------------------------------

/// Login: Client -> Server `{userId}`, Ack Server -> Client `{ok:true}`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginFrame {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<UserId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ok: Option<bool>,
}

/// Logout: Client -> Server, keine Antwort
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogoutFrame {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<UserId>,
}

/// Presence-Schnappschuss: Server -> Client
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OnlineListFrame {
    /// Aktuell registrierte Identitaeten (Reihenfolge ohne Bedeutung)
    pub online: Vec<UserId>,
}

/// Gerichtete Nachricht (`call`, `offer`, `answer`, `ice`)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DirectedFrame {
    /// Ziel-Identitaet (vom Client gesetzt, vom Server konsumiert)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to: Option<UserId>,
    /// Ursprungs-Identitaet (vom Server gestempelt)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<UserId>,
    /// Verhandlungs-Payload – wird unveraendert weitergereicht
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<serde_json::Value>,
}

/// Fehler: nur Server -> Client, wird nie weitergeleitet
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorFrame {
    pub message: String,
    /// Bei unerreichbarem Ziel: die betroffene Identitaet
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to: Option<UserId>,
}

// ---------------------------------------------------------------------------
// Haupt-Enum: SignalMessage
// ---------------------------------------------------------------------------

/// Alle Signaling-Nachrichten (typsicher via Tagged Enum)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum SignalMessage {
    Login(LoginFrame),
    Logout(LogoutFrame),
    GetOnline,
    OnlineList(OnlineListFrame),
    Call(DirectedFrame),
    Offer(DirectedFrame),
    Answer(DirectedFrame),
    Ice(DirectedFrame),
    Error(ErrorFrame),
}

impl SignalMessage {
    /// Login-Anfrage des Clients
    pub fn login(user_id: UserId) -> Self {
        Self::Login(LoginFrame {
            user_id: Some(user_id),
            ok: None,
        })
    }

    /// Login-Bestaetigung des Servers (`{type:"login", ok:true}`)
    pub fn login_ok() -> Self {
        Self::Login(LoginFrame {
            user_id: None,
            ok: Some(true),
        })
    }

    /// Logout-Anfrage des Clients
    pub fn logout(user_id: UserId) -> Self {
        Self::Logout(LogoutFrame {
            user_id: Some(user_id),
        })
    }

    /// Presence-Schnappschuss
    pub fn online_list(online: Vec<UserId>) -> Self {
        Self::OnlineList(OnlineListFrame { online })
    }

    /// Gerichteter Anruf-Hinweis
    pub fn call(to: UserId, payload: serde_json::Value) -> Self {
        Self::Call(DirectedFrame {
            to: Some(to),
            from: None,
            payload: Some(payload),
        })
    }

    /// Gerichtetes Offer
    pub fn offer(to: UserId, payload: serde_json::Value) -> Self {
        Self::Offer(DirectedFrame {
            to: Some(to),
            from: None,
            payload: Some(payload),
        })
    }

    /// Gerichtetes Answer
    pub fn answer(to: UserId, payload: serde_json::Value) -> Self {
        Self::Answer(DirectedFrame {
            to: Some(to),
            from: None,
            payload: Some(payload),
        })
    }

    /// Gerichteter ICE-Kandidat
    pub fn ice(to: UserId, payload: serde_json::Value) -> Self {
        Self::Ice(DirectedFrame {
            to: Some(to),
            from: None,
            payload: Some(payload),
        })
    }

    /// Fehler-Nachricht (nur lokal erzeugt, nie weitergeleitet)
    pub fn error(message: impl Into<String>, to: Option<UserId>) -> Self {
        Self::Error(ErrorFrame {
            message: message.into(),
            to,
        })
    }

    /// Gibt den gerichteten Frame zurueck, falls dies eine
    /// `call|offer|answer|ice`-Nachricht ist
    pub fn gerichtet(&self) -> Option<&DirectedFrame> {
        match self {
            Self::Call(f) | Self::Offer(f) | Self::Answer(f) | Self::Ice(f) => Some(f),
            _ => None,
        }
    }

    /// Baut die Weiterleitungs-Variante einer gerichteten Nachricht:
    /// gleicher Typ, `from` gestempelt, Payload unveraendert, ohne `to`.
    ///
    /// Gibt `None` zurueck wenn die Nachricht nicht gerichtet ist.
    pub fn als_weiterleitung(&self, from: UserId) -> Option<Self> {
        let frame = |f: &DirectedFrame| DirectedFrame {
            to: None,
            from: Some(from.clone()),
            payload: f.payload.clone(),
        };
        match self {
            Self::Call(f) => Some(Self::Call(frame(f))),
            Self::Offer(f) => Some(Self::Offer(frame(f))),
            Self::Answer(f) => Some(Self::Answer(frame(f))),
            Self::Ice(f) => Some(Self::Ice(frame(f))),
            _ => None,
        }
    }

    /// Serialisiert die Nachricht als JSON
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    /// Deserialisiert eine Nachricht aus JSON
    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn login_ack_wire_format() {
        let json = SignalMessage::login_ok().to_json().unwrap();
        assert_eq!(json, r#"{"type":"login","ok":true}"#);
    }

    #[test]
    fn login_anfrage_roundtrip() {
        let decoded = SignalMessage::from_json(r#"{"type":"login","userId":"alice"}"#).unwrap();
        if let SignalMessage::Login(f) = decoded {
            assert_eq!(f.user_id, Some(UserId::neu("alice")));
            assert_eq!(f.ok, None);
        } else {
            panic!("Erwartet Login-Frame");
        }
    }

    #[test]
    fn get_online_tag() {
        let json = SignalMessage::GetOnline.to_json().unwrap();
        assert_eq!(json, r#"{"type":"getOnline"}"#);
        assert!(matches!(
            SignalMessage::from_json(&json).unwrap(),
            SignalMessage::GetOnline
        ));
    }

    #[test]
    fn online_list_roundtrip() {
        let msg = SignalMessage::online_list(vec![UserId::neu("a"), UserId::neu("b")]);
        let json = msg.to_json().unwrap();
        assert_eq!(json, r#"{"type":"onlineList","online":["a","b"]}"#);
    }

    #[test]
    fn weiterleitung_stempelt_from_und_entfernt_to() {
        let payload = serde_json::json!({"type": "offer", "sdp": "v=0..."});
        let msg = SignalMessage::offer(UserId::neu("bob"), payload.clone());

        let relay = msg.als_weiterleitung(UserId::neu("alice")).unwrap();
        let json = relay.to_json().unwrap();
        let wert: serde_json::Value = serde_json::from_str(&json).unwrap();

        assert_eq!(wert["type"], "offer");
        assert_eq!(wert["from"], "alice");
        assert_eq!(wert["payload"], payload);
        assert!(wert.get("to").is_none(), "to darf nicht mitgesendet werden");
    }

    #[test]
    fn weiterleitung_nur_fuer_gerichtete_nachrichten() {
        assert!(SignalMessage::GetOnline
            .als_weiterleitung(UserId::neu("x"))
            .is_none());
        assert!(SignalMessage::login_ok()
            .als_weiterleitung(UserId::neu("x"))
            .is_none());
    }

    #[test]
    fn unbekannter_typ_wird_abgelehnt() {
        assert!(SignalMessage::from_json(r#"{"type":"unfug"}"#).is_err());
        assert!(SignalMessage::from_json("kein json").is_err());
    }

    #[test]
    fn ice_kandidat_feldnamen() {
        let kandidat = IceCandidate {
            candidate: "candidate:0 1 UDP 2122252543 192.0.2.1 54321 typ host".to_string(),
            sdp_mid: Some("0".to_string()),
            sdp_m_line_index: Some(0),
        };
        let wert = serde_json::to_value(&kandidat).unwrap();
        assert!(wert.get("sdpMid").is_some());
        assert!(wert.get("sdpMLineIndex").is_some());

        let zurueck: IceCandidate = serde_json::from_value(wert).unwrap();
        assert_eq!(zurueck, kandidat);
    }

    #[test]
    fn session_description_typ_feld() {
        let sdp = SessionDescription {
            typ: "offer".to_string(),
            sdp: "v=0\r\n".to_string(),
        };
        let wert = serde_json::to_value(&sdp).unwrap();
        assert_eq!(wert["type"], "offer");
    }

    #[test]
    fn error_mit_ziel_identitaet() {
        let msg = SignalMessage::error("peer not available", Some(UserId::neu("bob")));
        let json = msg.to_json().unwrap();
        let wert: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(wert["type"], "error");
        assert_eq!(wert["message"], "peer not available");
        assert_eq!(wert["to"], "bob");
    }
}
