//! Ereignisse des Audio-Spiegels
//!
//! Der Controller verteilt diese ueber einen tokio-broadcast-Kanal an die
//! Bedienoberflaeche, die sie als kurze Hinweise ("Toasts") anzeigt.

use serde::{Deserialize, Serialize};

/// Alle Ereignisse, die der Controller meldet
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum MirrorEvent {
    /// Spiegelung laeuft, Mikrofon ist auf die Kopfhoerer geroutet
    Gestartet { epoch: u64 },
    /// Spiegelung wurde beendet
    Gestoppt { epoch: u64 },
    /// Start fehlgeschlagen oder Engine-Fehler
    Fehler { grund: String },
    /// Aktion verlangt einen laufenden Spiegel
    NichtAktiv,
    /// Test-Ton wird abgespielt
    TestTon { lautstaerke: f32 },
    /// Lautstaerke hat die Warnschwelle ueberschritten
    LautstaerkeWarnung { wert: f32 },
}

impl MirrorEvent {
    /// Kurzer Titel fuer die Anzeige
    pub fn titel(&self) -> &'static str {
        match self {
            Self::Gestartet { .. } => "Audio Mirror Started",
            Self::Gestoppt { .. } => "Audio Mirror Stopped",
            Self::Fehler { .. } => "Error",
            Self::NichtAktiv => "Not Active",
            Self::TestTon { .. } => "Sound Check",
            Self::LautstaerkeWarnung { .. } => "High Volume",
        }
    }

    /// Beschreibungstext fuer die Anzeige
    pub fn beschreibung(&self) -> String {
        match self {
            Self::Gestartet { .. } => {
                "You should now hear your microphone input with enhanced audio processing"
                    .to_string()
            }
            Self::Gestoppt { .. } => "Audio mirroring has been stopped".to_string(),
            Self::Fehler { grund } => grund.clone(),
            Self::NichtAktiv => {
                "Please click Start Listening first to activate audio mirroring".to_string()
            }
            Self::TestTon { .. } => "Playing whistle sound...".to_string(),
            Self::LautstaerkeWarnung { wert } => {
                format!("Volume {wert:.1}x is high, protect your hearing")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_ist_serde_kompatibel() {
        let event = MirrorEvent::LautstaerkeWarnung { wert: 8.0 };
        let json = serde_json::to_string(&event).unwrap();
        let zurueck: MirrorEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(zurueck, event);
    }

    #[test]
    fn titel_und_beschreibung() {
        assert_eq!(MirrorEvent::NichtAktiv.titel(), "Not Active");
        assert!(MirrorEvent::Fehler {
            grund: "kaputt".into()
        }
        .beschreibung()
        .contains("kaputt"));
    }
}
