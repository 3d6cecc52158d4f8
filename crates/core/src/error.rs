//! Fehlertypen fuer Audify
//!
//! `MirrorError` ist die Fehler-Taxonomie an der Grenze zur Bedienoberflaeche.
//! Fehler der Audio-Schicht werden im Controller hierhin konvertiert und
//! erscheinen dort als Status-Text oder Ereignis, nie als Panic.

use thiserror::Error;

/// Result-Alias fuer Audify
pub type Result<T> = std::result::Result<T, MirrorError>;

/// Alle Fehler, die die Bedienoberflaeche zu sehen bekommt
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MirrorError {
    #[error("Mikrofon-Zugriff verweigert")]
    PermissionDenied,

    #[error("Signal-Graph konnte nicht aufgebaut werden: {0}")]
    GraphBuild(String),

    #[error("Audio-Spiegel ist nicht aktiv")]
    NotActive,

    #[error("Audio-Subsystem nicht verfuegbar: {0}")]
    EngineUnavailable(String),

    #[error("Konfigurationsfehler: {0}")]
    Konfiguration(String),
}

impl MirrorError {
    /// Kurzer englischer Grund fuer `Status::Error`
    pub fn status_grund(&self) -> String {
        match self {
            Self::PermissionDenied => "could not access microphone".to_string(),
            Self::GraphBuild(grund) => format!("could not start audio processing ({grund})"),
            Self::NotActive => "audio mirror is not active".to_string(),
            Self::EngineUnavailable(grund) => format!("audio engine unavailable ({grund})"),
            Self::Konfiguration(grund) => format!("invalid configuration ({grund})"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fehler_anzeige() {
        let e = MirrorError::GraphBuild("Kontext geschlossen".into());
        assert_eq!(
            e.to_string(),
            "Signal-Graph konnte nicht aufgebaut werden: Kontext geschlossen"
        );
    }

    #[test]
    fn status_grund_fuer_verweigerung() {
        assert_eq!(
            MirrorError::PermissionDenied.status_grund(),
            "could not access microphone"
        );
    }
}
