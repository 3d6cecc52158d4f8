//! Fehlertypen fuer die Audio-Engine

use thiserror::Error;

/// Alle moeglichen Fehler der Audio-Engine
#[derive(Debug, Error)]
pub enum AudioError {
    #[error("Audio-Geraet nicht gefunden: {0}")]
    GeraetNichtGefunden(String),

    #[error("Kein Standard-Eingabegeraet verfuegbar")]
    KeinStandardEingabegeraet,

    #[error("Kein Standard-Ausgabegeraet verfuegbar")]
    KeinStandardAusgabegeraet,

    #[error("Mikrofon-Zugriff verweigert: {0}")]
    ZugriffVerweigert(String),

    #[error("Stream-Fehler: {0}")]
    StreamFehler(String),

    #[error("Konfigurationsfehler: {0}")]
    Konfiguration(String),

    #[error("Capture-Handle ist geschlossen")]
    CaptureGeschlossen,

    #[error("Engine-Kontext ist geschlossen")]
    KontextGeschlossen,

    #[error("Signal-Graph-Aufbau fehlgeschlagen: {0}")]
    GraphAufbau(String),

    #[error("Audio-Thread konnte nicht gestartet werden: {0}")]
    Thread(#[from] std::io::Error),
}

impl AudioError {
    /// Gibt true zurueck wenn der Benutzer den Zugriff verweigert hat
    pub fn ist_verweigerung(&self) -> bool {
        matches!(self, Self::ZugriffVerweigert(_))
    }
}

pub type AudioResult<T> = Result<T, AudioError>;
