//! Lifecycle-Zustand und abgeleitete Statusanzeige

use serde::{Deserialize, Serialize};
use std::fmt;

/// Zustand des Lifecycle-Controllers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum MirrorState {
    /// Kein Stream, kein Graph
    #[default]
    Idle,
    /// Mikrofon-Freigabe wird angefragt
    Requesting,
    /// Stream und Graph laufen
    Active,
    /// Freigabe verweigert oder Engine-Fehler; verhaelt sich wie `Idle`
    Failed,
}

/// Menschenlesbarer Status. Wird immer aus dem Controller-Zustand abgeleitet.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Status {
    #[default]
    Inactive,
    Active,
    Error(String),
}

impl Status {
    pub fn ist_aktiv(&self) -> bool {
        matches!(self, Status::Active)
    }

    pub fn ist_fehler(&self) -> bool {
        matches!(self, Status::Error(_))
    }

    /// Ausfuehrlicher Hinweistext fuer die Anzeige unter dem Start-Knopf
    pub fn hinweis(&self) -> String {
        match self {
            Status::Inactive => {
                "Microphone inactive. Click \"Start Listening\" to begin.".to_string()
            }
            Status::Active => {
                "Microphone active. Adjust effects and volume in the controls below.".to_string()
            }
            Status::Error(grund) => format!(
                "Error: {grund}. Please allow microphone access and ensure headphones are connected."
            ),
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Status::Inactive => f.write_str("Inactive"),
            Status::Active => f.write_str("Active"),
            Status::Error(grund) => write!(f, "Error: {grund}"),
        }
    }
}
