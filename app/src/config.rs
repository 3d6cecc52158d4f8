//! Anwendungs-Konfiguration
//!
//! Wird beim Start aus einer TOML-Datei geladen. Alle Felder haben
//! sinnvolle Standardwerte, sodass Audify ohne Konfigurationsdatei
//! lauffaehig ist. Reglerwerte sind bewusst nicht konfigurierbar: sie
//! beginnen bei jedem Start mit den Standardwerten.

use audify_audio::{CaptureConfig, PlaybackConfig};
use audify_core::MirrorError;
use audify_observability::{log_format_gueltig, log_level_gueltig};
use serde::{Deserialize, Serialize};

/// Vollstaendige Konfiguration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub audio: AudioEinstellungen,
    pub logging: LoggingEinstellungen,
    pub metriken: MetrikEinstellungen,
}

/// Welcher Host die Audio-Ein- und Ausgabe stellt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendArt {
    /// Echte Geraete via cpal
    #[default]
    Cpal,
    /// Ohne Hardware (Trockenlauf)
    Offline,
}

/// Audio-Einstellungen
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioEinstellungen {
    pub backend: BackendArt,
    /// Teilstring des Eingabegeraet-Namens (leer = Standardgeraet)
    pub eingabegeraet: Option<String>,
    /// Teilstring des Ausgabegeraet-Namens (leer = Standardgeraet)
    pub ausgabegeraet: Option<String>,
    /// Abtastrate in Hz fuer Ein- und Ausgabe
    pub abtastrate: u32,
    /// Laenge des Mikrofon-Puffers in Millisekunden
    pub puffer_ms: u32,
}

impl Default for AudioEinstellungen {
    fn default() -> Self {
        Self {
            backend: BackendArt::Cpal,
            eingabegeraet: None,
            ausgabegeraet: None,
            abtastrate: 48000,
            puffer_ms: 500,
        }
    }
}

/// Logging-Einstellungen
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingEinstellungen {
    /// Log-Level: "trace", "debug", "info", "warn", "error"
    pub level: String,
    /// Format: "json" oder "text"
    pub format: String,
}

impl Default for LoggingEinstellungen {
    fn default() -> Self {
        Self {
            level: "info".into(),
            format: "text".into(),
        }
    }
}

/// Metrik-Einstellungen
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MetrikEinstellungen {
    pub aktiviert: bool,
}

impl Default for MetrikEinstellungen {
    fn default() -> Self {
        Self { aktiviert: true }
    }
}

impl AppConfig {
    /// Laedt die Konfiguration aus einer TOML-Datei.
    /// Gibt die Standardkonfiguration zurueck wenn die Datei nicht existiert.
    pub fn laden(pfad: &str) -> anyhow::Result<Self> {
        let config = match std::fs::read_to_string(pfad) {
            Ok(inhalt) => toml::from_str::<Self>(&inhalt)
                .map_err(|e| anyhow::anyhow!("Konfigurationsfehler in '{pfad}': {e}"))?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::warn!(
                    pfad = pfad,
                    "Konfigurationsdatei nicht gefunden, verwende Standardwerte"
                );
                Self::default()
            }
            Err(e) => {
                return Err(anyhow::anyhow!(
                    "Konfigurationsdatei '{pfad}' nicht lesbar: {e}"
                ))
            }
        };
        config.pruefen()?;
        Ok(config)
    }

    /// Prueft Wertebereiche, die serde nicht abdeckt
    pub fn pruefen(&self) -> Result<(), MirrorError> {
        if !log_level_gueltig(&self.logging.level) {
            return Err(MirrorError::Konfiguration(format!(
                "unbekanntes Log-Level '{}'",
                self.logging.level
            )));
        }
        if !log_format_gueltig(&self.logging.format) {
            return Err(MirrorError::Konfiguration(format!(
                "unbekanntes Log-Format '{}'",
                self.logging.format
            )));
        }
        if !(8000..=192_000).contains(&self.audio.abtastrate) {
            return Err(MirrorError::Konfiguration(format!(
                "Abtastrate {} Hz ausserhalb von 8000..=192000",
                self.audio.abtastrate
            )));
        }
        if !(10..=5000).contains(&self.audio.puffer_ms) {
            return Err(MirrorError::Konfiguration(format!(
                "Puffer {} ms ausserhalb von 10..=5000",
                self.audio.puffer_ms
            )));
        }
        Ok(())
    }

    pub fn capture_config(&self) -> CaptureConfig {
        CaptureConfig {
            device: self.audio.eingabegeraet.clone(),
            sample_rate: self.audio.abtastrate,
            buffer_size: (self.audio.abtastrate as usize * self.audio.puffer_ms as usize) / 1000,
        }
    }

    pub fn playback_config(&self) -> PlaybackConfig {
        PlaybackConfig {
            device: self.audio.ausgabegeraet.clone(),
            sample_rate: self.audio.abtastrate,
        }
    }
}
