//! audify – Bibliotheks-Root der Kommandozeilen-Oberflaeche
//!
//! Verdrahtet Konfiguration, Audio-Host und Controller und stellt die
//! Befehlsschleife bereit. `App::ausfuehren` ist von der Ein-/Ausgabe
//! getrennt und wird so auch in Tests verwendet.

pub mod command;
pub mod config;

use std::fmt::Write as _;
use std::sync::Arc;

use anyhow::Result;
use audify_audio::{
    list_devices, AudioBackend, CaptureSource, CpalBackend, CpalCaptureSource, OfflineBackend,
    OfflineCaptureSource, Richtung,
};
use audify_core::Parameter;
use audify_mirror::MirrorController;
use audify_observability::MirrorMetrics;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};

use command::{Befehl, HILFE};
use config::{AppConfig, BackendArt};

/// Antwort auf einen Befehl
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Antwort {
    pub text: String,
    pub beenden: bool,
}

impl Antwort {
    fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            beenden: false,
        }
    }
}

/// Haelt Controller und Metriken der laufenden Anwendung
pub struct App {
    controller: Arc<MirrorController>,
    metrics: Option<MirrorMetrics>,
}

impl App {
    /// Erstellt die Anwendung aus der Konfiguration
    pub fn neu(config: &AppConfig) -> Result<Self> {
        let (source, backend): (Arc<dyn CaptureSource>, Arc<dyn AudioBackend>) =
            match config.audio.backend {
                BackendArt::Cpal => (
                    Arc::new(CpalCaptureSource::new(config.capture_config())),
                    Arc::new(CpalBackend::new(config.playback_config())),
                ),
                BackendArt::Offline => (
                    Arc::new(OfflineCaptureSource::gewaehrend(config.audio.abtastrate)),
                    Arc::new(OfflineBackend::new(config.audio.abtastrate)),
                ),
            };
        let metrics = if config.metriken.aktiviert {
            Some(MirrorMetrics::neu()?)
        } else {
            None
        };
        info!(backend = backend.name(), "Audio-Host gewaehlt");
        Ok(Self::mit_controller(
            MirrorController::new(source, backend),
            metrics,
        ))
    }

    pub fn mit_controller(controller: MirrorController, metrics: Option<MirrorMetrics>) -> Self {
        let controller = match &metrics {
            Some(m) => controller.with_metrics(m.clone()),
            None => controller,
        };
        Self {
            controller: Arc::new(controller),
            metrics,
        }
    }

    pub fn controller(&self) -> &MirrorController {
        &self.controller
    }

    /// Fuehrt einen Befehl aus und liefert den anzuzeigenden Text
    pub async fn ausfuehren(&self, befehl: Befehl) -> Antwort {
        let c = &self.controller;
        match befehl {
            Befehl::Start => Antwort::text(status_text(c.start().await)),
            Befehl::Stop => Antwort::text(status_text(c.stop())),
            Befehl::Umschalten => Antwort::text(status_text(c.start_or_stop().await)),
            Befehl::Status => Antwort::text(format!(
                "{} ({:?})",
                status_text(c.status()),
                c.state()
            )),
            Befehl::Setzen(parameter, wert) => {
                let gesetzt = c.set_parameter(parameter, wert);
                let mut text = format!("{}: {}", parameter, parameter.anzeige(gesetzt));
                if parameter == Parameter::Volume && c.volume_warning() {
                    text.push_str("\nWarnung: hohe Lautstaerke, Gehoer schuetzen!");
                }
                Antwort::text(text)
            }
            Befehl::Zuruecksetzen => {
                c.reset_parameters();
                Antwort::text(self.parameter_text())
            }
            Befehl::Parameter => Antwort::text(self.parameter_text()),
            Befehl::Test => match c.request_test_tone() {
                Ok(()) => Antwort::text("Pruefton wird abgespielt"),
                Err(e) => Antwort::text(format!("Pruefton nicht moeglich: {e}")),
            },
            Befehl::Geraete => Antwort::text(geraete_text()),
            Befehl::Metriken => match &self.metrics {
                Some(m) => match m.exportieren() {
                    Ok(text) => Antwort::text(text),
                    Err(e) => Antwort::text(format!("Metriken-Export fehlgeschlagen: {e}")),
                },
                None => Antwort::text("Metriken sind deaktiviert"),
            },
            Befehl::Hilfe => Antwort::text(HILFE),
            Befehl::Beenden => Antwort {
                text: status_text(c.stop()),
                beenden: true,
            },
        }
    }

    fn parameter_text(&self) -> String {
        let c = &self.controller;
        let mut text = String::new();
        for (parameter, wert) in c.parameters().iter() {
            let _ = writeln!(text, "  {:<10} {}", parameter.name(), parameter.anzeige(wert));
        }
        if c.volume_warning() {
            text.push_str("  Warnung: hohe Lautstaerke");
        }
        text.trim_end().to_string()
    }

    /// Liest Befehle von stdin bis `quit`, Dateiende oder Ctrl-C.
    /// Ereignisse des Controllers werden dazwischen ausgegeben.
    pub async fn laufen(self) -> Result<()> {
        let mut events = self.controller.subscribe();
        let mut zeilen = BufReader::new(tokio::io::stdin()).lines();
        println!("Audify bereit, 'hilfe' zeigt alle Befehle");

        loop {
            tokio::select! {
                zeile = zeilen.next_line() => {
                    let Some(zeile) = zeile? else {
                        info!("Eingabe beendet");
                        break;
                    };
                    match Befehl::parsen(&zeile) {
                        Ok(None) => {}
                        Ok(Some(befehl)) => {
                            let antwort = self.ausfuehren(befehl).await;
                            println!("{}", antwort.text);
                            if antwort.beenden {
                                break;
                            }
                        }
                        Err(e) => println!("{e}"),
                    }
                }
                event = events.recv() => match event {
                    Ok(event) => println!("[{}] {}", event.titel(), event.beschreibung()),
                    Err(RecvError::Lagged(n)) => warn!(verpasst = n, "Ereignisse verpasst"),
                    Err(RecvError::Closed) => break,
                },
                _ = tokio::signal::ctrl_c() => {
                    info!("Ctrl-C empfangen, Spiegel wird beendet");
                    break;
                }
            }
        }

        self.controller.stop();
        Ok(())
    }
}

fn status_text(status: audify_core::Status) -> String {
    format!("Status: {status}\n{}", status.hinweis())
}

fn geraete_text() -> String {
    let mut text = String::new();
    for (richtung, titel) in [(Richtung::Eingabe, "Eingabe"), (Richtung::Ausgabe, "Ausgabe")] {
        let _ = writeln!(text, "{titel}:");
        match list_devices(richtung) {
            Ok(geraete) if geraete.is_empty() => {
                let _ = writeln!(text, "  (keine)");
            }
            Ok(geraete) => {
                for g in geraete {
                    let standard = if g.ist_standard { " [Standard]" } else { "" };
                    let _ = writeln!(
                        text,
                        "  {}{} ({} Kanaele, {:?} Hz)",
                        g.name, standard, g.channels, g.sample_rates
                    );
                }
            }
            Err(e) => {
                let _ = writeln!(text, "  Fehler: {e}");
            }
        }
    }
    text.trim_end().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use audify_core::MirrorState;

    fn app() -> (OfflineBackend, App) {
        let backend = OfflineBackend::new(48000);
        let controller = MirrorController::new(
            Arc::new(OfflineCaptureSource::gewaehrend(48000)),
            Arc::new(backend.clone()),
        );
        (backend, App::mit_controller(controller, Some(MirrorMetrics::neu().unwrap())))
    }

    #[tokio::test]
    async fn start_zeigt_status_und_hinweis() {
        let (backend, app) = app();
        let antwort = app.ausfuehren(Befehl::Start).await;
        assert!(antwort.text.contains("Status: Active"));
        assert!(antwort.text.contains("Microphone active"));
        assert!(!antwort.beenden);
        assert_eq!(backend.offene_kontexte(), 1);
    }

    #[tokio::test]
    async fn lautstaerke_mit_warnung() {
        let (_, app) = app();
        let antwort = app
            .ausfuehren(Befehl::Setzen(Parameter::Volume, 8.0))
            .await;
        assert!(antwort.text.starts_with("volume: 8.0x"));
        assert!(antwort.text.contains("Warnung"));

        let antwort = app
            .ausfuehren(Befehl::Setzen(Parameter::Volume, 12.0))
            .await;
        assert!(antwort.text.starts_with("volume: 10.0x"));
    }

    #[tokio::test]
    async fn pruefton_ohne_start() {
        let (_, app) = app();
        let antwort = app.ausfuehren(Befehl::Test).await;
        assert!(antwort.text.contains("nicht aktiv"));
    }

    #[tokio::test]
    async fn parameter_liste() {
        let (_, app) = app();
        let antwort = app.ausfuehren(Befehl::Parameter).await;
        assert!(antwort.text.contains("volume"));
        assert!(antwort.text.contains("3.0x"));
        assert!(antwort.text.contains("-24 dB"));
        assert!(antwort.text.contains("80 Hz"));
        assert!(antwort.text.contains("1000 Hz"));
    }

    #[tokio::test]
    async fn metriken_werden_exportiert() {
        let (_, app) = app();
        app.ausfuehren(Befehl::Start).await;
        let antwort = app.ausfuehren(Befehl::Metriken).await;
        assert!(antwort.text.contains("audify_sessions_started_total 1"));
    }

    #[tokio::test]
    async fn beenden_stoppt_spiegel() {
        let (backend, app) = app();
        app.ausfuehren(Befehl::Start).await;
        let antwort = app.ausfuehren(Befehl::Beenden).await;
        assert!(antwort.beenden);
        assert_eq!(app.controller().state(), MirrorState::Idle);
        assert_eq!(backend.offene_kontexte(), 0);
    }
}
