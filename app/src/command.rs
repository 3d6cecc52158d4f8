//! Befehle der Kommandozeile (eine Zeile = ein Befehl)

use std::fmt;

use audify_core::Parameter;

/// Ein geparster Befehl
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Befehl {
    Start,
    Stop,
    Umschalten,
    Setzen(Parameter, f32),
    Zuruecksetzen,
    Test,
    Status,
    Parameter,
    Geraete,
    Metriken,
    Hilfe,
    Beenden,
}

/// Fehler beim Parsen einer Zeile
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseFehler {
    Unbekannt(String),
    WertFehlt(&'static str),
    KeineZahl(String),
}

impl fmt::Display for ParseFehler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unbekannt(b) => write!(f, "Unbekannter Befehl '{b}', 'hilfe' zeigt alle Befehle"),
            Self::WertFehlt(p) => write!(f, "'{p}' braucht einen Zahlenwert"),
            Self::KeineZahl(w) => write!(f, "'{w}' ist keine Zahl"),
        }
    }
}

impl std::error::Error for ParseFehler {}

pub const HILFE: &str = "\
Befehle:
  start | stop | toggle     Spiegel starten, stoppen, umschalten
  volume <0..10>            Lautstaerke (Faktor)
  bass <-15..15>            Bass-Shelf in dB
  threshold <-100..0>       Kompressor-Schwelle in dB
  highpass <20..500>        Hochpass-Eckfrequenz in Hz
  eq-freq <200..8000>       EQ-Mittenfrequenz in Hz
  eq-gain <-20..20>         EQ-Verstaerkung in dB
  reset                     Regler auf Standard
  test                      Pruefton abspielen
  status | params           Status bzw. Reglerwerte anzeigen
  geraete                   Audio-Geraete auflisten
  metriken                  Prometheus-Metriken ausgeben
  hilfe | quit";

impl Befehl {
    /// Parst eine Zeile. Leere Zeilen ergeben `None`.
    pub fn parsen(zeile: &str) -> Result<Option<Self>, ParseFehler> {
        let mut teile = zeile.split_whitespace();
        let Some(wort) = teile.next() else {
            return Ok(None);
        };
        let wort = wort.to_lowercase();

        let befehl = match wort.as_str() {
            "start" => Self::Start,
            "stop" => Self::Stop,
            "toggle" | "umschalten" => Self::Umschalten,
            "reset" => Self::Zuruecksetzen,
            "test" => Self::Test,
            "status" => Self::Status,
            "params" | "parameter" => Self::Parameter,
            "geraete" | "devices" => Self::Geraete,
            "metriken" | "metrics" => Self::Metriken,
            "hilfe" | "help" | "?" => Self::Hilfe,
            "quit" | "exit" | "beenden" => Self::Beenden,
            andere => {
                let parameter: Parameter = andere
                    .parse()
                    .map_err(|_| ParseFehler::Unbekannt(andere.to_string()))?;
                let roh = teile.next().ok_or(ParseFehler::WertFehlt(parameter.name()))?;
                let wert: f32 = roh
                    .parse()
                    .map_err(|_| ParseFehler::KeineZahl(roh.to_string()))?;
                Self::Setzen(parameter, wert)
            }
        };
        Ok(Some(befehl))
    }
}
