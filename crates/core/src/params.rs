//! Stufen, Parameterfelder und Wertebereiche der Verarbeitungskette
//!
//! Alle Tabellen sind statisch, damit Signal-Graph und Bedienoberflaeche
//! dieselben Standardwerte und Grenzen verwenden.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Ab dieser Lautstaerke (linearer Faktor) zeigt die Anzeige eine Gehoer-Warnung
pub const LAUTSTAERKE_WARNSCHWELLE: f32 = 7.0;

/// Die fuenf Stufen der Verarbeitungskette
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StageKind {
    Compressor,
    HighPass,
    BassShelf,
    PeakingEq,
    Gain,
}

impl StageKind {
    /// Feste Reihenfolge: Capture -> Compressor -> HighPass -> BassShelf -> PeakingEq -> Gain -> Ausgang
    pub const KETTE: [StageKind; 5] = [
        StageKind::Compressor,
        StageKind::HighPass,
        StageKind::BassShelf,
        StageKind::PeakingEq,
        StageKind::Gain,
    ];

    /// Alle Felder dieser Stufe inklusive der festen Werte
    pub fn felder(self) -> &'static [FieldSpec] {
        match self {
            StageKind::Compressor => &KOMPRESSOR_FELDER,
            StageKind::HighPass => &HOCHPASS_FELDER,
            StageKind::BassShelf => &BASS_FELDER,
            StageKind::PeakingEq => &EQ_FELDER,
            StageKind::Gain => &GAIN_FELDER,
        }
    }

    /// Sucht die Beschreibung eines Feldes dieser Stufe
    pub fn feld(self, field: ParamField) -> Option<&'static FieldSpec> {
        self.felder().iter().find(|f| f.field == field)
    }

    pub fn name(self) -> &'static str {
        match self {
            StageKind::Compressor => "compressor",
            StageKind::HighPass => "highpass",
            StageKind::BassShelf => "bass-shelf",
            StageKind::PeakingEq => "peaking-eq",
            StageKind::Gain => "gain",
        }
    }
}

impl fmt::Display for StageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Einzelnes Feld einer Stufe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ParamField {
    /// Kompressor-Schwelle in dB
    Threshold,
    /// Knie-Breite in dB
    Knee,
    /// Kompressionsverhaeltnis (x:1)
    Ratio,
    /// Attack-Zeit in Sekunden
    Attack,
    /// Release-Zeit in Sekunden
    Release,
    /// Eck- bzw. Mittenfrequenz in Hz
    Frequency,
    /// Resonanz / Guete
    Q,
    /// dB bei Filtern, linearer Faktor bei der Gain-Stufe
    Gain,
}

impl fmt::Display for ParamField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ParamField::Threshold => "threshold",
            ParamField::Knee => "knee",
            ParamField::Ratio => "ratio",
            ParamField::Attack => "attack",
            ParamField::Release => "release",
            ParamField::Frequency => "frequency",
            ParamField::Q => "q",
            ParamField::Gain => "gain",
        };
        f.write_str(name)
    }
}

/// Geschlossener Wertebereich eines einstellbaren Feldes
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bereich {
    pub min: f32,
    pub max: f32,
}

impl Bereich {
    /// Begrenzt einen Wert auf den Bereich. NaN bleibt NaN.
    pub fn begrenzen(&self, wert: f32) -> f32 {
        wert.clamp(self.min, self.max)
    }
}

/// Beschreibung eines Feldes: Standardwert und optionaler Bereich.
/// Felder ohne Bereich sind fest und werden nie live veraendert.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FieldSpec {
    pub field: ParamField,
    pub standard: f32,
    pub bereich: Option<Bereich>,
}

impl FieldSpec {
    const fn einstellbar(field: ParamField, standard: f32, min: f32, max: f32) -> Self {
        Self {
            field,
            standard,
            bereich: Some(Bereich { min, max }),
        }
    }

    const fn fest(field: ParamField, standard: f32) -> Self {
        Self {
            field,
            standard,
            bereich: None,
        }
    }

    pub fn ist_fest(&self) -> bool {
        self.bereich.is_none()
    }

    /// Begrenzt einen Wert auf den Feldbereich (feste Felder liefern den Standardwert)
    pub fn begrenzen(&self, wert: f32) -> f32 {
        match self.bereich {
            Some(b) => b.begrenzen(wert),
            None => self.standard,
        }
    }
}

const THRESHOLD: FieldSpec = FieldSpec::einstellbar(ParamField::Threshold, -24.0, -100.0, 0.0);
const HOCHPASS_FREQUENZ: FieldSpec =
    FieldSpec::einstellbar(ParamField::Frequency, 80.0, 20.0, 500.0);
const BASS_GAIN: FieldSpec = FieldSpec::einstellbar(ParamField::Gain, 0.0, -15.0, 15.0);
const EQ_FREQUENZ: FieldSpec = FieldSpec::einstellbar(ParamField::Frequency, 1000.0, 200.0, 8000.0);
const EQ_GAIN: FieldSpec = FieldSpec::einstellbar(ParamField::Gain, 0.0, -20.0, 20.0);
const AUSGANG_GAIN: FieldSpec = FieldSpec::einstellbar(ParamField::Gain, 3.0, 0.0, 10.0);

const KOMPRESSOR_FELDER: [FieldSpec; 5] = [
    THRESHOLD,
    FieldSpec::fest(ParamField::Knee, 30.0),
    FieldSpec::fest(ParamField::Ratio, 12.0),
    FieldSpec::fest(ParamField::Attack, 0.003),
    FieldSpec::fest(ParamField::Release, 0.25),
];

const HOCHPASS_FELDER: [FieldSpec; 2] = [HOCHPASS_FREQUENZ, FieldSpec::fest(ParamField::Q, 1.0)];

// Shelf-Eckfrequenz ist fest, nur der Pegel ist einstellbar
const BASS_FELDER: [FieldSpec; 2] = [FieldSpec::fest(ParamField::Frequency, 200.0), BASS_GAIN];

const EQ_FELDER: [FieldSpec; 3] = [EQ_FREQUENZ, EQ_GAIN, FieldSpec::fest(ParamField::Q, 1.0)];

const GAIN_FELDER: [FieldSpec; 1] = [AUSGANG_GAIN];

/// Die sechs vom Benutzer einstellbaren Regler
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Parameter {
    /// Ausgangslautstaerke (linearer Faktor)
    Volume,
    /// Bass-Shelf in dB
    Bass,
    /// Kompressor-Schwelle in dB
    Threshold,
    /// Hochpass-Eckfrequenz in Hz
    HighPass,
    /// EQ-Mittenfrequenz in Hz
    EqFrequency,
    /// EQ-Anhebung/-Absenkung in dB
    EqGain,
}

impl Parameter {
    pub const ALLE: [Parameter; 6] = [
        Parameter::Volume,
        Parameter::Bass,
        Parameter::Threshold,
        Parameter::HighPass,
        Parameter::EqFrequency,
        Parameter::EqGain,
    ];

    /// Stufe und Feld, auf die dieser Regler schreibt
    pub fn ziel(self) -> (StageKind, ParamField) {
        match self {
            Parameter::Volume => (StageKind::Gain, ParamField::Gain),
            Parameter::Bass => (StageKind::BassShelf, ParamField::Gain),
            Parameter::Threshold => (StageKind::Compressor, ParamField::Threshold),
            Parameter::HighPass => (StageKind::HighPass, ParamField::Frequency),
            Parameter::EqFrequency => (StageKind::PeakingEq, ParamField::Frequency),
            Parameter::EqGain => (StageKind::PeakingEq, ParamField::Gain),
        }
    }

    /// Umkehrung von [`Parameter::ziel`]; `None` fuer feste oder unbekannte Felder
    pub fn aus_ziel(stage: StageKind, field: ParamField) -> Option<Self> {
        Self::ALLE.into_iter().find(|p| p.ziel() == (stage, field))
    }

    pub fn spec(self) -> &'static FieldSpec {
        match self {
            Parameter::Volume => &AUSGANG_GAIN,
            Parameter::Bass => &BASS_GAIN,
            Parameter::Threshold => &THRESHOLD,
            Parameter::HighPass => &HOCHPASS_FREQUENZ,
            Parameter::EqFrequency => &EQ_FREQUENZ,
            Parameter::EqGain => &EQ_GAIN,
        }
    }

    pub fn standard(self) -> f32 {
        self.spec().standard
    }

    pub fn begrenzen(self, wert: f32) -> f32 {
        self.spec().begrenzen(wert)
    }

    /// Kurzname wie im Kommandozeilen-Frontend
    pub fn name(self) -> &'static str {
        match self {
            Parameter::Volume => "volume",
            Parameter::Bass => "bass",
            Parameter::Threshold => "threshold",
            Parameter::HighPass => "highpass",
            Parameter::EqFrequency => "eq-freq",
            Parameter::EqGain => "eq-gain",
        }
    }

    /// Formatiert einen Wert wie die Regler-Anzeige (`3.0x`, `-24 dB`, `80 Hz`)
    pub fn anzeige(self, wert: f32) -> String {
        match self {
            Parameter::Volume => format!("{wert:.1}x"),
            Parameter::Bass | Parameter::Threshold | Parameter::EqGain => {
                format!("{} dB", wert.round())
            }
            Parameter::HighPass | Parameter::EqFrequency => format!("{} Hz", wert.round()),
        }
    }
}

impl fmt::Display for Parameter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Parameter {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Self::ALLE
            .into_iter()
            .find(|p| p.name().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("Unbekannter Parameter: {s}"))
    }
}

/// Aktuelle Sollwerte aller Regler
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ParameterSet {
    pub volume: f32,
    pub bass: f32,
    pub threshold: f32,
    pub high_pass: f32,
    pub eq_frequency: f32,
    pub eq_gain: f32,
}

impl ParameterSet {
    pub fn get(&self, parameter: Parameter) -> f32 {
        match parameter {
            Parameter::Volume => self.volume,
            Parameter::Bass => self.bass,
            Parameter::Threshold => self.threshold,
            Parameter::HighPass => self.high_pass,
            Parameter::EqFrequency => self.eq_frequency,
            Parameter::EqGain => self.eq_gain,
        }
    }

    /// Setzt einen Wert ungeprueft; Begrenzung erfolgt in der Bedienoberflaeche
    pub fn set(&mut self, parameter: Parameter, wert: f32) {
        let slot = match parameter {
            Parameter::Volume => &mut self.volume,
            Parameter::Bass => &mut self.bass,
            Parameter::Threshold => &mut self.threshold,
            Parameter::HighPass => &mut self.high_pass,
            Parameter::EqFrequency => &mut self.eq_frequency,
            Parameter::EqGain => &mut self.eq_gain,
        };
        *slot = wert;
    }

    /// Iteriert ueber alle Regler mit ihrem aktuellen Wert
    pub fn iter(&self) -> impl Iterator<Item = (Parameter, f32)> + '_ {
        Parameter::ALLE.into_iter().map(move |p| (p, self.get(p)))
    }
}

impl Default for ParameterSet {
    fn default() -> Self {
        Self {
            volume: Parameter::Volume.standard(),
            bass: Parameter::Bass.standard(),
            threshold: Parameter::Threshold.standard(),
            high_pass: Parameter::HighPass.standard(),
            eq_frequency: Parameter::EqFrequency.standard(),
            eq_gain: Parameter::EqGain.standard(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn standardwerte_entsprechen_profil() {
        let set = ParameterSet::default();
        assert_eq!(set.volume, 3.0);
        assert_eq!(set.bass, 0.0);
        assert_eq!(set.threshold, -24.0);
        assert_eq!(set.high_pass, 80.0);
        assert_eq!(set.eq_frequency, 1000.0);
        assert_eq!(set.eq_gain, 0.0);
    }

    #[test]
    fn jeder_regler_zeigt_auf_einstellbares_feld() {
        for p in Parameter::ALLE {
            let (stage, field) = p.ziel();
            let spec = stage.feld(field).expect("Feld muss existieren");
            assert!(!spec.ist_fest(), "{p} darf nicht auf ein festes Feld zeigen");
            assert_eq!(spec, p.spec());
            assert_eq!(Parameter::aus_ziel(stage, field), Some(p));
        }
    }

    #[test]
    fn feste_felder_haben_keinen_regler() {
        assert_eq!(
            Parameter::aus_ziel(StageKind::Compressor, ParamField::Ratio),
            None
        );
        assert_eq!(Parameter::aus_ziel(StageKind::HighPass, ParamField::Q), None);
        assert_eq!(
            Parameter::aus_ziel(StageKind::Gain, ParamField::Frequency),
            None
        );
    }

    #[test]
    fn begrenzung_auf_naechste_grenze() {
        assert_eq!(Parameter::Volume.begrenzen(15.0), 10.0);
        assert_eq!(Parameter::Volume.begrenzen(-1.0), 0.0);
        assert_eq!(Parameter::Threshold.begrenzen(-150.0), -100.0);
        assert_eq!(Parameter::HighPass.begrenzen(5.0), 20.0);
        assert_eq!(Parameter::EqFrequency.begrenzen(20_000.0), 8000.0);
        assert_eq!(Parameter::EqGain.begrenzen(-30.0), -20.0);
        assert_eq!(Parameter::Bass.begrenzen(16.0), 15.0);
        // Werte im Bereich bleiben unveraendert
        assert_eq!(Parameter::Volume.begrenzen(8.0), 8.0);
    }

    #[test]
    fn kompressor_feste_werte() {
        let s = StageKind::Compressor;
        assert_eq!(s.feld(ParamField::Knee).unwrap().standard, 30.0);
        assert_eq!(s.feld(ParamField::Ratio).unwrap().standard, 12.0);
        assert_eq!(s.feld(ParamField::Attack).unwrap().standard, 0.003);
        assert_eq!(s.feld(ParamField::Release).unwrap().standard, 0.25);
    }

    #[test]
    fn parameter_aus_name() {
        assert_eq!("volume".parse::<Parameter>(), Ok(Parameter::Volume));
        assert_eq!("EQ-GAIN".parse::<Parameter>(), Ok(Parameter::EqGain));
        assert!("pitch".parse::<Parameter>().is_err());
    }

    #[test]
    fn anzeige_format() {
        assert_eq!(Parameter::Volume.anzeige(3.0), "3.0x");
        assert_eq!(Parameter::Threshold.anzeige(-24.0), "-24 dB");
        assert_eq!(Parameter::HighPass.anzeige(80.0), "80 Hz");
    }

    #[test]
    fn set_und_get_symmetrisch() {
        let mut set = ParameterSet::default();
        set.set(Parameter::EqGain, 6.0);
        assert_eq!(set.get(Parameter::EqGain), 6.0);
        assert_eq!(set.iter().count(), 6);
    }
}
