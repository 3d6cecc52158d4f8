//! Parameter-Oberflaeche: Sollwerte der sechs Regler

use audify_audio::GraphContext;
use audify_core::{Parameter, ParameterSet, LAUTSTAERKE_WARNSCHWELLE};
use tracing::warn;

/// Haelt die aktuellen Reglerwerte. Werte sind immer im gueltigen Bereich.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParameterSurface {
    werte: ParameterSet,
}

impl ParameterSurface {
    pub fn new() -> Self {
        Self::default()
    }

    /// Begrenzt und speichert einen Wert. NaN wird ignoriert; zurueck kommt
    /// immer der nun gespeicherte Wert.
    pub fn set(&mut self, parameter: Parameter, wert: f32) -> f32 {
        if wert.is_nan() {
            warn!(%parameter, "NaN als Reglerwert ignoriert");
            return self.werte.get(parameter);
        }
        let begrenzt = parameter.begrenzen(wert);
        self.werte.set(parameter, begrenzt);
        begrenzt
    }

    pub fn get(&self, parameter: Parameter) -> f32 {
        self.werte.get(parameter)
    }

    pub fn values(&self) -> ParameterSet {
        self.werte
    }

    /// Gehoerschutz-Hinweis: Lautstaerke ueber 7.0x. Nur Anzeige, keine Begrenzung.
    pub fn volume_warning(&self) -> bool {
        self.werte.volume > LAUTSTAERKE_WARNSCHWELLE
    }

    pub fn reset(&mut self) {
        self.werte = ParameterSet::default();
    }

    /// Schreibt alle Werte auf einen laufenden Graphen. Gibt die Anzahl
    /// uebernommener Werte zurueck (0 wenn der Graph nicht offen ist).
    pub fn apply_to(&self, graph: &GraphContext) -> usize {
        self.werte
            .iter()
            .filter_map(|(parameter, wert)| graph.set(parameter, wert))
            .count()
    }
}
