//! Ausgangs-Gain mit sanften Uebergaengen (keine Klicks)

use std::sync::Arc;

use audify_core::{ParamField, StageKind};

use super::{time_to_coeff, AudioProcessor};
use crate::params::StageParams;

/// Glaettungszeit fuer Lautstaerke-Aenderungen
const GLAETTUNG_SECS: f32 = 0.005;

/// Linearer Verstaerker am Ende der Kette
pub struct GainStage {
    params: Arc<StageParams>,
    current: f32,
    smoothing: f32,
}

impl GainStage {
    pub fn new(params: Arc<StageParams>, sample_rate: f32) -> Self {
        // Startet direkt auf dem Zielwert, damit der Spiegel nicht einblendet
        let current = params.wert(ParamField::Gain);
        Self {
            params,
            current,
            smoothing: time_to_coeff(GLAETTUNG_SECS, sample_rate),
        }
    }

    /// Aktuell wirksamer (geglaetteter) Faktor
    pub fn current_gain(&self) -> f32 {
        self.current
    }
}

impl AudioProcessor for GainStage {
    fn process(&mut self, samples: &mut [f32]) {
        let target = self.params.wert(ParamField::Gain);
        for s in samples.iter_mut() {
            self.current = self.smoothing * self.current + (1.0 - self.smoothing) * target;
            *s *= self.current;
        }
    }

    fn reset(&mut self) {
        self.current = self.params.wert(ParamField::Gain);
    }

    fn kind(&self) -> StageKind {
        StageKind::Gain
    }
}
