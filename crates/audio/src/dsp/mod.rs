//! DSP-Stufen der Verarbeitungskette
//!
//! Alle Stufen implementieren das `AudioProcessor` Trait und lesen ihre
//! Live-Parameter einmal pro Block aus den gemeinsamen `StageParams`.

pub mod biquad;
pub mod compressor;
pub mod gain;

use audify_core::StageKind;

pub use biquad::{Biquad, BiquadStage, BiquadType};
pub use compressor::Compressor;
pub use gain::GainStage;

/// Gemeinsames Trait fuer alle Audio-Prozessoren
///
/// Prozessoren verarbeiten Mono-Samples in-place und laufen im
/// Realtime-Thread des Hosts, daher `Send`.
pub trait AudioProcessor: Send {
    /// Verarbeitet einen Puffer von Samples in-place
    fn process(&mut self, samples: &mut [f32]);

    /// Setzt den internen Zustand zurueck (z.B. Filter-Historie)
    fn reset(&mut self);

    /// Stufe, die dieser Prozessor umsetzt
    fn kind(&self) -> StageKind;
}

/// Zeitkonstante (Sekunden) -> Glaettungskoeffizient pro Sample
pub(crate) fn time_to_coeff(time_secs: f32, sample_rate: f32) -> f32 {
    if time_secs <= 0.0 {
        return 0.0;
    }
    (-1.0 / (time_secs * sample_rate)).exp()
}

pub(crate) fn db_to_linear(db: f32) -> f32 {
    10.0f32.powf(db / 20.0)
}

pub(crate) fn linear_to_db(linear: f32) -> f32 {
    20.0 * (linear.abs() + 1e-10).log10()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn db_umrechnung() {
        assert!((db_to_linear(0.0) - 1.0).abs() < 0.001);
        assert!((db_to_linear(-20.0) - 0.1).abs() < 0.001);
        assert!((linear_to_db(0.1) + 20.0).abs() < 0.01);
    }

    #[test]
    fn koeffizient_null_bei_null_zeit() {
        assert_eq!(time_to_coeff(0.0, 48000.0), 0.0);
        let c = time_to_coeff(0.25, 48000.0);
        assert!(c > 0.99 && c < 1.0);
    }
}
