//! IIR-Biquad in Direct Form II Transposed
//!
//! Koeffizienten nach dem Audio-EQ-Cookbook (R. Bristow-Johnson), intern in
//! f64 berechnet, Samples in f32. `BiquadStage` verbindet einen Biquad mit
//! den Live-Parametern der Hochpass-, Bass-Shelf- oder EQ-Stufe.

use std::f64::consts::{FRAC_1_SQRT_2, PI};
use std::sync::Arc;

use audify_core::{ParamField, StageKind};

use super::AudioProcessor;
use crate::params::StageParams;

/// Filtertypen der Kette
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BiquadType {
    HighPass,
    LowShelf,
    Peaking,
}

impl BiquadType {
    /// Filtertyp fuer eine Stufe; `None` fuer Stufen ohne Biquad
    pub fn fuer_stufe(kind: StageKind) -> Option<Self> {
        match kind {
            StageKind::HighPass => Some(Self::HighPass),
            StageKind::BassShelf => Some(Self::LowShelf),
            StageKind::PeakingEq => Some(Self::Peaking),
            StageKind::Compressor | StageKind::Gain => None,
        }
    }
}

/// Biquad-Filter
#[derive(Debug, Clone)]
pub struct Biquad {
    b0: f64,
    b1: f64,
    b2: f64,
    a1: f64,
    a2: f64,
    z1: f64,
    z2: f64,
    filter_type: BiquadType,
    sample_rate: f64,
}

impl Biquad {
    pub fn new(
        filter_type: BiquadType,
        frequency: f64,
        gain_db: f64,
        q: f64,
        sample_rate: f64,
    ) -> Self {
        let mut filter = Self {
            b0: 1.0,
            b1: 0.0,
            b2: 0.0,
            a1: 0.0,
            a2: 0.0,
            z1: 0.0,
            z2: 0.0,
            filter_type,
            sample_rate,
        };
        filter.set_params(frequency, gain_db, q);
        filter
    }

    /// Berechnet die Koeffizienten neu. Die Filterhistorie bleibt erhalten,
    /// damit Live-Aenderungen nicht knacken.
    pub fn set_params(&mut self, frequency: f64, gain_db: f64, q: f64) {
        // Frequenz unterhalb Nyquist halten
        let frequency = frequency.clamp(1.0, self.sample_rate * 0.49);
        let q = q.max(1e-4);
        let omega = 2.0 * PI * frequency / self.sample_rate;
        let sin_omega = omega.sin();
        let cos_omega = omega.cos();
        let alpha = sin_omega / (2.0 * q);
        let a = 10.0_f64.powf(gain_db / 40.0);

        let (b0, b1, b2, a0, a1, a2) = match self.filter_type {
            BiquadType::HighPass => (
                (1.0 + cos_omega) / 2.0,
                -(1.0 + cos_omega),
                (1.0 + cos_omega) / 2.0,
                1.0 + alpha,
                -2.0 * cos_omega,
                1.0 - alpha,
            ),
            BiquadType::LowShelf => {
                let two_sqrt_a_alpha = 2.0 * a.sqrt() * alpha;
                (
                    a * ((a + 1.0) - (a - 1.0) * cos_omega + two_sqrt_a_alpha),
                    2.0 * a * ((a - 1.0) - (a + 1.0) * cos_omega),
                    a * ((a + 1.0) - (a - 1.0) * cos_omega - two_sqrt_a_alpha),
                    (a + 1.0) + (a - 1.0) * cos_omega + two_sqrt_a_alpha,
                    -2.0 * ((a - 1.0) + (a + 1.0) * cos_omega),
                    (a + 1.0) + (a - 1.0) * cos_omega - two_sqrt_a_alpha,
                )
            }
            BiquadType::Peaking => (
                1.0 + alpha * a,
                -2.0 * cos_omega,
                1.0 - alpha * a,
                1.0 + alpha / a,
                -2.0 * cos_omega,
                1.0 - alpha / a,
            ),
        };

        self.b0 = b0 / a0;
        self.b1 = b1 / a0;
        self.b2 = b2 / a0;
        self.a1 = a1 / a0;
        self.a2 = a2 / a0;
    }

    #[inline]
    pub fn process_sample(&mut self, input: f32) -> f32 {
        let x = input as f64;
        let y = self.b0 * x + self.z1;
        self.z1 = self.b1 * x - self.a1 * y + self.z2;
        self.z2 = self.b2 * x - self.a2 * y;
        y as f32
    }

    pub fn reset(&mut self) {
        self.z1 = 0.0;
        self.z2 = 0.0;
    }
}

/// Biquad-Stufe mit Live-Parametern
pub struct BiquadStage {
    params: Arc<StageParams>,
    filter: Biquad,
    version: u64,
}

impl BiquadStage {
    /// Erstellt die Stufe. Gibt `None` zurueck, wenn die Stufe kein Filter ist.
    pub fn new(params: Arc<StageParams>, sample_rate: f32) -> Option<Self> {
        let filter_type = BiquadType::fuer_stufe(params.kind())?;
        let (frequency, gain_db, q) = Self::aktuelle_werte(&params);
        let filter = Biquad::new(filter_type, frequency, gain_db, q, sample_rate as f64);
        let version = params.version();
        Some(Self {
            params,
            filter,
            version,
        })
    }

    fn aktuelle_werte(params: &StageParams) -> (f64, f64, f64) {
        let frequency = params.wert(ParamField::Frequency) as f64;
        let gain_db = params.get(ParamField::Gain).unwrap_or(0.0) as f64;
        // Shelf mit Flankensteilheit S = 1 entspricht Q = 1/sqrt(2)
        let q = params
            .get(ParamField::Q)
            .map(f64::from)
            .unwrap_or(FRAC_1_SQRT_2);
        (frequency, gain_db, q)
    }
}

impl AudioProcessor for BiquadStage {
    fn process(&mut self, samples: &mut [f32]) {
        let version = self.params.version();
        if version != self.version {
            let (frequency, gain_db, q) = Self::aktuelle_werte(&self.params);
            self.filter.set_params(frequency, gain_db, q);
            self.version = version;
        }
        for sample in samples.iter_mut() {
            *sample = self.filter.process_sample(*sample);
        }
    }

    fn reset(&mut self) {
        self.filter.reset();
    }

    fn kind(&self) -> StageKind {
        self.params.kind()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SR: f64 = 48000.0;

    /// Spitzenpegel eines Sinus nach dem Filter (Einschwingen wird verworfen)
    fn spitze(filter: &mut Biquad, freq: f64) -> f32 {
        let mut max = 0.0f32;
        for i in 0..9600 {
            let t = i as f64 / SR;
            let out = filter.process_sample(((2.0 * PI * freq * t).sin() * 0.1) as f32);
            if i > 4800 {
                max = max.max(out.abs());
            }
        }
        max
    }

    #[test]
    fn peaking_ohne_gain_ist_durchlass() {
        let mut filter = Biquad::new(BiquadType::Peaking, 1000.0, 0.0, 1.0, SR);
        let out = filter.process_sample(0.5);
        assert!((out - 0.5).abs() < 0.01);
    }

    #[test]
    fn peaking_hebt_mittenfrequenz_an() {
        let mut filter = Biquad::new(BiquadType::Peaking, 1000.0, 12.0, 1.0, SR);
        let max = spitze(&mut filter, 1000.0);
        assert!(max > 0.3, "Anhebung erwartet, max={max}");
    }

    #[test]
    fn hochpass_daempft_tiefe_frequenzen() {
        let mut filter = Biquad::new(BiquadType::HighPass, 500.0, 0.0, 1.0, SR);
        let tief = spitze(&mut filter, 30.0);
        filter.reset();
        let hoch = spitze(&mut filter, 4000.0);
        assert!(tief < 0.01, "30 Hz sollte gedaempft sein: {tief}");
        assert!(hoch > 0.09, "4 kHz sollte passieren: {hoch}");
    }

    #[test]
    fn low_shelf_hebt_bass_an() {
        let mut filter = Biquad::new(BiquadType::LowShelf, 200.0, 12.0, FRAC_1_SQRT_2, SR);
        let bass = spitze(&mut filter, 40.0);
        filter.reset();
        let hoehen = spitze(&mut filter, 6000.0);
        assert!(bass > 0.3, "Bass sollte angehoben sein: {bass}");
        assert!((hoehen - 0.1).abs() < 0.02, "Hoehen unveraendert: {hoehen}");
    }

    #[test]
    fn frequenz_ueber_nyquist_bleibt_stabil() {
        let mut filter = Biquad::new(BiquadType::Peaking, 30_000.0, 6.0, 1.0, 16000.0);
        for _ in 0..1000 {
            assert!(filter.process_sample(0.5).is_finite());
        }
    }

    #[test]
    fn stufe_uebernimmt_live_aenderung() {
        let params = Arc::new(StageParams::new(StageKind::PeakingEq));
        let mut stage = BiquadStage::new(Arc::clone(&params), SR as f32).unwrap();
        let mut block = vec![0.5f32; 16];
        stage.process(&mut block);
        // 0 dB -> Gleichanteil bleibt nahezu unveraendert
        assert!((block[15] - 0.5).abs() < 0.05);

        params.set(ParamField::Gain, 20.0);
        assert_ne!(stage.version, params.version());
        stage.process(&mut block);
        assert_eq!(stage.version, params.version());
    }

    #[test]
    fn keine_biquad_stufe_fuer_kompressor() {
        let params = Arc::new(StageParams::new(StageKind::Compressor));
        assert!(BiquadStage::new(params, 48000.0).is_none());
    }
}
