//! Dynamik-Kompressor mit Soft-Knee
//!
//! Feed-forward: Spitzenpegel in dB -> statische Kennlinie (Threshold,
//! Knee, Ratio) -> Gain-Reduktion mit Attack/Release-Glaettung ->
//! automatische Aufholverstaerkung. Die Aufholverstaerkung folgt dem
//! WebAudio-DynamicsCompressor: `(1 / gain_bei_0_dBFS)^0.6`, bei den
//! Standardwerten also ca. +13.2 dB.

use std::sync::Arc;

use audify_core::{ParamField, StageKind};

use super::{db_to_linear, linear_to_db, time_to_coeff, AudioProcessor};
use crate::params::StageParams;

/// Kompressor-Stufe
pub struct Compressor {
    params: Arc<StageParams>,
    version: u64,
    sample_rate: f32,
    threshold_db: f32,
    knee_db: f32,
    ratio: f32,
    attack_coeff: f32,
    release_coeff: f32,
    /// Aktuelle Gain-Reduktion in dB (<= 0)
    reduction_db: f32,
    /// Lineare Aufholverstaerkung, haengt nur von der Kennlinie ab
    makeup: f32,
}

impl Compressor {
    pub fn new(params: Arc<StageParams>, sample_rate: f32) -> Self {
        let mut comp = Self {
            version: params.version(),
            params,
            sample_rate,
            threshold_db: 0.0,
            knee_db: 0.0,
            ratio: 1.0,
            attack_coeff: 0.0,
            release_coeff: 0.0,
            reduction_db: 0.0,
            makeup: 1.0,
        };
        comp.parameter_uebernehmen();
        comp
    }

    fn parameter_uebernehmen(&mut self) {
        self.threshold_db = self.params.wert(ParamField::Threshold);
        self.knee_db = self.params.wert(ParamField::Knee).max(0.0);
        self.ratio = self.params.wert(ParamField::Ratio).max(1.0);
        self.attack_coeff = time_to_coeff(self.params.wert(ParamField::Attack), self.sample_rate);
        self.release_coeff =
            time_to_coeff(self.params.wert(ParamField::Release), self.sample_rate);
        self.makeup = db_to_linear(-0.6 * self.kennlinie(0.0));
    }

    /// Statische Kennlinie: Ausgangspegel in dB fuer einen Eingangspegel in dB
    fn kennlinie(&self, input_db: f32) -> f32 {
        let ueber = input_db - self.threshold_db;
        if 2.0 * ueber < -self.knee_db {
            input_db
        } else if self.knee_db > 0.0 && 2.0 * ueber.abs() <= self.knee_db {
            let x = ueber + self.knee_db / 2.0;
            input_db + (1.0 / self.ratio - 1.0) * x * x / (2.0 * self.knee_db)
        } else {
            self.threshold_db + ueber / self.ratio
        }
    }

    /// Aktuelle Gain-Reduktion in dB (fuer Anzeige und Tests)
    pub fn reduction_db(&self) -> f32 {
        self.reduction_db
    }

    /// Aufholverstaerkung in dB
    pub fn makeup_db(&self) -> f32 {
        linear_to_db(self.makeup)
    }
}

impl AudioProcessor for Compressor {
    fn process(&mut self, samples: &mut [f32]) {
        let version = self.params.version();
        if version != self.version {
            self.parameter_uebernehmen();
            self.version = version;
        }

        for sample in samples.iter_mut() {
            let input_db = linear_to_db(*sample);
            let ziel = self.kennlinie(input_db) - input_db;

            // Mehr Reduktion -> Attack, weniger Reduktion -> Release
            let coeff = if ziel < self.reduction_db {
                self.attack_coeff
            } else {
                self.release_coeff
            };
            self.reduction_db = coeff * self.reduction_db + (1.0 - coeff) * ziel;

            *sample *= db_to_linear(self.reduction_db) * self.makeup;
        }
    }

    fn reset(&mut self) {
        self.reduction_db = 0.0;
    }

    fn kind(&self) -> StageKind {
        StageKind::Compressor
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kompressor() -> (Arc<StageParams>, Compressor) {
        let params = Arc::new(StageParams::new(StageKind::Compressor));
        let comp = Compressor::new(Arc::clone(&params), 48000.0);
        (params, comp)
    }

    /// Aufholverstaerkung bei Standardwerten: Kennlinie(0 dB) = -22 dB -> +13.2 dB
    const MAKEUP_STANDARD: f32 = 4.5709;

    #[test]
    fn leises_signal_nur_aufgeholt() {
        let (_, mut comp) = kompressor();
        // -60 dBFS liegt weit unter Threshold - Knee/2 = -39 dB
        let mut samples = vec![0.001f32; 4800];
        comp.process(&mut samples);
        assert!((samples[4799] - 0.001 * MAKEUP_STANDARD).abs() < 1e-4);
        assert!(comp.reduction_db().abs() < 0.01);
    }

    #[test]
    fn minus_40_dbfs_wird_ca_4_6_fach_lauter() {
        let (_, mut comp) = kompressor();
        let mut samples = vec![0.01f32; 4800];
        comp.process(&mut samples);
        let faktor = samples[4799] / 0.01;
        assert!((faktor - MAKEUP_STANDARD).abs() < 0.05, "Faktor: {faktor}");
        assert!((comp.makeup_db() - 13.2).abs() < 0.01);
    }

    #[test]
    fn lautes_signal_wird_reduziert() {
        let (_, mut comp) = kompressor();
        let mut samples = vec![0.9f32; 48000];
        comp.process(&mut samples);
        // 0.9 ~ -0.9 dB, 23 dB ueber Threshold bei 12:1 -> ca. -21 dB Reduktion,
        // mit +13.2 dB Aufholung bleibt ca. -8 dB
        assert!(comp.reduction_db() < -15.0, "Reduktion: {}", comp.reduction_db());
        assert!(samples[47999] > 0.3 && samples[47999] < 0.42, "Ausgang: {}", samples[47999]);
    }

    #[test]
    fn makeup_folgt_der_kennlinie() {
        let (params, mut comp) = kompressor();
        params.set(ParamField::Threshold, 0.0);
        params.set(ParamField::Knee, 0.0);
        let mut samples = vec![0.01f32; 480];
        comp.process(&mut samples);
        // Kennlinie(0 dB) = 0 dB -> keine Aufholverstaerkung
        assert!(comp.makeup_db().abs() < 0.01);
    }

    #[test]
    fn kennlinie_im_knie_stetig() {
        let (_, comp) = kompressor();
        let unten = comp.kennlinie(-39.0);
        let oben = comp.kennlinie(-9.0);
        assert!((unten + 39.0).abs() < 0.01);
        assert!((oben - (-24.0 + 15.0 / 12.0)).abs() < 0.01);
    }

    #[test]
    fn threshold_aenderung_wirkt_live() {
        let (params, mut comp) = kompressor();
        params.set(ParamField::Threshold, 0.0);
        let mut samples = vec![0.5f32; 480];
        comp.process(&mut samples);
        assert_eq!(comp.threshold_db, 0.0);
    }

    #[test]
    fn reset_setzt_reduktion_zurueck() {
        let (_, mut comp) = kompressor();
        let mut samples = vec![0.9f32; 4800];
        comp.process(&mut samples);
        comp.reset();
        assert_eq!(comp.reduction_db(), 0.0);
    }
}
