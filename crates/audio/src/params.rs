//! Lock-freie Live-Parameter der Verarbeitungsstufen
//!
//! Der Steuer-Thread schreibt, der Render-Thread liest einmal pro Block.
//! f32-Werte werden als Bits in `AtomicU32` abgelegt; ein Versionszaehler
//! zeigt dem Prozessor an, dass Koeffizienten neu berechnet werden muessen.

use audify_core::{ParamField, StageKind};
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

/// Atomarer f32-Wert
#[derive(Debug)]
pub struct AtomicParam {
    bits: AtomicU32,
}

impl AtomicParam {
    pub fn new(value: f32) -> Self {
        Self {
            bits: AtomicU32::new(value.to_bits()),
        }
    }

    #[inline]
    pub fn get(&self) -> f32 {
        f32::from_bits(self.bits.load(Ordering::Relaxed))
    }

    #[inline]
    pub fn set(&self, value: f32) {
        self.bits.store(value.to_bits(), Ordering::Relaxed);
    }
}

/// Alle Felder einer Stufe, initialisiert mit den Standardwerten
#[derive(Debug)]
pub struct StageParams {
    kind: StageKind,
    slots: Vec<(ParamField, AtomicParam)>,
    version: AtomicU64,
}

impl StageParams {
    pub fn new(kind: StageKind) -> Self {
        let slots = kind
            .felder()
            .iter()
            .map(|spec| (spec.field, AtomicParam::new(spec.standard)))
            .collect();
        Self {
            kind,
            slots,
            version: AtomicU64::new(0),
        }
    }

    pub fn kind(&self) -> StageKind {
        self.kind
    }

    /// Liest ein Feld; `None` wenn die Stufe das Feld nicht besitzt
    #[inline]
    pub fn get(&self, field: ParamField) -> Option<f32> {
        self.slots
            .iter()
            .find(|(f, _)| *f == field)
            .map(|(_, p)| p.get())
    }

    /// Liest ein Feld oder den Standardwert der Tabelle
    #[inline]
    pub fn wert(&self, field: ParamField) -> f32 {
        self.get(field)
            .or_else(|| self.kind.feld(field).map(|s| s.standard))
            .unwrap_or(0.0)
    }

    /// Schreibt ein Feld ohne Begrenzung. Gibt false zurueck wenn das Feld fehlt.
    pub fn set(&self, field: ParamField, value: f32) -> bool {
        match self.slots.iter().find(|(f, _)| *f == field) {
            Some((_, p)) => {
                p.set(value);
                self.version.fetch_add(1, Ordering::Release);
                true
            }
            None => false,
        }
    }

    /// Wird bei jedem Schreibzugriff erhoeht
    #[inline]
    pub fn version(&self) -> u64 {
        self.version.load(Ordering::Acquire)
    }

    /// Momentaufnahme aller Felder
    pub fn schnappschuss(&self) -> Vec<(ParamField, f32)> {
        self.slots.iter().map(|(f, p)| (*f, p.get())).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn atomic_param_speichert_f32() {
        let p = AtomicParam::new(-24.0);
        assert_eq!(p.get(), -24.0);
        p.set(0.003);
        assert_eq!(p.get(), 0.003);
    }

    #[test]
    fn stage_params_standardwerte() {
        let params = StageParams::new(StageKind::Compressor);
        assert_eq!(params.get(ParamField::Threshold), Some(-24.0));
        assert_eq!(params.get(ParamField::Knee), Some(30.0));
        assert_eq!(params.get(ParamField::Frequency), None);
    }

    #[test]
    fn schreiben_erhoeht_version() {
        let params = StageParams::new(StageKind::Gain);
        let v0 = params.version();
        assert!(params.set(ParamField::Gain, 5.0));
        assert!(params.version() > v0);
        assert_eq!(params.wert(ParamField::Gain), 5.0);
    }

    #[test]
    fn unbekanntes_feld_wird_abgelehnt() {
        let params = StageParams::new(StageKind::Gain);
        let v0 = params.version();
        assert!(!params.set(ParamField::Q, 2.0));
        assert_eq!(params.version(), v0);
    }
}
