//! Kurzer Pruefton auf einem eigenen Kontext
//!
//! Sinus, der in 0,3 s exponentiell von 1200 Hz auf 900 Hz faellt und nach
//! 0,5 s verstummt. Die Amplitude entspricht der aktuellen Lautstaerke.

use std::f64::consts::TAU;

use tracing::{debug, info};

use crate::error::AudioResult;
use crate::host::{AudioBackend, EngineContext, Renderer};

pub const TON_START_HZ: f64 = 1200.0;
pub const TON_ENDE_HZ: f64 = 900.0;
pub const TON_RAMPE_SECS: f64 = 0.3;
pub const TON_DAUER_SECS: f64 = 0.5;

/// Renderer fuer den Pruefton
pub struct ToneRenderer {
    sample_rate: f64,
    lautstaerke: f32,
    phase: f64,
    position: u64,
}

impl ToneRenderer {
    pub fn new(sample_rate: u32, lautstaerke: f32) -> Self {
        Self {
            sample_rate: sample_rate.max(1) as f64,
            lautstaerke,
            phase: 0.0,
            position: 0,
        }
    }

    /// Momentanfrequenz zum Zeitpunkt `t` (Sekunden)
    pub fn frequenz_bei(t: f64) -> f64 {
        if t >= TON_RAMPE_SECS {
            TON_ENDE_HZ
        } else {
            TON_START_HZ * (TON_ENDE_HZ / TON_START_HZ).powf(t / TON_RAMPE_SECS)
        }
    }

    /// Ist der Ton vollstaendig gerendert?
    pub fn ist_fertig(&self) -> bool {
        self.position as f64 / self.sample_rate >= TON_DAUER_SECS
    }
}

impl Renderer for ToneRenderer {
    fn render(&mut self, out: &mut [f32]) {
        for s in out.iter_mut() {
            if self.ist_fertig() {
                *s = 0.0;
                continue;
            }
            let t = self.position as f64 / self.sample_rate;
            *s = (self.phase.sin() as f32 * self.lautstaerke).clamp(-1.0, 1.0);
            self.phase = (self.phase + TAU * Self::frequenz_bei(t) / self.sample_rate) % TAU;
            self.position += 1;
        }
    }
}

/// Laufender Pruefton; schliesst seinen Kontext beim Beenden oder Drop
pub struct TonePlayback {
    context: Option<Box<dyn EngineContext>>,
}

impl TonePlayback {
    pub fn is_playing(&self) -> bool {
        self.context.as_ref().is_some_and(|c| c.is_open())
    }

    /// Schliesst den Kontext. Mehrfacher Aufruf ist erlaubt.
    pub fn finish(&mut self) {
        if let Some(mut context) = self.context.take() {
            context.close();
            debug!(frames = context.sample_clock(), "Pruefton beendet");
        }
    }
}

impl Drop for TonePlayback {
    fn drop(&mut self) {
        self.finish();
    }
}

/// Spielt den Pruefton auf einem frischen Kontext ab
pub fn play_test_tone(backend: &dyn AudioBackend, lautstaerke: f32) -> AudioResult<TonePlayback> {
    let mut context = backend.open_context()?;
    let renderer = ToneRenderer::new(context.sample_rate(), lautstaerke.max(0.0));
    if let Err(e) = context.connect(Box::new(renderer)) {
        context.close();
        return Err(e);
    }
    info!(lautstaerke, "Pruefton gestartet");
    Ok(TonePlayback {
        context: Some(context),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::offline::OfflineBackend;

    #[test]
    fn frequenz_faellt_exponentiell() {
        assert!((ToneRenderer::frequenz_bei(0.0) - 1200.0).abs() < 1e-9);
        let mitte = ToneRenderer::frequenz_bei(0.15);
        assert!((mitte - (1200.0f64 * 900.0).sqrt()).abs() < 1e-6);
        assert_eq!(ToneRenderer::frequenz_bei(0.3), 900.0);
        assert_eq!(ToneRenderer::frequenz_bei(0.45), 900.0);
    }

    #[test]
    fn ton_verstummt_nach_halber_sekunde() {
        let mut tone = ToneRenderer::new(48000, 1.0);
        let mut block = vec![0.0f32; 24000];
        tone.render(&mut block);
        assert!(block.iter().any(|s| s.abs() > 0.5));
        assert!(tone.ist_fertig());

        let mut rest = vec![1.0f32; 480];
        tone.render(&mut rest);
        assert!(rest.iter().all(|s| *s == 0.0));
    }

    #[test]
    fn amplitude_folgt_lautstaerke() {
        let mut tone = ToneRenderer::new(48000, 0.25);
        let mut block = vec![0.0f32; 4800];
        tone.render(&mut block);
        let spitze = block.iter().fold(0.0f32, |m, s| m.max(s.abs()));
        assert!(spitze <= 0.25 + 1e-6 && spitze > 0.24);
    }

    #[test]
    fn abspielen_und_beenden() {
        let backend = OfflineBackend::new(48000);
        let mut playback = play_test_tone(&backend, 3.0).unwrap();
        assert!(playback.is_playing());
        let block = backend.rendern(480).unwrap();
        assert!(block.iter().all(|s| (-1.0..=1.0).contains(s)));

        playback.finish();
        playback.finish();
        assert!(!playback.is_playing());
        assert_eq!(backend.offene_kontexte(), 0);
    }

    #[test]
    fn drop_schliesst_kontext() {
        let backend = OfflineBackend::new(48000);
        drop(play_test_tone(&backend, 1.0).unwrap());
        assert_eq!(backend.offene_kontexte(), 0);
    }
}
