//! Audio-Ausgabe via cpal
//!
//! `CpalContext` ist ein Engine-Kontext auf dem Ausgabegeraet. Beim
//! Verbinden startet ein eigener Thread, der den cpal-Stream besitzt; der
//! Renderer laeuft im cpal-Callback und fuellt einen Mono-Block, der auf
//! alle Ausgangskanaele dupliziert und auf [-1, 1] begrenzt wird.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use cpal::traits::{DeviceTrait, StreamTrait};
use cpal::{Device, SampleFormat, Stream, StreamConfig};
use crossbeam_channel::{bounded, Sender};
use tracing::{debug, error, info};

use crate::device::load_cpal_output_device;
use crate::error::{AudioError, AudioResult};
use crate::host::{AudioBackend, EngineContext, Renderer};

/// Konfiguration fuer die Ausgabe
#[derive(Debug, Clone)]
pub struct PlaybackConfig {
    /// Geraetename (Teilstring), `None` = Standardgeraet
    pub device: Option<String>,
    /// Abtastrate in Hz
    pub sample_rate: u32,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            device: None,
            sample_rate: 48000,
        }
    }
}

/// Oeffnet Engine-Kontexte auf dem Ausgabegeraet
#[derive(Debug, Clone, Default)]
pub struct CpalBackend {
    config: PlaybackConfig,
}

impl CpalBackend {
    pub fn new(config: PlaybackConfig) -> Self {
        Self { config }
    }
}

impl AudioBackend for CpalBackend {
    fn open_context(&self) -> AudioResult<Box<dyn EngineContext>> {
        // Geraet frueh pruefen, damit Fehler vor dem Verbinden auffallen
        load_cpal_output_device(self.config.device.as_deref())?;
        debug!(sample_rate = self.config.sample_rate, "Engine-Kontext geoeffnet");
        Ok(Box::new(CpalContext {
            config: self.config.clone(),
            clock: Arc::new(AtomicU64::new(0)),
            open: true,
            shutdown_tx: None,
            thread: None,
        }))
    }

    fn name(&self) -> &str {
        "cpal"
    }
}

/// Engine-Kontext auf einem cpal-Ausgabegeraet
pub struct CpalContext {
    config: PlaybackConfig,
    clock: Arc<AtomicU64>,
    open: bool,
    shutdown_tx: Option<Sender<()>>,
    thread: Option<JoinHandle<()>>,
}

impl EngineContext for CpalContext {
    fn sample_rate(&self) -> u32 {
        self.config.sample_rate
    }

    fn is_open(&self) -> bool {
        self.open
    }

    fn sample_clock(&self) -> u64 {
        self.clock.load(Ordering::Relaxed)
    }

    fn connect(&mut self, renderer: Box<dyn Renderer>) -> AudioResult<()> {
        if !self.open {
            return Err(AudioError::KontextGeschlossen);
        }
        if self.shutdown_tx.is_some() {
            return Err(AudioError::Konfiguration(
                "Kontext ist bereits verbunden".into(),
            ));
        }

        let (ready_tx, ready_rx) = bounded::<AudioResult<()>>(1);
        let (shutdown_tx, shutdown_rx) = bounded::<()>(1);
        let config = self.config.clone();
        let clock = Arc::clone(&self.clock);

        let thread = std::thread::Builder::new()
            .name("audify-output".into())
            .spawn(move || {
                let stream = load_cpal_output_device(config.device.as_deref())
                    .and_then(|device| open_output_stream(&device, &config, renderer, clock));
                match stream {
                    Ok(stream) => {
                        let _ = ready_tx.send(Ok(()));
                        let _ = shutdown_rx.recv();
                        drop(stream);
                        debug!("Ausgabe-Thread beendet");
                    }
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                    }
                }
            })?;

        match ready_rx.recv() {
            Ok(Ok(())) => {
                self.shutdown_tx = Some(shutdown_tx);
                self.thread = Some(thread);
                info!(sample_rate = self.config.sample_rate, "Ausgabe verbunden");
                Ok(())
            }
            Ok(Err(e)) => {
                let _ = thread.join();
                Err(e)
            }
            Err(_) => {
                let _ = thread.join();
                Err(AudioError::StreamFehler(
                    "Ausgabe-Thread ohne Rueckmeldung beendet".into(),
                ))
            }
        }
    }

    fn close(&mut self) {
        if !self.open {
            return;
        }
        self.open = false;
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                error!("Ausgabe-Thread ist abgestuerzt");
            }
        }
        debug!(frames = self.sample_clock(), "Engine-Kontext geschlossen");
    }
}

impl Drop for CpalContext {
    fn drop(&mut self) {
        self.close();
    }
}

/// Rendert einen Mono-Block und verteilt ihn auf alle Kanaele
struct Ausgang {
    renderer: Box<dyn Renderer>,
    mono: Vec<f32>,
    kanaele: usize,
    clock: Arc<AtomicU64>,
}

impl Ausgang {
    fn fuellen(&mut self, frames: usize, mut schreiben: impl FnMut(usize, f32)) {
        self.mono.resize(frames, 0.0);
        self.renderer.render(&mut self.mono[..frames]);
        for (i, s) in self.mono[..frames].iter().enumerate() {
            let s = s.clamp(-1.0, 1.0);
            for ch in 0..self.kanaele {
                schreiben(i * self.kanaele + ch, s);
            }
        }
        self.clock.fetch_add(frames as u64, Ordering::Relaxed);
    }
}

fn open_output_stream(
    device: &Device,
    config: &PlaybackConfig,
    renderer: Box<dyn Renderer>,
    clock: Arc<AtomicU64>,
) -> AudioResult<Stream> {
    let supported = device
        .supported_output_configs()
        .map_err(|e| AudioError::StreamFehler(e.to_string()))?
        .find(|c| {
            c.min_sample_rate().0 <= config.sample_rate
                && c.max_sample_rate().0 >= config.sample_rate
        });

    let (sample_format, channels) = supported
        .map(|c| (c.sample_format(), c.channels()))
        .unwrap_or((SampleFormat::F32, 2));

    let stream_config = StreamConfig {
        channels,
        sample_rate: cpal::SampleRate(config.sample_rate),
        buffer_size: cpal::BufferSize::Default,
    };
    let kanaele = channels.max(1) as usize;
    let mut ausgang = Ausgang {
        renderer,
        mono: Vec::with_capacity(4096),
        kanaele,
        clock,
    };
    let err_fn = |err| error!("Ausgabe-Fehler: {}", err);

    let stream = match sample_format {
        SampleFormat::F32 => device.build_output_stream(
            &stream_config,
            move |data: &mut [f32], _| {
                ausgang.fuellen(data.len() / kanaele, |i, s| data[i] = s);
            },
            err_fn,
            None,
        ),
        SampleFormat::I16 => device.build_output_stream(
            &stream_config,
            move |data: &mut [i16], _| {
                ausgang.fuellen(data.len() / kanaele, |i, s| {
                    data[i] = (s * i16::MAX as f32) as i16;
                });
            },
            err_fn,
            None,
        ),
        other => {
            return Err(AudioError::StreamFehler(format!(
                "Nicht unterstuetztes Sample-Format: {other:?}"
            )))
        }
    }
    .map_err(|e| AudioError::StreamFehler(e.to_string()))?;

    stream
        .play()
        .map_err(|e| AudioError::StreamFehler(e.to_string()))?;

    debug!(
        sample_rate = config.sample_rate,
        kanaele, "Ausgabe-Stream geoeffnet"
    );
    Ok(stream)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn playback_config_default() {
        let config = PlaybackConfig::default();
        assert_eq!(config.sample_rate, 48000);
        assert!(config.device.is_none());
    }

    #[test]
    fn ausgang_dupliziert_und_begrenzt() {
        let clock = Arc::new(AtomicU64::new(0));
        let mut ausgang = Ausgang {
            renderer: Box::new(|out: &mut [f32]| {
                out[0] = 2.0;
                out[1] = -0.5;
            }),
            mono: Vec::new(),
            kanaele: 2,
            clock: Arc::clone(&clock),
        };
        let mut data = [0.0f32; 4];
        ausgang.fuellen(2, |i, s| data[i] = s);
        assert_eq!(data, [1.0, 1.0, -0.5, -0.5]);
        assert_eq!(clock.load(Ordering::Relaxed), 2);
    }

    #[test]
    #[ignore = "Benoetigt Audio-Hardware"]
    fn ausgabe_kontext_oeffnen_und_schliessen() {
        let backend = CpalBackend::default();
        let mut ctx = backend.open_context().expect("Ausgabe sollte verfuegbar sein");
        ctx.connect(Box::new(|out: &mut [f32]| out.fill(0.0)))
            .expect("Verbinden sollte klappen");
        ctx.close();
        ctx.close();
        assert!(!ctx.is_open());
    }
}
