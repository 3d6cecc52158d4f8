//! Mikrofon-Capture via cpal
//!
//! Der cpal-Stream ist nicht `Send` und lebt daher auf einem eigenen
//! Thread. `CpalCapture` haelt nur den Shutdown-Kanal und den Leser des
//! Ring-Buffers. Mehrkanalige Geraete werden im Callback auf Mono
//! heruntergemischt.

use std::thread::JoinHandle;

use async_trait::async_trait;
use cpal::traits::{DeviceTrait, StreamTrait};
use cpal::{Device, SampleFormat, Stream, StreamConfig};
use crossbeam_channel::{bounded, Sender};
use ringbuf::traits::Producer;
use tracing::{debug, error, info, trace};

use crate::device::load_cpal_input_device;
use crate::error::{AudioError, AudioResult};
use crate::host::{capture_ring, CaptureHandle, CaptureProducer, CaptureReader, CaptureSource};

/// Konfiguration fuer den Audio-Capture
#[derive(Debug, Clone)]
pub struct CaptureConfig {
    /// Geraetename (Teilstring), `None` = Standardgeraet
    pub device: Option<String>,
    /// Abtastrate in Hz
    pub sample_rate: u32,
    /// Ring-Buffer Kapazitaet in Samples
    pub buffer_size: usize,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            device: None,
            sample_rate: 48000,
            buffer_size: 48000 / 2, // 500 ms Puffer
        }
    }
}

/// Stellt Mikrofon-Streams vom Betriebssystem bereit
#[derive(Debug, Clone, Default)]
pub struct CpalCaptureSource {
    config: CaptureConfig,
}

impl CpalCaptureSource {
    pub fn new(config: CaptureConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl CaptureSource for CpalCaptureSource {
    async fn acquire(&self) -> AudioResult<Box<dyn CaptureHandle>> {
        let config = self.config.clone();
        // Geraet oeffnen blockiert ggf. bis der Benutzer den Zugriff erlaubt
        let capture = tokio::task::spawn_blocking(move || CpalCapture::oeffnen(config))
            .await
            .map_err(|e| AudioError::StreamFehler(format!("Capture-Task abgebrochen: {e}")))??;
        Ok(Box::new(capture))
    }
}

/// Laufender Mikrofon-Stream auf eigenem Thread
pub struct CpalCapture {
    reader: CaptureReader,
    sample_rate: u32,
    shutdown_tx: Option<Sender<()>>,
    thread: Option<JoinHandle<()>>,
}

impl CpalCapture {
    /// Oeffnet das Geraet und wartet bis der Stream laeuft
    pub fn oeffnen(config: CaptureConfig) -> AudioResult<Self> {
        let (producer, reader) = capture_ring(config.buffer_size);
        let (ready_tx, ready_rx) = bounded::<AudioResult<()>>(1);
        let (shutdown_tx, shutdown_rx) = bounded::<()>(1);
        let sample_rate = config.sample_rate;

        let thread = std::thread::Builder::new()
            .name("audify-capture".into())
            .spawn(move || {
                let stream = load_cpal_input_device(config.device.as_deref())
                    .and_then(|device| open_capture_stream(&device, &config, producer));
                match stream {
                    Ok(stream) => {
                        let _ = ready_tx.send(Ok(()));
                        // Blockiert bis stop_tracks oder Drop
                        let _ = shutdown_rx.recv();
                        drop(stream);
                        debug!("Capture-Thread beendet");
                    }
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                    }
                }
            })?;

        match ready_rx.recv() {
            Ok(Ok(())) => {
                info!(sample_rate, "Mikrofon-Stream gestartet");
                Ok(Self {
                    reader,
                    sample_rate,
                    shutdown_tx: Some(shutdown_tx),
                    thread: Some(thread),
                })
            }
            Ok(Err(e)) => {
                let _ = thread.join();
                Err(e)
            }
            Err(_) => {
                let _ = thread.join();
                Err(AudioError::StreamFehler(
                    "Capture-Thread ohne Rueckmeldung beendet".into(),
                ))
            }
        }
    }
}

impl CaptureHandle for CpalCapture {
    fn is_active(&self) -> bool {
        self.shutdown_tx.is_some()
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn reader(&self) -> AudioResult<CaptureReader> {
        if self.is_active() {
            Ok(self.reader.clone())
        } else {
            Err(AudioError::CaptureGeschlossen)
        }
    }

    fn stop_tracks(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
            if let Some(thread) = self.thread.take() {
                if thread.join().is_err() {
                    error!("Capture-Thread ist abgestuerzt");
                }
            }
            info!("Mikrofon-Spuren gestoppt");
        }
    }
}

impl Drop for CpalCapture {
    fn drop(&mut self) {
        self.stop_tracks();
    }
}

/// Ordnet cpal-Fehler ein: Meldungen ueber fehlende Berechtigung werden
/// zu `ZugriffVerweigert`
fn stream_fehler(meldung: String) -> AudioError {
    let klein = meldung.to_lowercase();
    if ["permission", "denied", "not permitted"]
        .iter()
        .any(|m| klein.contains(m))
    {
        AudioError::ZugriffVerweigert(meldung)
    } else {
        AudioError::StreamFehler(meldung)
    }
}

/// Schreibt interleavte Frames als Mono in den Ring-Buffer
fn mono_schreiben(
    producer: &mut CaptureProducer,
    mono: &mut Vec<f32>,
    channels: usize,
    frames: impl Iterator<Item = f32>,
) {
    mono.clear();
    let mut summe = 0.0f32;
    for (i, s) in frames.enumerate() {
        summe += s;
        if (i + 1) % channels == 0 {
            mono.push(summe / channels as f32);
            summe = 0.0;
        }
    }
    let written = producer.push_slice(mono);
    if written < mono.len() {
        trace!(verworfen = mono.len() - written, "Capture Ring-Buffer voll");
    }
}

/// Oeffnet den Eingangsstream; der Producer wandert in den cpal-Callback
fn open_capture_stream(
    device: &Device,
    config: &CaptureConfig,
    mut producer: CaptureProducer,
) -> AudioResult<Stream> {
    let supported = device
        .supported_input_configs()
        .map_err(|e| stream_fehler(e.to_string()))?
        .find(|c| {
            c.min_sample_rate().0 <= config.sample_rate
                && c.max_sample_rate().0 >= config.sample_rate
        });

    let (sample_format, channels) = supported
        .map(|c| (c.sample_format(), c.channels()))
        .unwrap_or((SampleFormat::F32, 1));

    let stream_config = StreamConfig {
        channels,
        sample_rate: cpal::SampleRate(config.sample_rate),
        buffer_size: cpal::BufferSize::Default,
    };
    let kanaele = channels.max(1) as usize;
    let mut mono = Vec::with_capacity(4096);
    let err_fn = |err| error!("Capture-Fehler: {}", err);

    let stream = match sample_format {
        SampleFormat::F32 => device.build_input_stream(
            &stream_config,
            move |data: &[f32], _| {
                mono_schreiben(&mut producer, &mut mono, kanaele, data.iter().copied())
            },
            err_fn,
            None,
        ),
        SampleFormat::I16 => device.build_input_stream(
            &stream_config,
            move |data: &[i16], _| {
                mono_schreiben(
                    &mut producer,
                    &mut mono,
                    kanaele,
                    data.iter().map(|&s| s as f32 / i16::MAX as f32),
                )
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
    .map_err(|e| stream_fehler(e.to_string()))?;

    stream.play().map_err(|e| stream_fehler(e.to_string()))?;

    debug!(
        sample_rate = config.sample_rate,
        kanaele, "Capture-Stream geoeffnet"
    );
    Ok(stream)
}
