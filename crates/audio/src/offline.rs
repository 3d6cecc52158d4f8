//! Deterministischer In-Memory-Host
//!
//! Ersetzt Mikrofon und Ausgabegeraet in Tests und beim Betrieb ohne
//! Audio-Hardware. Die Antwort auf Mikrofon-Anfragen ist skriptbar
//! (Freigabe, Ablehnung, Fehler) und kann ueber ein `Notify` angehalten
//! werden, um eine lange Berechtigungsabfrage nachzustellen. Gerendert
//! wird nur auf Anforderung ueber `OfflineBackend::rendern`.

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};

use async_trait::async_trait;
use crossbeam_channel::{Receiver, Sender};
use parking_lot::Mutex;
use ringbuf::traits::Producer;
use tokio::sync::Notify;
use tracing::{debug, trace};

use crate::error::{AudioError, AudioResult};
use crate::host::{
    capture_ring, AudioBackend, CaptureHandle, CaptureProducer, CaptureReader, CaptureSource,
    EngineContext, Renderer,
};

/// Skriptbare Antwort auf eine Mikrofon-Anfrage
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OfflineAntwort {
    Freigabe,
    Verweigert,
    Fehler(String),
}

#[derive(Debug)]
struct QuellenZustand {
    antwort: OfflineAntwort,
    samples: Vec<f32>,
    sperre: Option<Arc<Notify>>,
    anfragen: usize,
    produzenten: Vec<Weak<Mutex<CaptureProducer>>>,
}

/// Mikrofon-Quelle ohne Hardware
#[derive(Debug, Clone)]
pub struct OfflineCaptureSource {
    zustand: Arc<Mutex<QuellenZustand>>,
    aktive: Arc<AtomicUsize>,
    sample_rate: u32,
}

impl OfflineCaptureSource {
    /// Quelle, die jede Anfrage freigibt
    pub fn gewaehrend(sample_rate: u32) -> Self {
        Self::mit_antwort(OfflineAntwort::Freigabe, sample_rate)
    }

    /// Quelle, bei der der Benutzer jede Anfrage ablehnt
    pub fn verweigernd() -> Self {
        Self::mit_antwort(OfflineAntwort::Verweigert, 48000)
    }

    pub fn mit_antwort(antwort: OfflineAntwort, sample_rate: u32) -> Self {
        Self {
            zustand: Arc::new(Mutex::new(QuellenZustand {
                antwort,
                samples: Vec::new(),
                sperre: None,
                anfragen: 0,
                produzenten: Vec::new(),
            })),
            aktive: Arc::new(AtomicUsize::new(0)),
            sample_rate,
        }
    }

    /// Samples, die jeder neue Stream bei der Freigabe im Puffer vorfindet
    /// (Rueckstand, den der Graph beim Aufbau verwirft)
    pub fn mit_samples(self, samples: Vec<f32>) -> Self {
        self.zustand.lock().samples = samples;
        self
    }

    /// Schreibt Samples in alle laufenden Streams, wie es der
    /// Mikrofon-Callback tut. Gibt die Anzahl belieferter Streams zurueck.
    pub fn einspeisen(&self, samples: &[f32]) -> usize {
        let mut zustand = self.zustand.lock();
        zustand.produzenten.retain(|p| p.strong_count() > 0);
        let mut beliefert = 0;
        for producer in zustand.produzenten.iter().filter_map(Weak::upgrade) {
            let geschrieben = producer.lock().push_slice(samples);
            if geschrieben < samples.len() {
                trace!(verworfen = samples.len() - geschrieben, "Offline-Puffer voll");
            }
            beliefert += 1;
        }
        beliefert
    }

    pub fn antwort_setzen(&self, antwort: OfflineAntwort) {
        self.zustand.lock().antwort = antwort;
    }

    /// Haelt kuenftige Anfragen an, bis das zurueckgegebene `Notify`
    /// ausgeloest wird (`notify_one` pro Anfrage)
    pub fn anhalten(&self) -> Arc<Notify> {
        let notify = Arc::new(Notify::new());
        self.zustand.lock().sperre = Some(Arc::clone(&notify));
        notify
    }

    /// Hebt das Anhalten fuer kuenftige Anfragen auf
    pub fn freigeben(&self) {
        self.zustand.lock().sperre = None;
    }

    /// Anzahl der Berechtigungsabfragen bisher
    pub fn anfragen(&self) -> usize {
        self.zustand.lock().anfragen
    }

    /// Anzahl der Streams, deren Spuren noch laufen
    pub fn aktive_handles(&self) -> usize {
        self.aktive.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CaptureSource for OfflineCaptureSource {
    async fn acquire(&self) -> AudioResult<Box<dyn CaptureHandle>> {
        let sperre = {
            let mut zustand = self.zustand.lock();
            zustand.anfragen += 1;
            zustand.sperre.clone()
        };
        if let Some(sperre) = sperre {
            sperre.notified().await;
        }

        let mut zustand = self.zustand.lock();
        match &zustand.antwort {
            OfflineAntwort::Freigabe => {
                let handle = OfflineCapture::neu(
                    &zustand.samples,
                    self.sample_rate,
                    Arc::clone(&self.aktive),
                );
                if let Some(producer) = &handle.producer {
                    zustand.produzenten.push(Arc::downgrade(producer));
                }
                debug!(anfragen = zustand.anfragen, "Offline-Mikrofon freigegeben");
                Ok(Box::new(handle))
            }
            OfflineAntwort::Verweigert => Err(AudioError::ZugriffVerweigert(
                "Benutzer hat abgelehnt".into(),
            )),
            OfflineAntwort::Fehler(grund) => Err(AudioError::StreamFehler(grund.clone())),
        }
    }
}

/// Offline-Stream; Samples kommen als Rueckstand bei der Freigabe oder
/// spaeter ueber `OfflineCaptureSource::einspeisen`
pub struct OfflineCapture {
    reader: CaptureReader,
    /// `None` sobald die Spuren gestoppt sind
    producer: Option<Arc<Mutex<CaptureProducer>>>,
    sample_rate: u32,
    aktiv: bool,
    aktive: Arc<AtomicUsize>,
}

impl OfflineCapture {
    fn neu(samples: &[f32], sample_rate: u32, aktive: Arc<AtomicUsize>) -> Self {
        let (mut producer, reader) = capture_ring(samples.len().max(sample_rate as usize));
        producer.push_slice(samples);
        aktive.fetch_add(1, Ordering::SeqCst);
        Self {
            reader,
            producer: Some(Arc::new(Mutex::new(producer))),
            sample_rate,
            aktiv: true,
            aktive,
        }
    }
}

impl CaptureHandle for OfflineCapture {
    fn is_active(&self) -> bool {
        self.aktiv
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn reader(&self) -> AudioResult<CaptureReader> {
        if self.aktiv {
            Ok(self.reader.clone())
        } else {
            Err(AudioError::CaptureGeschlossen)
        }
    }

    fn stop_tracks(&mut self) {
        if self.aktiv {
            self.aktiv = false;
            self.producer = None;
            self.aktive.fetch_sub(1, Ordering::SeqCst);
        }
    }
}

impl Drop for OfflineCapture {
    fn drop(&mut self) {
        self.stop_tracks();
    }
}

struct Slot {
    offen: AtomicBool,
    renderer: Mutex<Option<Box<dyn Renderer>>>,
    clock: AtomicU64,
}

#[derive(Default)]
struct BackendZustand {
    slots: Vec<Arc<Slot>>,
    oeffnen_scheitert: bool,
    verbinden_scheitert: bool,
    verbinden_sperre: Option<Receiver<()>>,
}

/// Ausgabe ohne Hardware; rendert nur auf Anforderung
#[derive(Clone)]
pub struct OfflineBackend {
    zustand: Arc<Mutex<BackendZustand>>,
    sample_rate: u32,
}

impl OfflineBackend {
    pub fn new(sample_rate: u32) -> Self {
        Self {
            zustand: Arc::new(Mutex::new(BackendZustand::default())),
            sample_rate,
        }
    }

    /// Laesst `open_context` fehlschlagen
    pub fn oeffnen_scheitern_lassen(&self, scheitern: bool) {
        self.zustand.lock().oeffnen_scheitert = scheitern;
    }

    /// Laesst `connect` auf neuen Kontexten fehlschlagen
    pub fn verbinden_scheitern_lassen(&self, scheitern: bool) {
        self.zustand.lock().verbinden_scheitert = scheitern;
    }

    /// Laesst `connect` auf neuen Kontexten warten, bis ueber den Sender
    /// ein Signal kommt oder er gedroppt wird; stellt ein langsam
    /// startendes Ausgabegeraet nach
    pub fn verbinden_anhalten(&self) -> Sender<()> {
        let (tx, rx) = crossbeam_channel::unbounded();
        self.zustand.lock().verbinden_sperre = Some(rx);
        tx
    }

    /// Anzahl aller jemals geoeffneten Kontexte
    pub fn geoeffnete_kontexte(&self) -> usize {
        self.zustand.lock().slots.len()
    }

    /// Anzahl der noch offenen Kontexte
    pub fn offene_kontexte(&self) -> usize {
        self.zustand
            .lock()
            .slots
            .iter()
            .filter(|s| s.offen.load(Ordering::SeqCst))
            .count()
    }

    /// Rendert `frames` Samples auf dem zuletzt geoeffneten, noch offenen
    /// und verbundenen Kontext
    pub fn rendern(&self, frames: usize) -> Option<Vec<f32>> {
        let slot = self
            .zustand
            .lock()
            .slots
            .iter()
            .rev()
            .find(|s| s.offen.load(Ordering::SeqCst) && s.renderer.lock().is_some())
            .cloned()?;
        Self::slot_rendern(&slot, frames)
    }

    fn slot_rendern(slot: &Slot, frames: usize) -> Option<Vec<f32>> {
        if !slot.offen.load(Ordering::SeqCst) {
            return None;
        }
        let mut renderer = slot.renderer.lock();
        let renderer = renderer.as_mut()?;
        let mut block = vec![0.0f32; frames];
        renderer.render(&mut block);
        for s in &mut block {
            *s = s.clamp(-1.0, 1.0);
        }
        slot.clock.fetch_add(frames as u64, Ordering::SeqCst);
        Some(block)
    }
}

impl AudioBackend for OfflineBackend {
    fn open_context(&self) -> AudioResult<Box<dyn EngineContext>> {
        let mut zustand = self.zustand.lock();
        if zustand.oeffnen_scheitert {
            return Err(AudioError::StreamFehler(
                "Offline-Kontext nicht verfuegbar".into(),
            ));
        }
        let slot = Arc::new(Slot {
            offen: AtomicBool::new(true),
            renderer: Mutex::new(None),
            clock: AtomicU64::new(0),
        });
        zustand.slots.push(Arc::clone(&slot));
        Ok(Box::new(OfflineContext {
            slot,
            sample_rate: self.sample_rate,
            verbinden_scheitert: zustand.verbinden_scheitert,
            sperre: zustand.verbinden_sperre.clone(),
        }))
    }

    fn name(&self) -> &str {
        "offline"
    }
}

struct OfflineContext {
    slot: Arc<Slot>,
    sample_rate: u32,
    verbinden_scheitert: bool,
    sperre: Option<Receiver<()>>,
}

impl EngineContext for OfflineContext {
    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn is_open(&self) -> bool {
        self.slot.offen.load(Ordering::SeqCst)
    }

    fn sample_clock(&self) -> u64 {
        self.slot.clock.load(Ordering::SeqCst)
    }

    fn connect(&mut self, renderer: Box<dyn Renderer>) -> AudioResult<()> {
        if let Some(sperre) = &self.sperre {
            // Err heisst: Sender weg, nicht mehr warten
            let _ = sperre.recv();
        }
        if !self.is_open() {
            return Err(AudioError::KontextGeschlossen);
        }
        if self.verbinden_scheitert {
            return Err(AudioError::StreamFehler("Verbinden fehlgeschlagen".into()));
        }
        *self.slot.renderer.lock() = Some(renderer);
        Ok(())
    }

    fn close(&mut self) {
        if self.slot.offen.swap(false, Ordering::SeqCst) {
            self.slot.renderer.lock().take();
        }
    }
}

impl Drop for OfflineContext {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn freigabe_liefert_aktiven_handle() {
        let source = OfflineCaptureSource::gewaehrend(48000).mit_samples(vec![0.5; 4]);
        let mut handle = source.acquire().await.unwrap();
        assert!(handle.is_active());
        assert_eq!(source.aktive_handles(), 1);

        let mut out = [0.0f32; 4];
        assert_eq!(handle.reader().unwrap().read_into(&mut out), 4);

        handle.stop_tracks();
        handle.stop_tracks();
        assert_eq!(source.aktive_handles(), 0);
        assert!(handle.reader().is_err());
    }

    #[tokio::test]
    async fn einspeisen_erreicht_nur_laufende_streams() {
        let source = OfflineCaptureSource::gewaehrend(48000);
        let mut erster = source.acquire().await.unwrap();
        let zweiter = source.acquire().await.unwrap();
        assert_eq!(source.einspeisen(&[0.25; 8]), 2);
        assert_eq!(zweiter.reader().unwrap().available(), 8);

        erster.stop_tracks();
        assert_eq!(source.einspeisen(&[0.25; 8]), 1);
        drop(zweiter);
        assert_eq!(source.einspeisen(&[0.25; 8]), 0);
    }

    #[tokio::test]
    async fn verweigerung_liefert_fehler() {
        let source = OfflineCaptureSource::verweigernd();
        let err = source.acquire().await.err().unwrap();
        assert!(err.ist_verweigerung());
        assert_eq!(source.anfragen(), 1);
        assert_eq!(source.aktive_handles(), 0);
    }

    #[tokio::test]
    async fn drop_stoppt_spuren() {
        let source = OfflineCaptureSource::gewaehrend(48000);
        let handle = source.acquire().await.unwrap();
        drop(handle);
        assert_eq!(source.aktive_handles(), 0);
    }

    #[tokio::test]
    async fn angehaltene_anfrage_wartet_auf_freigabe() {
        let source = OfflineCaptureSource::gewaehrend(48000);
        let sperre = source.anhalten();
        let s = source.clone();
        let task = tokio::spawn(async move { s.acquire().await.map(|h| h.is_active()) });
        tokio::task::yield_now().await;
        assert!(!task.is_finished());
        sperre.notify_one();
        assert!(task.await.unwrap().unwrap());
    }

    #[test]
    fn kontext_rendert_und_schliesst() {
        let backend = OfflineBackend::new(48000);
        let mut ctx = backend.open_context().unwrap();
        ctx.connect(Box::new(|out: &mut [f32]| out.fill(3.0)))
            .unwrap();

        let block = backend.rendern(8).unwrap();
        assert_eq!(block, vec![1.0; 8]);
        assert_eq!(ctx.sample_clock(), 8);
        assert_eq!(backend.offene_kontexte(), 1);

        ctx.close();
        ctx.close();
        assert_eq!(backend.offene_kontexte(), 0);
        assert_eq!(backend.geoeffnete_kontexte(), 1);
        assert!(backend.rendern(8).is_none());
    }

    #[test]
    fn fehler_injektion() {
        let backend = OfflineBackend::new(48000);
        backend.oeffnen_scheitern_lassen(true);
        assert!(backend.open_context().is_err());
        backend.oeffnen_scheitern_lassen(false);
        backend.verbinden_scheitern_lassen(true);
        let mut ctx = backend.open_context().unwrap();
        assert!(ctx.connect(Box::new(|_: &mut [f32]| {})).is_err());
    }
}
