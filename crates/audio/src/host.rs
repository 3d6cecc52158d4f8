//! Vertrag mit dem Host-Audio-Subsystem
//!
//! Der Signal-Graph kennt nur diese Traits. Umsetzungen:
//! - `capture` / `playback`: echte Geraete via cpal
//! - `offline`: deterministischer In-Memory-Host fuer Tests
//!
//! Ablauf: `CaptureSource::acquire` liefert ein `CaptureHandle` (einziger
//! Suspendierungspunkt, wartet ggf. auf die Freigabe durch den Benutzer).
//! `AudioBackend::open_context` oeffnet einen `EngineContext`, an den ein
//! `Renderer` angeschlossen wird. Der Renderer laeuft im Realtime-Thread
//! des Hosts und zieht dort die Samples aus dem `CaptureReader`.

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use ringbuf::traits::{Consumer, Observer, Split};
use ringbuf::{HeapCons, HeapProd, HeapRb};

use crate::error::AudioResult;

/// Quelle fuer Mikrofon-Streams
#[async_trait]
pub trait CaptureSource: Send + Sync {
    /// Fordert einen Stream an.
    ///
    /// Fehler: `AudioError::ZugriffVerweigert` wenn der Benutzer ablehnt,
    /// jeder andere Fehler wenn das Geraet nicht geoeffnet werden kann.
    async fn acquire(&self) -> AudioResult<Box<dyn CaptureHandle>>;
}

/// Besitz eines laufenden Mikrofon-Streams. Drop stoppt die Spuren.
pub trait CaptureHandle: Send {
    /// Laufen die Spuren noch?
    fn is_active(&self) -> bool;

    /// Abtastrate des Streams in Hz
    fn sample_rate(&self) -> u32;

    /// Leser fuer die Render-Seite. Fehler wenn der Stream gestoppt ist.
    fn reader(&self) -> AudioResult<CaptureReader>;

    /// Stoppt alle Spuren. Mehrfacher Aufruf ist erlaubt.
    fn stop_tracks(&mut self);
}

/// Erzeugt Engine-Kontexte
pub trait AudioBackend: Send + Sync {
    /// Oeffnet einen neuen Kontext (noch ohne Renderer)
    fn open_context(&self) -> AudioResult<Box<dyn EngineContext>>;

    /// Anzeigename fuer Logs
    fn name(&self) -> &str;
}

/// Eine laufende Instanz der Audio-Engine
pub trait EngineContext: Send {
    fn sample_rate(&self) -> u32;

    fn is_open(&self) -> bool;

    /// Anzahl bisher gerenderter Frames
    fn sample_clock(&self) -> u64;

    /// Verbindet einen Renderer mit dem Ausgang und startet die Wiedergabe
    fn connect(&mut self, renderer: Box<dyn Renderer>) -> AudioResult<()>;

    /// Schliesst den Kontext. Mehrfacher Aufruf ist erlaubt.
    fn close(&mut self);
}

/// Fuellt einen Mono-Block; laeuft im Realtime-Thread des Hosts
pub trait Renderer: Send + 'static {
    fn render(&mut self, out: &mut [f32]);
}

impl<F> Renderer for F
where
    F: FnMut(&mut [f32]) + Send + 'static,
{
    fn render(&mut self, out: &mut [f32]) {
        self(out)
    }
}

/// Produziert Samples aus dem Mikrofon-Callback
pub type CaptureProducer = HeapProd<f32>;

/// Render-seitiger Zugriff auf den Capture-Ring-Buffer
///
/// Mehrere Leser teilen sich denselben Consumer, es liest aber immer nur
/// der Graph der aktuellen Session. `try_lock` blockiert den
/// Realtime-Thread nie; bei Konflikt wird Stille geliefert.
#[derive(Clone)]
pub struct CaptureReader {
    consumer: Arc<Mutex<HeapCons<f32>>>,
}

impl CaptureReader {
    /// Liest bis zu `out.len()` Samples, fehlende werden mit Stille gefuellt.
    /// Gibt die Anzahl echter Samples zurueck.
    pub fn read_into(&self, out: &mut [f32]) -> usize {
        let read = match self.consumer.try_lock() {
            Some(mut cons) => cons.pop_slice(out),
            None => 0,
        };
        if read < out.len() {
            tracing::trace!(fehlend = out.len() - read, "Capture Underrun");
            out[read..].fill(0.0);
        }
        read
    }

    /// Anzahl gepufferter Samples
    pub fn available(&self) -> usize {
        self.consumer.lock().occupied_len()
    }

    /// Verwirft alles, was bisher gepuffert wurde. Gibt die Anzahl
    /// verworfener Samples zurueck.
    pub fn verwerfen(&self) -> usize {
        let verworfen = self.consumer.lock().clear();
        if verworfen > 0 {
            tracing::debug!(verworfen, "Veraltete Capture-Samples verworfen");
        }
        verworfen
    }
}

/// Legt einen Capture-Ring-Buffer mit der gegebenen Kapazitaet an
pub fn capture_ring(capacity: usize) -> (CaptureProducer, CaptureReader) {
    let rb = HeapRb::<f32>::new(capacity.max(1));
    let (producer, consumer) = rb.split();
    (
        producer,
        CaptureReader {
            consumer: Arc::new(Mutex::new(consumer)),
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use ringbuf::traits::Producer;

    #[test]
    fn reader_fuellt_underrun_mit_stille() {
        let (mut prod, reader) = capture_ring(16);
        prod.push_slice(&[0.5, 0.5]);
        let mut out = [1.0f32; 4];
        let read = reader.read_into(&mut out);
        assert_eq!(read, 2);
        assert_eq!(out, [0.5, 0.5, 0.0, 0.0]);
    }

    #[test]
    fn reader_klone_teilen_puffer() {
        let (mut prod, reader) = capture_ring(16);
        let zweiter = reader.clone();
        prod.push_slice(&[0.1, 0.2, 0.3]);
        assert_eq!(zweiter.available(), 3);
        let mut out = [0.0f32; 3];
        reader.read_into(&mut out);
        assert_eq!(zweiter.available(), 0);
    }

    #[test]
    fn verwerfen_leert_den_puffer() {
        let (mut prod, reader) = capture_ring(16);
        prod.push_slice(&[0.3; 12]);
        assert_eq!(reader.verwerfen(), 12);
        assert_eq!(reader.available(), 0);

        // Danach kommen nur noch neue Samples an
        prod.push_slice(&[0.7, 0.7]);
        let mut out = [1.0f32; 4];
        assert_eq!(reader.read_into(&mut out), 2);
        assert_eq!(out, [0.7, 0.7, 0.0, 0.0]);
        assert_eq!(reader.verwerfen(), 0);
    }

    #[test]
    fn closure_ist_renderer() {
        let mut r: Box<dyn Renderer> = Box::new(|out: &mut [f32]| out.fill(0.25));
        let mut block = [0.0f32; 3];
        r.render(&mut block);
        assert_eq!(block, [0.25; 3]);
    }
}
