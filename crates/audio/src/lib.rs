//! audify-audio – Audio-Engine des Mikrofon-Spiegels
//!
//! - Host-Vertrag (`host`): Mikrofon-Quelle, Engine-Kontext, Renderer
//! - cpal-Anbindung fuer echte Geraete (`capture`, `playback`, `device`)
//! - Offline-Host fuer Tests und Betrieb ohne Hardware (`offline`)
//! - DSP: Kompressor, Biquad-Filter, Gain
//! - Signal-Graph mit Live-Parametern (`graph`)
//! - Pruefton (`tone`)

pub mod capture;
pub mod device;
pub mod dsp;
pub mod error;
pub mod graph;
pub mod host;
pub mod offline;
pub mod params;
pub mod playback;
pub mod tone;

// Bequeme Re-Exporte der wichtigsten Typen
pub use capture::{CaptureConfig, CpalCapture, CpalCaptureSource};
pub use device::{list_devices, AudioDevice, Richtung};
pub use dsp::AudioProcessor;
pub use error::{AudioError, AudioResult};
pub use graph::{GraphContext, StageNode};
pub use host::{
    AudioBackend, CaptureHandle, CaptureReader, CaptureSource, EngineContext, Renderer,
};
pub use offline::{OfflineAntwort, OfflineBackend, OfflineCaptureSource};
pub use params::{AtomicParam, StageParams};
pub use playback::{CpalBackend, PlaybackConfig};
pub use tone::{play_test_tone, TonePlayback, ToneRenderer};
